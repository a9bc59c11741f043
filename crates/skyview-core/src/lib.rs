pub mod config;
pub mod error;
pub mod preferences;

pub use config::{
    Config, ConfigIssue, GeolocationConfig, ServiceConfig, UiConfig, ValidationResult,
    WeatherConfig,
    ZipProvider,
};
pub use error::{AppError, ConfigError};
pub use preferences::{DisplayPreferences, MetricWindUnit, Theme, UnitSystem};

use anyhow::Result;

/// Initialize logging for the application
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Skyview core initialized");
    Ok(())
}
