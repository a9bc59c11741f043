use anyhow::Result;
use clap::Parser;
use skyview_core::{AppError, Config, ConfigError, Theme, UnitSystem};
use skyview_weather::{Dashboard, DashboardSnapshot, LocationQuery};
use std::time::Duration;

/// Current conditions and a short forecast for a US location.
#[derive(Parser, Debug)]
#[command(name = "skyview", version)]
#[command(about = "Current conditions and a short forecast for a US location")]
struct Cli {
    /// Resolve the location from this device
    #[arg(long)]
    device: bool,

    /// Show metric units (saved for next time)
    #[arg(long, conflicts_with = "imperial")]
    metric: bool,

    /// Show imperial units (saved for next time)
    #[arg(long)]
    imperial: bool,

    /// Switch between the light and dark theme (saved for next time)
    #[arg(long)]
    toggle_theme: bool,

    /// A 5-digit ZIP code or "City, ST"
    #[arg(trailing_var_arg = true)]
    query: Vec<String>,
}

impl Cli {
    fn unit_system(&self) -> Option<UnitSystem> {
        match (self.metric, self.imperial) {
            (true, _) => Some(UnitSystem::Metric),
            (_, true) => Some(UnitSystem::Imperial),
            _ => None,
        }
    }

    fn query_text(&self) -> Option<String> {
        if self.query.is_empty() {
            None
        } else {
            Some(self.query.join(" "))
        }
    }
}

fn into_app_error(e: anyhow::Error) -> AppError {
    match e.downcast::<ConfigError>() {
        Ok(config) => AppError::Config(config),
        Err(other) => AppError::Other(other),
    }
}

/// Wait until the session holds a result for the resolved coordinates.
async fn wait_for_weather(dashboard: &Dashboard, limit: Duration) {
    let Some(target) = dashboard.location_state().location.coordinates else {
        return;
    };
    let mut updates = dashboard.subscribe_weather();
    let settled = updates.wait_for(|s| {
        s.coordinates == Some(target)
            && !s.loading
            && (s.current.is_some() || s.weather_error.is_some())
    });
    if tokio::time::timeout(limit, settled).await.is_err() {
        tracing::warn!("Timed out waiting for weather");
    }
}

fn render(snapshot: &DashboardSnapshot) {
    let theme = match snapshot.preferences.theme {
        Theme::Light => "light",
        Theme::Dark => "dark",
    };

    if snapshot.location_label.is_empty() {
        println!("Skyview ({} theme)", theme);
    } else {
        println!("Skyview - {} ({} theme)", snapshot.location_label, theme);
    }

    if let Some(message) = &snapshot.location.location_error {
        println!("  ! {}", message);
    }
    if snapshot.location.prompt_manual_entry {
        println!("  Enter a ZIP code or \"City, ST\" to see the weather (skyview --help).");
    }

    let weather = &snapshot.weather;
    if let Some(message) = &weather.weather_error {
        println!("  ! {}", message);
    }
    if let Some(current) = &weather.current {
        let stale = if weather.is_stale { " (stale)" } else { "" };
        println!();
        println!(
            "  {} {}  {}{}",
            current.icon, current.temperature_text, current.condition, stale
        );
        println!("  Feels like   {}", current.feels_like_text);
        println!("  Wind         {}", current.wind_text);
        println!("  Humidity     {}", current.humidity_text);
        println!("  Precip       {}", current.precipitation_text);
        println!("  Dew point    {}", current.dew_point_text);
        println!("  Visibility   {}", current.visibility_text);
        println!("  Pressure     {}", current.pressure_text);
        println!("  UV index     {}", current.uv_index_text);
        println!(
            "  Updated      {}",
            current.retrieved_at.format("%Y-%m-%d %H:%M UTC")
        );
    }

    if !weather.forecast.is_empty() {
        println!();
        for day in &weather.forecast {
            println!(
                "  {:<12} {} {:>8} / {:<8} {:<24} sunrise {} sunset {}",
                day.label,
                day.icon,
                day.high_text,
                day.low_text,
                day.condition,
                day.sunrise_text,
                day.sunset_text
            );
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let (config, _) = Config::load_validated().map_err(into_app_error)?;
    let dashboard = Dashboard::from_config(&config)?;

    if let Some(unit_system) = cli.unit_system() {
        dashboard.set_unit_system(unit_system);
    }
    if cli.toggle_theme {
        dashboard.toggle_theme();
    }

    // Resolution failures are already on the location state
    if let Err(e) = dashboard.initialize().await {
        tracing::debug!("Initial location: {}", e);
    }
    if cli.device {
        if let Err(e) = dashboard.request_device_location().await {
            tracing::debug!("Device location: {}", e);
        }
    }
    if let Some(input) = cli.query_text() {
        match LocationQuery::parse(&input) {
            Ok(query) => {
                if let Err(e) = dashboard.request_manual_resolution(&query).await {
                    tracing::debug!("Manual location: {}", e);
                }
            }
            Err(e) => return Err(e.into()),
        }
    }

    let limit = Duration::from_secs(config.services.request_timeout_secs.saturating_mul(2));
    wait_for_weather(&dashboard, limit).await;

    render(&dashboard.snapshot());
    dashboard.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    skyview_core::init()?;

    if let Err(e) = run(cli).await {
        tracing::error!("{}", e);
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}
