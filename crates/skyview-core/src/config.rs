use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::ConfigError;
use crate::preferences::{DisplayPreferences, MetricWindUnit, Theme, UnitSystem};

const APP_DIR: &str = "skyview";
const CONFIG_FILE: &str = "config.toml";
const STORAGE_FILE: &str = "storage.json";

/// One problem found in a loaded configuration, keyed by its TOML path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.field)
    }
}

/// Problems found by [`Config::validate`]. Errors block startup, warnings are logged.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigIssue>,
    pub warnings: Vec<ConfigIssue>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(ConfigIssue {
            field,
            message: message.into(),
        });
    }

    fn warning(&mut self, field: &'static str, message: impl Into<String>) {
        self.warnings.push(ConfigIssue {
            field,
            message: message.into(),
        });
    }

    /// All blocking problems joined into one line.
    pub fn summary(&self) -> String {
        let parts: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        parts.join("; ")
    }
}

/// Service endpoints must be absolute http(s) URLs with a usable host.
fn check_service_url(raw: &str, field: &'static str, result: &mut ValidationResult) {
    let url = match Url::parse(raw) {
        Ok(url) => url,
        Err(e) => {
            result.error(field, format!("not a URL: {}", e));
            return;
        }
    };

    if !matches!(url.scheme(), "http" | "https") {
        result.error(field, format!("scheme must be http or https, found {}", url.scheme()));
    }
    if url.host_str().map_or(true, str::is_empty) {
        result.error(field, "URL has no host");
    }
    if url.port() == Some(0) {
        result.error(field, "port 0 is not usable");
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Upstream service endpoints
    #[serde(default)]
    pub services: ServiceConfig,

    /// Weather request and presentation settings
    #[serde(default)]
    pub weather: WeatherConfig,

    /// Initial display preferences (overridden by stored toggles)
    #[serde(default)]
    pub ui: UiConfig,

    /// Device geolocation settings
    #[serde(default)]
    pub geolocation: GeolocationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base URL of the Nominatim-compatible geocoding service
    pub geocoding_url: String,

    /// Base URL of the Zippopotam-compatible ZIP lookup service
    pub zip_lookup_url: String,

    /// Base URL of the Open-Meteo-compatible weather service
    pub weather_url: String,

    /// User agent sent with every request (Nominatim rejects anonymous clients)
    pub user_agent: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            geocoding_url: "https://nominatim.openstreetmap.org".to_string(),
            zip_lookup_url: "https://api.zippopotam.us".to_string(),
            weather_url: "https://api.open-meteo.com".to_string(),
            user_agent: format!("Skyview/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 10,
        }
    }
}

/// Which provider answers ZIP-only queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ZipProvider {
    /// Forward geocode the ZIP, then reverse geocode the coordinates
    #[default]
    Nominatim,
    /// Single lookup returning place name, state and coordinates
    Zippopotam,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    /// IANA timezone passed to the weather service ("auto" resolves from coordinates)
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Maximum number of forecast days kept
    #[serde(default = "default_forecast_days")]
    pub forecast_days: usize,

    #[serde(default)]
    pub zip_provider: ZipProvider,

    #[serde(default)]
    pub metric_wind_unit: MetricWindUnit,

    /// Refresh interval in minutes (0 disables periodic refresh)
    #[serde(default = "default_refresh_minutes")]
    pub refresh_minutes: u32,
}

fn default_timezone() -> String {
    "auto".to_string()
}

fn default_forecast_days() -> usize {
    4
}

fn default_refresh_minutes() -> u32 {
    15
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            forecast_days: default_forecast_days(),
            zip_provider: ZipProvider::default(),
            metric_wind_unit: MetricWindUnit::default(),
            refresh_minutes: default_refresh_minutes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    #[serde(default)]
    pub unit_system: UnitSystem,

    #[serde(default)]
    pub theme: Theme,
}

impl UiConfig {
    pub fn preferences(&self) -> DisplayPreferences {
        DisplayPreferences {
            unit_system: self.unit_system,
            theme: self.theme,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    /// Whether device geolocation may be used at all
    #[serde(default = "default_geolocation_enabled")]
    pub enabled: bool,

    /// How long to wait for a single position fix
    #[serde(default = "default_geolocation_timeout")]
    pub timeout_secs: u64,

    /// Fixed coordinates reported as the device position (both or neither)
    #[serde(default)]
    pub fixed_latitude: Option<f64>,

    #[serde(default)]
    pub fixed_longitude: Option<f64>,
}

fn default_geolocation_enabled() -> bool {
    true
}

fn default_geolocation_timeout() -> u64 {
    15
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled: default_geolocation_enabled(),
            timeout_secs: default_geolocation_timeout(),
            fixed_latitude: None,
            fixed_longitude: None,
        }
    }
}

impl GeolocationConfig {
    /// Fixed coordinates, only when both halves are configured.
    pub fn fixed_position(&self) -> Option<(f64, f64)> {
        match (self.fixed_latitude, self.fixed_longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        Self {
            config_dir,
            services: ServiceConfig::default(),
            weather: WeatherConfig::default(),
            ui: UiConfig::default(),
            geolocation: GeolocationConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the user config directory, creating a default if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit path, creating a default if missing
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            let mut config = Self::default();
            if let Some(parent) = config_path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(config_path)?;
            return Ok(config);
        }

        let contents =
            std::fs::read_to_string(config_path).context("Failed to read config file")?;

        let config: Config =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// [`Config::load`] followed by [`Config::validate`].
    ///
    /// Blocking problems become [`ConfigError::Invalid`]; warnings are logged
    /// and handed back to the caller.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let report = config.validate();
        if !report.is_valid() {
            return Err(ConfigError::Invalid(report.summary()).into());
        }
        for issue in &report.warnings {
            tracing::warn!(field = issue.field, "Config: {}", issue.message);
        }
        Ok((config, report))
    }

    pub fn validate(&self) -> ValidationResult {
        let mut report = ValidationResult::default();
        let services = &self.services;

        check_service_url(&services.geocoding_url, "services.geocoding_url", &mut report);
        check_service_url(&services.zip_lookup_url, "services.zip_lookup_url", &mut report);
        check_service_url(&services.weather_url, "services.weather_url", &mut report);

        if services.user_agent.trim().is_empty() {
            report.error("services.user_agent", "user agent is required by the geocoder");
        }
        if services.request_timeout_secs == 0 {
            report.error("services.request_timeout_secs", "timeout must be at least 1 second");
        }

        let weather = &self.weather;
        if weather.timezone.trim().is_empty() {
            report.error("weather.timezone", "timezone is empty (use \"auto\")");
        }
        match weather.forecast_days {
            0 => report.error("weather.forecast_days", "at least one forecast day is needed"),
            3..=7 => {}
            _ => report.warning("weather.forecast_days", "forecast length outside 3-7 days"),
        }
        match weather.refresh_minutes {
            0 => report.warning("weather.refresh_minutes", "periodic refresh is off"),
            m if m > 24 * 60 => {
                report.warning("weather.refresh_minutes", "refresh interval exceeds a day")
            }
            _ => {}
        }

        let geo = &self.geolocation;
        if geo.fixed_latitude.is_some() != geo.fixed_longitude.is_some() {
            report.error(
                "geolocation.fixed_latitude",
                "fixed latitude and longitude go together",
            );
        }
        if let Some((lat, lon)) = geo.fixed_position() {
            if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                report.error("geolocation.fixed_latitude", "fixed position is out of range");
            }
        }
        if geo.enabled && geo.timeout_secs == 0 {
            report.warning("geolocation.timeout_secs", "a 0 second timeout never gets a fix");
        }

        report
    }

    /// Save configuration to the user config directory
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(config_path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Path of the durable key-value storage file
    pub fn storage_path(&self) -> PathBuf {
        self.config_dir.join(STORAGE_FILE)
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join(APP_DIR);

        Ok(config_dir.join(CONFIG_FILE))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_valid_default_config() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_valid(), "Default config should be valid: {:?}", result.errors);
    }

    #[test]
    fn test_invalid_url() {
        let mut config = Config::default();
        config.services.weather_url = "not-a-url".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "services.weather_url"));
    }

    #[test]
    fn test_invalid_url_scheme() {
        let mut config = Config::default();
        config.services.geocoding_url = "ftp://localhost:8080".to_string();
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.message.contains("http or https")));
        assert!(result.summary().contains("services.geocoding_url"));
    }

    #[test]
    fn test_zero_forecast_days_is_error() {
        let mut config = Config::default();
        config.weather.forecast_days = 0;
        let result = config.validate();
        assert!(!result.is_valid());
        assert!(result.errors.iter().any(|e| e.field == "weather.forecast_days"));
    }

    #[test]
    fn test_long_forecast_is_warning() {
        let mut config = Config::default();
        config.weather.forecast_days = 10;
        let result = config.validate();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|w| w.field == "weather.forecast_days"));
    }

    #[test]
    fn test_half_fixed_position_is_error() {
        let mut config = Config::default();
        config.geolocation.fixed_latitude = Some(44.95);
        let result = config.validate();
        assert!(!result.is_valid());
        assert_eq!(config.geolocation.fixed_position(), None);
    }

    #[test]
    fn test_load_creates_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config.config_dir, dir.path());
        assert_eq!(config.weather.forecast_days, 4);

        let reloaded = Config::load_from(&path).unwrap();
        assert_eq!(reloaded.services.weather_url, config.services.weather_url);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "config_dir = \"/tmp/skyview\"\n[weather]\nzip_provider = \"zippopotam\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.weather.zip_provider, ZipProvider::Zippopotam);
        assert_eq!(config.weather.timezone, "auto");
        assert_eq!(config.ui.unit_system, UnitSystem::Imperial);
        assert!(config.geolocation.enabled);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "config_dir = [").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_zero_timeout_blocks_startup() {
        let mut config = Config::default();
        config.services.request_timeout_secs = 0;
        config.services.user_agent = "  ".to_string();
        let result = config.validate();
        assert_eq!(result.errors.len(), 2);
        assert!(result.summary().contains("; "));
    }
}
