//! Open-Meteo forecast client.

use async_trait::async_trait;
use chrono::{FixedOffset, Local, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use skyview_core::{ServiceConfig, WeatherConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use crate::error::WeatherError;
use crate::types::{Coordinates, ForecastDay, WeatherReading, WeatherReport};

const CURRENT_FIELDS: &str = "temperature_2m,apparent_temperature,weather_code,wind_speed_10m,\
precipitation_probability,relative_humidity_2m,dew_point_2m,visibility,pressure_msl,uv_index";
const DAILY_FIELDS: &str = "temperature_2m_max,temperature_2m_min,weather_code,sunrise,sunset";
const DAILY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Stateless translation from coordinates to weather measurements.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn fetch_current_and_forecast(
        &self,
        coordinates: Coordinates,
    ) -> Result<WeatherReport, WeatherError>;
}

#[derive(Debug, Deserialize)]
struct ForecastResponse {
    utc_offset_seconds: Option<i32>,
    current: Option<CurrentBlock>,
    daily: Option<DailyBlock>,
}

#[derive(Debug, Default, Deserialize)]
struct CurrentBlock {
    temperature_2m: Option<f64>,
    apparent_temperature: Option<f64>,
    weather_code: Option<i32>,
    wind_speed_10m: Option<f64>,
    precipitation_probability: Option<f64>,
    relative_humidity_2m: Option<f64>,
    dew_point_2m: Option<f64>,
    visibility: Option<f64>,
    pressure_msl: Option<f64>,
    uv_index: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct DailyBlock {
    #[serde(default)]
    time: Vec<String>,
    #[serde(default)]
    temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    weather_code: Vec<Option<i32>>,
    #[serde(default)]
    sunrise: Vec<Option<String>>,
    #[serde(default)]
    sunset: Vec<Option<String>>,
}

#[derive(Debug, Clone)]
pub struct WeatherProvider {
    client: Arc<Client>,
    base_url: String,
    timezone: String,
    forecast_days: usize,
}

impl WeatherProvider {
    pub fn new(services: &ServiceConfig, weather: &WeatherConfig) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(services.request_timeout_secs))
            .user_agent(services.user_agent.as_str())
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: services.weather_url.trim_end_matches('/').to_string(),
            timezone: weather.timezone.clone(),
            forecast_days: weather.forecast_days,
        })
    }

    /// Provider with default request settings against an explicit base URL.
    pub fn with_base_url(base_url: &str) -> Result<Self, WeatherError> {
        Self::new(
            &ServiceConfig {
                weather_url: base_url.to_string(),
                ..ServiceConfig::default()
            },
            &WeatherConfig::default(),
        )
    }

    pub fn timezone(&self) -> &str {
        &self.timezone
    }

    #[instrument(skip(self), level = "info")]
    pub async fn fetch(&self, coordinates: Coordinates) -> Result<WeatherReport, WeatherError> {
        let url = format!(
            "{}/v1/forecast?latitude={}&longitude={}&current={}&daily={}\
             &temperature_unit=fahrenheit&wind_speed_unit=mph&timezone={}",
            self.base_url,
            coordinates.latitude,
            coordinates.longitude,
            CURRENT_FIELDS,
            DAILY_FIELDS,
            urlencoding::encode(&self.timezone),
        );

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            tracing::warn!("Weather request returned status {}", response.status());
            return Err(WeatherError::ServiceUnavailable(format!(
                "weather service returned {}",
                response.status()
            )));
        }

        let body: ForecastResponse = response.json().await?;

        let today = match body.utc_offset_seconds.and_then(FixedOffset::east_opt) {
            Some(offset) => Utc::now().with_timezone(&offset).date_naive(),
            None => Local::now().date_naive(),
        };

        let current = reading_from(body.current.unwrap_or_default());
        let forecast = retain_upcoming(
            forecast_from(body.daily.unwrap_or_default()),
            today,
            self.forecast_days,
        );

        tracing::info!(
            "Fetched weather: {:?}F, {} forecast days",
            current.temperature_f,
            forecast.len()
        );
        Ok(WeatherReport {
            current,
            forecast,
            today,
        })
    }
}

#[async_trait]
impl WeatherSource for WeatherProvider {
    async fn fetch_current_and_forecast(
        &self,
        coordinates: Coordinates,
    ) -> Result<WeatherReport, WeatherError> {
        self.fetch(coordinates).await
    }
}

fn reading_from(current: CurrentBlock) -> WeatherReading {
    WeatherReading {
        temperature_f: current.temperature_2m,
        feels_like_f: current.apparent_temperature,
        wind_mph: current.wind_speed_10m,
        precipitation_percent: current.precipitation_probability,
        humidity_percent: current.relative_humidity_2m,
        dew_point_f: current.dew_point_2m,
        visibility_meters: current.visibility,
        pressure_hpa: current.pressure_msl,
        uv_index: current.uv_index,
        weather_code: current.weather_code,
        retrieved_at: Utc::now(),
    }
}

fn forecast_from(daily: DailyBlock) -> Vec<ForecastDay> {
    daily
        .time
        .iter()
        .enumerate()
        .filter_map(|(i, date)| {
            let date = match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
                Ok(d) => d,
                Err(e) => {
                    tracing::debug!("Skipping forecast day {:?}: {}", date, e);
                    return None;
                }
            };
            Some(ForecastDay {
                date,
                max_temp_f: daily.temperature_2m_max.get(i).copied().flatten(),
                min_temp_f: daily.temperature_2m_min.get(i).copied().flatten(),
                weather_code: daily.weather_code.get(i).copied().flatten(),
                sunrise: parse_local_time(daily.sunrise.get(i)),
                sunset: parse_local_time(daily.sunset.get(i)),
            })
        })
        .collect()
}

fn parse_local_time(value: Option<&Option<String>>) -> Option<NaiveDateTime> {
    value
        .and_then(Option::as_deref)
        .and_then(|s| NaiveDateTime::parse_from_str(s, DAILY_TIME_FORMAT).ok())
}

/// Keep days on or after `today`, ascending by date, at most `max_days`.
pub fn retain_upcoming(
    mut days: Vec<ForecastDay>,
    today: NaiveDate,
    max_days: usize,
) -> Vec<ForecastDay> {
    days.retain(|d| d.date >= today);
    days.sort_by_key(|d| d.date);
    days.truncate(max_days);
    days
}
