use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GeocodeError;

const DEVICE_LOCATION_LABEL: &str = "Your Location";

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and within the WGS84 ranges.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Human-readable place fields. Any subset may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationLabel {
    pub city: String,
    pub state: String,
    pub zip: String,
}

impl LocationLabel {
    pub fn is_empty(&self) -> bool {
        self.city.is_empty() && self.state.is_empty() && self.zip.is_empty()
    }

    /// Fill blank fields from `fallback`, keeping any value already present.
    pub fn or_fill(mut self, fallback: &LocationLabel) -> Self {
        if self.city.is_empty() {
            self.city = fallback.city.clone();
        }
        if self.state.is_empty() {
            self.state = fallback.state.clone();
        }
        if self.zip.is_empty() {
            self.zip = fallback.zip.clone();
        }
        self
    }
}

/// Where the authoritative location came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    #[default]
    Unset,
    Manual,
    DeviceGeolocation,
}

/// The authoritative location owned by the resolver.
///
/// Coordinates are either fully present or absent. For device provenance the
/// label is a cache re-derived by reverse geocoding on every new fix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLocation {
    pub coordinates: Option<Coordinates>,
    pub label: LocationLabel,
    pub provenance: Provenance,
}

impl ResolvedLocation {
    pub fn manual(coordinates: Coordinates, label: LocationLabel) -> Self {
        Self {
            coordinates: Some(coordinates),
            label,
            provenance: Provenance::Manual,
        }
    }

    /// A fresh device fix; the label starts empty until reverse geocoding completes.
    pub fn device(coordinates: Coordinates) -> Self {
        Self {
            coordinates: Some(coordinates),
            label: LocationLabel::default(),
            provenance: Provenance::DeviceGeolocation,
        }
    }

    pub fn with_label(mut self, label: LocationLabel) -> Self {
        self.label = label;
        self
    }

    /// A persisted record is only adopted when it carries usable coordinates.
    pub fn is_usable(&self) -> bool {
        self.provenance != Provenance::Unset
            && self.coordinates.is_some_and(|c| c.is_valid())
    }

    /// Label shown in the header of the rendering surface.
    pub fn display_label(&self) -> String {
        let label = &self.label;
        match (label.city.is_empty(), label.state.is_empty()) {
            (false, false) => return format!("{}, {}", label.city, label.state),
            (false, true) => return label.city.clone(),
            _ => {}
        }
        if !label.zip.is_empty() {
            return label.zip.clone();
        }
        match (self.provenance, self.coordinates) {
            (Provenance::Unset, _) | (_, None) => String::new(),
            (Provenance::DeviceGeolocation, Some(_)) => DEVICE_LOCATION_LABEL.to_string(),
            (Provenance::Manual, Some(c)) => format!("{:.2}, {:.2}", c.latitude, c.longitude),
        }
    }
}

/// Raw location request as collected by the display layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocationQuery {
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip: Option<String>,
}

/// A query that passed validation: exactly one of the two accepted shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedQuery {
    Zip(String),
    CityState { city: String, state: String },
}

const QUERY_HINT: &str = "Please enter a ZIP code or city and state";

impl LocationQuery {
    pub fn zip(zip: impl Into<String>) -> Self {
        Self {
            zip: Some(zip.into()),
            ..Self::default()
        }
    }

    pub fn city_state(city: impl Into<String>, state: impl Into<String>) -> Self {
        Self {
            city: Some(city.into()),
            state: Some(state.into()),
            zip: None,
        }
    }

    /// Parse a single search box entry: `"90210"` or `"Portland, OR"`.
    pub fn parse(input: &str) -> Result<Self, GeocodeError> {
        let input = input.trim();
        if is_zip(input) {
            return Ok(Self::zip(input));
        }

        let (city, state) = input
            .split_once(',')
            .map(|(c, s)| (c.trim(), s.trim()))
            .ok_or_else(|| GeocodeError::InvalidQuery(QUERY_HINT.to_string()))?;

        if city.is_empty() || state.is_empty() || state.contains(',') {
            return Err(GeocodeError::InvalidQuery(QUERY_HINT.to_string()));
        }

        Ok(Self::city_state(city, state))
    }

    /// Exactly one of `zip` or (`city` and `state`) must be supplied.
    pub fn validate(&self) -> Result<ValidatedQuery, GeocodeError> {
        let zip = non_blank(&self.zip);
        let city = non_blank(&self.city);
        let state = non_blank(&self.state);

        match (zip, city, state) {
            (Some(zip), None, None) => {
                if is_zip(zip) {
                    Ok(ValidatedQuery::Zip(zip.to_string()))
                } else {
                    Err(GeocodeError::InvalidQuery(format!(
                        "ZIP code must be 5 digits, got {:?}",
                        zip
                    )))
                }
            }
            (None, Some(city), Some(state)) => Ok(ValidatedQuery::CityState {
                city: city.to_string(),
                state: state.to_string(),
            }),
            (Some(_), _, _) => Err(GeocodeError::InvalidQuery(
                "Provide either a ZIP code or a city and state, not both".to_string(),
            )),
            _ => Err(GeocodeError::InvalidQuery(QUERY_HINT.to_string())),
        }
    }
}

impl ValidatedQuery {
    /// Free-text form sent to the forward geocoder.
    pub fn search_text(&self) -> String {
        match self {
            ValidatedQuery::Zip(zip) => zip.clone(),
            ValidatedQuery::CityState { city, state } => format!("{}, {}", city, state),
        }
    }

    /// Label fields the user typed, used to fill gaps in the reverse lookup.
    pub fn entered_label(&self) -> LocationLabel {
        match self {
            ValidatedQuery::Zip(zip) => LocationLabel {
                zip: zip.clone(),
                ..LocationLabel::default()
            },
            ValidatedQuery::CityState { city, state } => LocationLabel {
                city: city.clone(),
                state: state.clone(),
                zip: String::new(),
            },
        }
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// `^\d{5}$`
pub fn is_zip(value: &str) -> bool {
    value.len() == 5 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Result of a combined ZIP lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ZipLocation {
    pub city: String,
    pub state: String,
    pub coordinates: Coordinates,
}

/// Current conditions in canonical units (Fahrenheit, mph, metres, hPa).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReading {
    pub temperature_f: Option<f64>,
    pub feels_like_f: Option<f64>,
    pub wind_mph: Option<f64>,
    pub precipitation_percent: Option<f64>,
    pub humidity_percent: Option<f64>,
    pub dew_point_f: Option<f64>,
    pub visibility_meters: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub uv_index: Option<f64>,
    pub weather_code: Option<i32>,
    pub retrieved_at: DateTime<Utc>,
}

/// One day of the short-range forecast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastDay {
    pub date: NaiveDate,
    pub max_temp_f: Option<f64>,
    pub min_temp_f: Option<f64>,
    pub weather_code: Option<i32>,
    pub sunrise: Option<NaiveDateTime>,
    pub sunset: Option<NaiveDateTime>,
}

impl ForecastDay {
    /// "Today" for the current day, otherwise e.g. "Tue, Jan 6".
    pub fn day_label(&self, today: NaiveDate) -> String {
        if self.date == today {
            "Today".to_string()
        } else {
            self.date.format("%a, %b %-d").to_string()
        }
    }
}

/// Everything one weather request returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub current: WeatherReading,
    pub forecast: Vec<ForecastDay>,
    /// Calendar date at the location when the report was fetched.
    pub today: NaiveDate,
}
