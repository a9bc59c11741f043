//! Error taxonomy for location resolution and weather retrieval.
//!
//! Every variant carries a `user_message()`; the state machines attach that
//! string to their error fields instead of propagating the failure upward.

use skyview_core::AppError;
use thiserror::Error;

/// Geocoding and ZIP lookup errors.
#[derive(Debug, Error)]
pub enum GeocodeError {
    /// Malformed user input, caught before any network call.
    #[error("Invalid location query: {0}")]
    InvalidQuery(String),

    /// The service answered but had no match.
    #[error("Location not found: {0}")]
    NotFound(String),

    /// A match was returned without required fields.
    #[error("Incomplete location data: {0}")]
    IncompleteData(String),

    /// A match was returned with fields that do not parse.
    #[error("Invalid location data: {0}")]
    InvalidData(String),

    /// Transport failure or non-success HTTP status.
    #[error("Location lookup failed: {0}")]
    ServiceUnavailable(String),
}

impl GeocodeError {
    pub fn user_message(&self) -> &'static str {
        match self {
            GeocodeError::InvalidQuery(_) => "Please enter a ZIP code or city and state.",
            GeocodeError::NotFound(_) => "Location not found. Check and try again.",
            GeocodeError::IncompleteData(_) | GeocodeError::InvalidData(_) => {
                "Location details were incomplete. Try a different search."
            }
            GeocodeError::ServiceUnavailable(_) => "Location lookup failed. Please try again later.",
        }
    }
}

impl From<reqwest::Error> for GeocodeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            GeocodeError::InvalidData(e.to_string())
        } else {
            GeocodeError::ServiceUnavailable(e.to_string())
        }
    }
}

/// Device geolocation errors.
#[derive(Debug, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("Geolocation not supported")]
    Unsupported,
    #[error("Location service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Location request timed out")]
    Timeout,
    #[error("Location error: {0}")]
    Other(String),
}

impl LocationError {
    pub fn user_message(&self) -> &'static str {
        match self {
            LocationError::Unsupported => "Geolocation not supported",
            _ => "Could not get your location",
        }
    }
}

/// Weather provider errors.
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Weather service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("No location resolved yet")]
    NoLocation,
    #[error("Superseded by a newer weather request")]
    Superseded,
}

impl WeatherError {
    pub fn user_message(&self) -> &'static str {
        match self {
            WeatherError::ServiceUnavailable(_) => {
                "Weather service unavailable. Please try again later."
            }
            WeatherError::Parse(_) => "Weather data could not be read. Please try again.",
            WeatherError::NoLocation => "Choose a location to see the weather.",
            WeatherError::Superseded => "Weather is being updated.",
        }
    }
}

impl From<reqwest::Error> for WeatherError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            WeatherError::Parse(e.to_string())
        } else {
            WeatherError::ServiceUnavailable(e.to_string())
        }
    }
}

/// Durable storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Storage serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of a single location resolution attempt.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error(transparent)]
    Geocode(#[from] GeocodeError),

    #[error("Location unavailable: {0}")]
    LocationUnavailable(#[from] LocationError),

    /// A newer request started before this one completed; its result was discarded.
    #[error("Superseded by a newer location request")]
    Superseded,
}

impl ResolutionError {
    pub fn user_message(&self) -> &'static str {
        match self {
            ResolutionError::Geocode(e) => e.user_message(),
            ResolutionError::LocationUnavailable(e) => e.user_message(),
            ResolutionError::Superseded => "Location is being updated.",
        }
    }
}

impl From<GeocodeError> for AppError {
    fn from(e: GeocodeError) -> Self {
        AppError::service(e.user_message(), e.to_string())
    }
}

impl From<ResolutionError> for AppError {
    fn from(e: ResolutionError) -> Self {
        AppError::service(e.user_message(), e.to_string())
    }
}

impl From<WeatherError> for AppError {
    fn from(e: WeatherError) -> Self {
        AppError::service(e.user_message(), e.to_string())
    }
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::Io(io) => AppError::Io(io),
            other => AppError::service(
                "Saved settings could not be read. Please try again.",
                other.to_string(),
            ),
        }
    }
}
