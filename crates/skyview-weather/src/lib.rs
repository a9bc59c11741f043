//! Weather dashboard core for Skyview
//!
//! Resolves a location from a stored record, device geolocation or a typed
//! query, fetches current conditions and a short forecast from Open-Meteo,
//! and keeps both consistent as the location changes.

pub mod codes;
pub mod dashboard;
pub mod error;
pub mod geocode;
pub mod location;
pub mod provider;
pub mod resolver;
pub mod session;
pub mod storage;
pub mod types;
pub mod units;

pub use codes::{code_to_display, WeatherDisplay};
pub use dashboard::{Dashboard, DashboardSnapshot};
pub use error::{GeocodeError, LocationError, ResolutionError, StorageError, WeatherError};
pub use geocode::{Geocoder, GeocodingClient};
pub use location::{locator_from_config, DeviceLocator, FixedLocator, NoLocator, SystemLocator};
pub use provider::{WeatherProvider, WeatherSource};
pub use resolver::{LocationResolver, LocationState, ResolutionPhase};
pub use session::{WeatherSession, WeatherState};
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use types::*;
pub use units::{UnitConverter, WeatherView};
