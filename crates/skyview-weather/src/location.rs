//! Device geolocation: one position fix per request, no continuous tracking.

use async_trait::async_trait;
use skyview_core::GeolocationConfig;
use std::sync::Arc;
use std::time::Duration;

use crate::error::LocationError;
use crate::types::Coordinates;

/// Single-shot access to the environment's geolocation capability.
#[async_trait]
pub trait DeviceLocator: Send + Sync {
    /// Whether this environment can produce a position at all.
    fn is_available(&self) -> bool;

    async fn current_location(&self) -> Result<Coordinates, LocationError>;
}

/// Environment without a geolocation capability.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLocator;

#[async_trait]
impl DeviceLocator for NoLocator {
    fn is_available(&self) -> bool {
        false
    }

    async fn current_location(&self) -> Result<Coordinates, LocationError> {
        Err(LocationError::Unsupported)
    }
}

/// Reports a configured position as the device fix.
#[derive(Debug, Clone, Copy)]
pub struct FixedLocator {
    coordinates: Coordinates,
}

impl FixedLocator {
    pub fn new(coordinates: Coordinates) -> Self {
        Self { coordinates }
    }
}

#[async_trait]
impl DeviceLocator for FixedLocator {
    fn is_available(&self) -> bool {
        true
    }

    async fn current_location(&self) -> Result<Coordinates, LocationError> {
        Ok(self.coordinates)
    }
}

/// The platform's location service, bounded by a timeout.
#[derive(Debug, Clone, Copy)]
pub struct SystemLocator {
    timeout: Duration,
}

impl SystemLocator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl DeviceLocator for SystemLocator {
    fn is_available(&self) -> bool {
        cfg!(any(target_os = "linux", windows))
    }

    async fn current_location(&self) -> Result<Coordinates, LocationError> {
        let fix = tokio::time::timeout(self.timeout, platform::locate())
            .await
            .map_err(|_| LocationError::Timeout)??;

        if !fix.is_valid() {
            return Err(LocationError::Other(format!(
                "invalid position {}, {}",
                fix.latitude, fix.longitude
            )));
        }

        tracing::info!("Got location: {}, {}", fix.latitude, fix.longitude);
        Ok(fix)
    }
}

/// Pick the locator described by the geolocation config section.
pub fn locator_from_config(config: &GeolocationConfig) -> Arc<dyn DeviceLocator> {
    if !config.enabled {
        tracing::info!("Device geolocation disabled by configuration");
        return Arc::new(NoLocator);
    }
    match config.fixed_position() {
        Some((lat, lon)) => Arc::new(FixedLocator::new(Coordinates::new(lat, lon))),
        None => Arc::new(SystemLocator::new(Duration::from_secs(config.timeout_secs))),
    }
}

#[cfg(target_os = "linux")]
mod platform {
    //! GeoClue2 over the system D-Bus.

    use futures::StreamExt;
    use zbus::zvariant::OwnedObjectPath;

    use crate::error::LocationError;
    use crate::types::Coordinates;

    const DESKTOP_ID: &str = "skyview";
    // GCLUE_ACCURACY_LEVEL_CITY
    const ACCURACY_CITY: u32 = 4;
    const NO_LOCATION: &str = "/";

    #[zbus::proxy(
        interface = "org.freedesktop.GeoClue2.Manager",
        default_service = "org.freedesktop.GeoClue2",
        default_path = "/org/freedesktop/GeoClue2/Manager",
        gen_blocking = false
    )]
    trait GeoClueManager {
        fn get_client(&self) -> zbus::Result<OwnedObjectPath>;
    }

    #[zbus::proxy(
        interface = "org.freedesktop.GeoClue2.Client",
        default_service = "org.freedesktop.GeoClue2",
        gen_blocking = false
    )]
    trait GeoClueClient {
        fn start(&self) -> zbus::Result<()>;

        fn stop(&self) -> zbus::Result<()>;

        #[zbus(property)]
        fn location(&self) -> zbus::Result<OwnedObjectPath>;

        #[zbus(property)]
        fn set_desktop_id(&self, id: &str) -> zbus::Result<()>;

        #[zbus(property)]
        fn set_requested_accuracy_level(&self, level: u32) -> zbus::Result<()>;
    }

    #[zbus::proxy(
        interface = "org.freedesktop.GeoClue2.Location",
        default_service = "org.freedesktop.GeoClue2",
        gen_blocking = false
    )]
    trait GeoClueLocation {
        #[zbus(property)]
        fn latitude(&self) -> zbus::Result<f64>;

        #[zbus(property)]
        fn longitude(&self) -> zbus::Result<f64>;

        #[zbus(property)]
        fn accuracy(&self) -> zbus::Result<f64>;
    }

    impl From<zbus::Error> for LocationError {
        fn from(e: zbus::Error) -> Self {
            let text = e.to_string();
            if text.contains("AccessDenied") {
                LocationError::PermissionDenied
            } else if text.contains("ServiceUnknown") {
                LocationError::Unsupported
            } else {
                LocationError::ServiceUnavailable(text)
            }
        }
    }

    pub(super) async fn locate() -> Result<Coordinates, LocationError> {
        let conn = zbus::Connection::system().await?;
        let manager = GeoClueManagerProxy::new(&conn).await?;
        let client_path = manager.get_client().await?;

        let client = GeoClueClientProxy::builder(&conn)
            .path(client_path)?
            .build()
            .await?;
        client.set_desktop_id(DESKTOP_ID).await?;
        client.set_requested_accuracy_level(ACCURACY_CITY).await?;

        let mut changes = client.receive_location_changed().await;
        client.start().await?;

        let result = async {
            let mut path = client.location().await?;
            while path.as_str() == NO_LOCATION {
                let change = changes.next().await.ok_or_else(|| {
                    LocationError::ServiceUnavailable("GeoClue stopped reporting".to_string())
                })?;
                path = change.get().await?;
            }

            let location = GeoClueLocationProxy::builder(&conn)
                .path(path)?
                .build()
                .await?;
            let coordinates = Coordinates::new(location.latitude().await?, location.longitude().await?);
            if let Ok(accuracy) = location.accuracy().await {
                tracing::debug!("GeoClue fix accuracy: {:.0} m", accuracy);
            }
            Ok::<_, LocationError>(coordinates)
        }
        .await;

        if let Err(e) = client.stop().await {
            tracing::debug!("Failed to stop GeoClue client: {}", e);
        }
        result
    }
}

#[cfg(windows)]
mod platform {
    //! Windows.Devices.Geolocation.

    use windows::Devices::Geolocation::{GeolocationAccessStatus, Geolocator};

    use crate::error::LocationError;
    use crate::types::Coordinates;

    fn locate_blocking() -> Result<Coordinates, LocationError> {
        let win = |e: windows::core::Error| LocationError::ServiceUnavailable(e.message().to_string());

        let access = Geolocator::RequestAccessAsync().map_err(win)?.get().map_err(win)?;
        if access != GeolocationAccessStatus::Allowed {
            return Err(LocationError::PermissionDenied);
        }

        let locator = Geolocator::new().map_err(win)?;
        let position = locator
            .GetGeopositionAsync()
            .map_err(win)?
            .get()
            .map_err(win)?;
        let point = position
            .Coordinate()
            .and_then(|c| c.Point())
            .and_then(|p| p.Position())
            .map_err(win)?;

        Ok(Coordinates::new(point.Latitude, point.Longitude))
    }

    pub(super) async fn locate() -> Result<Coordinates, LocationError> {
        tokio::task::spawn_blocking(locate_blocking)
            .await
            .map_err(|e| LocationError::Other(e.to_string()))?
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use crate::error::LocationError;
    use crate::types::Coordinates;

    pub(super) async fn locate() -> Result<Coordinates, LocationError> {
        Err(LocationError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[tokio::test]
    async fn test_no_locator_is_unsupported() {
        let locator = NoLocator;
        assert!(!locator.is_available());
        assert!(matches!(
            locator.current_location().await,
            Err(LocationError::Unsupported)
        ));
    }

    #[tokio::test]
    async fn test_fixed_locator_reports_configured_position() {
        let config = GeolocationConfig {
            fixed_latitude: Some(44.959621),
            fixed_longitude: Some(-93.845337),
            ..GeolocationConfig::default()
        };
        let locator = locator_from_config(&config);
        assert!(locator.is_available());
        assert_eq!(
            locator.current_location().await.unwrap(),
            Coordinates::new(44.959621, -93.845337)
        );
    }

    #[tokio::test]
    async fn test_disabled_config_has_no_capability() {
        let config = GeolocationConfig {
            enabled: false,
            fixed_latitude: Some(1.0),
            fixed_longitude: Some(2.0),
            ..GeolocationConfig::default()
        };
        assert!(!locator_from_config(&config).is_available());
    }
}
