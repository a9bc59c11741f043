//! Composition root for the weather dashboard.
//!
//! Wires the resolver, the weather session and durable storage together and
//! exposes the operations the display layer invokes:
//! - every coordinate change published by the resolver is forwarded to the
//!   session, which refetches;
//! - unit and theme toggles are persisted alongside the resolved location;
//! - `snapshot()` is everything a surface needs to render.

use parking_lot::Mutex;
use serde::Serialize;
use skyview_core::{AppError, Config, DisplayPreferences, MetricWindUnit, Theme, UnitSystem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};

use crate::error::{ResolutionError, WeatherError};
use crate::geocode::{Geocoder, GeocodingClient};
use crate::location::{locator_from_config, DeviceLocator};
use crate::provider::{WeatherProvider, WeatherSource};
use crate::resolver::{LocationResolver, LocationState};
use crate::session::{WeatherSession, WeatherState};
use crate::storage::{self, JsonFileStore, KeyValueStore, MemoryStore};
use crate::types::{LocationQuery, ResolvedLocation};
use crate::units::{UnitConverter, WeatherView};

/// Read-only view of every component, for rendering.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSnapshot {
    pub location: LocationState,
    pub location_label: String,
    pub weather: WeatherView,
    pub preferences: DisplayPreferences,
}

pub struct Dashboard {
    resolver: Arc<LocationResolver>,
    session: Arc<WeatherSession>,
    store: Arc<dyn KeyValueStore>,
    preferences: Mutex<DisplayPreferences>,
    metric_wind: MetricWindUnit,
    refresh_interval: Option<Duration>,
    started: AtomicBool,
    shutdown_tx: broadcast::Sender<()>,
}

impl Dashboard {
    /// Build the dashboard against the services and storage named in `config`.
    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        let geocoder = GeocodingClient::new(&config.services)?;
        let provider = WeatherProvider::new(&config.services, &config.weather)?;
        let locator = locator_from_config(&config.geolocation);

        let store: Arc<dyn KeyValueStore> = match JsonFileStore::open(config.storage_path()) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::warn!(
                    "Storage at {:?} unusable, keeping state in memory: {}",
                    config.storage_path(),
                    e
                );
                Arc::new(MemoryStore::new())
            }
        };

        Ok(Self::new(
            config,
            Arc::new(geocoder),
            locator,
            Arc::new(provider),
            store,
        ))
    }

    pub fn new(
        config: &Config,
        geocoder: Arc<dyn Geocoder>,
        locator: Arc<dyn DeviceLocator>,
        source: Arc<dyn WeatherSource>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let preferences = match storage::load_preferences(store.as_ref()) {
            Ok(Some(stored)) => stored,
            Ok(None) => config.ui.preferences(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable stored preferences: {}", e);
                config.ui.preferences()
            }
        };

        let resolver = LocationResolver::new(
            geocoder,
            locator,
            store.clone(),
            config.weather.zip_provider,
        );
        let refresh_interval = match config.weather.refresh_minutes {
            0 => None,
            minutes => Some(Duration::from_secs(u64::from(minutes) * 60)),
        };
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            resolver: Arc::new(resolver),
            session: Arc::new(WeatherSession::new(source)),
            store,
            preferences: Mutex::new(preferences),
            metric_wind: config.weather.metric_wind_unit,
            refresh_interval,
            started: AtomicBool::new(false),
            shutdown_tx,
        }
    }

    /// Start forwarding location changes to the session, then resolve the
    /// initial location (stored record, device fix or manual prompt).
    ///
    /// Background tasks are spawned on the first call only.
    pub async fn initialize(&self) -> Result<(), ResolutionError> {
        if !self.started.swap(true, Ordering::SeqCst) {
            self.spawn_forwarder();
            if let Some(interval) = self.refresh_interval {
                self.spawn_auto_refresh(interval);
            }
        }
        self.resolver.initialize().await
    }

    fn spawn_forwarder(&self) {
        let mut coordinates_rx = self.resolver.subscribe();
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let session = self.session.clone();

        tokio::spawn(async move {
            loop {
                let latest = *coordinates_rx.borrow_and_update();
                if let Some(coordinates) = latest {
                    // Token is taken here so fetches are ordered by change, not by task start
                    let token = session.begin(coordinates);
                    let session = session.clone();
                    tokio::spawn(async move {
                        if let Err(e) = session.fetch(token, coordinates).await {
                            tracing::debug!("Weather update for {:?} ended: {}", coordinates, e);
                        }
                    });
                }

                tokio::select! {
                    changed = coordinates_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("Location forwarder stopped");
        });
    }

    fn spawn_auto_refresh(&self, period: Duration) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let session = self.session.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match session.refresh().await {
                            Ok(()) | Err(WeatherError::NoLocation) | Err(WeatherError::Superseded) => {}
                            Err(e) => tracing::warn!("Scheduled refresh failed: {}", e),
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            tracing::debug!("Auto refresh stopped");
        });
    }

    pub async fn request_manual_resolution(
        &self,
        query: &LocationQuery,
    ) -> Result<ResolvedLocation, ResolutionError> {
        self.resolver.request_manual_resolution(query).await
    }

    pub async fn request_device_location(&self) -> Result<ResolvedLocation, ResolutionError> {
        self.resolver.request_device_location().await
    }

    /// Re-fetch weather for the resolver's current location.
    pub async fn refresh(&self) -> Result<(), WeatherError> {
        let coordinates = self
            .resolver
            .location()
            .coordinates
            .ok_or(WeatherError::NoLocation)?;
        self.session.on_location_changed(coordinates).await
    }

    pub fn preferences(&self) -> DisplayPreferences {
        *self.preferences.lock()
    }

    pub fn set_unit_system(&self, unit_system: UnitSystem) -> DisplayPreferences {
        self.update_preferences(|p| p.unit_system = unit_system)
    }

    pub fn toggle_unit_system(&self) -> DisplayPreferences {
        self.update_preferences(|p| p.unit_system = p.unit_system.toggled())
    }

    pub fn set_theme(&self, theme: Theme) -> DisplayPreferences {
        self.update_preferences(|p| p.theme = theme)
    }

    pub fn toggle_theme(&self) -> DisplayPreferences {
        self.update_preferences(|p| p.theme = p.theme.toggled())
    }

    fn update_preferences(&self, change: impl FnOnce(&mut DisplayPreferences)) -> DisplayPreferences {
        let mut preferences = self.preferences.lock();
        change(&mut preferences);
        if let Err(e) = storage::save_preferences(self.store.as_ref(), &preferences) {
            tracing::warn!("Failed to persist display preferences: {}", e);
        }
        tracing::debug!("Display preferences now {:?}", *preferences);
        *preferences
    }

    pub fn location_state(&self) -> LocationState {
        self.resolver.state()
    }

    pub fn weather_state(&self) -> WeatherState {
        self.session.state()
    }

    /// Weather state changes, for surfaces that re-render on update.
    pub fn subscribe_weather(&self) -> watch::Receiver<WeatherState> {
        self.session.subscribe()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        let preferences = self.preferences();
        let units = UnitConverter::new(preferences.unit_system, self.metric_wind);
        let location = self.resolver.state();

        DashboardSnapshot {
            location_label: location.display_label(),
            location,
            weather: WeatherView::new(&self.session.state(), &units),
            preferences,
        }
    }

    /// Stop background tasks. Also happens on drop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

impl Drop for Dashboard {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;
    use crate::location::NoLocator;
    use crate::types::{Coordinates, LocationLabel, WeatherReading, WeatherReport};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    const STORED: Coordinates = Coordinates {
        latitude: 45.1719,
        longitude: -93.8747,
    };

    /// Counts fetches and reports the latitude as the temperature.
    #[derive(Default)]
    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl WeatherSource for CountingSource {
        async fn fetch_current_and_forecast(
            &self,
            coordinates: Coordinates,
        ) -> Result<WeatherReport, WeatherError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(WeatherReport {
                current: WeatherReading {
                    temperature_f: Some(coordinates.latitude),
                    feels_like_f: None,
                    wind_mph: None,
                    precipitation_percent: None,
                    humidity_percent: None,
                    dew_point_f: None,
                    visibility_meters: None,
                    pressure_hpa: None,
                    uv_index: None,
                    weather_code: Some(0),
                    retrieved_at: Utc::now(),
                },
                forecast: Vec::new(),
                today: Utc::now().date_naive(),
            })
        }
    }

    fn stored_location_dashboard(source: Arc<CountingSource>) -> Dashboard {
        let store = Arc::new(MemoryStore::new());
        let location = ResolvedLocation::manual(STORED, LocationLabel::default());
        storage::save_location(store.as_ref(), &location).unwrap();

        let mut config = Config::default();
        config.weather.refresh_minutes = 0;
        let geocoder = GeocodingClient::with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9")
            .unwrap();
        Dashboard::new(&config, Arc::new(geocoder), Arc::new(NoLocator), source, store)
    }

    fn offline_dashboard(store: Arc<MemoryStore>) -> Dashboard {
        let config = Config::default();
        let geocoder = GeocodingClient::with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9")
            .unwrap();
        let provider = WeatherProvider::with_base_url("http://127.0.0.1:9").unwrap();
        Dashboard::new(
            &config,
            Arc::new(geocoder),
            Arc::new(NoLocator),
            Arc::new(provider),
            store,
        )
    }

    #[tokio::test]
    async fn test_toggles_persist_preferences() {
        let store = Arc::new(MemoryStore::new());
        let dashboard = offline_dashboard(store.clone());
        assert_eq!(dashboard.preferences(), DisplayPreferences::default());

        dashboard.set_unit_system(UnitSystem::Metric);
        let prefs = dashboard.toggle_theme();
        assert_eq!(prefs.theme, Theme::Dark);
        assert_eq!(prefs.unit_system, UnitSystem::Metric);
        assert_eq!(storage::load_preferences(store.as_ref()).unwrap(), Some(prefs));

        // A new dashboard over the same storage restores them
        let restored = offline_dashboard(store);
        assert_eq!(restored.preferences(), prefs);
        assert_eq!(restored.snapshot().weather.unit_system, UnitSystem::Metric);
    }

    #[tokio::test]
    async fn test_initialize_without_location_prompts() {
        let dashboard = offline_dashboard(Arc::new(MemoryStore::new()));
        dashboard.initialize().await.unwrap();

        let snapshot = dashboard.snapshot();
        assert!(snapshot.location.prompt_manual_entry);
        assert_eq!(snapshot.location_label, "");
        assert!(snapshot.weather.current.is_none());
        assert!(matches!(
            dashboard.refresh().await,
            Err(WeatherError::NoLocation)
        ));
    }

    #[tokio::test]
    async fn test_malformed_query_never_reaches_network() {
        let dashboard = offline_dashboard(Arc::new(MemoryStore::new()));
        let err = dashboard
            .request_manual_resolution(&LocationQuery::city_state("Austin", ""))
            .await
            .unwrap_err();
        assert_eq!(
            err.user_message(),
            "Please enter a ZIP code or city and state."
        );
        assert_eq!(
            dashboard.location_state().location_error.as_deref(),
            Some("Please enter a ZIP code or city and state.")
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_repeated_initialize_forwards_once_per_change() {
        let source = Arc::new(CountingSource::default());
        let dashboard = stored_location_dashboard(source.clone());

        dashboard.initialize().await.unwrap();
        dashboard.initialize().await.unwrap();

        let mut updates = dashboard.subscribe_weather();
        tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|s| s.current.is_some() && !s.loading),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Two publishes of the stored location, one forwarder
        let calls = source.calls.load(Ordering::SeqCst);
        assert!((1..=2).contains(&calls), "unexpected fetch count {}", calls);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_refresh_uses_resolved_location_immediately() {
        let source = Arc::new(CountingSource::default());
        let dashboard = stored_location_dashboard(source);

        dashboard.initialize().await.unwrap();
        // The forwarder's fetch for the same place may supersede this one
        match dashboard.refresh().await {
            Ok(()) | Err(WeatherError::Superseded) => {}
            Err(e) => panic!("refresh failed: {}", e),
        }
        assert_eq!(dashboard.weather_state().coordinates, Some(STORED));

        let mut updates = dashboard.subscribe_weather();
        let state = tokio::time::timeout(
            Duration::from_secs(5),
            updates.wait_for(|s| s.current.is_some() && !s.loading),
        )
        .await
        .unwrap()
        .unwrap()
        .clone();
        assert_eq!(state.coordinates, Some(STORED));
        assert_eq!(state.current.unwrap().temperature_f, Some(STORED.latitude));
    }
}
