//! Weather session state: readings for the latest resolved coordinates.

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::instrument;

use crate::error::WeatherError;
use crate::provider::WeatherSource;
use crate::types::{Coordinates, ForecastDay, WeatherReading, WeatherReport};

/// Readings in canonical units plus the flags the display layer renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeatherState {
    pub current: Option<WeatherReading>,
    pub forecast: Vec<ForecastDay>,
    pub loading: bool,
    pub weather_error: Option<String>,
    /// Readings are from before the last failed fetch.
    pub is_stale: bool,
    /// Coordinates of the most recent fetch trigger.
    pub coordinates: Option<Coordinates>,
    /// Date at the location as of the last successful fetch.
    pub today: Option<NaiveDate>,
}

#[derive(Debug, Default)]
struct Inner {
    state: WeatherState,
    token: u64,
}

pub struct WeatherSession {
    source: Arc<dyn WeatherSource>,
    inner: Mutex<Inner>,
    updates: watch::Sender<WeatherState>,
}

impl WeatherSession {
    pub fn new(source: Arc<dyn WeatherSource>) -> Self {
        let (updates, _) = watch::channel(WeatherState::default());
        Self {
            source,
            inner: Mutex::new(Inner::default()),
            updates,
        }
    }

    pub fn state(&self) -> WeatherState {
        self.inner.lock().state.clone()
    }

    /// Every state change, for surfaces that re-render on update.
    pub fn subscribe(&self) -> watch::Receiver<WeatherState> {
        self.updates.subscribe()
    }

    /// Fetch for newly resolved coordinates. Only the latest trigger's result is kept.
    pub async fn on_location_changed(&self, coordinates: Coordinates) -> Result<(), WeatherError> {
        let token = self.begin(coordinates);
        self.fetch(token, coordinates).await
    }

    /// Claim the next fetch token and mark `coordinates` as loading.
    ///
    /// Triggers are ordered by this call, not by when their fetch first runs.
    pub fn begin(&self, coordinates: Coordinates) -> u64 {
        let mut inner = self.inner.lock();
        inner.token += 1;
        inner.state.coordinates = Some(coordinates);
        inner.state.loading = true;
        self.updates.send_replace(inner.state.clone());
        inner.token
    }

    /// Run the fetch claimed by [`WeatherSession::begin`].
    #[instrument(skip(self), level = "info")]
    pub async fn fetch(&self, token: u64, coordinates: Coordinates) -> Result<(), WeatherError> {
        let result = self.source.fetch_current_and_forecast(coordinates).await;
        self.complete(token, result)
    }

    /// Re-fetch against the current coordinates.
    pub async fn refresh(&self) -> Result<(), WeatherError> {
        let coordinates = self
            .inner
            .lock()
            .state
            .coordinates
            .ok_or(WeatherError::NoLocation)?;

        tracing::info!("Refreshing weather");
        self.on_location_changed(coordinates).await
    }

    fn complete(
        &self,
        token: u64,
        result: Result<WeatherReport, WeatherError>,
    ) -> Result<(), WeatherError> {
        let mut inner = self.inner.lock();
        if inner.token != token {
            tracing::debug!(
                "Discarding stale weather response {} (current is {})",
                token,
                inner.token
            );
            return Err(WeatherError::Superseded);
        }

        let state = &mut inner.state;
        state.loading = false;
        let result = match result {
            Ok(report) => {
                state.current = Some(report.current);
                state.forecast = report.forecast;
                state.today = Some(report.today);
                state.weather_error = None;
                state.is_stale = false;
                Ok(())
            }
            Err(e) => {
                tracing::error!("Weather fetch failed: {}", e);
                state.weather_error = Some(e.user_message().to_string());
                state.is_stale = state.current.is_some();
                Err(e)
            }
        };
        self.updates.send_replace(state.clone());
        result
    }
}
