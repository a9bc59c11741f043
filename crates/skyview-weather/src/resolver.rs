//! Location resolution state machine.
//!
//! Owns the authoritative [`ResolvedLocation`]. Three sources compete for it:
//! the persisted record, device geolocation and manual search. Every request
//! takes a fresh token; a completion whose token is no longer current is
//! discarded, so a slow lookup can never overwrite a newer one.

use parking_lot::Mutex;
use serde::Serialize;
use skyview_core::ZipProvider;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::instrument;

use crate::error::ResolutionError;
use crate::geocode::Geocoder;
use crate::location::DeviceLocator;
use crate::storage::{self, KeyValueStore};
use crate::types::{Coordinates, LocationLabel, LocationQuery, ResolvedLocation, ValidatedQuery};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionPhase {
    #[default]
    Unset,
    Resolving,
    Resolved,
}

/// Everything the display layer reads from the resolver.
///
/// A failed attempt leaves `phase` at `Resolved` (last-good location kept) or
/// `Unset` (nothing resolved yet) with `location_error` set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationState {
    pub phase: ResolutionPhase,
    pub location: ResolvedLocation,
    pub location_error: Option<String>,
    /// The manual-entry surface should be shown.
    pub prompt_manual_entry: bool,
}

impl LocationState {
    pub fn display_label(&self) -> String {
        self.location.display_label()
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: LocationState,
    token: u64,
}

pub struct LocationResolver {
    geocoder: Arc<dyn Geocoder>,
    locator: Arc<dyn DeviceLocator>,
    store: Arc<dyn KeyValueStore>,
    zip_provider: ZipProvider,
    inner: Mutex<Inner>,
    coordinates_tx: watch::Sender<Option<Coordinates>>,
}

impl LocationResolver {
    pub fn new(
        geocoder: Arc<dyn Geocoder>,
        locator: Arc<dyn DeviceLocator>,
        store: Arc<dyn KeyValueStore>,
        zip_provider: ZipProvider,
    ) -> Self {
        let (coordinates_tx, _) = watch::channel(None);
        Self {
            geocoder,
            locator,
            store,
            zip_provider,
            inner: Mutex::new(Inner::default()),
            coordinates_tx,
        }
    }

    /// Coordinates of every completed resolution, including re-resolutions
    /// to the same place.
    pub fn subscribe(&self) -> watch::Receiver<Option<Coordinates>> {
        self.coordinates_tx.subscribe()
    }

    pub fn state(&self) -> LocationState {
        self.inner.lock().state.clone()
    }

    pub fn location(&self) -> ResolvedLocation {
        self.inner.lock().state.location.clone()
    }

    /// Adopt the persisted record, else try the device, else ask for manual entry.
    #[instrument(skip(self), level = "info")]
    pub async fn initialize(&self) -> Result<(), ResolutionError> {
        let stored = match storage::load_location(self.store.as_ref()) {
            Ok(stored) => stored,
            Err(e) => {
                tracing::warn!("Ignoring unreadable stored location: {}", e);
                None
            }
        };

        if let Some(location) = stored.filter(ResolvedLocation::is_usable) {
            tracing::info!("Restored stored location: {}", location.display_label());
            let mut inner = self.inner.lock();
            inner.state = LocationState {
                phase: ResolutionPhase::Resolved,
                location,
                location_error: None,
                prompt_manual_entry: false,
            };
            self.coordinates_tx
                .send_replace(inner.state.location.coordinates);
            return Ok(());
        }

        if !self.locator.is_available() {
            tracing::info!("No stored location and no geolocation capability");
            self.inner.lock().state.prompt_manual_entry = true;
            return Ok(());
        }

        self.request_device_location().await.map(|_| ())
    }

    /// Resolve a typed query. Malformed input fails before any state change.
    #[instrument(skip(self), level = "info")]
    pub async fn request_manual_resolution(
        &self,
        query: &LocationQuery,
    ) -> Result<ResolvedLocation, ResolutionError> {
        let validated = match query.validate() {
            Ok(validated) => validated,
            Err(e) => {
                tracing::debug!("Rejected query: {}", e);
                self.inner.lock().state.location_error = Some(e.user_message().to_string());
                return Err(e.into());
            }
        };

        let token = self.begin();
        let result = self.lookup_manual(query, &validated).await;
        self.complete(token, result)
    }

    /// Resolve from a single device fix, then reverse geocode the label.
    #[instrument(skip(self), level = "info")]
    pub async fn request_device_location(&self) -> Result<ResolvedLocation, ResolutionError> {
        let token = self.begin();

        let coordinates = match self.locator.current_location().await {
            Ok(coordinates) => coordinates,
            Err(e) => return self.complete(token, Err(e.into())),
        };

        // The label is a cache for device fixes; a failed lookup leaves it empty
        let label = match self.geocoder.resolve_label(coordinates).await {
            Ok(label) => label,
            Err(e) => {
                tracing::warn!("Reverse geocoding device fix failed: {}", e);
                LocationLabel::default()
            }
        };

        self.complete(token, Ok(ResolvedLocation::device(coordinates).with_label(label)))
    }

    async fn lookup_manual(
        &self,
        query: &LocationQuery,
        validated: &ValidatedQuery,
    ) -> Result<ResolvedLocation, ResolutionError> {
        if let (ValidatedQuery::Zip(zip), ZipProvider::Zippopotam) = (validated, self.zip_provider)
        {
            let place = self.geocoder.resolve_zip_location(zip).await?;
            let label = LocationLabel {
                city: place.city,
                state: place.state,
                zip: zip.clone(),
            };
            return Ok(ResolvedLocation::manual(place.coordinates, label));
        }

        let coordinates = self.geocoder.resolve_coordinates(query).await?;
        let label = self
            .geocoder
            .resolve_label(coordinates)
            .await?
            .or_fill(&validated.entered_label());
        Ok(ResolvedLocation::manual(coordinates, label))
    }

    fn begin(&self) -> u64 {
        let mut inner = self.inner.lock();
        inner.token += 1;
        inner.state.phase = ResolutionPhase::Resolving;
        inner.state.location_error = None;
        tracing::debug!("Resolution {} started", inner.token);
        inner.token
    }

    fn complete(
        &self,
        token: u64,
        result: Result<ResolvedLocation, ResolutionError>,
    ) -> Result<ResolvedLocation, ResolutionError> {
        let mut inner = self.inner.lock();
        if inner.token != token {
            tracing::info!(
                "Discarding stale resolution {} (current is {})",
                token,
                inner.token
            );
            return Err(ResolutionError::Superseded);
        }

        match result {
            Ok(location) => {
                // Written under the lock so storage and memory never disagree
                if let Err(e) = storage::save_location(self.store.as_ref(), &location) {
                    tracing::warn!("Failed to persist resolved location: {}", e);
                }
                tracing::info!(
                    "Resolved location {:?} ({:?})",
                    location.display_label(),
                    location.provenance
                );
                inner.state = LocationState {
                    phase: ResolutionPhase::Resolved,
                    location: location.clone(),
                    location_error: None,
                    prompt_manual_entry: false,
                };
                self.coordinates_tx.send_replace(location.coordinates);
                Ok(location)
            }
            Err(e) => {
                tracing::warn!("Location resolution failed: {}", e);
                let has_location = inner.state.location.is_usable();
                inner.state.phase = if has_location {
                    ResolutionPhase::Resolved
                } else {
                    ResolutionPhase::Unset
                };
                inner.state.location_error = Some(e.user_message().to_string());
                if !has_location && matches!(e, ResolutionError::LocationUnavailable(_)) {
                    inner.state.prompt_manual_entry = true;
                }
                Err(e)
            }
        }
    }
}
