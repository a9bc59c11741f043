//! Forward and reverse geocoding plus ZIP lookup.
//! Uses Nominatim (OpenStreetMap) and Zippopotam.us - free, no API key required.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use skyview_core::ServiceConfig;
use std::time::Duration;
use tracing::instrument;

use crate::error::GeocodeError;
use crate::types::{is_zip, Coordinates, LocationLabel, LocationQuery, ZipLocation};

const ACCEPT_LANGUAGE: &str = "en";

/// Stateless translation between location queries, coordinates and labels.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Forward lookup of a ZIP or "city, state" query.
    async fn resolve_coordinates(&self, query: &LocationQuery) -> Result<Coordinates, GeocodeError>;

    /// Reverse lookup of the place fields for a coordinate pair.
    async fn resolve_label(&self, coordinates: Coordinates) -> Result<LocationLabel, GeocodeError>;

    /// Combined ZIP lookup returning city, state and coordinates in one call.
    async fn resolve_zip_location(&self, zip: &str) -> Result<ZipLocation, GeocodeError>;
}

#[derive(Debug, Deserialize)]
struct NominatimPlace {
    lat: Option<String>,
    lon: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NominatimReverse {
    address: Option<NominatimAddress>,
}

#[derive(Debug, Deserialize)]
struct NominatimAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    hamlet: Option<String>,
    state: Option<String>,
    postcode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ZipResponse {
    #[serde(default)]
    places: Vec<ZipPlace>,
}

#[derive(Debug, Deserialize)]
struct ZipPlace {
    #[serde(rename = "place name")]
    place_name: Option<String>,
    #[serde(rename = "state abbreviation")]
    state_abbreviation: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
}

/// HTTP client for the geocoding and ZIP lookup services.
#[derive(Debug, Clone)]
pub struct GeocodingClient {
    client: Client,
    geocoding_url: String,
    zip_lookup_url: String,
}

impl GeocodingClient {
    pub fn new(services: &ServiceConfig) -> Result<Self, GeocodeError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(services.request_timeout_secs))
            .user_agent(services.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            geocoding_url: trim_base(&services.geocoding_url),
            zip_lookup_url: trim_base(&services.zip_lookup_url),
        })
    }

    /// Point both services at explicit base URLs (e.g. a mock server).
    pub fn with_base_urls(geocoding_url: &str, zip_lookup_url: &str) -> Result<Self, GeocodeError> {
        Self::new(&ServiceConfig {
            geocoding_url: geocoding_url.to_string(),
            zip_lookup_url: zip_lookup_url.to_string(),
            ..ServiceConfig::default()
        })
    }

    #[instrument(skip(self), level = "info")]
    pub async fn resolve_coordinates(
        &self,
        query: &LocationQuery,
    ) -> Result<Coordinates, GeocodeError> {
        let search = query.validate()?.search_text();
        let url = format!("{}/search", self.geocoding_url);

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .query(&[("q", search.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Forward geocode returned status {}", response.status());
            return Err(GeocodeError::ServiceUnavailable(format!(
                "geocoding service returned {}",
                response.status()
            )));
        }

        let places: Vec<NominatimPlace> = response.json().await?;
        let place = places
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(search.clone()))?;

        let coordinates = parse_coordinates(place.lat.as_deref(), place.lon.as_deref())?;
        tracing::info!(
            "Geocoded {:?} to {}, {}",
            search,
            coordinates.latitude,
            coordinates.longitude
        );
        Ok(coordinates)
    }

    #[instrument(skip(self), level = "info")]
    pub async fn resolve_label(
        &self,
        coordinates: Coordinates,
    ) -> Result<LocationLabel, GeocodeError> {
        let url = format!("{}/reverse", self.geocoding_url);
        let lat = coordinates.latitude.to_string();
        let lon = coordinates.longitude.to_string();

        let response = self
            .client
            .get(&url)
            .header(reqwest::header::ACCEPT_LANGUAGE, ACCEPT_LANGUAGE)
            .query(&[
                ("lat", lat.as_str()),
                ("lon", lon.as_str()),
                ("format", "json"),
                ("addressdetails", "1"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            tracing::debug!("Reverse geocode returned status {}", response.status());
            return Err(GeocodeError::ServiceUnavailable(format!(
                "reverse geocoding service returned {}",
                response.status()
            )));
        }

        let body: NominatimReverse = response.json().await?;
        let addr = body
            .address
            .ok_or_else(|| GeocodeError::NotFound(format!("no address for {}, {}", lat, lon)))?;

        // Sparse datasets: take the finest locality available
        let city = addr
            .city
            .or(addr.town)
            .or(addr.village)
            .or(addr.hamlet)
            .unwrap_or_default();

        let label = LocationLabel {
            city,
            state: addr.state.unwrap_or_default(),
            zip: addr.postcode.unwrap_or_default(),
        };

        tracing::info!("Reverse geocoded to: {:?}", label);
        Ok(label)
    }

    #[instrument(skip(self), level = "info")]
    pub async fn resolve_zip_location(&self, zip: &str) -> Result<ZipLocation, GeocodeError> {
        if !is_zip(zip) {
            return Err(GeocodeError::InvalidQuery(format!(
                "ZIP code must be 5 digits, got {:?}",
                zip
            )));
        }

        let url = format!("{}/us/{}", self.zip_lookup_url, zip);
        let response = self.client.get(&url).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(GeocodeError::NotFound(zip.to_string()));
        }
        if !response.status().is_success() {
            return Err(GeocodeError::ServiceUnavailable(format!(
                "ZIP lookup returned {}",
                response.status()
            )));
        }

        let body: ZipResponse = response.json().await?;
        let place = body
            .places
            .into_iter()
            .next()
            .ok_or_else(|| GeocodeError::NotFound(zip.to_string()))?;

        let (Some(city), Some(state)) = (place.place_name, place.state_abbreviation) else {
            return Err(GeocodeError::IncompleteData(format!(
                "ZIP {} is missing place name or state",
                zip
            )));
        };
        let coordinates =
            parse_coordinates(place.latitude.as_deref(), place.longitude.as_deref())?;

        tracing::info!("ZIP {} resolved to {}, {}", zip, city, state);
        Ok(ZipLocation {
            city,
            state,
            coordinates,
        })
    }
}

#[async_trait]
impl Geocoder for GeocodingClient {
    async fn resolve_coordinates(&self, query: &LocationQuery) -> Result<Coordinates, GeocodeError> {
        GeocodingClient::resolve_coordinates(self, query).await
    }

    async fn resolve_label(&self, coordinates: Coordinates) -> Result<LocationLabel, GeocodeError> {
        GeocodingClient::resolve_label(self, coordinates).await
    }

    async fn resolve_zip_location(&self, zip: &str) -> Result<ZipLocation, GeocodeError> {
        GeocodingClient::resolve_zip_location(self, zip).await
    }
}

/// Both halves must be present and numeric; never yields a partial pair.
fn parse_coordinates(lat: Option<&str>, lon: Option<&str>) -> Result<Coordinates, GeocodeError> {
    let (Some(lat), Some(lon)) = (lat, lon) else {
        return Err(GeocodeError::IncompleteData(
            "match is missing latitude or longitude".to_string(),
        ));
    };

    let parse = |value: &str| {
        value
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| GeocodeError::InvalidData(format!("not a number: {:?}", value)))
    };

    let coordinates = Coordinates::new(parse(lat)?, parse(lon)?);
    if !coordinates.is_valid() {
        return Err(GeocodeError::InvalidData(format!(
            "coordinates out of range: {}, {}",
            lat, lon
        )));
    }
    Ok(coordinates)
}

fn trim_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
    use super::*;

    #[test]
    fn test_parse_coordinates() {
        let c = parse_coordinates(Some("34.0901"), Some("-118.4065")).unwrap();
        assert_eq!(c, Coordinates::new(34.0901, -118.4065));
    }

    #[test]
    fn test_parse_coordinates_never_partial() {
        assert!(matches!(
            parse_coordinates(Some("34.0901"), None),
            Err(GeocodeError::IncompleteData(_))
        ));
        assert!(matches!(
            parse_coordinates(Some("34.0901"), Some("west")),
            Err(GeocodeError::InvalidData(_))
        ));
        assert!(matches!(
            parse_coordinates(Some("NaN"), Some("1.0")),
            Err(GeocodeError::InvalidData(_))
        ));
        assert!(matches!(
            parse_coordinates(Some("134.0"), Some("1.0")),
            Err(GeocodeError::InvalidData(_))
        ));
    }

    #[test]
    fn test_trim_base() {
        assert_eq!(trim_base("http://localhost:1234/"), "http://localhost:1234");
    }

    #[tokio::test]
    async fn test_zip_format_checked_before_request() {
        // Unroutable base URL: the call must fail locally, not on the network
        let client = GeocodingClient::with_base_urls("http://127.0.0.1:9", "http://127.0.0.1:9")
            .unwrap();
        let err = client.resolve_zip_location("1234").await.unwrap_err();
        assert!(matches!(err, GeocodeError::InvalidQuery(_)));

        let err = client
            .resolve_coordinates(&LocationQuery::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GeocodeError::InvalidQuery(_)));
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test -p skyview-weather -- --ignored
    async fn test_reverse_geocode_seattle() {
        let client = GeocodingClient::new(&ServiceConfig::default()).unwrap();
        let label = client
            .resolve_label(Coordinates::new(47.6062, -122.3321))
            .await
            .unwrap();
        assert!(label.city.to_lowercase().contains("seattle"));
    }
}
