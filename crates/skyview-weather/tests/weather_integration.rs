//! Integration tests for WeatherProvider using wiremock.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use chrono::{Duration, NaiveDate, Utc};
use skyview_core::{MetricWindUnit, UnitSystem};
use skyview_weather::{
    Coordinates, UnitConverter, WeatherError, WeatherProvider, WeatherState, WeatherView,
};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dates_from(start: NaiveDate, count: i64) -> Vec<String> {
    (0..count)
        .map(|i| (start + Duration::days(i)).format("%Y-%m-%d").to_string())
        .collect()
}

/// Forecast body starting yesterday (UTC), so one day must be dropped.
fn forecast_body() -> serde_json::Value {
    let yesterday = Utc::now().date_naive() - Duration::days(1);
    let dates = dates_from(yesterday, 7);
    let sunrise = dates
        .iter()
        .map(|d| format!("{}T06:45", d))
        .collect::<Vec<_>>();

    serde_json::json!({
        "latitude": 34.09,
        "longitude": -118.41,
        "utc_offset_seconds": 0,
        "timezone": "GMT",
        "current": {
            "time": "2026-01-05T12:00",
            "temperature_2m": 72.0,
            "apparent_temperature": 70.5,
            "weather_code": 1,
            "wind_speed_10m": 10.0,
            "precipitation_probability": 5,
            "relative_humidity_2m": 40,
            "dew_point_2m": 46.4,
            "visibility": 16093.44,
            "pressure_msl": 1015.3,
            "uv_index": 4.4
        },
        "daily": {
            "time": dates,
            "temperature_2m_max": [60.0, 75.2, 74.0, 71.1, 69.0, 68.0, 66.0],
            "temperature_2m_min": [40.0, 55.4, 54.0, 53.1, 52.0, 51.0, 50.0],
            "weather_code": [0, 1, 2, 3, 61, 63, 95],
            "sunrise": sunrise,
            "sunset": [null, null, null, null, null, null, null]
        }
    })
}

#[tokio::test]
async fn test_fetch_current_and_forecast() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .and(query_param("latitude", "34.0901"))
        .and(query_param("longitude", "-118.4065"))
        .and(query_param("temperature_unit", "fahrenheit"))
        .and(query_param("wind_speed_unit", "mph"))
        .and(query_param("timezone", "auto"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&mock_server)
        .await;

    let provider = WeatherProvider::with_base_url(&mock_server.uri()).unwrap();
    let report = provider
        .fetch(Coordinates::new(34.0901, -118.4065))
        .await
        .unwrap();

    assert_eq!(report.current.temperature_f, Some(72.0));
    assert_eq!(report.current.feels_like_f, Some(70.5));
    assert_eq!(report.current.weather_code, Some(1));
    assert_eq!(report.current.visibility_meters, Some(16093.44));

    // Yesterday dropped, default limit of four days kept
    let today = Utc::now().date_naive();
    assert_eq!(report.today, today);
    assert_eq!(report.forecast.len(), 4);
    assert_eq!(report.forecast[0].date, today);
    assert_eq!(report.forecast[0].max_temp_f, Some(75.2));
    assert_eq!(report.forecast[3].weather_code, Some(61));
    assert!(report.forecast[0].sunrise.is_some());
    assert!(report.forecast[0].sunset.is_none());
}

#[tokio::test]
async fn test_metric_view_of_fetched_reading() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body()))
        .mount(&mock_server)
        .await;

    let provider = WeatherProvider::with_base_url(&mock_server.uri()).unwrap();
    let report = provider
        .fetch(Coordinates::new(34.0901, -118.4065))
        .await
        .unwrap();

    let state = WeatherState {
        current: Some(report.current.clone()),
        forecast: report.forecast.clone(),
        today: Some(report.today),
        ..WeatherState::default()
    };

    let metric = WeatherView::new(
        &state,
        &UnitConverter::new(UnitSystem::Metric, MetricWindUnit::Knots),
    );
    let current = metric.current.unwrap();
    assert_eq!(current.temperature_text, "22.2°C");
    assert_eq!(current.dew_point_text, "8°C");
    assert_eq!(current.wind_text, "8.7 knots");
    assert_eq!(current.visibility_text, "16.1 km");
    assert_eq!(current.condition, "Mainly clear");
    assert_eq!(metric.forecast[0].label, "Today");
    assert_eq!(metric.forecast[0].high_text, "24°C");

    let imperial = WeatherView::new(
        &state,
        &UnitConverter::new(UnitSystem::Imperial, MetricWindUnit::Knots),
    );
    let current = imperial.current.unwrap();
    assert_eq!(current.temperature_text, "72°F");
    assert_eq!(current.visibility_text, "10 mi");
    assert_eq!(current.uv_index_text, "4.4");

    // Stored canonical values are untouched by either view
    assert_eq!(state.current.unwrap().temperature_f, Some(72.0));
}

#[tokio::test]
async fn test_fetch_server_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let provider = WeatherProvider::with_base_url(&mock_server.uri()).unwrap();
    let err = provider
        .fetch(Coordinates::new(34.0901, -118.4065))
        .await
        .unwrap_err();

    assert!(matches!(err, WeatherError::ServiceUnavailable(_)));
}

#[tokio::test]
async fn test_fetch_missing_fields_become_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "current": { "temperature_2m": 50.0 }
        })))
        .mount(&mock_server)
        .await;

    let provider = WeatherProvider::with_base_url(&mock_server.uri()).unwrap();
    let report = provider
        .fetch(Coordinates::new(34.0901, -118.4065))
        .await
        .unwrap();

    assert_eq!(report.current.temperature_f, Some(50.0));
    assert_eq!(report.current.wind_mph, None);
    assert_eq!(report.current.weather_code, None);
    assert!(report.forecast.is_empty());
}

#[tokio::test]
async fn test_fetch_malformed_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1/forecast"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&mock_server)
        .await;

    let provider = WeatherProvider::with_base_url(&mock_server.uri()).unwrap();
    let err = provider
        .fetch(Coordinates::new(34.0901, -118.4065))
        .await
        .unwrap_err();

    assert!(matches!(err, WeatherError::Parse(_)));
}
