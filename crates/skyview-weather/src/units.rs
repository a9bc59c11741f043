//! Read-time unit conversion. Stored readings stay in Fahrenheit, mph and metres.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use skyview_core::{MetricWindUnit, UnitSystem};

use crate::codes::display_for;
use crate::session::WeatherState;
use crate::types::{ForecastDay, WeatherReading};

const KMH_PER_MPH: f64 = 1.609344;
const KNOTS_PER_MPH: f64 = 0.868976;
const METERS_PER_MILE: f64 = 1609.344;
const METERS_PER_KM: f64 = 1000.0;
const MISSING: &str = "--";

pub fn fahrenheit_to_celsius(fahrenheit: f64) -> f64 {
    (fahrenheit - 32.0) * 5.0 / 9.0
}

/// Round to one decimal, without a negative zero.
pub fn round1(value: f64) -> f64 {
    let rounded = (value * 10.0).round() / 10.0;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// `22.2`, or `0` rather than `0.0` for whole numbers.
pub fn format_measure(value: f64) -> String {
    let rounded = round1(value);
    if rounded.fract() == 0.0 {
        format!("{:.0}", rounded)
    } else {
        format!("{:.1}", rounded)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnitConverter {
    system: UnitSystem,
    metric_wind: MetricWindUnit,
}

impl UnitConverter {
    pub fn new(system: UnitSystem, metric_wind: MetricWindUnit) -> Self {
        Self {
            system,
            metric_wind,
        }
    }

    pub fn system(&self) -> UnitSystem {
        self.system
    }

    pub fn temperature(&self, fahrenheit: f64) -> f64 {
        match self.system {
            UnitSystem::Imperial => round1(fahrenheit),
            UnitSystem::Metric => round1(fahrenheit_to_celsius(fahrenheit)),
        }
    }

    pub fn temperature_unit(&self) -> &'static str {
        match self.system {
            UnitSystem::Imperial => "°F",
            UnitSystem::Metric => "°C",
        }
    }

    pub fn wind_speed(&self, mph: f64) -> f64 {
        match (self.system, self.metric_wind) {
            (UnitSystem::Imperial, _) => round1(mph),
            (UnitSystem::Metric, MetricWindUnit::Kmh) => round1(mph * KMH_PER_MPH),
            (UnitSystem::Metric, MetricWindUnit::Knots) => round1(mph * KNOTS_PER_MPH),
        }
    }

    pub fn wind_unit(&self) -> &'static str {
        match (self.system, self.metric_wind) {
            (UnitSystem::Imperial, _) => "mph",
            (UnitSystem::Metric, MetricWindUnit::Kmh) => "km/h",
            (UnitSystem::Metric, MetricWindUnit::Knots) => "knots",
        }
    }

    pub fn visibility(&self, meters: f64) -> f64 {
        match self.system {
            UnitSystem::Imperial => round1(meters / METERS_PER_MILE),
            UnitSystem::Metric => round1(meters / METERS_PER_KM),
        }
    }

    pub fn visibility_unit(&self) -> &'static str {
        match self.system {
            UnitSystem::Imperial => "mi",
            UnitSystem::Metric => "km",
        }
    }

    pub fn format_temperature(&self, fahrenheit: Option<f64>) -> String {
        fahrenheit.map_or_else(
            || MISSING.to_string(),
            |f| format!("{}{}", format_measure(self.temperature(f)), self.temperature_unit()),
        )
    }

    pub fn format_wind(&self, mph: Option<f64>) -> String {
        mph.map_or_else(
            || MISSING.to_string(),
            |v| format!("{} {}", format_measure(self.wind_speed(v)), self.wind_unit()),
        )
    }

    pub fn format_visibility(&self, meters: Option<f64>) -> String {
        meters.map_or_else(
            || MISSING.to_string(),
            |v| format!("{} {}", format_measure(self.visibility(v)), self.visibility_unit()),
        )
    }
}

fn format_percent(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), |v| format!("{}%", format_measure(v)))
}

fn format_pressure(hpa: Option<f64>) -> String {
    hpa.map_or_else(|| MISSING.to_string(), |v| format!("{} hPa", format_measure(v)))
}

fn format_plain(value: Option<f64>) -> String {
    value.map_or_else(|| MISSING.to_string(), format_measure)
}

fn format_clock(time: Option<NaiveDateTime>) -> String {
    time.map_or_else(|| MISSING.to_string(), |t| t.format("%-I:%M %p").to_string())
}

/// Current conditions formatted for one unit system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentView {
    pub icon: &'static str,
    pub condition: &'static str,
    pub temperature: Option<f64>,
    pub temperature_text: String,
    pub feels_like_text: String,
    pub wind_text: String,
    pub humidity_text: String,
    pub precipitation_text: String,
    pub dew_point_text: String,
    pub visibility_text: String,
    pub pressure_text: String,
    pub uv_index_text: String,
    pub retrieved_at: DateTime<Utc>,
}

impl CurrentView {
    pub fn new(reading: &WeatherReading, units: &UnitConverter) -> Self {
        let display = display_for(reading.weather_code);
        Self {
            icon: display.icon,
            condition: display.text,
            temperature: reading.temperature_f.map(|f| units.temperature(f)),
            temperature_text: units.format_temperature(reading.temperature_f),
            feels_like_text: units.format_temperature(reading.feels_like_f),
            wind_text: units.format_wind(reading.wind_mph),
            humidity_text: format_percent(reading.humidity_percent),
            precipitation_text: format_percent(reading.precipitation_percent),
            dew_point_text: units.format_temperature(reading.dew_point_f),
            visibility_text: units.format_visibility(reading.visibility_meters),
            pressure_text: format_pressure(reading.pressure_hpa),
            uv_index_text: format_plain(reading.uv_index),
            retrieved_at: reading.retrieved_at,
        }
    }
}

/// One forecast row formatted for one unit system.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastView {
    pub date: NaiveDate,
    pub label: String,
    pub icon: &'static str,
    pub condition: &'static str,
    pub high_text: String,
    pub low_text: String,
    pub sunrise_text: String,
    pub sunset_text: String,
}

impl ForecastView {
    pub fn new(day: &ForecastDay, today: NaiveDate, units: &UnitConverter) -> Self {
        let display = display_for(day.weather_code);
        Self {
            date: day.date,
            label: day.day_label(today),
            icon: display.icon,
            condition: display.text,
            high_text: units.format_temperature(day.max_temp_f),
            low_text: units.format_temperature(day.min_temp_f),
            sunrise_text: format_clock(day.sunrise),
            sunset_text: format_clock(day.sunset),
        }
    }
}

/// Session readings as the rendering surface shows them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherView {
    pub unit_system: UnitSystem,
    pub current: Option<CurrentView>,
    pub forecast: Vec<ForecastView>,
    pub loading: bool,
    pub weather_error: Option<String>,
    pub is_stale: bool,
}

impl WeatherView {
    pub fn new(state: &WeatherState, units: &UnitConverter) -> Self {
        let today = state.today.unwrap_or_else(|| Local::now().date_naive());
        Self {
            unit_system: units.system(),
            current: state.current.as_ref().map(|r| CurrentView::new(r, units)),
            forecast: state
                .forecast
                .iter()
                .map(|day| ForecastView::new(day, today, units))
                .collect(),
            loading: state.loading,
            weather_error: state.weather_error.clone(),
            is_stale: state.is_stale,
        }
    }
}
