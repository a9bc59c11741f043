//! WMO weather interpretation codes as reported by Open-Meteo.
//! See: https://open-meteo.com/en/docs#weathervariables

use serde::Serialize;

/// Icon/text pair shown for a weather code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WeatherDisplay {
    pub icon: &'static str,
    pub text: &'static str,
}

impl WeatherDisplay {
    const fn new(icon: &'static str, text: &'static str) -> Self {
        Self { icon, text }
    }
}

/// Shown for codes outside the table (and for missing codes).
pub const UNKNOWN_WEATHER: WeatherDisplay = WeatherDisplay::new("❓", "Unknown");

/// Every code the table recognises, in ascending order.
pub const KNOWN_CODES: [i32; 28] = [
    0, 1, 2, 3, 45, 48, 51, 53, 55, 56, 57, 61, 63, 65, 66, 67, 71, 73, 75, 77, 80, 81, 82, 85,
    86, 95, 96, 99,
];

/// Map a WMO code to its display pair.
pub fn code_to_display(code: i32) -> WeatherDisplay {
    match code {
        0 => WeatherDisplay::new("☀️", "Clear sky"),
        1 => WeatherDisplay::new("🌤️", "Mainly clear"),
        2 => WeatherDisplay::new("⛅", "Partly cloudy"),
        3 => WeatherDisplay::new("☁️", "Overcast"),
        45 => WeatherDisplay::new("🌫️", "Fog"),
        48 => WeatherDisplay::new("🌫️", "Depositing rime fog"),
        51 => WeatherDisplay::new("🌦️", "Light drizzle"),
        53 => WeatherDisplay::new("🌦️", "Moderate drizzle"),
        55 => WeatherDisplay::new("🌦️", "Dense drizzle"),
        56 => WeatherDisplay::new("🌧️", "Light freezing drizzle"),
        57 => WeatherDisplay::new("🌧️", "Dense freezing drizzle"),
        61 => WeatherDisplay::new("🌦️", "Slight rain"),
        63 => WeatherDisplay::new("🌦️", "Moderate rain"),
        65 => WeatherDisplay::new("🌧️", "Heavy rain"),
        66 => WeatherDisplay::new("🌧️", "Light freezing rain"),
        67 => WeatherDisplay::new("🌧️", "Heavy freezing rain"),
        71 => WeatherDisplay::new("🌨️", "Slight snow fall"),
        73 => WeatherDisplay::new("🌨️", "Moderate snow fall"),
        75 => WeatherDisplay::new("❄️", "Heavy snow fall"),
        77 => WeatherDisplay::new("❄️", "Snow grains"),
        80 => WeatherDisplay::new("🌦️", "Slight rain showers"),
        81 => WeatherDisplay::new("🌦️", "Moderate rain showers"),
        82 => WeatherDisplay::new("🌧️", "Violent rain showers"),
        85 => WeatherDisplay::new("🌨️", "Slight snow showers"),
        86 => WeatherDisplay::new("🌨️", "Heavy snow showers"),
        95 => WeatherDisplay::new("⛈️", "Thunderstorm"),
        96 => WeatherDisplay::new("⛈️", "Thunderstorm with slight hail"),
        99 => WeatherDisplay::new("⛈️", "Thunderstorm with heavy hail"),
        _ => UNKNOWN_WEATHER,
    }
}

/// Same as [`code_to_display`], treating a missing code as unknown.
pub fn display_for(code: Option<i32>) -> WeatherDisplay {
    code.map(code_to_display).unwrap_or(UNKNOWN_WEATHER)
}
