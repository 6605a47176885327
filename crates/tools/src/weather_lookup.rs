//! Weather lookup tool — deterministic mock weather data.
//!
//! Returns plausible conditions derived from a hash of the location name,
//! so the reasoning loop can be exercised end-to-end without network access.

use async_trait::async_trait;
use ponder_core::error::ToolError;
use ponder_core::tool::{ParamSpec, ParamType, Tool, ToolContext, ToolDescriptor};
use serde_json::Value;

pub struct WeatherLookupTool {
    descriptor: ToolDescriptor,
}

impl WeatherLookupTool {
    pub fn new() -> Self {
        let descriptor = ToolDescriptor::new(
            "weather_lookup",
            "Look up current weather conditions for a location. Returns temperature, \
             conditions, humidity, and wind speed.",
        )
        .category("weather")
        .timeout_ms(10_000)
        .retry(2)
        .param(ParamSpec::required(
            "location",
            ParamType::String,
            "The city name or location to look up weather for",
        ))
        .param(
            ParamSpec::optional(
                "units",
                ParamType::String,
                "Temperature units: metric (default) or imperial",
            )
            .with_validator(|v| match v.as_str() {
                Some("metric" | "imperial") => Ok(()),
                _ => Err("must be 'metric' or 'imperial'".into()),
            }),
        );
        Self { descriptor }
    }
}

impl Default for WeatherLookupTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for WeatherLookupTool {
    fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    async fn execute(&self, params: Value, _ctx: &ToolContext) -> Result<Value, ToolError> {
        let location = params["location"].as_str().unwrap_or_default().trim();
        if location.is_empty() {
            return Err(ToolError::execution(&self.descriptor.name, "location is empty"));
        }
        let units = params["units"].as_str().unwrap_or("metric");
        let weather = generate_mock_weather(location, units);
        serde_json::to_value(&weather)
            .map_err(|e| ToolError::execution(&self.descriptor.name, e.to_string()))
    }
}

#[derive(serde::Serialize)]
struct WeatherData {
    location: String,
    temperature: f64,
    units: String,
    conditions: String,
    humidity: u32,
    wind_speed: f64,
    wind_direction: String,
}

/// Generate deterministic mock weather based on location name hash.
fn generate_mock_weather(location: &str, units: &str) -> WeatherData {
    let hash: u32 = location
        .to_lowercase()
        .bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32));

    let conditions_list = [
        "Clear skies",
        "Partly cloudy",
        "Overcast",
        "Light rain",
        "Heavy rain",
        "Thunderstorms",
        "Snow",
        "Foggy",
    ];

    let wind_dirs = ["N", "NE", "E", "SE", "S", "SW", "W", "NW"];

    let base_temp_c = ((hash % 40) as f64) - 5.0; // -5 to 35°C
    let (temperature, unit_label) = if units == "imperial" {
        (base_temp_c * 9.0 / 5.0 + 32.0, "°F")
    } else {
        (base_temp_c, "°C")
    };

    WeatherData {
        location: location.to_string(),
        temperature: (temperature * 10.0).round() / 10.0,
        units: unit_label.to_string(),
        conditions: conditions_list[(hash as usize / 7) % conditions_list.len()].to_string(),
        humidity: 30 + (hash % 60),
        wind_speed: ((hash % 30) as f64) + 5.0,
        wind_direction: wind_dirs[(hash as usize / 3) % wind_dirs.len()].to_string(),
    }
}
