//! Display Formatting Helpers
//!
//! Frontend-agnostic formatting of sensor readings. Values are stored in °C
//! and RPM; conversion happens only here.

use serde::{Deserialize, Serialize};

use crate::sensor::{Sensor, SensorKind};

/// Unit used when printing temperatures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

/// Convert Celsius to Fahrenheit
pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

/// Format temperature with one decimal place and explicit unit
pub fn format_temp_precise_with_unit(temp_celsius: f32, unit: TemperatureUnit) -> String {
    match unit {
        TemperatureUnit::Fahrenheit => format!("{:.1}°F", celsius_to_fahrenheit(temp_celsius)),
        TemperatureUnit::Celsius => format!("{:.1}°C", temp_celsius),
    }
}

/// Format an RPM value, rounded to whole revolutions
pub fn format_rpm(rpm: f32) -> String {
    format!("{:.0} RPM", rpm)
}

/// Format a sensor's current value, or `--` when there is no reading
pub fn format_sensor_value(sensor: &Sensor, unit: TemperatureUnit) -> String {
    match (sensor.kind(), sensor.value()) {
        (_, None) => "--".to_string(),
        (SensorKind::Temperature, Some(v)) => format_temp_precise_with_unit(v, unit),
        (SensorKind::Fan, Some(v)) => format_rpm(v),
    }
}

/// One aligned `label  value` line
pub fn format_sensor_line(sensor: &Sensor, unit: TemperatureUnit) -> String {
    let mut line = format!("{:<18} {:>10}", sensor.label(), format_sensor_value(sensor, unit));
    if let Some(max) = sensor.max_rpm() {
        line.push_str(&format!("  (max {})", format_rpm(max)));
    }
    line
}
