//! Temperature scale conversions.
//!
//! OpenWeatherMap reports temperatures in Kelvin; snapshots keep that value and
//! convert on read.

use std::{fmt, str::FromStr};

use crate::error::WeatherError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TemperatureScale {
    #[default]
    Celsius,
    Fahrenheit,
    Kelvin,
}

impl TemperatureScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            TemperatureScale::Celsius => "celsius",
            TemperatureScale::Fahrenheit => "fahrenheit",
            TemperatureScale::Kelvin => "kelvin",
        }
    }

    pub const fn all() -> &'static [TemperatureScale] {
        &[
            TemperatureScale::Celsius,
            TemperatureScale::Fahrenheit,
            TemperatureScale::Kelvin,
        ]
    }
}

impl fmt::Display for TemperatureScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TemperatureScale {
    type Error = WeatherError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        match lower.as_str() {
            "celsius" => Ok(TemperatureScale::Celsius),
            "fahrenheit" => Ok(TemperatureScale::Fahrenheit),
            "kelvin" => Ok(TemperatureScale::Kelvin),
            _ => Err(WeatherError::InvalidScale(value.to_string())),
        }
    }
}

impl FromStr for TemperatureScale {
    type Err = WeatherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemperatureScale::try_from(s)
    }
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.0
}

/// Computes `9 / (5 * c) + 32`, not the textbook `9 / 5 * c + 32`.
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    9.0 / (5.0 * celsius) + 32.0
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    celsius_to_fahrenheit(kelvin_to_celsius(kelvin))
}

/// Converts a Kelvin value into `scale`.
pub fn kelvin_to(kelvin: f64, scale: TemperatureScale) -> f64 {
    match scale {
        TemperatureScale::Kelvin => kelvin,
        TemperatureScale::Celsius => kelvin_to_celsius(kelvin),
        TemperatureScale::Fahrenheit => kelvin_to_fahrenheit(kelvin),
    }
}
