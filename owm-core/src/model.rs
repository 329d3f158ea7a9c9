use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Value;

use crate::{
    error::{Result, WeatherError},
    units::{TemperatureScale, kelvin_to},
};

/// A city as resolved by a [`CityDirectory`](crate::cities::CityDirectory).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CityRef {
    pub id: i64,
    pub name: String,
    /// Two or three letter country code, always lowercase.
    pub country: String,
    pub longitude: f64,
    pub latitude: f64,
}

impl CityRef {
    pub fn new(id: i64, name: impl Into<String>, country: &str, coords: Coordinates) -> Self {
        Self {
            id,
            name: name.into(),
            country: country.to_lowercase(),
            longitude: coords.longitude,
            latitude: coords.latitude,
        }
    }

    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.longitude, self.latitude)
    }
}

impl fmt::Display for CityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.name, self.country)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

impl Coordinates {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }
}

/// Where a weather query points at.
#[derive(Debug, Clone, PartialEq)]
pub enum Location {
    City(CityRef),
    Coordinates(Coordinates),
}

impl Location {
    /// Picks the query location out of the caller's optional inputs.
    ///
    /// A city wins over explicit coordinates when both are given.
    pub fn resolve(city: Option<&CityRef>, coords: Option<Coordinates>) -> Result<Self> {
        match (city, coords) {
            (Some(city), _) => Ok(Location::City(city.clone())),
            (None, Some(coords)) => Ok(Location::Coordinates(coords)),
            (None, None) => Err(WeatherError::MissingLocation),
        }
    }

    /// Query parameters identifying this location for the OpenWeatherMap API.
    pub(crate) fn query_params(&self) -> Vec<(&'static str, String)> {
        match self {
            Location::City(city) => vec![("id", city.id.to_string())],
            Location::Coordinates(c) => vec![
                ("lat", c.latitude.to_string()),
                ("long", c.longitude.to_string()),
            ],
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::City(city) => write!(f, "{city} (id {})", city.id),
            Location::Coordinates(c) => write!(f, "lat {}, lon {}", c.latitude, c.longitude),
        }
    }
}

/// Weather conditions observed at a single instant.
///
/// Built only through [`WeatherSnapshot::from_payload`]; either every required
/// field is present or no snapshot exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeatherSnapshot {
    description: String,
    conditions: Vec<String>,
    sea_level_pressure: f64,
    ground_level_pressure: Option<f64>,
    humidity: f64,
    temperature: f64,
    min_temperature: f64,
    max_temperature: f64,
    wind_speed: f64,
    wind_direction: Option<f64>,
    clouds_level: f64,
    rain_volume_3h: f64,
    snow_volume_3h: f64,
    timestamp: DateTime<Utc>,
}

impl WeatherSnapshot {
    /// Parses one item as returned by the `weather` endpoint or found in the
    /// `list` of the `history/city` endpoint.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let raw = OwmSnapshot::deserialize(payload)
            .map_err(|e| WeatherError::MalformedWeatherData(e.to_string()))?;

        let sea_level_pressure = raw.main.pressure.or(raw.main.sea_level).ok_or_else(|| {
            WeatherError::MalformedWeatherData(
                "neither main.pressure nor main.sea_level is present".to_string(),
            )
        })?;

        let timestamp = DateTime::<Utc>::from_timestamp(raw.dt, 0).ok_or_else(|| {
            WeatherError::MalformedWeatherData(format!("dt {} is out of range", raw.dt))
        })?;

        let description = raw
            .weather
            .iter()
            .map(|w| w.description.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let conditions = raw.weather.into_iter().map(|w| w.main).collect();

        Ok(Self {
            description,
            conditions,
            sea_level_pressure,
            ground_level_pressure: raw.main.grnd_level,
            humidity: raw.main.humidity,
            temperature: raw.main.temp,
            min_temperature: raw.main.temp_min,
            max_temperature: raw.main.temp_max,
            wind_speed: raw.wind.speed,
            wind_direction: raw.wind.deg,
            clouds_level: raw.clouds.all,
            rain_volume_3h: raw.rain.map_or(0.0, |r| r.three_hours),
            snow_volume_3h: raw.snow.map_or(0.0, |s| s.three_hours),
            timestamp,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Short condition codes such as `Clear` or `Rain`, in payload order.
    pub fn conditions(&self) -> &[String] {
        &self.conditions
    }

    pub fn temperature(&self, scale: TemperatureScale) -> f64 {
        kelvin_to(self.temperature, scale)
    }

    pub fn min_temperature(&self, scale: TemperatureScale) -> f64 {
        kelvin_to(self.min_temperature, scale)
    }

    pub fn max_temperature(&self, scale: TemperatureScale) -> f64 {
        kelvin_to(self.max_temperature, scale)
    }

    /// Relative humidity in percent.
    pub fn humidity(&self) -> f64 {
        self.humidity
    }

    /// Cloudiness in percent.
    pub fn clouds_level(&self) -> f64 {
        self.clouds_level
    }

    /// Sea level pressure in hPa.
    pub fn sea_level_pressure(&self) -> f64 {
        self.sea_level_pressure
    }

    /// Ground level pressure in hPa, when the station reports it.
    pub fn ground_level_pressure(&self) -> Option<f64> {
        self.ground_level_pressure
    }

    /// Alias of [`sea_level_pressure`](Self::sea_level_pressure).
    pub fn atmospheric_pressure(&self) -> f64 {
        self.sea_level_pressure()
    }

    /// Wind speed in m/s.
    pub fn wind_speed(&self) -> f64 {
        self.wind_speed
    }

    /// Wind direction in degrees.
    pub fn wind_direction(&self) -> Option<f64> {
        self.wind_direction
    }

    /// Rain volume over the last 3 hours, in mm.
    pub fn rain_volume(&self) -> f64 {
        self.rain_volume_3h
    }

    /// Snow volume over the last 3 hours, in mm.
    pub fn snow_volume(&self) -> f64 {
        self.snow_volume_3h
    }
}

impl fmt::Display for WeatherSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = TemperatureScale::Celsius;

        writeln!(f, "{}", self.description)?;
        writeln!(
            f,
            "Temp: {}ºC, min: {}ºC, max: {}ºC",
            self.temperature(c) as i64,
            self.min_temperature(c) as i64,
            self.max_temperature(c) as i64,
        )?;

        if self.clouds_level > 0.0 {
            writeln!(f, "{}% of clouds", self.clouds_level as i64)?;
        }

        writeln!(f, "{}% of humidity", self.humidity as i64)?;
        writeln!(f, "Athmospheric pressure: {}hPa", self.atmospheric_pressure() as i64)?;
        writeln!(f, "Wind speed: {}m/s", Rounded(self.wind_speed))?;

        if self.rain_volume_3h > 0.0 {
            writeln!(f, "Rain volume: {}mm", Rounded(self.rain_volume_3h))?;
        }

        if self.snow_volume_3h > 0.0 {
            writeln!(f, "Snow volume: {}mm", Rounded(self.snow_volume_3h))?;
        }

        Ok(())
    }
}

/// Renders a value rounded to two decimals, keeping at least one decimal
/// digit (`3.456` → `3.46`, `3` → `3.0`).
struct Rounded(f64);

impl fmt::Display for Rounded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let v = (self.0 * 100.0).round() / 100.0;
        if v.fract() == 0.0 {
            write!(f, "{v:.1}")
        } else {
            write!(f, "{v}")
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwmCondition {
    main: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct OwmMain {
    temp: f64,
    temp_min: f64,
    temp_max: f64,
    humidity: f64,
    #[serde(default, deserialize_with = "present")]
    pressure: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    sea_level: Option<f64>,
    #[serde(default, deserialize_with = "present")]
    grnd_level: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmWind {
    speed: f64,
    #[serde(default, deserialize_with = "present")]
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwmClouds {
    all: f64,
}

#[derive(Debug, Deserialize)]
struct OwmPrecipitation {
    #[serde(rename = "3h")]
    three_hours: f64,
}

#[derive(Debug, Deserialize)]
struct OwmSnapshot {
    weather: Vec<OwmCondition>,
    main: OwmMain,
    wind: OwmWind,
    clouds: OwmClouds,
    #[serde(default, deserialize_with = "present")]
    rain: Option<OwmPrecipitation>,
    #[serde(default, deserialize_with = "present")]
    snow: Option<OwmPrecipitation>,
    #[serde(deserialize_with = "whole_seconds")]
    dt: i64,
}

/// Optional key that must hold a `T` whenever it is present; `null` is
/// rejected instead of being read as absent.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Unix timestamp given either as an integer or as a float with no
/// fractional part.
fn whole_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    if !secs.is_finite() || secs.fract() != 0.0 {
        return Err(D::Error::custom(format!("dt {secs} is not a whole number of seconds")));
    }
    Ok(secs as i64)
}
