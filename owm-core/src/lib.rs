//! Core library for the `owm` weather client.
//!
//! This crate defines:
//! - Typed weather snapshots parsed from OpenWeatherMap payloads
//! - Temperature scale conversions
//! - A process-wide cache for current-weather responses
//! - The OpenWeatherMap client (current weather and history)
//! - City lookup and on-disk configuration
//!
//! It is used by `owm-cli`, but can also be reused by other binaries or services.

pub mod cache;
pub mod cities;
pub mod config;
pub mod error;
pub mod model;
pub mod provider;
pub mod units;

pub use cache::{Clock, RequestCache, SystemClock};
pub use cities::{CityDirectory, SqliteCityDirectory, resolve_city};
pub use config::Config;
pub use error::WeatherError;
pub use model::{CityRef, Coordinates, Location, WeatherSnapshot};
pub use provider::{HistoryQuery, OpenWeatherMap, WeatherProvider};
pub use units::TemperatureScale;
