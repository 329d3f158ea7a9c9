use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt::Debug;

use crate::{
    error::{Result, WeatherError},
    model::{CityRef, Coordinates, WeatherSnapshot},
};

pub mod openweathermap;

pub use openweathermap::OpenWeatherMap;

const SECONDS_PER_DAY: f64 = 24.0 * 60.0 * 60.0;

/// Date range and sampling interval of a history request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryQuery {
    pub start: DateTime<Utc>,
    /// Defaults to the moment the request is made.
    pub end: Option<DateTime<Utc>>,
    /// Days between samples; fractional values are allowed.
    pub interval_days: f64,
}

impl HistoryQuery {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: None,
            interval_days: 1.0,
        }
    }

    pub fn until(mut self, end: DateTime<Utc>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn every(mut self, interval_days: f64) -> Self {
        self.interval_days = interval_days;
        self
    }

    /// Number of samples in `[start, end]`: `floor((end - start) / interval)`.
    pub fn sample_count(&self, end: DateTime<Utc>) -> Result<i64> {
        if !self.interval_days.is_finite() || self.interval_days <= 0.0 {
            return Err(WeatherError::InvalidInterval(self.interval_days));
        }
        if end < self.start {
            return Err(WeatherError::InvalidTimeRange);
        }

        let span = (end.timestamp() - self.start.timestamp()) as f64;
        Ok((span / (self.interval_days * SECONDS_PER_DAY)).floor() as i64)
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Current conditions at a city or, failing that, at `coords`.
    async fn current_weather(
        &self,
        city: Option<&CityRef>,
        coords: Option<Coordinates>,
    ) -> Result<WeatherSnapshot>;

    /// Past conditions sampled over `query`'s range. Items the API returns in
    /// an unreadable shape are left out.
    async fn weather_history(
        &self,
        query: &HistoryQuery,
        city: Option<&CityRef>,
        coords: Option<Coordinates>,
    ) -> Result<Vec<WeatherSnapshot>>;
}
