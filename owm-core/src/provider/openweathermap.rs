use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::debug;

use crate::{
    cache::RequestCache,
    error::{Result, WeatherError},
    model::{CityRef, Coordinates, Location, WeatherSnapshot},
    provider::{HistoryQuery, WeatherProvider},
};

pub const DEFAULT_BASE_URL: &str = "http://api.openweathermap.org/data/2.5";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const CURRENT_ENDPOINT: &str = "weather";
const HISTORY_ENDPOINT: &str = "history/city";

/// Client for the OpenWeatherMap 2.5 API.
///
/// Current-weather responses go through a [`RequestCache`] (the process-wide
/// one unless another is injected); history responses never do.
#[derive(Debug, Clone)]
pub struct OpenWeatherMap {
    api_key: String,
    base_url: String,
    http: Client,
    cache: Arc<RequestCache>,
}

impl OpenWeatherMap {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(WeatherError::EmptyApiKey);
        }

        Ok(Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            http: build_client(DEFAULT_TIMEOUT)?,
            cache: RequestCache::shared(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_cache(mut self, cache: Arc<RequestCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Replaces the default 10 second timeout applied to every request.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self> {
        self.http = build_client(timeout)?;
        Ok(self)
    }

    async fn fetch_current(&self, location: &Location) -> Result<WeatherSnapshot> {
        let url = self.request_url(CURRENT_ENDPOINT, location, Vec::new())?;
        debug!(%location, "requesting current weather");

        let payload = self
            .cache
            .fetch_or_compute(url.as_str(), true, || {
                self.fetch_json(CURRENT_ENDPOINT, url.clone())
            })
            .await?;

        WeatherSnapshot::from_payload(&payload)
    }

    async fn fetch_history(
        &self,
        query: &HistoryQuery,
        location: &Location,
    ) -> Result<Vec<WeatherSnapshot>> {
        let end = query.end.unwrap_or_else(Utc::now);
        let count = query.sample_count(end)?;

        let url = self.request_url(
            HISTORY_ENDPOINT,
            location,
            vec![
                ("start", query.start.timestamp().to_string()),
                ("end", end.timestamp().to_string()),
                ("cnt", count.to_string()),
            ],
        )?;
        debug!(%location, start = %query.start, %end, count, "requesting weather history");

        let payload = self
            .cache
            .fetch_or_compute(url.as_str(), false, || {
                self.fetch_json(HISTORY_ENDPOINT, url.clone())
            })
            .await?;

        parse_history(&payload)
    }

    /// Full request URL; doubles as the cache signature.
    fn request_url(
        &self,
        endpoint: &str,
        location: &Location,
        extra: Vec<(&'static str, String)>,
    ) -> Result<Url> {
        let mut params = vec![("APPID", self.api_key.clone())];
        params.extend(location.query_params());
        params.extend(extra);

        Url::parse_with_params(&format!("{}/{}", self.base_url, endpoint), &params)
            .map_err(|e| WeatherError::UpstreamRequestFailed(format!("invalid request URL: {e}")))
    }

    async fn fetch_json(&self, endpoint: &str, url: Url) -> Result<Value> {
        let res = self.http.get(url).send().await.map_err(|e| {
            WeatherError::UpstreamRequestFailed(format!(
                "failed to send request to OpenWeatherMap ({endpoint}): {}",
                e.without_url()
            ))
        })?;

        let status = res.status();
        debug!(endpoint, %status, "OpenWeatherMap responded");

        let body = res.text().await.map_err(|e| {
            WeatherError::UpstreamRequestFailed(format!(
                "failed to read OpenWeatherMap {endpoint} response body: {}",
                e.without_url()
            ))
        })?;

        if !status.is_success() {
            return Err(WeatherError::UpstreamRequestFailed(format!(
                "OpenWeatherMap {endpoint} request failed with status {status}: {}",
                truncate_body(&body)
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            WeatherError::UpstreamDecodeFailed(format!("OpenWeatherMap {endpoint} response: {e}"))
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMap {
    async fn current_weather(
        &self,
        city: Option<&CityRef>,
        coords: Option<Coordinates>,
    ) -> Result<WeatherSnapshot> {
        let location = Location::resolve(city, coords)?;
        self.fetch_current(&location).await
    }

    async fn weather_history(
        &self,
        query: &HistoryQuery,
        city: Option<&CityRef>,
        coords: Option<Coordinates>,
    ) -> Result<Vec<WeatherSnapshot>> {
        let location = Location::resolve(city, coords)?;
        self.fetch_history(query, &location).await
    }
}

fn parse_history(payload: &Value) -> Result<Vec<WeatherSnapshot>> {
    let items = payload
        .get("list")
        .and_then(Value::as_array)
        .ok_or(WeatherError::MalformedHistoryResponse)?;

    let snapshots: Vec<_> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| match WeatherSnapshot::from_payload(item) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                debug!(index = i, error = %e, "skipping unreadable history item");
                None
            }
        })
        .collect();

    debug!(received = items.len(), kept = snapshots.len(), "parsed weather history");
    Ok(snapshots)
}

fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| {
            WeatherError::UpstreamRequestFailed(format!("failed to build HTTP client: {e}"))
        })
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::ManualClock, cache::FRESHNESS_WINDOW_SECS, units::TemperatureScale};
    use chrono::{DateTime, TimeZone};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "test-key";

    fn olite() -> CityRef {
        CityRef::new(3114711, "Olite", "es", Coordinates::new(-1.65, 42.48))
    }

    fn snapshot_json(temp: f64, dt: i64) -> Value {
        json!({
            "weather": [{"description": "clear sky", "main": "Clear"}],
            "main": {
                "temp": temp,
                "temp_min": temp - 2.0,
                "temp_max": temp + 2.0,
                "pressure": 1013,
                "humidity": 50
            },
            "wind": {"speed": 3.5},
            "clouds": {"all": 0},
            "dt": dt
        })
    }

    fn jan(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 1, d, 0, 0, 0).unwrap()
    }

    fn gateway(server: &MockServer) -> (OpenWeatherMap, Arc<ManualClock>, Arc<RequestCache>) {
        let clock = Arc::new(ManualClock::new(jan(10)));
        let cache = Arc::new(RequestCache::with_clock(clock.clone()));
        let owm = OpenWeatherMap::new(KEY)
            .unwrap()
            .with_base_url(server.uri())
            .with_cache(cache.clone());
        (owm, clock, cache)
    }

    #[test]
    fn empty_api_key_is_rejected() {
        assert!(matches!(OpenWeatherMap::new(""), Err(WeatherError::EmptyApiKey)));
        assert!(matches!(OpenWeatherMap::new("  "), Err(WeatherError::EmptyApiKey)));
    }

    #[test]
    fn truncate_body_limits_length() {
        assert_eq!(truncate_body("short"), "short");
        let long = "é".repeat(250);
        let cut = truncate_body(&long);
        assert_eq!(cut.chars().count(), 203);
        assert!(cut.ends_with("..."));
    }

    #[tokio::test]
    async fn current_weather_is_cached_within_window() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("APPID", KEY))
            .and(query_param("id", "3114711"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(snapshot_json(300.0, 1483228800)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let (owm, clock, cache) = gateway(&server);
        let city = olite();

        let first = owm.current_weather(Some(&city), None).await.unwrap();
        assert_eq!(first.temperature(TemperatureScale::Celsius), 27.0);

        clock.advance(chrono::Duration::seconds(FRESHNESS_WINDOW_SECS - 1));
        let second = owm.current_weather(Some(&city), None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);

        clock.advance(chrono::Duration::seconds(1));
        owm.current_weather(Some(&city), None).await.unwrap();
        // MockServer verifies the expected request count on drop.
    }

    #[tokio::test]
    async fn coordinates_are_sent_as_lat_and_long() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .and(query_param("lat", "42.48"))
            .and(query_param("long", "-1.65"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(snapshot_json(280.0, 1483228800)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let (owm, _clock, _cache) = gateway(&server);
        let snapshot = owm
            .current_weather(None, Some(Coordinates::new(-1.65, 42.48)))
            .await
            .unwrap();

        assert_eq!(snapshot.temperature(TemperatureScale::Kelvin), 280.0);
    }

    #[tokio::test]
    async fn missing_location_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (owm, _clock, _cache) = gateway(&server);
        let err = owm.current_weather(None, None).await.unwrap_err();
        assert!(matches!(err, WeatherError::MissingLocation));

        let err = owm
            .weather_history(&HistoryQuery::new(jan(1)).until(jan(3)), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::MissingLocation));
    }

    #[tokio::test]
    async fn error_status_is_reported_and_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Invalid API key"))
            .expect(2)
            .mount(&server)
            .await;

        let (owm, _clock, cache) = gateway(&server);
        let city = olite();

        for _ in 0..2 {
            let err = owm.current_weather(Some(&city), None).await.unwrap_err();
            assert!(matches!(err, WeatherError::UpstreamRequestFailed(ref m) if m.contains("401")));
        }
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn undecodable_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let (owm, _clock, _cache) = gateway(&server);
        let err = owm.current_weather(Some(&olite()), None).await.unwrap_err();
        assert!(matches!(err, WeatherError::UpstreamDecodeFailed(_)));
    }

    #[tokio::test]
    async fn malformed_current_payload_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/weather"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cod": 200, "main": {}})))
            .mount(&server)
            .await;

        let (owm, _clock, _cache) = gateway(&server);
        let err = owm.current_weather(Some(&olite()), None).await.unwrap_err();
        assert!(matches!(err, WeatherError::MalformedWeatherData(_)));
    }

    #[tokio::test]
    async fn history_skips_malformed_items_and_bypasses_cache() {
        let server = MockServer::start().await;
        let mut broken = snapshot_json(290.0, 1483315200);
        broken["main"].as_object_mut().unwrap().remove("temp");

        Mock::given(method("GET"))
            .and(path("/history/city"))
            .and(query_param("APPID", KEY))
            .and(query_param("id", "3114711"))
            .and(query_param("start", "1483228800"))
            .and(query_param("end", "1483401600"))
            .and(query_param("cnt", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "cod": "200",
                "list": [
                    snapshot_json(281.0, 1483228800),
                    snapshot_json(282.0, 1483272000),
                    broken,
                    snapshot_json(284.0, 1483358400),
                    snapshot_json(285.0, 1483401600)
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let (owm, _clock, cache) = gateway(&server);
        let query = HistoryQuery::new(jan(1)).until(jan(3));
        let city = olite();

        let history = owm.weather_history(&query, Some(&city), None).await.unwrap();
        let temps: Vec<f64> = history
            .iter()
            .map(|s| s.temperature(TemperatureScale::Kelvin))
            .collect();
        assert_eq!(temps, vec![281.0, 282.0, 284.0, 285.0]);
        assert!(history.windows(2).all(|w| w[0].timestamp() < w[1].timestamp()));

        let again = owm.weather_history(&query, Some(&city), None).await.unwrap();
        assert_eq!(again.len(), 4);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn history_without_list_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/history/city"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"cod": "200", "cnt": 0})))
            .mount(&server)
            .await;

        let (owm, _clock, _cache) = gateway(&server);
        let err = owm
            .weather_history(
                &HistoryQuery::new(jan(1)).until(jan(3)),
                None,
                Some(Coordinates::new(-1.65, 42.48)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::MalformedHistoryResponse));
    }

    #[tokio::test]
    async fn history_rejects_bad_interval_before_requesting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (owm, _clock, _cache) = gateway(&server);
        let query = HistoryQuery::new(jan(1)).until(jan(3)).every(0.0);
        let err = owm.weather_history(&query, Some(&olite()), None).await.unwrap_err();
        assert!(matches!(err, WeatherError::InvalidInterval(_)));
    }
}
