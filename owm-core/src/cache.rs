//! In-memory cache for upstream responses.
//!
//! Only "current weather" requests are cached. Entries stay fresh for ten
//! minutes and are overwritten on the next fetch after that; nothing is ever
//! evicted otherwise.

use std::{
    collections::HashMap,
    fmt::Debug,
    future::Future,
    sync::{Arc, OnceLock},
};

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::Result;

/// How long a cached current-weather response is served without refetching.
pub const FRESHNESS_WINDOW_SECS: i64 = 600;

/// Source of "now" for freshness checks.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    payload: Value,
    fetched_at: DateTime<Utc>,
}

/// Response cache keyed by request signature.
#[derive(Debug)]
pub struct RequestCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    freshness_window: Duration,
    clock: Arc<dyn Clock>,
}

static SHARED: OnceLock<Arc<RequestCache>> = OnceLock::new();

impl RequestCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            freshness_window: Duration::seconds(FRESHNESS_WINDOW_SECS),
            clock,
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// The process-wide cache, created on first use.
    pub fn shared() -> Arc<RequestCache> {
        SHARED.get_or_init(|| Arc::new(RequestCache::new())).clone()
    }

    pub fn freshness_window(&self) -> Duration {
        self.freshness_window
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the payload for `signature`, calling `fetch` only when needed.
    ///
    /// Non-cacheable requests always go to `fetch` and leave the cache
    /// untouched. Errors from `fetch` are returned as-is and never stored.
    pub async fn fetch_or_compute<F, Fut>(
        &self,
        signature: &str,
        cacheable: bool,
        fetch: F,
    ) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if !cacheable {
            trace!("not cacheable, fetching");
            return fetch().await;
        }

        let now = self.clock.now();
        {
            let entries = self.entries.lock();
            if let Some(entry) = entries.get(signature) {
                let age = now - entry.fetched_at;
                if age < self.freshness_window {
                    debug!(age_secs = age.num_seconds(), "serving cached response");
                    return Ok(entry.payload.clone());
                }
                debug!(age_secs = age.num_seconds(), "cached response is stale");
            }
        }

        let payload = fetch().await?;

        // Stamped with the lookup time, not the fetch completion time.
        self.entries.lock().insert(
            signature.to_string(),
            CacheEntry {
                payload: payload.clone(),
                fetched_at: now,
            },
        );

        Ok(payload)
    }
}

impl Default for RequestCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A clock that only moves when told to.
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct ManualClock(Mutex<DateTime<Utc>>);

#[cfg(test)]
impl ManualClock {
    pub(crate) fn new(start: DateTime<Utc>) -> Self {
        Self(Mutex::new(start))
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.0.lock() += by;
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock()
    }
}
