//! Short-lived store of the last good observation per city.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::time::Instant;

use crate::model::WeatherObservation;

/// Lower-cased, trimmed city name. `" Melbourne "` and `"melbourne"` share a key.
pub fn normalize_key(city: &str) -> String {
    city.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: WeatherObservation,
    pub fetched_at: DateTime<Utc>,
    pub(crate) written_at: Instant,
}

impl CacheEntry {
    pub fn age(&self) -> Duration {
        self.written_at.elapsed()
    }

    pub fn is_within(&self, max_age: Duration) -> bool {
        self.age() <= max_age
    }
}

/// Thread-safe result cache. Cloning shares the underlying map.
///
/// Entries are kept for the TTL plus the stale grace. Reads evict the key they
/// touch; `put` sweeps the whole map at most once per retention period.
#[derive(Debug, Clone)]
pub struct ResultCache {
    inner: Arc<DashMap<String, CacheEntry>>,
    ttl: Duration,
    stale_grace: Duration,
    last_sweep: Arc<Mutex<Instant>>,
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
            stale_grace: Duration::ZERO,
            last_sweep: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Lets [`ResultCache::get_stale`] serve entries up to `grace` past the TTL.
    pub fn with_stale_grace(mut self, grace: Duration) -> Self {
        self.stale_grace = grace;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stale_grace(&self) -> Duration {
        self.stale_grace
    }

    /// How long an entry may stay in the map at all.
    pub fn retention(&self) -> Duration {
        self.ttl + self.stale_grace
    }

    /// Fresh entry for `city`, if any.
    pub fn get(&self, city: &str) -> Option<CacheEntry> {
        self.get_within(city, self.ttl)
    }

    /// Entry for `city` that is still usable as a fallback.
    pub fn get_stale(&self, city: &str) -> Option<CacheEntry> {
        self.get_within(city, self.retention())
    }

    /// Entry for `city` no older than `max_age`. Entries past the retention
    /// period are removed on the way.
    pub fn get_within(&self, city: &str, max_age: Duration) -> Option<CacheEntry> {
        let key = normalize_key(city);
        let entry = self.inner.get(&key).map(|e| e.value().clone())?;

        if entry.is_within(max_age) {
            return Some(entry);
        }

        if !entry.is_within(self.retention()) {
            self.inner
                .remove_if(&key, |_, e| e.written_at == entry.written_at);
        }
        None
    }

    /// Stores `value` for `city`, replacing any previous entry.
    pub fn put(&self, city: &str, value: WeatherObservation) {
        self.sweep_if_due();

        let entry = CacheEntry {
            value,
            fetched_at: Utc::now(),
            written_at: Instant::now(),
        };
        self.inner.insert(normalize_key(city), entry);
    }

    /// Drops every entry past the retention period. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let retention = self.retention();
        let before = self.inner.len();
        self.inner.retain(|_, entry| entry.is_within(retention));
        before.saturating_sub(self.inner.len())
    }

    fn sweep_if_due(&self) {
        let now = Instant::now();
        {
            let mut last = self
                .last_sweep
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if now.duration_since(*last) < self.retention() {
                return;
            }
            *last = now;
        }

        let removed = self.purge_expired();
        if removed > 0 {
            tracing::debug!(
                removed,
                remaining = self.inner.len(),
                "purged expired cache entries"
            );
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}
