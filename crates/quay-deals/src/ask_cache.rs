//! Bounded cache of provider asks.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use lru::LruCache;
use quay_core::ask::{Ask, CachedAsk};

/// LRU of the most recently fetched asks, keyed by provider address.
///
/// Staleness is checked at read time; stale entries are evicted on read.
pub struct AskCache {
    entries: Mutex<LruCache<String, CachedAsk>>,
    max_staleness: chrono::Duration,
}

impl AskCache {
    pub fn new(capacity: NonZeroUsize, max_staleness: std::time::Duration) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            max_staleness: chrono::Duration::from_std(max_staleness)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// A fresh ask for `address` at `now`, if cached.
    pub fn get(&self, address: &str, now: DateTime<Utc>) -> Option<Ask> {
        let mut entries = self.entries.lock().ok()?;
        let cached = entries.get(address)?;
        if cached.is_fresh(now, self.max_staleness) {
            return Some(cached.ask.clone());
        }
        entries.pop(address);
        None
    }

    pub fn insert(&self, address: &str, ask: Ask, fetched_at: DateTime<Utc>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(address.to_string(), CachedAsk { ask, fetched_at });
        }
    }

    /// Seed from a persisted ask; never replaces a newer cached one.
    pub fn warm(&self, address: &str, cached: CachedAsk) {
        if let Ok(mut entries) = self.entries.lock() {
            let newer = entries
                .peek(address)
                .is_some_and(|existing| existing.fetched_at >= cached.fetched_at);
            if !newer {
                entries.put(address.to_string(), cached);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
