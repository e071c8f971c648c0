//! Bounded response cache with TTL expiry and LRU eviction.
//!
//! Sits in front of expensive list/query calls. Entries expire after a
//! fixed TTL and are lazily removed when touched; inserting past capacity
//! evicts the least-recently-used entry. Intended for moderate-throughput
//! metadata, not a hot path; all operations share one critical section.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::Value;

/// LRU cache with per-entry TTL.
pub struct LruTtlCache {
    capacity: usize,
    ttl: Duration,
    inner: Mutex<Inner>,
}

struct Inner {
    entries: HashMap<String, Entry>,
    // Monotone recency stamp; the entry with the smallest stamp is the LRU.
    tick: u64,
}

struct Entry {
    value: Value,
    inserted_at: Instant,
    last_access: u64,
}

impl LruTtlCache {
    /// Create a cache holding at most `capacity` entries, each valid for
    /// `ttl` after insertion.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity,
            ttl,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                tick: 0,
            }),
        }
    }

    /// Look up a value. Returns `None` for missing or expired entries; an
    /// expired entry is deleted as a side effect. A hit promotes the entry
    /// to most-recently-used.
    pub fn get(&self, key: &str) -> Option<Value> {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let expired = match inner.entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted_at.elapsed() > self.ttl,
        };
        if expired {
            inner.entries.remove(key);
            return None;
        }

        inner.tick += 1;
        let tick = inner.tick;
        let entry = inner.entries.get_mut(key).expect("entry checked above");
        entry.last_access = tick;
        Some(entry.value.clone())
    }

    /// Insert or overwrite a value. Overwriting refreshes both TTL and
    /// recency; inserting a new key beyond capacity evicts the current LRU
    /// entry first.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut inner = self.inner.lock().expect("cache mutex poisoned");

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.capacity {
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(k, _)| k.clone())
            {
                tracing::debug!(key = %lru_key, "Evicting least-recently-used cache entry");
                inner.entries.remove(&lru_key);
            }
        }

        inner.tick += 1;
        let tick = inner.tick;
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
                last_access: tick,
            },
        );
    }

    /// Remove a single entry if present.
    pub fn invalidate(&self, key: &str) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.remove(key);
    }

    /// Remove every entry whose key contains the given substring. Used to
    /// drop all cached views of one resource after a write against it.
    pub fn invalidate_prefix(&self, pattern: &str) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.retain(|key, _| !key.contains(pattern));
    }

    /// Remove everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.clear();
    }

    /// Current live entry count. Expired entries that have not been touched
    /// yet still count until a lookup or sweep removes them.
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("cache mutex poisoned");
        inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Proactively sweep all expired entries; returns how many were removed.
    /// Optional maintenance hook; `get` self-heals, so correctness does not
    /// depend on calling this.
    pub fn cleanup_expired(&self) -> usize {
        let mut inner = self.inner.lock().expect("cache mutex poisoned");
        let before = inner.entries.len();
        let ttl = self.ttl;
        inner
            .entries
            .retain(|_, entry| entry.inserted_at.elapsed() <= ttl);
        before - inner.entries.len()
    }
}

// =============================================================================
// Tests
// =============================================================================
