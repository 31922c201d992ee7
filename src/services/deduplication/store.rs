//! TTL-indexed key/value store.
//!
//! Entries expire logically: a read past `expires_at` behaves as if the key
//! were absent, whether or not [`ExpiringKeyStore::cleanup`] has run. Cleanup
//! only reclaims memory.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// A stored value and the instant it stops being visible.
#[derive(Debug, Clone)]
pub struct ExpiringEntry<T> {
    /// Stored value.
    pub value: T,
    /// Instant after which the entry is treated as absent.
    pub expires_at: Instant,
}

impl<T> ExpiringEntry<T> {
    /// Returns true if the entry has expired as of `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory TTL store keyed by string.
///
/// # Capacity
///
/// Unbounded when `max_entries` is `None`. Otherwise writing a new key into a
/// full store evicts the least-recently-written entry. Reads never affect
/// eviction order.
///
/// # Thread Safety
///
/// Guarded by a single `Mutex`; lock poisoning is recovered since every
/// operation leaves the map consistent.
pub struct ExpiringKeyStore<T> {
    name: &'static str,
    default_ttl: Duration,
    entries: Mutex<LruCache<String, ExpiringEntry<T>>>,
}

impl<T> std::fmt::Debug for ExpiringKeyStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringKeyStore")
            .field("name", &self.name)
            .field("default_ttl", &self.default_ttl)
            .field("len", &self.len())
            .finish()
    }
}

impl<T: Clone> ExpiringKeyStore<T> {
    /// Creates a store.
    ///
    /// `name` labels log fields and metrics. A `max_entries` of `Some(0)` is
    /// treated as unbounded.
    #[must_use]
    pub fn new(name: &'static str, default_ttl: Duration, max_entries: Option<usize>) -> Self {
        let cache = match max_entries.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };
        Self {
            name,
            default_ttl,
            entries: Mutex::new(cache),
        }
    }

    /// Returns the TTL applied when `set` is called without one.
    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Stores or overwrites `key` with `expires_at = now + ttl`.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Option<Duration>) {
        let now = Instant::now();
        let entry = ExpiringEntry {
            value,
            expires_at: expiry_from(now, ttl.unwrap_or(self.default_ttl)),
        };
        let key = key.into();
        let displaced = self.lock().push(key.clone(), entry);

        // push also returns the entry it overwrote; only a different key is an eviction.
        if let Some((evicted_key, _)) = displaced.filter(|(k, _)| *k != key) {
            tracing::debug!(store = self.name, key = %evicted_key, "Evicted entry at capacity");
            metrics::counter!("dedup_store_evictions_total", "store" => self.name).increment(1);
        }
    }

    /// Returns the value for `key` if present and unexpired.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        self.lock()
            .peek(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value.clone())
    }

    /// Returns true if `key` is present and unexpired.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock()
            .peek(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Removes `key`, returning its value if it was present and unexpired.
    pub fn remove(&self, key: &str) -> Option<T> {
        let now = Instant::now();
        self.lock()
            .pop(key)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value)
    }

    /// Physically removes every expired entry, returning how many were dropped.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();
        for key in &expired {
            entries.pop(key);
        }
        drop(entries);

        if !expired.is_empty() {
            tracing::debug!(store = self.name, removed = expired.len(), "Removed expired entries");
        }
        expired.len()
    }

    /// Empties the store.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl<T> ExpiringKeyStore<T> {
    /// Returns the number of stored entries, including expired ones not yet
    /// cleaned up.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<String, ExpiringEntry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Saturates instead of panicking on absurdly long TTLs.
fn expiry_from(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl)
        .or_else(|| now.checked_add(FAR_FUTURE))
        .unwrap_or(now)
}

const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
