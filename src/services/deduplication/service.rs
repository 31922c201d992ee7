//! Deduplication and idempotency service.
//!
//! Keeps two independent key spaces:
//! 1. **Content hash**: digest of the uploaded bytes, so identical uploads are
//!    processed once
//! 2. **Idempotency key**: client-supplied token, so a retried request
//!    returns the first response
//!
//! Both are [`ExpiringKeyStore`]s; expiry is checked on every read. Expired
//! entries are swept every `cleanup_every_writes` writes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::instrument;

use super::config::DeduplicationConfig;
use super::hasher::ContentHasher;
use super::store::ExpiringKeyStore;

const MINUTE_MS: i64 = 60_000;

/// Result of an idempotency-key lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyCheck<T> {
    /// Whether the key was seen and has not expired.
    pub is_duplicate: bool,
    /// The result stored with the key, if any.
    pub result: Option<T>,
}

/// Entry counts per key space.
///
/// Counts include expired entries until [`DeduplicationService::cleanup`] runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeduplicationStats {
    /// Entries in the content-hash space.
    pub entries: usize,
    /// Entries in the idempotency-key space.
    pub idempotency_keys: usize,
}

/// Service for at-most-once processing.
///
/// # Example
///
/// ```rust
/// use chat_ingest::services::DeduplicationService;
/// use chat_ingest::services::deduplication::DeduplicationConfig;
///
/// let dedup: DeduplicationService<String> =
///     DeduplicationService::new(DeduplicationConfig::default());
/// let hash = DeduplicationService::<String>::content_hash("payload");
///
/// assert!(!dedup.is_duplicate(&hash));
/// dedup.mark_processed(&hash, Some("done".to_string()), None);
/// assert!(dedup.is_duplicate(&hash));
/// assert_eq!(dedup.get_cached_result(&hash).as_deref(), Some("done"));
/// ```
#[derive(Debug)]
pub struct DeduplicationService<T = serde_json::Value> {
    config: DeduplicationConfig,
    processed: ExpiringKeyStore<Option<T>>,
    idempotency: ExpiringKeyStore<Option<T>>,
    writes: AtomicU64,
}

impl<T: Clone> Default for DeduplicationService<T> {
    fn default() -> Self {
        Self::new(DeduplicationConfig::default())
    }
}

impl<T: Clone> DeduplicationService<T> {
    /// Creates a service with empty key spaces.
    #[must_use]
    pub fn new(config: DeduplicationConfig) -> Self {
        Self {
            processed: ExpiringKeyStore::new("content", config.content_ttl, config.max_entries),
            idempotency: ExpiringKeyStore::new(
                "idempotency",
                config.idempotency_ttl,
                config.max_entries,
            ),
            writes: AtomicU64::new(0),
            config,
        }
    }

    /// Returns the service configuration.
    #[must_use]
    pub const fn config(&self) -> &DeduplicationConfig {
        &self.config
    }

    /// Returns the content hash for the given content.
    #[must_use]
    pub fn content_hash(content: &str) -> String {
        ContentHasher::hash(content)
    }

    /// Records `hash` as processed, overwriting any earlier entry.
    ///
    /// `ttl` defaults to the configured content TTL.
    #[instrument(
        skip(self, hash, result),
        fields(operation = "mark_processed", hash = %ContentHasher::short(hash))
    )]
    pub fn mark_processed(&self, hash: &str, result: Option<T>, ttl: Option<Duration>) {
        self.processed.set(hash, result, ttl);
        metrics::counter!("dedup_records_total", "space" => "content").increment(1);
        self.after_write();
    }

    /// Returns true if `hash` was processed and has not expired.
    #[must_use]
    pub fn is_duplicate(&self, hash: &str) -> bool {
        let found = self.processed.contains(hash);
        record_lookup("content", found);
        found
    }

    /// Returns the result stored with `hash`, if unexpired.
    #[must_use]
    pub fn get_cached_result(&self, hash: &str) -> Option<T> {
        self.processed.get(hash).flatten()
    }

    /// Looks up a client idempotency key.
    #[must_use]
    pub fn check_idempotency(&self, key: &str) -> IdempotencyCheck<T> {
        let hit = self.idempotency.get(key);
        record_lookup("idempotency", hit.is_some());
        match hit {
            Some(result) => IdempotencyCheck {
                is_duplicate: true,
                result,
            },
            None => IdempotencyCheck {
                is_duplicate: false,
                result: None,
            },
        }
    }

    /// Stores the result for a client idempotency key.
    ///
    /// `ttl` defaults to the configured idempotency TTL.
    #[instrument(skip(self, key, result), fields(operation = "store_idempotency_result"))]
    pub fn store_idempotency_result(&self, key: &str, result: T, ttl: Option<Duration>) {
        self.idempotency.set(key, Some(result), ttl);
        metrics::counter!("dedup_records_total", "space" => "idempotency").increment(1);
        self.after_write();
    }

    /// Hashes `(chat_id, user_id, window)` for the current time window.
    ///
    /// Requests for the same chat and user within one `window_minutes` bucket
    /// collide; a `window_minutes` of 0 is treated as 1.
    #[must_use]
    pub fn generate_extraction_hash(chat_id: &str, user_id: &str, window_minutes: u64) -> String {
        Self::generate_extraction_hash_at(chat_id, user_id, window_minutes, Utc::now())
    }

    /// Same as [`Self::generate_extraction_hash`] with an explicit clock.
    #[must_use]
    pub fn generate_extraction_hash_at(
        chat_id: &str,
        user_id: &str,
        window_minutes: u64,
        now: DateTime<Utc>,
    ) -> String {
        let window_ms = i64::try_from(window_minutes.max(1))
            .unwrap_or(i64::MAX)
            .saturating_mul(MINUTE_MS);
        let window_index = now.timestamp_millis().div_euclid(window_ms);
        ContentHasher::hash(&format!("{chat_id}:{user_id}:{window_index}"))
    }

    /// Extraction hash using the configured window size.
    #[must_use]
    pub fn extraction_hash(&self, chat_id: &str, user_id: &str) -> String {
        Self::generate_extraction_hash(chat_id, user_id, self.config.extraction_window_minutes)
    }

    /// Physically removes expired entries from both spaces.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup(&self) -> usize {
        let removed = self.processed.cleanup() + self.idempotency.cleanup();
        tracing::debug!(removed, "Deduplication cleanup finished");
        self.publish_gauges();
        removed
    }

    /// Returns entry counts per space.
    #[must_use]
    pub fn stats(&self) -> DeduplicationStats {
        DeduplicationStats {
            entries: self.processed.len(),
            idempotency_keys: self.idempotency.len(),
        }
    }

    /// Empties both spaces.
    pub fn clear(&self) {
        self.processed.clear();
        self.idempotency.clear();
        tracing::info!("Deduplication caches cleared");
        self.publish_gauges();
    }

    fn after_write(&self) {
        let every = self.config.cleanup_every_writes;
        if every == 0 {
            return;
        }
        let written = self.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if written % every == 0 {
            self.cleanup();
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn publish_gauges(&self) {
        let stats = self.stats();
        metrics::gauge!("dedup_entries", "space" => "content").set(stats.entries as f64);
        metrics::gauge!("dedup_entries", "space" => "idempotency")
            .set(stats.idempotency_keys as f64);
    }
}

fn record_lookup(space: &'static str, found: bool) {
    metrics::counter!(
        "dedup_lookups_total",
        "space" => space,
        "result" => if found { "hit" } else { "miss" }
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{Value, json};
    use std::thread;

    fn service() -> DeduplicationService<Value> {
        DeduplicationService::new(DeduplicationConfig::default())
    }

    #[test]
    fn test_unknown_hash_is_not_duplicate() {
        let dedup = service();
        assert!(!dedup.is_duplicate("missing"));
        assert!(dedup.get_cached_result("missing").is_none());
    }

    #[test]
    fn test_mark_processed_then_duplicate() {
        let dedup = service();
        let hash = DeduplicationService::<Value>::content_hash("chat text");

        dedup.mark_processed(&hash, Some(json!({"messages": 3})), None);

        assert!(dedup.is_duplicate(&hash));
        assert_eq!(dedup.get_cached_result(&hash), Some(json!({"messages": 3})));
    }

    #[test]
    fn test_mark_processed_without_result() {
        let dedup = service();
        dedup.mark_processed("h", None, None);

        assert!(dedup.is_duplicate("h"));
        assert!(dedup.get_cached_result("h").is_none());
    }

    #[test]
    fn test_entry_expires_without_cleanup() {
        let dedup = service();
        dedup.mark_processed("h", Some(json!(1)), Some(Duration::from_millis(50)));
        assert!(dedup.is_duplicate("h"));

        thread::sleep(Duration::from_millis(80));

        assert!(!dedup.is_duplicate("h"));
        assert!(dedup.get_cached_result("h").is_none());
        assert_eq!(dedup.stats().entries, 1);
        assert_eq!(dedup.cleanup(), 1);
        assert_eq!(dedup.stats().entries, 0);
    }

    #[test]
    fn test_idempotency_roundtrip() {
        let dedup = service();
        let miss = dedup.check_idempotency("req-1");
        assert!(!miss.is_duplicate);
        assert!(miss.result.is_none());

        dedup.store_idempotency_result("req-1", json!({"status": "ok"}), None);
        let hit = dedup.check_idempotency("req-1");
        assert!(hit.is_duplicate);
        assert_eq!(hit.result, Some(json!({"status": "ok"})));
    }

    #[test]
    fn test_spaces_are_independent() {
        let dedup = service();
        dedup.mark_processed("shared", None, None);

        assert!(!dedup.check_idempotency("shared").is_duplicate);
        assert_eq!(
            dedup.stats(),
            DeduplicationStats {
                entries: 1,
                idempotency_keys: 0
            }
        );
    }

    #[test]
    fn test_cleanup_covers_both_spaces() {
        let dedup = service();
        let short = Some(Duration::from_millis(10));
        dedup.mark_processed("a", None, short);
        dedup.store_idempotency_result("k", json!(null), short);
        dedup.mark_processed("b", None, None);
        thread::sleep(Duration::from_millis(30));

        assert_eq!(dedup.cleanup(), 2);
        assert_eq!(
            dedup.stats(),
            DeduplicationStats {
                entries: 1,
                idempotency_keys: 0
            }
        );
    }

    #[test]
    fn test_writes_trigger_cleanup() {
        let dedup: DeduplicationService<Value> = DeduplicationService::new(
            DeduplicationConfig::default().with_cleanup_every_writes(4),
        );
        let short = Some(Duration::from_millis(10));
        for i in 0..3 {
            dedup.mark_processed(&format!("old-{i}"), None, short);
        }
        thread::sleep(Duration::from_millis(30));
        assert_eq!(dedup.stats().entries, 3);

        // The fourth write sweeps the three expired entries.
        dedup.store_idempotency_result("k", json!(1), None);
        assert_eq!(
            dedup.stats(),
            DeduplicationStats {
                entries: 0,
                idempotency_keys: 1
            }
        );
    }

    #[test]
    fn test_zero_interval_never_sweeps() {
        let dedup: DeduplicationService<Value> = DeduplicationService::new(
            DeduplicationConfig::default().with_cleanup_every_writes(0),
        );
        for i in 0..10 {
            dedup.mark_processed(&format!("h{i}"), None, Some(Duration::ZERO));
        }
        assert_eq!(dedup.stats().entries, 10);
    }

    #[test]
    fn test_clear_empties_everything() {
        let dedup = service();
        dedup.mark_processed("a", None, None);
        dedup.store_idempotency_result("k", json!(1), None);

        dedup.clear();
        assert_eq!(
            dedup.stats(),
            DeduplicationStats {
                entries: 0,
                idempotency_keys: 0
            }
        );
    }

    #[test]
    fn test_extraction_hash_buckets() {
        let at = |h, m| Utc.with_ymd_and_hms(2024, 3, 1, h, m, 0).unwrap();
        let hash = |chat, user, now| {
            DeduplicationService::<Value>::generate_extraction_hash_at(chat, user, 60, now)
        };

        assert_eq!(hash("c1", "u1", at(10, 5)), hash("c1", "u1", at(10, 55)));
        assert_ne!(hash("c1", "u1", at(10, 5)), hash("c1", "u1", at(11, 5)));
        assert_ne!(hash("c1", "u1", at(10, 5)), hash("c2", "u1", at(10, 5)));
        assert_ne!(hash("c1", "u1", at(10, 5)), hash("c1", "u2", at(10, 5)));
        assert_eq!(hash("c1", "u1", at(10, 5)).len(), 64);
    }

    #[test]
    fn test_extraction_hash_zero_window_is_one_minute() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 30).unwrap();
        assert_eq!(
            DeduplicationService::<Value>::generate_extraction_hash_at("c", "u", 0, now),
            DeduplicationService::<Value>::generate_extraction_hash_at("c", "u", 1, now)
        );
    }

    #[test]
    fn test_extraction_hash_uses_configured_window() {
        let dedup: DeduplicationService<Value> = DeduplicationService::new(
            DeduplicationConfig::default().with_extraction_window_minutes(1440),
        );
        assert_eq!(
            dedup.extraction_hash("c", "u"),
            DeduplicationService::<Value>::generate_extraction_hash("c", "u", 1440)
        );
    }
}
