//! Deduplication configuration.

use crate::config::DedupSettings;
use std::time::Duration;

/// Configuration for the deduplication service.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `CHAT_INGEST_DEDUP_CONTENT_TTL_SECS` | u64 | `86400` | Content-hash entry lifetime |
/// | `CHAT_INGEST_DEDUP_IDEMPOTENCY_TTL_SECS` | u64 | `86400` | Idempotency-key entry lifetime |
/// | `CHAT_INGEST_DEDUP_MAX_ENTRIES` | usize | `10000` | Per-space entry cap (0 = unbounded) |
/// | `CHAT_INGEST_DEDUP_CLEANUP_EVERY_WRITES` | u64 | `1024` | Writes between automatic cleanups (0 = never) |
/// | `CHAT_INGEST_DEDUP_EXTRACTION_WINDOW_MINUTES` | u64 | `60` | Extraction hash bucket size |
///
/// # Example
///
/// ```rust
/// use chat_ingest::services::deduplication::DeduplicationConfig;
/// use std::time::Duration;
///
/// let config = DeduplicationConfig::default().with_content_ttl(Duration::from_secs(60));
/// assert_eq!(config.content_ttl, Duration::from_secs(60));
/// assert_eq!(config.max_entries, Some(10_000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeduplicationConfig {
    /// Default lifetime of content-hash entries.
    pub content_ttl: Duration,
    /// Default lifetime of idempotency-key entries.
    pub idempotency_ttl: Duration,
    /// Cap on entries per space; `None` is unbounded.
    pub max_entries: Option<usize>,
    /// Writes between automatic expired-entry sweeps; 0 disables them.
    pub cleanup_every_writes: u64,
    /// Window size used by extraction hashes.
    pub extraction_window_minutes: u64,
}

const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_CLEANUP_EVERY_WRITES: u64 = 1024;

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            content_ttl: DEFAULT_TTL,
            idempotency_ttl: DEFAULT_TTL,
            max_entries: Some(DEFAULT_MAX_ENTRIES),
            cleanup_every_writes: DEFAULT_CLEANUP_EVERY_WRITES,
            extraction_window_minutes: 60,
        }
    }
}

impl DeduplicationConfig {
    /// Creates a new configuration from environment variables.
    ///
    /// Falls back to defaults for any unset variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Builds configuration from the `[dedup]` config file section.
    #[must_use]
    pub fn from_settings(settings: &DedupSettings) -> Self {
        let mut config = Self::default();
        if let Some(secs) = settings.content_ttl_secs {
            config.content_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = settings.idempotency_ttl_secs {
            config.idempotency_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = settings.max_entries {
            config.max_entries = (max > 0).then_some(max);
        }
        if let Some(writes) = settings.cleanup_every_writes {
            config.cleanup_every_writes = writes;
        }
        if let Some(minutes) = settings.extraction_window_minutes {
            config.extraction_window_minutes = minutes;
        }
        config
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(secs) = parse_env::<u64>("CHAT_INGEST_DEDUP_CONTENT_TTL_SECS") {
            self.content_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_env::<u64>("CHAT_INGEST_DEDUP_IDEMPOTENCY_TTL_SECS") {
            self.idempotency_ttl = Duration::from_secs(secs);
        }
        if let Some(max) = parse_env::<usize>("CHAT_INGEST_DEDUP_MAX_ENTRIES") {
            self.max_entries = (max > 0).then_some(max);
        }
        if let Some(writes) = parse_env::<u64>("CHAT_INGEST_DEDUP_CLEANUP_EVERY_WRITES") {
            self.cleanup_every_writes = writes;
        }
        if let Some(minutes) = parse_env::<u64>("CHAT_INGEST_DEDUP_EXTRACTION_WINDOW_MINUTES") {
            self.extraction_window_minutes = minutes;
        }
        self
    }

    /// Builder method to set the content-hash TTL.
    #[must_use]
    pub const fn with_content_ttl(mut self, ttl: Duration) -> Self {
        self.content_ttl = ttl;
        self
    }

    /// Builder method to set the idempotency-key TTL.
    #[must_use]
    pub const fn with_idempotency_ttl(mut self, ttl: Duration) -> Self {
        self.idempotency_ttl = ttl;
        self
    }

    /// Builder method to cap entries per space.
    #[must_use]
    pub const fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = Some(max_entries);
        self
    }

    /// Builder method to remove the entry cap.
    #[must_use]
    pub const fn unbounded(mut self) -> Self {
        self.max_entries = None;
        self
    }

    /// Builder method to set how many writes pass between automatic cleanups.
    #[must_use]
    pub const fn with_cleanup_every_writes(mut self, writes: u64) -> Self {
        self.cleanup_every_writes = writes;
        self
    }

    /// Builder method to set the extraction hash window.
    #[must_use]
    pub const fn with_extraction_window_minutes(mut self, minutes: u64) -> Self {
        self.extraction_window_minutes = minutes;
        self
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
