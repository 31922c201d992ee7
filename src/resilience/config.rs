//! Circuit breaker configuration.

use crate::config::BreakerSettings;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Decides whether an error counts against a breaker.
///
/// Returning `false` lets the error propagate to the caller without touching
/// breaker state (e.g. validation errors that say nothing about the dependency).
pub type FailurePredicate = Arc<dyn Fn(&(dyn StdError + 'static)) -> bool + Send + Sync>;

/// Returns a predicate that counts every error as a failure.
#[must_use]
pub fn count_all_errors() -> FailurePredicate {
    Arc::new(|_| true)
}

/// Configuration for a single circuit breaker.
///
/// # Environment Variables
///
/// | Variable | Type | Default | Description |
/// |----------|------|---------|-------------|
/// | `CHAT_INGEST_BREAKER_FAILURE_THRESHOLD` | u32 | `5` | Counted failures before opening |
/// | `CHAT_INGEST_BREAKER_RESET_MS` | u64 | `30000` | Time spent open before a trial |
/// | `CHAT_INGEST_BREAKER_SUCCESS_THRESHOLD` | u32 | `2` | Half-open successes needed to close |
/// | `CHAT_INGEST_BREAKER_WINDOW_MS` | u64 | `60000` | Gap after which the failure count restarts |
#[derive(Clone)]
pub struct CircuitBreakerConfig {
    /// Counted failures (while closed) before opening the circuit.
    pub failure_threshold: u32,
    /// How long to keep the circuit open before admitting trial calls.
    pub reset_timeout_ms: u64,
    /// Successful trial calls needed to close a half-open circuit.
    pub success_threshold: u32,
    /// A counted failure arriving this long after the previous one restarts
    /// the failure count. Zero keeps counting indefinitely.
    pub window_duration_ms: u64,
    /// Classifier deciding which errors count as failures.
    pub is_failure: FailurePredicate,
}

impl fmt::Debug for CircuitBreakerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerConfig")
            .field("failure_threshold", &self.failure_threshold)
            .field("reset_timeout_ms", &self.reset_timeout_ms)
            .field("success_threshold", &self.success_threshold)
            .field("window_duration_ms", &self.window_duration_ms)
            .finish_non_exhaustive()
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout_ms: 30_000,
            success_threshold: 2,
            window_duration_ms: 60_000,
            is_failure: count_all_errors(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Loads breaker configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides()
    }

    /// Builds breaker configuration from config file settings.
    #[must_use]
    pub fn from_settings(settings: &BreakerSettings) -> Self {
        let mut config = Self::default();
        if let Some(threshold) = settings.failure_threshold {
            config.failure_threshold = threshold.max(1);
        }
        if let Some(reset_ms) = settings.reset_timeout_ms {
            config.reset_timeout_ms = reset_ms;
        }
        if let Some(threshold) = settings.success_threshold {
            config.success_threshold = threshold.max(1);
        }
        if let Some(window_ms) = settings.window_duration_ms {
            config.window_duration_ms = window_ms;
        }
        config
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(v) = std::env::var("CHAT_INGEST_BREAKER_FAILURE_THRESHOLD") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.failure_threshold = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("CHAT_INGEST_BREAKER_RESET_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.reset_timeout_ms = parsed;
            }
        }
        if let Ok(v) = std::env::var("CHAT_INGEST_BREAKER_SUCCESS_THRESHOLD") {
            if let Ok(parsed) = v.parse::<u32>() {
                self.success_threshold = parsed.max(1);
            }
        }
        if let Ok(v) = std::env::var("CHAT_INGEST_BREAKER_WINDOW_MS") {
            if let Ok(parsed) = v.parse::<u64>() {
                self.window_duration_ms = parsed;
            }
        }
        self
    }

    /// Sets the failure threshold.
    #[must_use]
    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the reset timeout in milliseconds.
    #[must_use]
    pub const fn with_reset_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.reset_timeout_ms = timeout_ms;
        self
    }

    /// Sets the success threshold.
    #[must_use]
    pub const fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    /// Sets the failure counting window in milliseconds.
    #[must_use]
    pub const fn with_window_duration_ms(mut self, window_ms: u64) -> Self {
        self.window_duration_ms = window_ms;
        self
    }

    /// Replaces the failure classifier.
    #[must_use]
    pub fn with_failure_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&(dyn StdError + 'static)) -> bool + Send + Sync + 'static,
    {
        self.is_failure = Arc::new(predicate);
        self
    }

    pub(crate) const fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub(crate) const fn window(&self) -> Duration {
        Duration::from_millis(self.window_duration_ms)
    }
}
