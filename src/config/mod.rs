//! Configuration management.
//!
//! Configuration is layered: TOML file sections, then environment variable
//! overrides, then built-in defaults for anything still unset.

use crate::observability::LoggingConfig;
use crate::resilience::CircuitBreakerConfig;
use crate::services::{DeduplicationConfig, IngestOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_PATH_ENV: &str = "CHAT_INGEST_CONFIG_PATH";

/// Main configuration for chat-ingest.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    /// Default configuration for circuit breakers.
    pub breaker: CircuitBreakerConfig,
    /// Deduplication cache configuration.
    pub dedup: DeduplicationConfig,
    /// Upload pipeline behavior.
    pub ingest: IngestOptions,
    /// Logging configuration.
    pub logging: LoggingConfig,
    /// Whether the Prometheus recorder is installed.
    pub metrics_enabled: bool,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Circuit breaker section.
    pub breaker: Option<BreakerSettings>,
    /// Deduplication section.
    pub dedup: Option<DedupSettings>,
    /// Ingest pipeline section.
    pub ingest: Option<IngestSettings>,
    /// Logging section.
    pub logging: Option<LoggingSettings>,
    /// Metrics section.
    pub metrics: Option<MetricsSettings>,
}

/// `[breaker]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BreakerSettings {
    /// Counted failures before opening.
    pub failure_threshold: Option<u32>,
    /// Milliseconds to stay open before a trial call.
    pub reset_timeout_ms: Option<u64>,
    /// Half-open successes needed to close.
    pub success_threshold: Option<u32>,
    /// Failure counting window in milliseconds.
    pub window_duration_ms: Option<u64>,
}

/// `[dedup]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct DedupSettings {
    /// TTL for content-hash entries.
    pub content_ttl_secs: Option<u64>,
    /// TTL for idempotency-key entries.
    pub idempotency_ttl_secs: Option<u64>,
    /// Per-space entry cap; 0 is unbounded.
    pub max_entries: Option<usize>,
    /// Writes between automatic cleanups; 0 disables them.
    pub cleanup_every_writes: Option<u64>,
    /// Bucket size for extraction hashes.
    pub extraction_window_minutes: Option<u64>,
}

/// `[ingest]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct IngestSettings {
    /// Reject uploads the export heuristic does not recognize.
    pub require_valid_export: Option<bool>,
    /// Run the summarizer after parsing.
    pub summarize: Option<bool>,
}

/// `[logging]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct LoggingSettings {
    /// `pretty` or `json`.
    pub format: Option<String>,
    /// `EnvFilter` directive.
    pub filter: Option<String>,
    /// Optional log file path.
    pub file: Option<String>,
}

/// `[metrics]` section in config file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct MetricsSettings {
    /// Install the Prometheus recorder.
    pub enabled: Option<bool>,
}

impl IngestConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration following the standard lookup order.
    ///
    /// 1. `explicit` path (the `--config` flag)
    /// 2. `CHAT_INGEST_CONFIG_PATH`
    /// 3. Platform config dir (`chat-ingest/config.toml`)
    /// 4. Defaults
    ///
    /// Environment overrides are applied last in every case.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicitly named file cannot be read or parsed.
    pub fn load(explicit: Option<&Path>) -> crate::Result<Self> {
        let from_env = std::env::var(CONFIG_PATH_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let config = match explicit.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::load_from_file(&path)?,
            None => Self::load_default(),
        };

        Ok(config.with_env_overrides())
    }

    /// Loads configuration from a file path, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> crate::Result<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| crate::Error::OperationFailed {
                operation: "read_config_file".to_string(),
                cause: format!("{}: {e}", path.display()),
            })?;

        Self::from_toml(&contents)
    }

    /// Parses configuration from TOML text, without environment overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the text is not a valid config file.
    pub fn from_toml(contents: &str) -> crate::Result<Self> {
        let file: ConfigFile =
            toml::from_str(contents).map_err(|e| crate::Error::OperationFailed {
                operation: "parse_config_file".to_string(),
                cause: e.to_string(),
            })?;

        Ok(Self::from_config_file(file))
    }

    /// Loads configuration from the platform config directory.
    ///
    /// Returns default configuration if no readable config file is found.
    #[must_use]
    pub fn load_default() -> Self {
        let Some(base_dirs) = directories::BaseDirs::new() else {
            return Self::default();
        };

        let path = base_dirs
            .config_dir()
            .join("chat-ingest")
            .join("config.toml");
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            },
        }
    }

    /// Applies `CHAT_INGEST_*` environment overrides to every section.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.breaker = self.breaker.with_env_overrides();
        self.dedup = self.dedup.with_env_overrides();
        self.logging = self.logging.with_env_overrides();
        if let Some(enabled) = parse_bool_env("CHAT_INGEST_METRICS_ENABLED") {
            self.metrics_enabled = enabled;
        }
        self
    }

    /// Converts a `ConfigFile` to `IngestConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(breaker) = file.breaker {
            config.breaker = CircuitBreakerConfig::from_settings(&breaker);
        }
        if let Some(dedup) = file.dedup {
            config.dedup = DeduplicationConfig::from_settings(&dedup);
        }
        if let Some(ingest) = file.ingest {
            if let Some(v) = ingest.require_valid_export {
                config.ingest.require_valid_export = v;
            }
            if let Some(v) = ingest.summarize {
                config.ingest.summarize = v;
            }
        }
        if let Some(logging) = file.logging {
            config.logging = LoggingConfig::from_settings(&logging);
        }
        if let Some(metrics) = file.metrics {
            config.metrics_enabled = metrics.enabled.unwrap_or(false);
        }

        config
    }
}

/// Parses a boolean environment variable (`1`/`true`/`yes`/`on`).
pub(crate) fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
