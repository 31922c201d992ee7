//! Structured logging configuration.

use crate::config::LoggingSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Default filter directive when none is configured.
pub const DEFAULT_FILTER: &str = "chat_ingest=info,warn";

/// Filter directive applied by `--verbose`.
pub const VERBOSE_FILTER: &str = "chat_ingest=debug,info";

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl LogFormat {
    /// Parses a format name, defaulting to pretty for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Logging configuration.
///
/// # Environment Variables
///
/// | Variable | Description |
/// |----------|-------------|
/// | `CHAT_INGEST_LOG_FORMAT` | `pretty` or `json` |
/// | `CHAT_INGEST_LOG` | `EnvFilter` directive |
/// | `CHAT_INGEST_LOG_FILE` | Append logs to this file instead of stderr |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// `EnvFilter` directive.
    pub filter: String,
    /// Optional log file.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: DEFAULT_FILTER.to_string(),
            file: None,
        }
    }
}

impl LoggingConfig {
    /// Builds logging configuration from the `[logging]` config file section.
    #[must_use]
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        let mut config = Self::default();
        if let Some(format) = &settings.format {
            config.format = LogFormat::parse(format);
        }
        if let Some(filter) = settings.filter.as_ref().filter(|f| !f.trim().is_empty()) {
            config.filter.clone_from(filter);
        }
        config.file = settings.file.as_ref().map(PathBuf::from);
        config
    }

    /// Applies environment variable overrides.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(format) = std::env::var("CHAT_INGEST_LOG_FORMAT") {
            self.format = LogFormat::parse(&format);
        }
        if let Ok(filter) = std::env::var("CHAT_INGEST_LOG") {
            if !filter.trim().is_empty() {
                self.filter = filter;
            }
        }
        if let Ok(file) = std::env::var("CHAT_INGEST_LOG_FILE") {
            if !file.trim().is_empty() {
                self.file = Some(PathBuf::from(file));
            }
        }
        self
    }

    /// Raises the filter to debug for this crate.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        if verbose {
            self.filter = VERBOSE_FILTER.to_string();
        }
        self
    }

    /// Builds the `EnvFilter`, falling back to the default on a bad directive.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(&self.filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}
