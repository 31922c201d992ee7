//! # chat-ingest
//!
//! Resilient ingestion of user-supplied chat exports.
//!
//! The crate turns informally-structured chat export text into validated
//! structured data while protecting downstream dependencies and processing
//! each logical request at most once.
//!
//! ## Components
//!
//! - [`services::ChatParser`]: raw WhatsApp export text to [`ChatExportData`]
//! - [`resilience::CircuitBreaker`]: per-dependency failure isolation
//! - [`resilience::CircuitBreakerRegistry`]: get-or-create breakers by name
//! - [`services::DeduplicationService`]: content-hash and idempotency-key
//!   caches with lazy expiry
//! - [`services::IngestService`]: the upload pipeline tying the above together
//!
//! ## Example
//!
//! ```rust,ignore
//! use chat_ingest::services::{IngestRequest, ServiceContainer};
//! use chat_ingest::IngestConfig;
//!
//! let container = ServiceContainer::new(&IngestConfig::default());
//! let ingest = container.ingest_service();
//! let outcome = ingest.ingest(IngestRequest::new(raw_text)).await?;
//! println!("{} messages", outcome.chat.messages.len());
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod models;
pub mod observability;
pub mod resilience;
pub mod services;

// Re-exports for convenience
pub use config::IngestConfig;
pub use models::{ChatExportData, ChatMessage, ExportMetadata};
pub use resilience::{
    BreakerError, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerRegistry, CircuitOpenError,
    CircuitState,
};
pub use services::{
    ChatParser, DeduplicationService, IngestService, is_valid_whatsapp_export, parse_chat_export,
};

/// Error type for chat-ingest operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidInput` | Upload rejected by the export heuristic, empty idempotency key |
/// | `OperationFailed` | Config file I/O, observability init, summarizer failures |
/// | `ParseFailure` | Internal parser fault (never a malformed line) |
/// | `ServiceUnavailable` | A circuit breaker rejected the call while open |
#[derive(Debug, ThisError)]
pub enum Error {
    /// Invalid input was provided.
    ///
    /// Raised when:
    /// - The upload does not look like a chat export
    /// - A blank idempotency key is supplied
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    ///
    /// Raised when:
    /// - Configuration files cannot be read or parsed
    /// - Logging or metrics cannot be initialized
    /// - A downstream summarizer fails
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// The parser hit an internal fault.
    ///
    /// Malformed lines are skipped and never produce this error.
    #[error("failed to parse chat export: {0}")]
    ParseFailure(String),

    /// A downstream service is temporarily unavailable.
    ///
    /// Raised when the circuit breaker guarding `service` is open.
    /// Callers should surface this as "retry later" rather than a generic failure.
    #[error("service '{service}' unavailable, retry after {retry_after_ms}ms")]
    ServiceUnavailable {
        /// The guarded service name.
        service: String,
        /// Milliseconds until the breaker admits a trial call.
        retry_after_ms: u64,
    },
}

impl From<CircuitOpenError> for Error {
    fn from(err: CircuitOpenError) -> Self {
        Self::ServiceUnavailable {
            service: err.service_name,
            retry_after_ms: err.retry_after_ms,
        }
    }
}

/// Result type alias for chat-ingest operations.
pub type Result<T> = std::result::Result<T, Error>;
