//! Circuit breaking for failure-prone dependencies.
//!
//! Each downstream dependency gets its own named [`CircuitBreaker`], handed out
//! by a [`CircuitBreakerRegistry`] that the service container owns.
//!
//! # Circuit Breaker States
//!
//! ```text
//! +--------+     failures >= threshold     +------+
//! | Closed | --------------------------->  | Open |
//! +--------+                               +------+
//!     ^                                     ^   |
//!     |  successes >= threshold     failure |   | reset timeout elapsed
//!     |                                     |   v
//!     +--------------------------------  +-----------+
//!                                        | Half-Open |
//!                                        +-----------+
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use chat_ingest::resilience::{AI_PROVIDER, CircuitBreakerRegistry};
//!
//! let registry = CircuitBreakerRegistry::default();
//! let breaker = registry.get_circuit_breaker(AI_PROVIDER, None);
//! let summary = breaker.execute(|| summarizer.summarize(&chat)).await?;
//! ```

mod breaker;
mod config;
mod error;
mod registry;

pub use breaker::{
    CircuitBreaker, CircuitBreakerStats, CircuitState, StateChangeListener, StateTransition,
};
pub use config::{CircuitBreakerConfig, FailurePredicate, count_all_errors};
pub use error::{BreakerError, CircuitOpenError};
pub use registry::CircuitBreakerRegistry;

/// Breaker name guarding the summarization provider.
pub const AI_PROVIDER: &str = "ai-provider";
