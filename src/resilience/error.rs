//! Errors raised by circuit breakers.

use thiserror::Error as ThisError;

/// Raised without invoking the guarded call because the circuit is open.
///
/// Callers should treat this as "retry later", not as a downstream failure.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("circuit breaker for '{service_name}' is open, retry after {retry_after_ms}ms")]
pub struct CircuitOpenError {
    /// Name of the guarded service.
    pub service_name: String,
    /// Milliseconds until the open window elapses.
    pub retry_after_ms: u64,
}

/// Outcome of a failed breaker-guarded call.
#[derive(Debug, ThisError)]
pub enum BreakerError<E> {
    /// The circuit was open; the call was never made.
    #[error(transparent)]
    Open(#[from] CircuitOpenError),

    /// The call was made and returned this error, unchanged.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns true if the call was rejected without being made.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open(_))
    }

    /// Returns the downstream error, if the call was made.
    #[must_use]
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(err) => Some(err),
            Self::Open(_) => None,
        }
    }
}

impl From<BreakerError<crate::Error>> for crate::Error {
    fn from(err: BreakerError<Self>) -> Self {
        match err {
            BreakerError::Open(open) => open.into(),
            BreakerError::Inner(inner) => inner,
        }
    }
}
