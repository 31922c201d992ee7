//! Circuit breaker state machine.

use super::config::CircuitBreakerConfig;
use super::error::{BreakerError, CircuitOpenError};
use serde::{Deserialize, Serialize};
use std::error::Error as StdError;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Calls flow through; failures are counted.
    Closed,
    /// Calls are rejected until the reset timeout elapses.
    Open,
    /// Trial calls are admitted to probe recovery.
    HalfOpen,
}

impl CircuitState {
    /// Returns the canonical upper-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    /// Returns the state as a numeric value for metrics.
    ///
    /// - 0: Closed
    /// - 1: Open
    /// - 2: Half-Open
    #[must_use]
    pub const fn metric_value(self) -> u8 {
        match self {
            Self::Closed => 0,
            Self::Open => 1,
            Self::HalfOpen => 2,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state change reported to listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTransition {
    /// Breaker name.
    pub name: String,
    /// State before the change.
    pub from: CircuitState,
    /// State after the change.
    pub to: CircuitState,
}

/// Callback invoked after every state change, outside the breaker's lock.
pub type StateChangeListener = Arc<dyn Fn(&StateTransition) + Send + Sync>;

/// Read-only snapshot of a breaker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStats {
    /// Breaker name.
    pub name: String,
    /// Current state (as last evaluated; the open timeout is checked lazily).
    pub state: CircuitState,
    /// Failure count in the current state.
    pub failures: u32,
    /// Success count in the current state.
    pub successes: u32,
    /// Calls admitted since creation or the last reset.
    pub total_requests: u64,
    /// Counted failures since creation or the last reset.
    pub total_failures: u64,
}

#[derive(Debug)]
struct BreakerCore {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    last_transition: Instant,
    last_failure: Option<Instant>,
    total_requests: u64,
    total_failures: u64,
}

type Change = Option<(CircuitState, CircuitState)>;

impl BreakerCore {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            last_transition: now,
            last_failure: None,
            total_requests: 0,
            total_failures: 0,
        }
    }

    fn transition_to(&mut self, to: CircuitState, now: Instant) -> Change {
        let from = self.state;
        self.state = to;
        self.last_transition = now;
        self.failure_count = 0;
        self.success_count = 0;
        Some((from, to))
    }

    /// Lazily moves an expired open circuit to half-open.
    fn refresh(&mut self, reset_timeout: Duration, now: Instant) -> Change {
        if self.state == CircuitState::Open
            && now.saturating_duration_since(self.last_transition) >= reset_timeout
        {
            return self.transition_to(CircuitState::HalfOpen, now);
        }
        None
    }

    fn remaining_open(&self, reset_timeout: Duration, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.last_transition);
        let remaining = reset_timeout.saturating_sub(elapsed);
        u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX)
    }

    fn on_success(&mut self, success_threshold: u32, now: Instant) -> Change {
        match self.state {
            CircuitState::Closed => {
                self.success_count = self.success_count.saturating_add(1);
                self.failure_count = 0;
                None
            },
            CircuitState::HalfOpen => {
                self.success_count = self.success_count.saturating_add(1);
                if self.success_count >= success_threshold {
                    self.last_failure = None;
                    return self.transition_to(CircuitState::Closed, now);
                }
                None
            },
            // Admitted before the circuit opened; too late to count.
            CircuitState::Open => None,
        }
    }

    fn on_failure(&mut self, failure_threshold: u32, window: Duration, now: Instant) -> Change {
        self.total_failures = self.total_failures.saturating_add(1);
        match self.state {
            CircuitState::Closed => {
                let stale = !window.is_zero()
                    && self
                        .last_failure
                        .is_some_and(|at| now.saturating_duration_since(at) > window);
                if stale {
                    self.failure_count = 0;
                }
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_failure = Some(now);
                if self.failure_count >= failure_threshold {
                    let change = self.transition_to(CircuitState::Open, now);
                    // The count that tripped the circuit stays visible in stats.
                    self.failure_count = failure_threshold;
                    return change;
                }
                None
            },
            CircuitState::HalfOpen => self.transition_to(CircuitState::Open, now),
            CircuitState::Open => None,
        }
    }
}

/// Guards calls to one failure-prone dependency.
///
/// ```text
/// +--------+   failures >= threshold   +------+
/// | Closed | ------------------------> | Open |
/// +--------+                           +------+
///     ^                                 ^    |
///     | successes >= threshold  failure |    | reset timeout elapsed
///     |                                 |    v
///     +------------------------------ +-----------+
///                                     | Half-Open |
///                                     +-----------+
/// ```
///
/// The open-to-half-open move is evaluated lazily on the next call; there is
/// no background timer.
///
/// # Concurrency
///
/// State lives behind a `Mutex` that is never held across the guarded call.
/// Half-open admits every concurrent caller as a trial; there is no single
/// canary request.
///
/// # Example
///
/// ```rust,ignore
/// use chat_ingest::resilience::{CircuitBreaker, CircuitBreakerConfig};
///
/// let breaker = CircuitBreaker::new("ai-provider", CircuitBreakerConfig::default());
/// let summary = breaker.execute(|| client.summarize(&chat)).await?;
/// ```
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    core: Mutex<BreakerCore>,
    listener: Option<StateChangeListener>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl CircuitBreaker {
    /// Creates a closed breaker. Thresholds below 1 are raised to 1.
    #[must_use]
    pub fn new(name: impl Into<String>, mut config: CircuitBreakerConfig) -> Self {
        config.failure_threshold = config.failure_threshold.max(1);
        config.success_threshold = config.success_threshold.max(1);
        Self {
            name: name.into(),
            config,
            core: Mutex::new(BreakerCore::new(Instant::now())),
            listener: None,
        }
    }

    /// Attaches a listener notified after every state change.
    #[must_use]
    pub fn with_listener(mut self, listener: StateChangeListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Returns the breaker name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the breaker configuration.
    #[must_use]
    pub const fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns the last evaluated state without checking the open timeout.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Returns true if a call would currently be admitted.
    ///
    /// The only side effect is the lazy open-to-half-open transition once the
    /// reset timeout has elapsed.
    pub fn is_allowed(&self) -> bool {
        let mut core = self.lock();
        let change = core.refresh(self.config.reset_timeout(), Instant::now());
        let allowed = core.state != CircuitState::Open;
        drop(core);
        self.notify(change);
        allowed
    }

    /// Runs an async operation through the breaker.
    ///
    /// While open, `operation` is never invoked and the call fails with
    /// [`BreakerError::Open`]. Errors from `operation` are returned unchanged
    /// as [`BreakerError::Inner`]; only those the classifier accepts count
    /// against the breaker.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + 'static,
    {
        self.try_acquire()?;
        let start = Instant::now();
        let outcome = operation().await;
        self.record_outcome(&outcome, start.elapsed());
        outcome.map_err(BreakerError::Inner)
    }

    /// Runs a synchronous operation through the breaker.
    ///
    /// Same state semantics as [`Self::execute`].
    pub fn call<T, E, F>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Result<T, E>,
        E: StdError + 'static,
    {
        self.try_acquire()?;
        let start = Instant::now();
        let outcome = operation();
        self.record_outcome(&outcome, start.elapsed());
        outcome.map_err(BreakerError::Inner)
    }

    /// Forces the breaker closed and zeroes every counter.
    pub fn reset(&self) {
        let mut core = self.lock();
        let from = core.state;
        *core = BreakerCore::new(Instant::now());
        drop(core);
        tracing::info!(breaker = %self.name, from = %from, "Circuit breaker reset");
        if from != CircuitState::Closed {
            self.notify(Some((from, CircuitState::Closed)));
        }
    }

    /// Returns a snapshot of the breaker counters.
    #[must_use]
    pub fn stats(&self) -> CircuitBreakerStats {
        let core = self.lock();
        CircuitBreakerStats {
            name: self.name.clone(),
            state: core.state,
            failures: core.failure_count,
            successes: core.success_count,
            total_requests: core.total_requests,
            total_failures: core.total_failures,
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerCore> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> Result<(), CircuitOpenError> {
        let now = Instant::now();
        let mut core = self.lock();
        let change = core.refresh(self.config.reset_timeout(), now);
        let admitted = if core.state == CircuitState::Open {
            Err(CircuitOpenError {
                service_name: self.name.clone(),
                retry_after_ms: core.remaining_open(self.config.reset_timeout(), now),
            })
        } else {
            core.total_requests = core.total_requests.saturating_add(1);
            Ok(())
        };
        drop(core);
        self.notify(change);

        if let Err(ref rejection) = admitted {
            tracing::debug!(
                breaker = %self.name,
                retry_after_ms = rejection.retry_after_ms,
                "Circuit breaker rejected call"
            );
            metrics::counter!(
                "circuit_breaker_requests_total",
                "breaker" => self.name.clone(),
                "status" => "rejected"
            )
            .increment(1);
        }
        admitted
    }

    fn record_outcome<T, E>(&self, outcome: &Result<T, E>, elapsed: Duration)
    where
        E: StdError + 'static,
    {
        let status = match outcome {
            Ok(_) => {
                self.record_success();
                "success"
            },
            Err(err) => {
                if (self.config.is_failure)(err) {
                    self.record_failure(err);
                    "failure"
                } else {
                    tracing::debug!(
                        breaker = %self.name,
                        error = %err,
                        "Error not classified as a failure"
                    );
                    "ignored_error"
                }
            },
        };

        metrics::counter!(
            "circuit_breaker_requests_total",
            "breaker" => self.name.clone(),
            "status" => status
        )
        .increment(1);
        metrics::histogram!(
            "circuit_breaker_call_duration_ms",
            "breaker" => self.name.clone(),
            "status" => status
        )
        .record(elapsed.as_secs_f64() * 1000.0);
    }

    fn record_success(&self) {
        let mut core = self.lock();
        let change = core.on_success(self.config.success_threshold, Instant::now());
        drop(core);
        self.notify(change);
    }

    fn record_failure(&self, err: &(dyn StdError + 'static)) {
        let mut core = self.lock();
        let change = core.on_failure(
            self.config.failure_threshold,
            self.config.window(),
            Instant::now(),
        );
        let failures = core.failure_count;
        drop(core);
        tracing::debug!(
            breaker = %self.name,
            failures,
            threshold = self.config.failure_threshold,
            error = %err,
            "Circuit breaker recorded failure"
        );
        self.notify(change);
    }

    fn notify(&self, change: Change) {
        let Some((from, to)) = change else {
            return;
        };

        match to {
            CircuitState::Open => tracing::warn!(
                breaker = %self.name,
                from = %from,
                reset_timeout_ms = self.config.reset_timeout_ms,
                "Circuit breaker opened"
            ),
            CircuitState::HalfOpen => tracing::info!(
                breaker = %self.name,
                "Circuit breaker transitioning to half-open"
            ),
            CircuitState::Closed => tracing::info!(
                breaker = %self.name,
                from = %from,
                "Circuit breaker closed"
            ),
        }

        metrics::gauge!("circuit_breaker_state", "breaker" => self.name.clone())
            .set(f64::from(to.metric_value()));
        metrics::counter!(
            "circuit_breaker_transitions_total",
            "breaker" => self.name.clone(),
            "from" => from.as_str(),
            "to" => to.as_str()
        )
        .increment(1);

        if let Some(listener) = &self.listener {
            listener(&StateTransition {
                name: self.name.clone(),
                from,
                to,
            });
        }
    }
}
