//! Named circuit breakers.

use super::breaker::{CircuitBreaker, CircuitBreakerStats, StateChangeListener};
use super::config::CircuitBreakerConfig;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Get-or-create map of circuit breakers keyed by dependency name.
///
/// Owned by the service container rather than a process-wide static, so tests
/// and embedders get isolated breaker state.
pub struct CircuitBreakerRegistry {
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    default_config: CircuitBreakerConfig,
    listener: Option<StateChangeListener>,
}

impl std::fmt::Debug for CircuitBreakerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreakerRegistry")
            .field("breakers", &self.names())
            .field("default_config", &self.default_config)
            .finish_non_exhaustive()
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry using `default_config` for new breakers.
    #[must_use]
    pub fn new(default_config: CircuitBreakerConfig) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            default_config,
            listener: None,
        }
    }

    /// Attaches a listener to every breaker created from now on.
    #[must_use]
    pub fn with_listener(mut self, listener: StateChangeListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Returns the breaker registered under `name`, creating it if needed.
    ///
    /// `config` only applies on creation; an existing breaker keeps the
    /// configuration it was created with.
    pub fn get_circuit_breaker(
        &self,
        name: &str,
        config: Option<CircuitBreakerConfig>,
    ) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.get(name) {
            return existing;
        }

        let mut breakers = self
            .breakers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another caller may have created it between the two locks.
        let breaker = breakers.entry(name.to_string()).or_insert_with(|| {
            let config = config.unwrap_or_else(|| self.default_config.clone());
            let breaker = CircuitBreaker::new(name, config);
            tracing::debug!(breaker = name, "Registered circuit breaker");
            Arc::new(match &self.listener {
                Some(listener) => breaker.with_listener(Arc::clone(listener)),
                None => breaker,
            })
        });
        Arc::clone(breaker)
    }

    /// Returns the breaker registered under `name` without creating it.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    /// Returns a snapshot of every breaker, sorted by name.
    #[must_use]
    pub fn all_stats(&self) -> Vec<CircuitBreakerStats> {
        let mut stats: Vec<_> = self
            .snapshot()
            .iter()
            .map(|breaker| breaker.stats())
            .collect();
        stats.sort_by(|a, b| a.name.cmp(&b.name));
        stats
    }

    /// Forces every breaker closed.
    pub fn reset_all(&self) {
        let breakers = self.snapshot();
        for breaker in &breakers {
            breaker.reset();
        }
        tracing::info!(count = breakers.len(), "Reset all circuit breakers");
    }

    /// Returns the registered breaker names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self
            .breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Returns the number of registered breakers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no breaker has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Clones the Arcs so breaker locks are never taken under the map lock.
    fn snapshot(&self) -> Vec<Arc<CircuitBreaker>> {
        self.breakers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
