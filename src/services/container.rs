//! Service container.
//!
//! Built once at startup from [`IngestConfig`]. Owns the shared breaker
//! registry and dedup caches so every service handed out sees the same state.

use crate::config::IngestConfig;
use crate::resilience::{AI_PROVIDER, CircuitBreakerConfig, CircuitBreakerRegistry};
use crate::services::deduplication::DeduplicationService;
use crate::services::ingest::{IngestOptions, IngestOutcome, IngestService, StatsSummarizer, Summarizer};
use std::sync::Arc;

/// Container for shared service state.
#[derive(Debug)]
pub struct ServiceContainer {
    options: IngestOptions,
    breakers: Arc<CircuitBreakerRegistry>,
    dedup: Arc<DeduplicationService<IngestOutcome>>,
}

impl ServiceContainer {
    /// Creates a container from configuration.
    ///
    /// The `"ai-provider"` breaker is registered eagerly so its state shows
    /// up in stats before the first call.
    #[must_use]
    pub fn new(config: &IngestConfig) -> Self {
        let breakers = Arc::new(CircuitBreakerRegistry::new(config.breaker.clone()));
        breakers.get_circuit_breaker(AI_PROVIDER, Some(ai_provider_config(&config.breaker)));

        Self {
            options: config.ingest,
            breakers,
            dedup: Arc::new(DeduplicationService::new(config.dedup.clone())),
        }
    }

    /// Returns the shared breaker registry.
    #[must_use]
    pub fn registry(&self) -> Arc<CircuitBreakerRegistry> {
        Arc::clone(&self.breakers)
    }

    /// Returns the shared dedup service.
    #[must_use]
    pub fn dedup(&self) -> Arc<DeduplicationService<IngestOutcome>> {
        Arc::clone(&self.dedup)
    }

    /// Returns an ingest pipeline using the local [`StatsSummarizer`].
    #[must_use]
    pub fn ingest_service(&self) -> IngestService<StatsSummarizer> {
        self.ingest_service_with(StatsSummarizer)
    }

    /// Returns an ingest pipeline using a custom summarizer.
    #[must_use]
    pub fn ingest_service_with<S: Summarizer>(&self, summarizer: S) -> IngestService<S> {
        IngestService::new(
            self.options,
            self.dedup(),
            self.registry(),
            Some(summarizer),
        )
    }
}

// Rejected input says nothing about provider health.
fn ai_provider_config(base: &CircuitBreakerConfig) -> CircuitBreakerConfig {
    base.clone().with_failure_predicate(|err| {
        !matches!(
            err.downcast_ref::<crate::Error>(),
            Some(crate::Error::InvalidInput(_))
        )
    })
}
