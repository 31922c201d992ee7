//! Chat export upload pipeline.
//!
//! ```text
//! raw upload
//!   -> idempotency key known?  -> cached outcome (duplicate)
//!   -> content hash known?     -> cached outcome (duplicate)
//!   -> export heuristic        -> InvalidInput
//!   -> parse
//!   -> summarize via "ai-provider" breaker
//!   -> record in both key spaces
//! ```
//!
//! Failed runs record nothing, so a retry reprocesses from scratch.

use crate::models::ChatExportData;
use crate::observability::{RequestContext, scope_request_context};
use crate::resilience::{AI_PROVIDER, CircuitBreakerRegistry};
use crate::services::chat_parser::{is_valid_whatsapp_export, parse_chat_export};
use crate::services::deduplication::{ContentHasher, DeduplicationService};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;

/// Produces a short digest of a parsed chat.
///
/// Implementations typically call a remote model; the pipeline wraps every
/// call in the `"ai-provider"` circuit breaker.
pub trait Summarizer: Send + Sync {
    /// Returns the summarizer name for logging.
    fn name(&self) -> &'static str;

    /// Summarizes a parsed chat.
    ///
    /// # Errors
    ///
    /// Returns an error if the downstream provider fails.
    fn summarize(&self, chat: &ChatExportData) -> impl Future<Output = Result<String>> + Send;
}

/// Local summarizer reporting message and participant counts.
///
/// Makes no network calls; useful as a default and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSummarizer;

impl Summarizer for StatsSummarizer {
    fn name(&self) -> &'static str {
        "stats"
    }

    async fn summarize(&self, chat: &ChatExportData) -> Result<String> {
        let mut summary = format!(
            "{} messages from {} participants",
            chat.messages.len(),
            chat.participants.len()
        );
        if let Some((first, last)) = chat.time_span() {
            summary.push_str(&format!(
                " between {} and {}",
                first.format("%Y-%m-%d %H:%M"),
                last.format("%Y-%m-%d %H:%M")
            ));
        }
        let media = chat.media_count();
        if media > 0 {
            summary.push_str(&format!(", {media} media attachments"));
        }
        Ok(summary)
    }
}

/// Pipeline behavior switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOptions {
    /// Reject uploads the export heuristic does not recognize.
    pub require_valid_export: bool,
    /// Run the summarizer after parsing.
    pub summarize: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            require_valid_export: true,
            summarize: true,
        }
    }
}

/// One upload to process.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Raw export text.
    pub raw: String,
    /// Optional client idempotency key.
    pub idempotency_key: Option<String>,
}

impl IngestRequest {
    /// Creates a request without an idempotency key.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            idempotency_key: None,
        }
    }

    /// Attaches a client idempotency key.
    #[must_use]
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// Result of one ingest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestOutcome {
    /// SHA256 of the raw upload.
    pub content_hash: String,
    /// Parsed chat.
    pub chat: ChatExportData,
    /// Summary, when summarization ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// True when served from the dedup cache without reprocessing.
    pub duplicate: bool,
}

impl IngestOutcome {
    fn as_duplicate(mut self) -> Self {
        self.duplicate = true;
        self
    }
}

/// Runs uploads through dedup, parsing, and summarization.
pub struct IngestService<S = StatsSummarizer> {
    options: IngestOptions,
    dedup: Arc<DeduplicationService<IngestOutcome>>,
    breakers: Arc<CircuitBreakerRegistry>,
    summarizer: Option<S>,
}

impl<S> std::fmt::Debug for IngestService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestService")
            .field("options", &self.options)
            .field("summarizer", &self.summarizer.is_some())
            .finish_non_exhaustive()
    }
}

impl<S: Summarizer> IngestService<S> {
    /// Creates a pipeline.
    ///
    /// `summarizer` only runs when `options.summarize` is set.
    #[must_use]
    pub fn new(
        options: IngestOptions,
        dedup: Arc<DeduplicationService<IngestOutcome>>,
        breakers: Arc<CircuitBreakerRegistry>,
        summarizer: Option<S>,
    ) -> Self {
        Self {
            options,
            dedup,
            breakers,
            summarizer: summarizer.filter(|_| options.summarize),
        }
    }

    /// Returns the pipeline options.
    #[must_use]
    pub const fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Processes one upload at most once.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for a blank idempotency key or an upload
    ///   that does not look like a chat export
    /// - [`Error::ServiceUnavailable`] when the `"ai-provider"` breaker is open
    /// - Any error returned by the summarizer
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let context = RequestContext::new();
        let timer = context.clone();
        let result = scope_request_context(context, "ingest", self.run(request)).await;

        let status = match &result {
            Ok(outcome) if outcome.duplicate => "duplicate",
            Ok(_) => "processed",
            Err(Error::InvalidInput(_)) => "rejected",
            Err(Error::ServiceUnavailable { .. }) => "unavailable",
            Err(_) => "failed",
        };
        metrics::counter!("ingest_requests_total", "status" => status).increment(1);
        metrics::histogram!("ingest_duration_ms", "status" => status)
            .record(timer.elapsed().as_secs_f64() * 1000.0);
        tracing::debug!(
            request_id = timer.request_id(),
            status,
            "Ingest request finished"
        );

        result
    }

    async fn run(&self, request: IngestRequest) -> Result<IngestOutcome> {
        let IngestRequest {
            raw,
            idempotency_key,
        } = request;

        if let Some(key) = &idempotency_key {
            if key.trim().is_empty() {
                return Err(Error::InvalidInput(
                    "idempotency key must not be blank".to_string(),
                ));
            }
            if let Some(cached) = self.dedup.check_idempotency(key).result {
                tracing::info!(idempotency_key = %key, "Replaying result for idempotency key");
                return Ok(cached.as_duplicate());
            }
        }

        let content_hash = ContentHasher::hash(&raw);
        if let Some(cached) = self.dedup.get_cached_result(&content_hash) {
            tracing::info!(
                content_hash = %ContentHasher::short(&content_hash),
                "Upload already processed"
            );
            if let Some(key) = &idempotency_key {
                self.dedup.store_idempotency_result(key, cached.clone(), None);
            }
            return Ok(cached.as_duplicate());
        }

        if self.options.require_valid_export && !is_valid_whatsapp_export(&raw) {
            tracing::warn!(bytes = raw.len(), "Upload rejected by export heuristic");
            return Err(Error::InvalidInput(
                "content does not look like a WhatsApp chat export".to_string(),
            ));
        }

        let chat = parse_chat_export(&raw)?;
        let summary = self.summarize(&chat).await?;

        let outcome = IngestOutcome {
            content_hash,
            chat,
            summary,
            duplicate: false,
        };

        self.dedup
            .mark_processed(&outcome.content_hash, Some(outcome.clone()), None);
        if let Some(key) = &idempotency_key {
            self.dedup
                .store_idempotency_result(key, outcome.clone(), None);
        }

        tracing::info!(
            content_hash = %ContentHasher::short(&outcome.content_hash),
            messages = outcome.chat.messages.len(),
            participants = outcome.chat.participants.len(),
            "Chat export ingested"
        );
        Ok(outcome)
    }

    async fn summarize(&self, chat: &ChatExportData) -> Result<Option<String>> {
        let Some(summarizer) = &self.summarizer else {
            return Ok(None);
        };

        let breaker = self.breakers.get_circuit_breaker(AI_PROVIDER, None);
        match breaker.execute(|| summarizer.summarize(chat)).await {
            Ok(summary) => Ok(Some(summary)),
            Err(err) => {
                let err = Error::from(err);
                tracing::warn!(
                    summarizer = summarizer.name(),
                    error = %err,
                    "Summarization failed"
                );
                Err(err)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::{CircuitBreakerConfig, CircuitState};
    use crate::services::deduplication::DeduplicationConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const EXPORT: &str = "\
[08/01/2023, 10:30:00] John Doe: Hello
[08/01/2023, 10:31:00] Jane Smith: Hi there
[08/01/2023, 10:32:00] John Doe: <Media omitted>";

    #[derive(Default)]
    struct CountingSummarizer {
        calls: AtomicUsize,
        fail: bool,
    }

    impl Summarizer for CountingSummarizer {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn summarize(&self, chat: &ChatExportData) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::OperationFailed {
                    operation: "summarize".to_string(),
                    cause: "provider down".to_string(),
                });
            }
            Ok(format!("{} messages", chat.messages.len()))
        }
    }

    fn pipeline<S: Summarizer>(
        summarizer: S,
        options: IngestOptions,
        breaker: CircuitBreakerConfig,
    ) -> IngestService<S> {
        IngestService::new(
            options,
            Arc::new(DeduplicationService::new(DeduplicationConfig::default())),
            Arc::new(CircuitBreakerRegistry::new(breaker)),
            Some(summarizer),
        )
    }

    #[tokio::test]
    async fn test_ingest_parses_and_summarizes() {
        let service = pipeline(
            StatsSummarizer,
            IngestOptions::default(),
            CircuitBreakerConfig::default(),
        );

        let outcome = service.ingest(IngestRequest::new(EXPORT)).await.unwrap();
        assert!(!outcome.duplicate);
        assert_eq!(outcome.chat.messages.len(), 3);
        assert_eq!(outcome.chat.participants, vec!["Jane Smith", "John Doe"]);
        assert_eq!(outcome.content_hash, ContentHasher::hash(EXPORT));

        let summary = outcome.summary.unwrap();
        assert!(summary.starts_with("3 messages from 2 participants"));
        assert!(summary.ends_with("1 media attachments"));
    }

    #[tokio::test]
    async fn test_identical_upload_is_not_reprocessed() {
        let service = pipeline(
            CountingSummarizer::default(),
            IngestOptions::default(),
            CircuitBreakerConfig::default(),
        );

        let first = service.ingest(IngestRequest::new(EXPORT)).await.unwrap();
        let second = service.ingest(IngestRequest::new(EXPORT)).await.unwrap();

        assert!(!first.duplicate);
        assert!(second.duplicate);
        assert_eq!(first.chat, second.chat);
        let calls = service.summarizer.as_ref().unwrap().calls.load(Ordering::SeqCst);
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn test_idempotency_key_replays_first_result() {
        let service = pipeline(
            StatsSummarizer,
            IngestOptions::default(),
            CircuitBreakerConfig::default(),
        );

        let first = service
            .ingest(IngestRequest::new(EXPORT).with_idempotency_key("req-1"))
            .await
            .unwrap();
        // Different body, same key: the first response wins.
        let replay = service
            .ingest(IngestRequest::new("[01/01/2024, 09:00] Bob: other").with_idempotency_key("req-1"))
            .await
            .unwrap();

        assert!(replay.duplicate);
        assert_eq!(replay.content_hash, first.content_hash);
    }

    #[tokio::test]
    async fn test_content_duplicate_is_stored_under_new_key() {
        let service = pipeline(
            StatsSummarizer,
            IngestOptions::default(),
            CircuitBreakerConfig::default(),
        );
        service.ingest(IngestRequest::new(EXPORT)).await.unwrap();

        let outcome = service
            .ingest(IngestRequest::new(EXPORT).with_idempotency_key("late-key"))
            .await
            .unwrap();
        assert!(outcome.duplicate);
        assert!(service.dedup.check_idempotency("late-key").is_duplicate);
    }

    #[tokio::test]
    async fn test_blank_idempotency_key_rejected() {
        let service = pipeline(
            StatsSummarizer,
            IngestOptions::default(),
            CircuitBreakerConfig::default(),
        );
        let err = service
            .ingest(IngestRequest::new(EXPORT).with_idempotency_key("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_non_export_rejected_when_required() {
        let service = pipeline(
            StatsSummarizer,
            IngestOptions::default(),
            CircuitBreakerConfig::default(),
        );
        let err = service
            .ingest(IngestRequest::new("just some notes\nnothing else"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(service.dedup.stats().entries, 0);
    }

    #[tokio::test]
    async fn test_non_export_accepted_when_not_required() {
        let options = IngestOptions {
            require_valid_export: false,
            summarize: false,
        };
        let service = pipeline(StatsSummarizer, options, CircuitBreakerConfig::default());

        let outcome = service
            .ingest(IngestRequest::new("just some notes"))
            .await
            .unwrap();
        assert!(outcome.chat.is_empty());
        assert!(outcome.summary.is_none());
    }

    #[tokio::test]
    async fn test_summarizer_failure_records_nothing() {
        let service = pipeline(
            CountingSummarizer {
                fail: true,
                ..CountingSummarizer::default()
            },
            IngestOptions::default(),
            CircuitBreakerConfig::default(),
        );

        let err = service.ingest(IngestRequest::new(EXPORT)).await.unwrap_err();
        assert!(matches!(err, Error::OperationFailed { .. }));
        assert!(!service.dedup.is_duplicate(&ContentHasher::hash(EXPORT)));
    }

    #[tokio::test]
    async fn test_open_breaker_maps_to_service_unavailable() {
        let service = pipeline(
            CountingSummarizer {
                fail: true,
                ..CountingSummarizer::default()
            },
            IngestOptions::default(),
            CircuitBreakerConfig::default()
                .with_failure_threshold(2)
                .with_reset_timeout_ms(60_000),
        );

        for _ in 0..2 {
            let _ = service.ingest(IngestRequest::new(EXPORT)).await;
        }
        let breaker = service.breakers.get(AI_PROVIDER).unwrap();
        assert_eq!(breaker.state(), CircuitState::Open);

        let err = service.ingest(IngestRequest::new(EXPORT)).await.unwrap_err();
        assert!(matches!(err, Error::ServiceUnavailable { ref service, .. } if service == AI_PROVIDER));
        let calls = service.summarizer.as_ref().unwrap().calls.load(Ordering::SeqCst);
        assert_eq!(calls, 2);
    }
}
