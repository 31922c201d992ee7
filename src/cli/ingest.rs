//! Ingest CLI command.

use super::{read_export, write_error};
use crate::services::{ContentHasher, IngestRequest, ServiceContainer};
use crate::{Error, Result};
use std::io::Write;
use std::path::PathBuf;

/// Runs each file through the ingest pipeline, then reports breaker and
/// dedup stats.
///
/// All files share one container, so repeating a file (or an idempotency
/// key) shows duplicate detection. A failing file does not stop the rest.
///
/// # Errors
///
/// Returns the first per-file error after every file has been attempted, or
/// an error if the output cannot be written.
pub async fn cmd_ingest(
    container: &ServiceContainer,
    paths: &[PathBuf],
    idempotency_key: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let service = container.ingest_service();
    let mut first_error: Option<Error> = None;

    for path in paths {
        let result = match read_export(path) {
            Ok(raw) => {
                let mut request = IngestRequest::new(raw);
                if let Some(key) = idempotency_key {
                    request = request.with_idempotency_key(key);
                }
                service.ingest(request).await
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => {
                let status = if outcome.duplicate {
                    "duplicate"
                } else {
                    "processed"
                };
                writeln!(
                    out,
                    "{}: {status} ({} messages, {} participants, skipped {} lines) [{}]",
                    path.display(),
                    outcome.chat.messages.len(),
                    outcome.chat.participants.len(),
                    outcome.chat.metadata.skipped_lines,
                    ContentHasher::short(&outcome.content_hash),
                )
                .map_err(write_error)?;
                if let Some(summary) = &outcome.summary {
                    writeln!(out, "  summary: {summary}").map_err(write_error)?;
                }
            },
            Err(e) => {
                writeln!(out, "{}: failed: {e}", path.display()).map_err(write_error)?;
                first_error.get_or_insert(e);
            },
        }
    }

    write_stats(container, out)?;
    first_error.map_or(Ok(()), Err)
}

fn write_stats(container: &ServiceContainer, out: &mut impl Write) -> Result<()> {
    writeln!(out, "\nCircuit breakers:").map_err(write_error)?;
    for stats in container.registry().all_stats() {
        writeln!(
            out,
            "  {}: {} (requests {}, failures {})",
            stats.name, stats.state, stats.total_requests, stats.total_failures
        )
        .map_err(write_error)?;
    }

    let dedup = container.dedup().stats();
    writeln!(
        out,
        "Deduplication: {} content entries, {} idempotency keys",
        dedup.entries, dedup.idempotency_keys
    )
    .map_err(write_error)
}
