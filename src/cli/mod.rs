//! CLI command implementations.
//!
//! Each command writes its report to a caller-supplied writer so the binary
//! can print to stdout and tests can capture output.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `parse` | Parse an export and print it as JSON |
//! | `validate` | Report whether a file looks like a WhatsApp export |
//! | `ingest` | Run files through the dedup/parse/summarize pipeline |
//! | `hash` | Print the content hash used for deduplication |
//!
//! # Example Usage
//!
//! ```bash
//! chat-ingest parse --pretty "WhatsApp Chat with Jane.txt"
//! chat-ingest ingest chat.txt chat.txt --idempotency-key upload-42
//! ```

mod hash;
mod ingest;
mod parse;
mod validate;

pub use hash::cmd_hash;
pub use ingest::cmd_ingest;
pub use parse::cmd_parse;
pub use validate::cmd_validate;

use crate::observability::current_request_id;
use crate::{Error, Result};
use std::path::Path;

/// Reads an export file as UTF-8 text.
fn read_export(path: &Path) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_export".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    tracing::debug!(
        request_id = current_request_id().as_deref(),
        path = %path.display(),
        bytes = raw.len(),
        "Read export file"
    );
    Ok(raw)
}

#[allow(clippy::needless_pass_by_value)]
fn write_error(e: std::io::Error) -> Error {
    Error::OperationFailed {
        operation: "write_output".to_string(),
        cause: e.to_string(),
    }
}
