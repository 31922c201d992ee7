//! Parse CLI command.

use super::{read_export, write_error};
use crate::Result;
use crate::services::parse_chat_export;
use std::io::Write;
use std::path::Path;

/// Parses `path` and writes the structured chat as JSON.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the output cannot be written.
pub fn cmd_parse(path: &Path, pretty: bool, out: &mut impl Write) -> Result<()> {
    let raw = read_export(path)?;
    let data = parse_chat_export(&raw)?;

    let json = if pretty {
        serde_json::to_string_pretty(&data)
    } else {
        serde_json::to_string(&data)
    }
    .map_err(|e| crate::Error::OperationFailed {
        operation: "serialize_chat".to_string(),
        cause: e.to_string(),
    })?;

    writeln!(out, "{json}").map_err(write_error)
}
