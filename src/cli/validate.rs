//! Validate CLI command.

use super::{read_export, write_error};
use crate::Result;
use crate::services::is_valid_whatsapp_export;
use std::io::Write;
use std::path::Path;

/// Reports whether `path` looks like a WhatsApp export.
///
/// Returns the verdict so the binary can set its exit code.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the output cannot be written.
pub fn cmd_validate(path: &Path, out: &mut impl Write) -> Result<bool> {
    let raw = read_export(path)?;
    let valid = is_valid_whatsapp_export(&raw);
    let verdict = if valid {
        "looks like a WhatsApp export"
    } else {
        "does not look like a WhatsApp export"
    };
    writeln!(out, "{}: {verdict}", path.display()).map_err(write_error)?;
    Ok(valid)
}
