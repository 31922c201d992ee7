//! Hash CLI command.

use super::write_error;
use crate::Result;
use crate::services::ContentHasher;
use std::io::Write;
use std::path::Path;

/// Writes the content hash of `path` in `sha256sum` style.
///
/// Hashes the raw bytes, so files that are not valid UTF-8 still hash.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the output cannot be written.
pub fn cmd_hash(path: &Path, out: &mut impl Write) -> Result<()> {
    let bytes = std::fs::read(path).map_err(|e| crate::Error::OperationFailed {
        operation: "read_export".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    let hash = ContentHasher::hash_bytes(&bytes);
    writeln!(out, "{hash}  {}", path.display()).map_err(write_error)
}
