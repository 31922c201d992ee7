//! Content hashing utility for deduplication.
//!
//! Produces SHA256 digests for content-addressed duplicate detection.
//! Unlike fuzzy matching, no normalization is applied: two uploads collide
//! only when they are byte-identical.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Length of the prefix used when a digest appears in log fields.
const SHORT_HASH_LEN: usize = 16;

/// Content hasher for deduplication.
///
/// # Example
///
/// ```rust
/// use chat_ingest::services::deduplication::ContentHasher;
///
/// let hash = ContentHasher::hash("[08/01/2023, 10:30] John: hello");
/// assert_eq!(hash.len(), 64); // SHA256 produces 64 hex chars
/// assert_eq!(hash, ContentHasher::hash_bytes(b"[08/01/2023, 10:30] John: hello"));
/// ```
pub struct ContentHasher;

impl ContentHasher {
    /// Computes the SHA256 hash of a string.
    ///
    /// # Returns
    ///
    /// The lowercase hex-encoded SHA256 hash (64 characters).
    #[must_use]
    pub fn hash(content: &str) -> String {
        Self::hash_bytes(content.as_bytes())
    }

    /// Computes the SHA256 hash of raw bytes.
    #[must_use]
    pub fn hash_bytes(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Computes the SHA256 hash of a serializable value.
    ///
    /// Values are canonicalized through `serde_json` first, so object keys are
    /// ordered and structurally equal values hash equally. A value that
    /// serializes to a JSON string hashes the same as the raw string.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the value cannot be
    /// represented as JSON (for example a map with non-string keys).
    pub fn hash_value<T: Serialize + ?Sized>(value: &T) -> crate::Result<String> {
        let canonical =
            serde_json::to_value(value).map_err(|e| crate::Error::InvalidInput(e.to_string()))?;
        match canonical {
            serde_json::Value::String(s) => Ok(Self::hash(&s)),
            other => Ok(Self::hash(&other.to_string())),
        }
    }

    /// Returns the leading characters of a digest for log output.
    #[must_use]
    pub fn short(hash: &str) -> &str {
        hash.get(..SHORT_HASH_LEN).unwrap_or(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_hash_produces_64_char_hex() {
        let hash = ContentHasher::hash("test content");
        assert_eq!(hash.len(), 64);
        assert!(
            hash.chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
        );
    }

    #[test]
    fn test_known_digest() {
        assert_eq!(
            ContentHasher::hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_same_content_same_hash() {
        assert_eq!(ContentHasher::hash("abc"), ContentHasher::hash("abc"));
    }

    #[test]
    fn test_different_content_different_hash() {
        assert_ne!(ContentHasher::hash("abc"), ContentHasher::hash("abd"));
        assert_ne!(ContentHasher::hash("abc"), ContentHasher::hash("ABC"));
    }

    #[test]
    fn test_string_value_hashes_like_raw_string() {
        let raw = ContentHasher::hash("hello");
        assert_eq!(ContentHasher::hash_value("hello").unwrap(), raw);
        assert_eq!(ContentHasher::hash_value(&json!("hello")).unwrap(), raw);
    }

    #[test]
    fn test_object_key_order_is_canonical() {
        let mut a = HashMap::new();
        a.insert("b", 2);
        a.insert("a", 1);
        let b = json!({"a": 1, "b": 2});

        assert_eq!(
            ContentHasher::hash_value(&a).unwrap(),
            ContentHasher::hash_value(&b).unwrap()
        );
        assert_eq!(
            ContentHasher::hash_value(&b).unwrap(),
            ContentHasher::hash(r#"{"a":1,"b":2}"#)
        );
    }

    #[test]
    fn test_different_values_different_hash() {
        assert_ne!(
            ContentHasher::hash_value(&json!({"a": 1})).unwrap(),
            ContentHasher::hash_value(&json!({"a": 2})).unwrap()
        );
        assert_ne!(
            ContentHasher::hash_value(&json!({"a": 1})).unwrap(),
            ContentHasher::hash_value(&json!({"b": 1})).unwrap()
        );
        assert_ne!(
            ContentHasher::hash_value(&json!([1, 2])).unwrap(),
            ContentHasher::hash_value(&json!([2, 1])).unwrap()
        );
    }

    #[test]
    fn test_non_string_keys_rejected() {
        let mut map = HashMap::new();
        map.insert((1, 2), "pair");
        assert!(matches!(
            ContentHasher::hash_value(&map),
            Err(crate::Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_short() {
        let hash = ContentHasher::hash("abc");
        assert_eq!(ContentHasher::short(&hash), &hash[..16]);
        assert_eq!(ContentHasher::short("abc"), "abc");
    }
}
