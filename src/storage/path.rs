//! Remote path checks for namespaces and keys.
//!
//! Namespaces and keys become segments of a contents API path. A `.`, `..`
//! or empty segment would either be collapsed by URL normalization or name
//! the namespace directory itself, so the request would reach a different
//! file than the caller asked for. Both are checked here before any request
//! is built.

use crate::{Error, Result};

/// Strips surrounding whitespace and slashes so `"/a/b/"` and `"a/b"` name
/// the same directory.
#[must_use]
pub fn normalize_namespace(namespace: &str) -> String {
    namespace.trim().trim_matches('/').to_string()
}

/// Normalizes a namespace and rejects `.`, `..` and empty inner segments.
///
/// An empty namespace is the repository root and is accepted.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] naming the offending segment.
pub fn validate_namespace(namespace: &str) -> Result<String> {
    let normalized = normalize_namespace(namespace);
    if !normalized.is_empty() {
        check_segments("namespace", &normalized)?;
    }
    Ok(normalized)
}

/// Rejects empty keys and keys with `.`, `..` or empty segments.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] naming the offending segment.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidInput("key may not be empty".to_string()));
    }
    check_segments("key", key)
}

fn check_segments(kind: &str, path: &str) -> Result<()> {
    for segment in path.split('/') {
        match segment {
            "" => {
                return Err(Error::InvalidInput(format!(
                    "{kind} '{path}' has an empty path segment"
                )));
            },
            "." | ".." => {
                return Err(Error::InvalidInput(format!(
                    "{kind} '{path}' may not contain a '{segment}' segment"
                )));
            },
            _ => {},
        }
    }
    Ok(())
}
