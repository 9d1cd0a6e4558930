//! Key records and version tokens.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Size reported for a key that does not exist.
pub const MISSING_SIZE: i64 = -1;

/// Opaque revision marker for one key's file.
///
/// The provider requires the current token before it accepts an update or a
/// delete. Tokens are never guessed; they come from a prior read, listing or
/// write response.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionToken(String);

impl VersionToken {
    /// Creates a new version token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for VersionToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for VersionToken {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One key's value plus provider metadata.
///
/// `size == -1` if and only if the key is absent. A present key with an empty
/// value has `size == 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Key name as stored by the provider (decrypted by the store when a
    /// cipher is configured).
    pub name: String,
    /// Value payload.
    pub content: String,
    /// Byte length of the content, or `-1` when the key does not exist.
    pub size: i64,
    /// Raw download locator.
    pub raw_url: String,
    /// Browser locator.
    pub html_url: String,
    /// Commit that produced or removed this record, if any.
    pub commit: String,
}

impl Record {
    /// Record describing a key that does not exist.
    #[must_use]
    pub fn missing() -> Self {
        Self {
            name: String::new(),
            content: String::new(),
            size: MISSING_SIZE,
            raw_url: String::new(),
            html_url: String::new(),
            commit: String::new(),
        }
    }

    /// Result of a delete: the key is gone, only the commit is reported.
    ///
    /// An empty commit means nothing was deleted because the key was already
    /// absent.
    #[must_use]
    pub fn removed(commit: impl Into<String>) -> Self {
        Self {
            commit: commit.into(),
            ..Self::missing()
        }
    }

    /// Returns true if the key exists.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.size != MISSING_SIZE
    }

    /// Replaces the content and recomputes the size from it.
    pub fn set_content(&mut self, content: String) {
        self.size = i64::try_from(content.len()).unwrap_or(i64::MAX);
        self.content = content;
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::missing()
    }
}
