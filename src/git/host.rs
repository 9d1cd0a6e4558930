//! Connection string parsing.
//!
//! Two clone link forms are accepted:
//!
//! ```text
//! git@github.com:octocat/kv-data.git
//! https://github.com/octocat/kv-data.git
//! ```

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Accepted clone link forms, tried in order.
///
/// 1. SSH: `user@host:owner/repo.git`
/// 2. HTTPS: `https://host/owner/repo.git`
static HOST_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"^[\w.-]+@([\w.-]+):([\w-]+)/([\w.-]+)\.git$").ok(),
        Regex::new(r"^https://([\w.-]+)/([\w-]+)/([\w.-]+)\.git$").ok(),
    ]
    .into_iter()
    .flatten()
    .collect()
});

/// A parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Host {
    /// Hosting provider, e.g. `github.com`.
    pub provider: String,
    /// Account that owns the repository.
    pub owner: String,
    /// Repository name without the `.git` suffix.
    pub repo: String,
}

impl Host {
    /// Parses an SSH or HTTPS clone link.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Format`] when the string matches neither form.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use gitkv::Host;
    ///
    /// let host = Host::parse("git@github.com:octocat/kv-data.git").unwrap();
    /// assert_eq!(host.provider, "github.com");
    /// assert_eq!(host.owner, "octocat");
    /// assert_eq!(host.repo, "kv-data");
    /// ```
    pub fn parse(connection: &str) -> Result<Self> {
        let connection = connection.trim();
        HOST_PATTERNS
            .iter()
            .find_map(|pattern| pattern.captures(connection))
            .map(|caps| Self {
                provider: caps[1].to_string(),
                owner: caps[2].to_string(),
                repo: caps[3].to_string(),
            })
            .ok_or_else(|| Error::Format(connection.to_string()))
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.provider, self.owner, self.repo)
    }
}
