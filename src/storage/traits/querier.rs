//! Remote store adapter trait.

use crate::Result;
use crate::models::{Record, VersionToken};

/// Trait for provider adapters.
///
/// A querier maps key-value operations onto one provider's file API for a
/// single repository and branch. It owns the version token cache and the
/// conflict recovery protocol. Keys and values arrive already encrypted; a
/// querier never sees plaintext when a cipher is configured.
///
/// All methods take `&self`; implementations synchronize their own state.
pub trait Querier: Send + Sync {
    /// Provider tag this querier talks to, e.g. `github.com`.
    fn provider(&self) -> &str;

    /// Returns the current namespace.
    fn namespace(&self) -> String;

    /// Switches the namespace and clears the token cache. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidInput`] if the namespace has a `.`,
    /// `..` or empty segment; the current namespace is kept.
    fn select_namespace(&self, namespace: &str) -> Result<()>;

    /// Lists the plain files in the current namespace.
    ///
    /// Entries carry no content. A missing namespace lists as empty.
    fn list(&self) -> Result<Vec<Record>>;

    /// Reads one key. A missing key yields [`Record::missing`].
    fn read(&self, key: &str) -> Result<Record>;

    /// Creates or updates one key.
    fn write(&self, key: &str, value: &str) -> Result<Record>;

    /// Deletes one key. Deleting a missing key succeeds with an empty commit.
    fn remove(&self, key: &str) -> Result<Record>;

    /// Returns the cached version token for a key, if any.
    fn cached_token(&self, key: &str) -> Option<VersionToken>;
}
