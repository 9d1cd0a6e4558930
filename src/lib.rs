//! # gitkv
//!
//! A key-value store backed by the file contents API of a git hosting
//! provider. Every key is one file in a repository directory; the value is the
//! file content.
//!
//! gitkv turns a stateless, versioned file API into a consistent-looking KV
//! interface:
//!
//! - a per-key version token cache so updates and deletes do not need a read
//!   on every call,
//! - a single read-then-retry cycle that recovers from missing or stale tokens,
//! - a read-through cache and optional transparent encryption of key names and
//!   values.
//!
//! ## Example
//!
//! ```rust,ignore
//! use gitkv::{KvStore, StoreConfig};
//!
//! let config = StoreConfig::builder()
//!     .with_host("git@github.com:octocat/kv-data.git")
//!     .with_token(std::env::var("GITKV_TOKEN")?)
//!     .with_namespace("sessions")
//!     .build()?;
//!
//! let store = KvStore::open(config)?;
//! store.set("mykey", "myvalue")?;
//! let record = store.get("mykey")?;
//! assert_eq!(record.content, "myvalue");
//! store.delete("mykey")?;
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
// multiple_crate_versions is inherently crate-level (detects duplicate transitive dependencies).
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

// Module declarations
pub mod cli;
pub mod config;
pub mod git;
pub mod models;
pub mod observability;
pub mod security;
pub mod services;
pub mod storage;

// Re-exports for convenience
pub use config::{CipherSetting, Committer, HttpConfig, StoreConfig, StoreConfigBuilder};
pub use git::Host;
pub use models::{Record, VersionToken};
pub use security::{Cipher, FnCipher, SecretCipher};
pub use services::KvStore;
pub use storage::{GithubQuerier, Querier, QuerierFactory, Transport};

/// Error type for gitkv operations.
///
/// A missing key is never an error: reads resolve it to a [`Record`] with
/// `size == -1`.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `Conflict` | Version token missing or stale, and the single retry also failed |
/// | `Validation` | Provider answered 422 for a reason other than the token |
/// | `RemoteRejected` | Any other non-2xx, non-404 answer |
/// | `Unauthorized` | Provider answered 401 |
/// | `Transport` | Connection-level failure talking to the provider |
/// | `UnsupportedEncoding` | File payload uses an encoding gitkv cannot decode |
/// | `Format` | Connection string matches no recognized form |
/// | `Configuration` | Missing host or token, unknown provider, bad config file |
/// | `Cipher` | Key or value could not be encrypted or decrypted |
/// | `InvalidInput` | Directory where a file was expected, malformed shell line |
/// | `OperationFailed` | Serialization and local I/O failures |
#[derive(Debug, ThisError)]
pub enum Error {
    /// The provider rejected a write or delete because the version token was
    /// missing or stale.
    ///
    /// Handled internally by one read-then-retry cycle; surfaced only when the
    /// retry fails the same way.
    #[error("conflict on key '{key}': {message}")]
    Conflict {
        /// Key (as sent to the provider) that conflicted.
        key: String,
        /// Provider message.
        message: String,
    },

    /// The provider rejected the request payload.
    #[error("validation failed: {message}")]
    Validation {
        /// Provider message.
        message: String,
    },

    /// The provider answered with a non-success status.
    #[error("remote rejected request with status {status}: {message}")]
    RemoteRejected {
        /// HTTP status code.
        status: u16,
        /// Provider message.
        message: String,
    },

    /// The access token was refused.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The transport could not reach the provider.
    #[error("transport failure during '{operation}': {cause}")]
    Transport {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// A file payload used an encoding that cannot be decoded.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// A connection string matched no recognized pattern.
    #[error("unrecognized host: {0}")]
    Format(String),

    /// Required configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Encryption or decryption failed.
    #[error("cipher error: {0}")]
    Cipher(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// An operation failed.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },
}

/// Result type alias for gitkv operations.
pub type Result<T> = std::result::Result<T, Error>;
