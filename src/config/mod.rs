//! Configuration management.
//!
//! [`StoreConfig`] is one immutable value built once by
//! [`StoreConfigBuilder`] and passed explicitly to the querier and the store.
//! Validation is eager: a missing host or token fails at `build()`, before any
//! request is made.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults (`default` namespace, `master` branch)
//! 2. Config file (`~/.config/gitkv/config.toml`, see [`ConfigFile`])
//! 3. Environment (`GITKV_HOST`, `GITKV_TOKEN`, `GITKV_DB`, `GITKV_BRANCH`,
//!    `GITKV_SECRET`, `GITKV_DEBUG`)
//! 4. Explicit builder calls (CLI flags)

mod file;

pub use file::{ConfigFile, ConfigFileCommitter, ConfigFileHttp, ConfigFileLogging};

use crate::git::Host;
use crate::security::Cipher;
use crate::storage::validate_namespace;
use crate::{Error, Result};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Branch used when none is configured.
pub const DEFAULT_BRANCH: &str = "master";

/// Identity recorded on every commit the store makes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Committer {
    /// Committer name.
    pub name: String,
    /// Committer email.
    pub email: String,
}

impl Default for Committer {
    fn default() -> Self {
        Self {
            name: "gitkv".to_string(),
            email: "gitkv@users.noreply.github.com".to_string(),
        }
    }
}

/// HTTP client configuration for the contents API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    /// Request timeout in milliseconds (0 to disable).
    pub timeout_ms: u64,
    /// Connect timeout in milliseconds (0 to disable).
    pub connect_timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            connect_timeout_ms: 3_000,
        }
    }
}

impl HttpConfig {
    /// Loads HTTP configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Applies `GITKV_HTTP_TIMEOUT_MS` and `GITKV_HTTP_CONNECT_TIMEOUT_MS`.
    ///
    /// Unparseable values are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(timeout_ms) = lookup("GITKV_HTTP_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            self.timeout_ms = timeout_ms;
        }
        if let Some(connect_timeout_ms) =
            lookup("GITKV_HTTP_CONNECT_TIMEOUT_MS").and_then(|v| v.parse().ok())
        {
            self.connect_timeout_ms = connect_timeout_ms;
        }
        self
    }
}

/// How keys and values are encrypted.
#[derive(Clone)]
pub enum CipherSetting {
    /// Use the default cipher keyed by this secret.
    Secret(SecretString),
    /// Use a caller-supplied encode/decode pair.
    Custom(Arc<dyn Cipher>),
}

impl fmt::Debug for CipherSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("Secret([REDACTED])"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Validated store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    host: String,
    parsed_host: Host,
    token: SecretString,
    namespace: String,
    branch: String,
    cipher: Option<CipherSetting>,
    debug: bool,
    committer: Committer,
    cache_enabled: bool,
    api_base_url: Option<String>,
    http: HttpConfig,
}

impl StoreConfig {
    /// Starts building a configuration.
    #[must_use]
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Returns a builder seeded with this configuration.
    ///
    /// Used to derive a changed configuration without mutating this one.
    #[must_use]
    pub fn to_builder(&self) -> StoreConfigBuilder {
        StoreConfigBuilder {
            host: Some(self.host.clone()),
            token: Some(self.token.clone()),
            namespace: Some(self.namespace.clone()),
            branch: Some(self.branch.clone()),
            cipher: self.cipher.clone(),
            debug: self.debug,
            committer: Some(self.committer.clone()),
            cache_enabled: self.cache_enabled,
            api_base_url: self.api_base_url.clone(),
            http: self.http,
        }
    }

    /// The connection string as given.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The parsed connection string.
    #[must_use]
    pub const fn parsed_host(&self) -> &Host {
        &self.parsed_host
    }

    /// The access token.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }

    /// The initial namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The branch commits go to.
    #[must_use]
    pub fn branch(&self) -> &str {
        &self.branch
    }

    /// The cipher setting, if encryption is configured.
    #[must_use]
    pub const fn cipher(&self) -> Option<&CipherSetting> {
        self.cipher.as_ref()
    }

    /// Whether debug logging was requested.
    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    /// The committer identity.
    #[must_use]
    pub const fn committer(&self) -> &Committer {
        &self.committer
    }

    /// Whether the read and listing caches are used.
    #[must_use]
    pub const fn cache_enabled(&self) -> bool {
        self.cache_enabled
    }

    /// API base URL override.
    #[must_use]
    pub fn api_base_url(&self) -> Option<&str> {
        self.api_base_url.as_deref()
    }

    /// HTTP client settings.
    #[must_use]
    pub const fn http(&self) -> HttpConfig {
        self.http
    }
}

/// Builder for [`StoreConfig`].
#[derive(Debug, Clone)]
pub struct StoreConfigBuilder {
    host: Option<String>,
    token: Option<SecretString>,
    namespace: Option<String>,
    branch: Option<String>,
    cipher: Option<CipherSetting>,
    debug: bool,
    committer: Option<Committer>,
    cache_enabled: bool,
    api_base_url: Option<String>,
    http: HttpConfig,
}

impl Default for StoreConfigBuilder {
    fn default() -> Self {
        Self {
            host: None,
            token: None,
            namespace: None,
            branch: None,
            cipher: None,
            debug: false,
            committer: None,
            cache_enabled: true,
            api_base_url: None,
            http: HttpConfig::default(),
        }
    }
}

impl StoreConfigBuilder {
    /// Seeds a builder from a parsed config file.
    #[must_use]
    pub fn from_config_file(file: ConfigFile) -> Self {
        let mut builder = Self::default();

        if let Some(host) = file.host {
            builder = builder.with_host(host);
        }
        if let Some(token) = file.token {
            builder = builder.with_token(token);
        }
        if let Some(db) = file.db {
            builder = builder.with_namespace(db);
        }
        if let Some(branch) = file.branch {
            builder = builder.with_branch(branch);
        }
        if let Some(secret) = file.secret {
            builder = builder.with_secret(secret);
        }
        if let Some(debug) = file.debug {
            builder.debug = debug;
        }
        if let Some(cache) = file.cache {
            builder.cache_enabled = cache;
        }
        if let Some(url) = file.api_base_url {
            builder.api_base_url = Some(url);
        }
        if let Some(committer) = file.committer {
            let default = Committer::default();
            builder.committer = Some(Committer {
                name: committer.name.unwrap_or(default.name),
                email: committer.email.unwrap_or(default.email),
            });
        }
        if let Some(http) = file.http {
            if let Some(timeout_ms) = http.timeout_ms {
                builder.http.timeout_ms = timeout_ms;
            }
            if let Some(connect_timeout_ms) = http.connect_timeout_ms {
                builder.http.connect_timeout_ms = connect_timeout_ms;
            }
        }

        builder
    }

    /// Applies `GITKV_*` environment variables.
    #[must_use]
    pub fn with_env(self) -> Self {
        self.with_env_lookup(|key| std::env::var(key).ok())
    }

    /// Applies `GITKV_*` variables resolved through `lookup`.
    #[must_use]
    pub fn with_env_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("GITKV_HOST") {
            self = self.with_host(host);
        }
        if let Some(token) = lookup("GITKV_TOKEN") {
            self = self.with_token(token);
        }
        if let Some(db) = lookup("GITKV_DB") {
            self = self.with_namespace(db);
        }
        if let Some(branch) = lookup("GITKV_BRANCH") {
            self = self.with_branch(branch);
        }
        if let Some(secret) = lookup("GITKV_SECRET") {
            self = self.with_secret(secret);
        }
        if let Some(debug) = lookup("GITKV_DEBUG") {
            self.debug = matches!(debug.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        self.http = self.http.with_env_overrides(&lookup);
        self
    }

    /// Sets the connection string.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the access token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(SecretString::from(token.into()));
        self
    }

    /// Sets the namespace (repository subdirectory).
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Sets the branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = Some(branch.into());
        self
    }

    /// Enables the default cipher keyed by `secret`.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.cipher = Some(CipherSetting::Secret(SecretString::from(secret.into())));
        self
    }

    /// Uses a caller-supplied cipher.
    #[must_use]
    pub fn with_cipher(mut self, cipher: Arc<dyn Cipher>) -> Self {
        self.cipher = Some(CipherSetting::Custom(cipher));
        self
    }

    /// Disables encryption.
    #[must_use]
    pub fn without_cipher(mut self) -> Self {
        self.cipher = None;
        self
    }

    /// Enables or disables debug logging.
    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the committer identity.
    #[must_use]
    pub fn with_committer(mut self, committer: Committer) -> Self {
        self.committer = Some(committer);
        self
    }

    /// Enables or disables the read and listing caches.
    #[must_use]
    pub const fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = enabled;
        self
    }

    /// Overrides the API base URL (e.g. for an enterprise installation).
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Sets HTTP client timeouts.
    #[must_use]
    pub const fn with_http_config(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    /// Returns true once both a host and a token have been supplied.
    #[must_use]
    pub const fn has_connection(&self) -> bool {
        self.host.is_some() && self.token.is_some()
    }

    /// Validates and freezes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the host or token is missing, the
    /// secret is empty or the namespace has a `.`, `..` or empty segment.
    /// Returns [`Error::Format`] if the host is not a recognized clone link.
    pub fn build(self) -> Result<StoreConfig> {
        let host = self
            .host
            .filter(|h| !h.trim().is_empty())
            .ok_or_else(|| Error::Configuration("host is unset".to_string()))?;

        let token = self
            .token
            .filter(|t| !t.expose_secret().trim().is_empty())
            .ok_or_else(|| {
                Error::Configuration(
                    "token is unset; create a personal access token with repository \
                     contents permission"
                        .to_string(),
                )
            })?;

        if let Some(CipherSetting::Secret(secret)) = &self.cipher {
            if secret.expose_secret().is_empty() {
                return Err(Error::Configuration("cipher secret is empty".to_string()));
            }
        }

        let namespace = match self.namespace {
            Some(namespace) => validate_namespace(&namespace).map_err(|e| match e {
                Error::InvalidInput(message) => Error::Configuration(message),
                other => other,
            })?,
            None => DEFAULT_NAMESPACE.to_string(),
        };

        let parsed_host = Host::parse(&host)?;

        Ok(StoreConfig {
            host,
            parsed_host,
            token,
            namespace,
            branch: self.branch.unwrap_or_else(|| DEFAULT_BRANCH.to_string()),
            cipher: self.cipher,
            debug: self.debug,
            committer: self.committer.unwrap_or_default(),
            cache_enabled: self.cache_enabled,
            api_base_url: self.api_base_url,
            http: self.http,
        })
    }
}
