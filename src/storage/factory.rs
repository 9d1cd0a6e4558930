//! Querier factory.
//!
//! Maps a provider tag, as parsed from the connection string, to the adapter
//! that speaks that provider's API.
//!
//! ```text
//! QuerierFactory
//!   ├── "github.com" → GithubQuerier
//!   └── register(tag, constructor) for anything else
//! ```

use crate::config::StoreConfig;
use crate::storage::github::{self, GithubQuerier};
use crate::storage::traits::{Querier, Transport};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Builds a querier for one provider.
pub type QuerierConstructor = fn(&StoreConfig, Arc<dyn Transport>) -> Arc<dyn Querier>;

/// Registry of provider adapters.
#[derive(Clone)]
pub struct QuerierFactory {
    constructors: BTreeMap<String, QuerierConstructor>,
}

impl Default for QuerierFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register(github::PROVIDER, |config, transport| {
            Arc::new(GithubQuerier::new(config, transport))
        });
        factory
    }
}

impl QuerierFactory {
    /// Creates a factory with the built-in providers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a factory with no providers.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            constructors: BTreeMap::new(),
        }
    }

    /// Registers or replaces a provider.
    pub fn register(&mut self, provider: impl Into<String>, constructor: QuerierConstructor) {
        self.constructors.insert(provider.into(), constructor);
    }

    /// Registered provider tags, sorted.
    #[must_use]
    pub fn providers(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Creates the querier for the provider named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no adapter is registered for the
    /// provider.
    pub fn create(
        &self,
        config: &StoreConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Arc<dyn Querier>> {
        let provider = &config.parsed_host().provider;
        let constructor = self.constructors.get(provider).ok_or_else(|| {
            Error::Configuration(format!(
                "unsupported provider '{provider}' (supported: {})",
                self.providers().join(", ")
            ))
        })?;

        tracing::debug!(category = "github", provider = %provider, "Creating querier");
        Ok(constructor(config, transport))
    }
}

impl std::fmt::Debug for QuerierFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuerierFactory")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::InMemoryContentsTransport;

    fn config(host: &str) -> StoreConfig {
        StoreConfig::builder()
            .with_host(host)
            .with_token("ghp_test")
            .build()
            .unwrap()
    }

    #[test]
    fn test_github_is_registered() {
        let factory = QuerierFactory::new();
        assert_eq!(factory.providers(), vec!["github.com"]);

        let querier = factory
            .create(
                &config("https://github.com/octocat/kv-data.git"),
                Arc::new(InMemoryContentsTransport::new()),
            )
            .unwrap();
        assert_eq!(querier.provider(), "github.com");
        assert_eq!(querier.namespace(), "default");
    }

    #[test]
    fn test_unknown_provider_is_configuration_error() {
        let factory = QuerierFactory::new();
        let result = factory.create(
            &config("git@gitlab.com:octocat/kv-data.git"),
            Arc::new(InMemoryContentsTransport::new()),
        );

        assert!(matches!(
            result,
            Err(Error::Configuration(msg)) if msg.contains("gitlab.com")
        ));
    }

    #[test]
    fn test_register_additional_provider() {
        let mut factory = QuerierFactory::empty();
        factory.register("git.example.com", |config, transport| {
            Arc::new(GithubQuerier::new(config, transport))
        });

        assert!(
            factory
                .create(
                    &config("git@git.example.com:team/store.git"),
                    Arc::new(InMemoryContentsTransport::new()),
                )
                .is_ok()
        );
        assert!(
            factory
                .create(
                    &config("git@github.com:team/store.git"),
                    Arc::new(InMemoryContentsTransport::new()),
                )
                .is_err()
        );
    }
}
