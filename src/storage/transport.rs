//! HTTP transport for the contents API.

use crate::config::{HttpConfig, StoreConfig};
use crate::storage::traits::{HttpMethod, Transport, TransportRequest, TransportResponse};
use crate::{Error, Result};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// Default API base for `github.com`.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Media type requested from the API.
const ACCEPT: &str = "application/vnd.github+json";

/// Builds a blocking HTTP client with the configured timeouts.
///
/// Falls back to a default client if the builder fails.
#[must_use]
pub fn build_http_client(config: HttpConfig) -> reqwest::blocking::Client {
    let mut builder = reqwest::blocking::Client::builder()
        .user_agent(format!("gitkv/{}", env!("CARGO_PKG_VERSION")));
    if config.timeout_ms > 0 {
        builder = builder.timeout(Duration::from_millis(config.timeout_ms));
    }
    if config.connect_timeout_ms > 0 {
        builder = builder.connect_timeout(Duration::from_millis(config.connect_timeout_ms));
    }

    builder.build().unwrap_or_else(|err| {
        tracing::warn!("Failed to build HTTP client: {err}");
        reqwest::blocking::Client::new()
    })
}

/// Transport that talks to the provider over HTTPS.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    base_url: Url,
    token: SecretString,
}

impl HttpTransport {
    /// Creates a transport from a store configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the API base URL is invalid.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let base = config.api_base_url().unwrap_or(DEFAULT_API_BASE_URL);
        let base_url = Url::parse(base)
            .map_err(|e| Error::Configuration(format!("invalid API base URL '{base}': {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::Configuration(format!(
                "API base URL cannot be a base: {base}"
            )));
        }

        Ok(Self {
            client: build_http_client(config.http()),
            base_url,
            token: config.token().clone(),
        })
    }

    /// Returns the API base URL.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a request path against the base URL.
    ///
    /// Each `/`-separated segment is percent-encoded on its own, so key names
    /// with spaces or `?` stay inside their segment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the base URL cannot take path
    /// segments.
    pub fn url_for(&self, request: &TransportRequest) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                Error::Configuration(format!("API base URL cannot be a base: {}", self.base_url))
            })?;
            segments
                .pop_if_empty()
                .extend(request.path.split('/').filter(|s| !s.is_empty()));
        }
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(&request.query);
        }
        Ok(url)
    }
}

impl Transport for HttpTransport {
    fn invoke(&self, request: &TransportRequest) -> Result<TransportResponse> {
        let url = self.url_for(request)?;
        let operation = format!("{} {}", request.method, request.path);

        let builder = match request.method {
            HttpMethod::Get => self.client.get(url),
            HttpMethod::Put => self.client.put(url),
            HttpMethod::Delete => self.client.delete(url),
        };
        let mut builder = builder
            .header("Accept", ACCEPT)
            .header(
                "Authorization",
                format!("token {}", self.token.expose_secret()),
            );
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().map_err(|e| Error::Transport {
            operation: operation.clone(),
            cause: e.to_string(),
        })?;

        let status = response.status().as_u16();
        let body = response.text().map_err(|e| Error::Transport {
            operation,
            cause: format!("failed to read response body: {e}"),
        })?;

        tracing::debug!(
            category = "github",
            method = %request.method,
            path = %request.path,
            status,
            "Contents API request completed"
        );

        Ok(TransportResponse { status, body })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}
