//! Storage layer.
//!
//! Two layers sit between the store and the provider:
//! - **Querier**: maps key-value operations onto a provider's file API and
//!   owns the version token cache ([`GithubQuerier`])
//! - **Transport**: performs one request per call ([`HttpTransport`], or
//!   [`InMemoryContentsTransport`] for tests and offline use)

// Lock guards are scoped to a single statement; tightening gains nothing.
#![allow(clippy::significant_drop_tightening)]

pub mod factory;
pub mod github;
pub mod memory;
pub mod path;
pub mod traits;
pub mod transport;

pub use factory::{QuerierConstructor, QuerierFactory};
pub use github::GithubQuerier;
pub use memory::InMemoryContentsTransport;
pub use path::{normalize_namespace, validate_key, validate_namespace};
pub use traits::{HttpMethod, Querier, Transport, TransportRequest, TransportResponse};
pub use transport::HttpTransport;
