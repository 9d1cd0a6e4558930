//! Storage backend traits.

mod querier;
mod transport;

pub use querier::Querier;
pub use transport::{HttpMethod, Transport, TransportRequest, TransportResponse};
