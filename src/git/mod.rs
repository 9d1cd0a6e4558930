//! Git hosting helpers.
//!
//! Parses clone links into the provider, owner and repository they point at.

mod host;

pub use host::Host;
