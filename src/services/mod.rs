//! Business logic services.
//!
//! Services orchestrate the storage layer and provide high-level operations.

mod kv;

pub use kv::KvStore;
