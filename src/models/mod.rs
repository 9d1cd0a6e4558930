//! Data models for gitkv.
//!
//! Records are the unit of storage: one file in the backing repository is
//! one record.

mod record;

pub use record::{Record, VersionToken};
