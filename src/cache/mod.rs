//! Snapshot caching.
//!
//! `store` holds the persisted blobs, `usage` decides when to rebuild.

pub mod store;
pub mod usage;

pub use store::{FileStore, MemoryStore, SnapshotStore};
pub use usage::{DebugMode, UsageCache};
