//! SQLite-backed render cache.
//!
//! Persistent store for rendered screenshots and archived payloads, using
//! SQLite with async access via tokio-rusqlite. It supports:
//!
//! - Opaque keys (PWID URNs or SHA-256 composite keys)
//! - Per-entry time-to-live with lazy expiry
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Purge by expiry, LRU or everything

pub mod connection;
pub mod entries;
pub mod hash;
pub mod migrations;

pub use crate::Error;

pub use connection::CacheDb;
pub use entries::{CacheEntry, PurgePlan, PurgeReport};
pub use hash::composite_key;
