//! Core types and shared functionality for memento.
//!
//! This crate provides:
//! - The capture data model and timestamp handling
//! - The PWID codec
//! - Render cache with SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod capture;
pub mod config;
pub mod error;
pub mod pwid;
pub mod timestamp;

pub use cache::{CacheDb, CacheEntry, PurgePlan, PurgeReport};
pub use capture::{Capture, CaptureQueryKey, Captures, StorageLocator};
pub use config::AppConfig;
pub use error::Error;
pub use pwid::{Pwid, PwidLayout};
pub use timestamp::Timestamp;
