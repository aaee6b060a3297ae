//! # loresync
//!
//! Change detection, deduplication, and versioned synchronization for
//! repeatedly re-sent role-play session text (a "world info" sheet plus a
//! chat transcript).
//!
//! ## Architecture
//!
//! - **Content-hash diffing**: each ingestion cycle classifies the fresh
//!   parse against the prior per-session snapshot — added / removed /
//!   modified entries, append / truncation / modification chat sequences
//! - **Three-tier deduplication**: shingle fingerprints, weighted feature
//!   comparison, then an external semantic judge for the ambiguous remainder
//! - **Bitemporal store**: records carry a valid-time interval and are
//!   superseded or closed, never deleted
//! - **Optimistic concurrency**: snapshot commits compare-and-swap on a
//!   per-session version counter

pub mod errors;
pub mod models;
pub mod types;

pub mod dedup;
pub mod diff;
pub mod judge;

pub mod snapshots;
pub mod store;
pub mod sync;

pub mod utils;

pub use errors::{JudgeError, Result, SyncError};
pub use sync::StateSynchronizer;
pub use types::{DedupConfig, SyncConfig};
