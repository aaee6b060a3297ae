//! Typed data model for the diff → dedup → sync pipeline.
//!
//! - [`entry`] — world-info entries, kinds, statuses and snapshots
//! - [`message`] — chat messages, roles and the chat-history snapshot
//! - [`record`] — store-side records with valid-time and supersession fields

pub mod entry;
pub mod message;
pub mod record;

pub use entry::{CandidateEntry, Entry, EntryKind, EntryStatus, WorldInfoSnapshot};
pub use message::{CandidateMessage, ChatHistorySnapshot, ChatMessage, Role};
pub use record::{RecordPatch, StoredRecord};
