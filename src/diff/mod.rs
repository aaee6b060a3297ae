//! Snapshot differs.
//!
//! Pure, side-effect-free classification of a fresh parse against the prior
//! per-session snapshot:
//! - [`world_info`] — added / removed / modified / unchanged entries
//! - [`chat`] — no-change / append / truncation / modification sequences

pub mod chat;
pub mod world_info;

pub use chat::{assign_messages, diff_chat_history, ChatChange, MessageEdit};
pub use world_info::{
    diff_world_info, ChangeKind, ChangeSet, EntryDifference, FieldDiff, PropertyChange,
};
