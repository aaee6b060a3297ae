//! Chat messages and the per-session chat-history snapshot.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::utils::normalize_content;

/// Speaker role in a role-play transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }

    /// Infer a role from a raw speaker label.
    ///
    /// `"user"` (case-insensitive) maps to [`Role::User`]; `"assistant"` and
    /// `"ai"` map to [`Role::Assistant`]; any other label — a character name
    /// the model speaks as — defaults to [`Role::Assistant`].
    pub fn infer(speaker: &str) -> Self {
        let lowered = speaker.to_lowercase();
        match lowered.as_str() {
            "user" => Role::User,
            "assistant" | "ai" => Role::Assistant,
            _ => Role::Assistant,
        }
    }
}

/// A parser-supplied message: raw speaker label plus content, before role
/// inference and hash assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateMessage {
    pub speaker: String,
    pub content: String,
}

/// A chat message with derived identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// `msg_<session>_<turn>`.
    pub message_id: String,
    pub role: Role,
    pub content: String,
    /// MD5 over `"<role>:<normalized content>"`, so the same line spoken in
    /// a different role hashes differently.
    pub content_hash: String,
    pub turn_number: usize,
    pub session_id: String,
    /// Raw speaker label before role inference (e.g. a character name).
    pub speaker_mapping: Option<String>,
}

impl ChatMessage {
    /// Build a message from a parsed candidate, inferring the role and
    /// computing the content hash.
    pub fn from_candidate(candidate: CandidateMessage, session_id: &str, turn: usize) -> Self {
        let role = Role::infer(&candidate.speaker);
        let content_hash = message_hash(role, &candidate.content);

        ChatMessage {
            message_id: format!("msg_{session_id}_{turn}"),
            role,
            content: candidate.content,
            content_hash,
            turn_number: turn,
            session_id: session_id.to_string(),
            speaker_mapping: Some(candidate.speaker),
        }
    }
}

/// MD5 fingerprint over `role:content` with the content normalized.
pub fn message_hash(role: Role, content: &str) -> String {
    let mut h = Md5::new();
    h.update(role.as_str().as_bytes());
    h.update(b":");
    h.update(normalize_content(content).as_bytes());
    format!("{:x}", h.finalize())
}

/// The chat-history view for one session.
///
/// Invariant: `message_hashes[i] == messages[i].content_hash` for all `i`.
/// Messages are appended, truncated, or wholesale rebuilt per cycle, never
/// mutated individually.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatHistorySnapshot {
    pub messages: Vec<ChatMessage>,
    pub message_hashes: Vec<String>,
    /// Bumped on every non-no-change cycle.
    pub version: u64,
}

impl ChatHistorySnapshot {
    /// Build a snapshot from a message list, deriving the parallel hash list.
    pub fn from_messages(messages: Vec<ChatMessage>, version: u64) -> Self {
        let message_hashes = messages.iter().map(|m| m.content_hash.clone()).collect();
        ChatHistorySnapshot {
            messages,
            message_hashes,
            version,
        }
    }
}
