//! Chat-history sequence differ.
//!
//! Resolves the two cheap streaming cases — pure growth and pure trailing
//! removal — by hash-prefix comparison in O(n) before falling back to an
//! O(n) positional diff, avoiding edit-distance computation for the common
//! patterns.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::{CandidateMessage, ChatHistorySnapshot, ChatMessage};
use crate::utils::first_diff_index;

/// A single positional edit found by the modification fallback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MessageEdit {
    /// Index present only in the new sequence.
    Added { index: usize, message: ChatMessage },
    /// Index present only in the old sequence.
    Removed { index: usize },
    /// Index present in both with differing hashes; carries the new side.
    Modified { index: usize, new: ChatMessage },
}

/// Classification of one chat ingestion cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatChange {
    NoChange {
        message_count: usize,
    },
    /// The old sequence is an exact prefix of the new one.
    Append {
        diff_index: usize,
        new_messages: Vec<ChatMessage>,
        new_messages_count: usize,
    },
    /// The new sequence is an exact prefix of the old one (a suffix was
    /// removed). Removal of the *oldest* messages is not detected here and
    /// falls through to [`ChatChange::Modification`], which still converges
    /// on the correct state; see DESIGN.md.
    Truncation {
        removed_messages_count: usize,
    },
    /// Anything else: a positional diff over both sequences.
    Modification {
        edits: Vec<MessageEdit>,
        message_count: usize,
    },
}

/// Assign identity (role inference, turn numbers, content hashes) to a
/// freshly parsed candidate message list.
pub fn assign_messages(candidates: Vec<CandidateMessage>, session_id: &str) -> Vec<ChatMessage> {
    candidates
        .into_iter()
        .enumerate()
        .map(|(turn, c)| ChatMessage::from_candidate(c, session_id, turn))
        .collect()
}

/// Diff a new message sequence against the previous snapshot.
///
/// Checked in order, first match wins: exact hash equality ⇒ no change;
/// old-is-prefix growth ⇒ append; new-is-prefix shrink ⇒ truncation;
/// anything else ⇒ positional modification diff.
pub fn diff_chat_history(
    old: Option<&ChatHistorySnapshot>,
    new_messages: &[ChatMessage],
) -> ChatChange {
    let old_refs: Vec<&str> = old
        .map(|s| s.message_hashes.iter().map(String::as_str).collect())
        .unwrap_or_default();
    let new_hashes: Vec<&str> = new_messages.iter().map(|m| m.content_hash.as_str()).collect();

    if old_refs == new_hashes {
        return ChatChange::NoChange {
            message_count: new_messages.len(),
        };
    }

    let Some(diff_index) = first_diff_index(&old_refs, &new_hashes) else {
        // The equality check above disagreed with first_diff_index, which
        // indicates a hashing/equality inconsistency. Return the safe
        // answer rather than raising.
        warn!(
            old_len = old_refs.len(),
            new_len = new_hashes.len(),
            "chat differ: diff index disagrees with sequence equality, treating as no change"
        );
        return ChatChange::NoChange {
            message_count: new_messages.len(),
        };
    };

    if new_hashes.len() > old_refs.len() && new_hashes[..old_refs.len()] == old_refs[..] {
        let tail = new_messages[old_refs.len()..].to_vec();
        return ChatChange::Append {
            diff_index,
            new_messages_count: tail.len(),
            new_messages: tail,
        };
    }

    if new_hashes.len() < old_refs.len() && old_refs[..new_hashes.len()] == new_hashes[..] {
        return ChatChange::Truncation {
            removed_messages_count: old_refs.len() - new_hashes.len(),
        };
    }

    let old_messages: &[ChatMessage] = old.map_or(&[], |s| &s.messages);
    ChatChange::Modification {
        edits: positional_diff(old_messages, new_messages),
        message_count: new_messages.len(),
    }
}

/// Walk both sequences by index up to the longer length, recording edits.
fn positional_diff(old: &[ChatMessage], new: &[ChatMessage]) -> Vec<MessageEdit> {
    let mut edits = Vec::new();
    let max_len = old.len().max(new.len());

    for i in 0..max_len {
        match (old.get(i), new.get(i)) {
            (None, Some(msg)) => edits.push(MessageEdit::Added {
                index: i,
                message: msg.clone(),
            }),
            (Some(_), None) => edits.push(MessageEdit::Removed { index: i }),
            (Some(o), Some(n)) if o.content_hash != n.content_hash => {
                edits.push(MessageEdit::Modified {
                    index: i,
                    new: n.clone(),
                })
            }
            _ => {}
        }
    }

    edits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(lines: &[(&str, &str)]) -> Vec<ChatMessage> {
        assign_messages(
            lines
                .iter()
                .map(|(speaker, content)| CandidateMessage {
                    speaker: speaker.to_string(),
                    content: content.to_string(),
                })
                .collect(),
            "s1",
        )
    }

    fn snapshot(lines: &[(&str, &str)], version: u64) -> ChatHistorySnapshot {
        ChatHistorySnapshot::from_messages(messages(lines), version)
    }

    #[test]
    fn test_no_previous_snapshot_is_append_like() {
        let new = messages(&[("User", "hi")]);
        // With no old state the new sequence grows from an empty prefix.
        match diff_chat_history(None, &new) {
            ChatChange::Append {
                diff_index,
                new_messages_count,
                new_messages,
            } => {
                assert_eq!(diff_index, 0);
                assert_eq!(new_messages_count, 1);
                assert_eq!(new_messages.len(), 1);
            }
            other => panic!("expected Append, got {other:?}"),
        }
    }

    #[test]
    fn test_no_change_on_identical_sequences() {
        let old = snapshot(&[("User", "hi"), ("Aru", "hello")], 1);
        let new = messages(&[("User", "hi"), ("Aru", "hello")]);
        assert_eq!(
            diff_chat_history(Some(&old), &new),
            ChatChange::NoChange { message_count: 2 }
        );
    }

    #[test]
    fn test_empty_old_and_new_is_no_change() {
        let old = snapshot(&[], 0);
        assert_eq!(
            diff_chat_history(Some(&old), &[]),
            ChatChange::NoChange { message_count: 0 }
        );
    }

    #[test]
    fn test_append_detected() {
        // old=[h1,h2], new=[h1,h2,h3] ⇒ append of 1.
        let old = snapshot(&[("User", "hi"), ("Aru", "hello")], 1);
        let new = messages(&[("User", "hi"), ("Aru", "hello"), ("User", "bye")]);
        match diff_chat_history(Some(&old), &new) {
            ChatChange::Append {
                diff_index,
                new_messages,
                new_messages_count,
            } => {
                assert_eq!(diff_index, 2);
                assert_eq!(new_messages_count, 1);
                assert_eq!(new_messages[0].content, "bye");
            }
            other => panic!("expected Append, got {other:?}"),
        }
    }

    #[test]
    fn test_truncation_detected() {
        // old=[h1,h2,h3], new=[h1,h2] ⇒ truncation of 1.
        let old = snapshot(&[("User", "hi"), ("Aru", "hello"), ("User", "bye")], 1);
        let new = messages(&[("User", "hi"), ("Aru", "hello")]);
        assert_eq!(
            diff_chat_history(Some(&old), &new),
            ChatChange::Truncation {
                removed_messages_count: 1
            }
        );
    }

    #[test]
    fn test_modification_fallback_flags_changed_index() {
        // old=[h1,h2], new=[h1,h3] ⇒ modification at index 1.
        let old = snapshot(&[("User", "hi"), ("Aru", "hello")], 1);
        let new = messages(&[("User", "hi"), ("Aru", "hello there")]);
        match diff_chat_history(Some(&old), &new) {
            ChatChange::Modification {
                edits,
                message_count,
            } => {
                assert_eq!(message_count, 2);
                assert_eq!(edits.len(), 1);
                match &edits[0] {
                    MessageEdit::Modified { index, new } => {
                        assert_eq!(*index, 1);
                        assert_eq!(new.content, "hello there");
                    }
                    other => panic!("expected Modified, got {other:?}"),
                }
            }
            other => panic!("expected Modification, got {other:?}"),
        }
    }

    #[test]
    fn test_longer_new_with_midstream_change_is_modification() {
        // Growth without prefix equality must not classify as append.
        let old = snapshot(&[("User", "hi"), ("Aru", "hello")], 1);
        let new = messages(&[("User", "hi!"), ("Aru", "hello"), ("User", "bye")]);
        match diff_chat_history(Some(&old), &new) {
            ChatChange::Modification { edits, .. } => {
                assert_eq!(edits.len(), 2);
                assert!(matches!(edits[0], MessageEdit::Modified { index: 0, .. }));
                assert!(matches!(edits[1], MessageEdit::Added { index: 2, .. }));
            }
            other => panic!("expected Modification, got {other:?}"),
        }
    }

    #[test]
    fn test_shorter_new_with_change_is_modification() {
        let old = snapshot(&[("User", "hi"), ("Aru", "hello"), ("User", "bye")], 1);
        let new = messages(&[("User", "hi"), ("Aru", "farewell")]);
        match diff_chat_history(Some(&old), &new) {
            ChatChange::Modification { edits, .. } => {
                assert_eq!(edits.len(), 2);
                assert!(matches!(edits[0], MessageEdit::Modified { index: 1, .. }));
                assert!(matches!(edits[1], MessageEdit::Removed { index: 2 }));
            }
            other => panic!("expected Modification, got {other:?}"),
        }
    }

    #[test]
    fn test_oldest_messages_dropped_falls_through_to_modification() {
        // Prefix removal (context-window limiting) is not the truncation
        // case; it lands in the generic modification path.
        let old = snapshot(&[("User", "one"), ("Aru", "two"), ("User", "three")], 1);
        let new = messages(&[("Aru", "two"), ("User", "three")]);
        assert!(matches!(
            diff_chat_history(Some(&old), &new),
            ChatChange::Modification { .. }
        ));
    }

    #[test]
    fn test_role_inference_feeds_hashes() {
        // "Haruki" and "Aru" both infer Assistant, so identical content
        // produces identical hashes and therefore no change.
        let old = snapshot(&[("Haruki", "Good morning.")], 1);
        let new = messages(&[("Aru", "Good morning.")]);
        assert_eq!(
            diff_chat_history(Some(&old), &new),
            ChatChange::NoChange { message_count: 1 }
        );
    }
}
