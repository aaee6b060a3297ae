//! Shared utilities.
//!
//! Includes:
//! - Text normalization (name and content canonicalization)
//! - Identity and content-hash derivation (MD5 change-detection fingerprints)
//! - Character-set Jaccard similarity and hash-sequence helpers

pub mod hash;
pub mod text;

pub use hash::{
    content_hash, content_hashes, entry_id, first_diff_index, structural_fingerprint,
    text_similarity, ContentHashes,
};
pub use text::{normalize_content, normalize_name};
