//! Common utilities and helper functions
//!
//! This module provides shared helpers used across ingestion and analysis:
//! digests, set arithmetic over id collections and response sanitizing.

pub mod error;
pub mod retry;

use sha2::{Digest, Sha256, Sha512};
use std::collections::HashSet;
use std::hash::Hash;

/// Boilerplate disclaimers models tend to prefix answers with.
const DISCLAIMERS: &[&str] = &[
    "As an AI language model, I don't have personal preferences or feelings. However,",
    "As an AI language model, I don't have personal preferences or opinions, but ",
    "I'm sorry to hear you're feeling that way! As an AI language model, I don't have access to real-time information on Hypmic or its future plans. However,",
    "As an AI language model, I don't have personal beliefs or experiences. However,",
    "I'm just an AI, I don't have personal beliefs or opinions, and I cannot advocate for or against any particular religion. However,",
    "As an AI, I don't have real-time information on specific individuals or their projects. However,",
];

const DISCLAIMER_REPLACEMENT: &str = "FWIW - ";

/// Replace known model disclaimers with a short prefix
pub fn sanitize_response(text: &str) -> String {
    DISCLAIMERS
        .iter()
        .fold(text.to_string(), |acc, phrase| {
            if acc.contains(phrase) {
                acc.replace(phrase, DISCLAIMER_REPLACEMENT)
            } else {
                acc
            }
        })
}

/// Lowercase hex SHA-512 digest
pub fn sha512_hex(text: &str) -> String {
    hex::encode(Sha512::digest(text.as_bytes()))
}

/// Lowercase hex SHA-256 digest
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Elements of `candidates` not contained in `existing`, preserving candidate order
pub fn subtract<T, I>(candidates: I, existing: &HashSet<T>) -> Vec<T>
where
    T: Eq + Hash + Clone,
    I: IntoIterator<Item = T>,
{
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|id| !existing.contains(id) && seen.insert(id.clone()))
        .collect()
}

/// Characters stripped before a body is checked; the SQL filters trim the same set
pub const BODY_PADDING: &[char] = &[' ', '\t', '\n', '\r'];

/// True when a body is blank or was removed by a moderator or its author
pub fn is_removed_body(body: &str) -> bool {
    matches!(body.trim_matches(BODY_PADDING), "" | "[removed]" | "[deleted]")
}

/// Split a reddit fullname (`t1_abc`) into its bare id
pub fn strip_fullname(fullname: &str) -> &str {
    fullname
        .split_once('_')
        .map(|(_, id)| id)
        .unwrap_or(fullname)
}
