//! Fingerprint store: the dedup ledger shared by ingestion and analysis
//!
//! A fingerprint is the presence of an id inside a namespace. Analysis uses
//! [`FingerprintStore::add`] as a compare-and-set reservation so that exactly
//! one concurrent worker processes an item; ingestion uses the `author_id`
//! namespace to tombstone accounts that can no longer be fetched.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   add(ns, id) ─► true   ┌──────────────────────┐
//! │ worker A     │ ──────────────────────► │                      │
//! └──────────────┘                         │  FingerprintStore    │
//! ┌──────────────┐   add(ns, id) ─► false  │  (Redis SET NX / Mem)│
//! │ worker B     │ ──────────────────────► │                      │
//! └──────────────┘                         └──────────────────────┘
//! ```

mod redis_store;

pub use redis_store::RedisFingerprintStore;

use crate::utils::error::FingerprintError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::RwLock;

pub type Result<T> = std::result::Result<T, FingerprintError>;

/// Fingerprint namespaces; the string form is the key prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Post reservations (analysis)
    Post,
    /// Comment reservations (analysis)
    Comment,
    /// Author tombstones, keyed by author name
    Author,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post_id",
            Self::Comment => "comment_id",
            Self::Author => "author_id",
        }
    }

    /// Tombstones are permanent; reservations may expire.
    pub fn expires(&self) -> bool {
        !matches!(self, Self::Author)
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Namespace-scoped set membership with atomic insert
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Whether `id` has been recorded in `namespace`
    async fn exists(&self, namespace: Namespace, id: &str) -> Result<bool>;

    /// Record `id`; returns `false` if it was already present
    async fn add(&self, namespace: Namespace, id: &str) -> Result<bool>;

    /// All ids recorded in `namespace`
    async fn list(&self, namespace: Namespace) -> Result<HashSet<String>>;
}

/// In-process fingerprint store
///
/// Used by tests and single-process runs without Redis. Entries never expire.
#[derive(Debug, Default)]
pub struct MemoryFingerprintStore {
    entries: RwLock<HashMap<Namespace, HashSet<String>>>,
}

impl MemoryFingerprintStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FingerprintStore for MemoryFingerprintStore {
    async fn exists(&self, namespace: Namespace, id: &str) -> Result<bool> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(&namespace)
            .is_some_and(|set| set.contains(id)))
    }

    async fn add(&self, namespace: Namespace, id: &str) -> Result<bool> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        Ok(entries.entry(namespace).or_default().insert(id.to_string()))
    }

    async fn list(&self, namespace: Namespace) -> Result<HashSet<String>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries.get(&namespace).cloned().unwrap_or_default())
    }
}
