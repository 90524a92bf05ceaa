//! Persistence layer for ingested items and analysis documents
//!
//! The relational store is the source of truth. Writes are idempotent
//! (`ON CONFLICT DO NOTHING` on each table's natural key) and there is no
//! general update path; the only mutation is the best-effort vote refresh.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │           IngestEngine / AnalysisEngine                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  &dyn Record, Table, ItemKind
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Store trait                            │
//! │  insert · existing_ids · new_ids · unanalyzed_ids · loads   │
//! └─────────────────────────────────────────────────────────────┘
//!                 │                               │
//!                 ▼                               ▼
//!      ┌─────────────────────┐         ┌─────────────────────┐
//!      │ PgStore (deadpool)  │         │ SqliteStore (Mutex) │
//!      │ JSONB documents     │         │ json_extract        │
//!      └─────────────────────┘         └─────────────────────┘
//! ```

pub mod postgres;
pub mod records;
pub mod sqlite;
mod value;

pub use postgres::PgStore;
pub use records::{
    AnalysisDocument, AnalysisRecord, AuthorRecord, CommentRecord, CommentTreeRecord,
    ErrorRecord, PostRecord, PromptCompletionRecord, ServiceLogRecord, SubscriptionRecord,
};
pub use sqlite::SqliteStore;
pub use value::SqlValue;

use crate::fingerprint::Namespace;
use crate::utils::error::StoreError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt;

pub type Result<T> = std::result::Result<T, StoreError>;

// ============================================================================
// Schema catalogue
// ============================================================================

/// Tables owned by the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Posts,
    Comments,
    Authors,
    AnalysisDocuments,
    PromptCompletionDetails,
    ParentChildTree,
    Subscription,
    Errors,
    ServiceLogs,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Posts => "posts",
            Self::Comments => "comments",
            Self::Authors => "authors",
            Self::AnalysisDocuments => "analysis_documents",
            Self::PromptCompletionDetails => "prompt_completion_details",
            Self::ParentChildTree => "parent_child_tree_data",
            Self::Subscription => "subscription",
            Self::Errors => "errors",
            Self::ServiceLogs => "service_logs",
        }
    }

    /// Columns that may be named in id queries
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::Posts => &["post_id", "post_author", "subreddit"],
            Self::Comments => &["comment_id", "comment_author", "post_id", "subreddit"],
            Self::Authors => &["author_id", "author_name"],
            Self::AnalysisDocuments => &["shasum_512"],
            Self::PromptCompletionDetails => &["doc_shasum_512"],
            Self::ParentChildTree => &["post_id", "shasum256"],
            Self::Subscription => &["subreddit"],
            Self::Errors => &["item_id"],
            Self::ServiceLogs => &[],
        }
    }

    pub(crate) fn checked_column<'a>(&self, column: &'a str) -> Result<&'a str> {
        if self.columns().contains(&column) {
            Ok(column)
        } else {
            Err(StoreError::UnknownColumn {
                table: self.as_str().to_string(),
                column: column.to_string(),
            })
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of analyzable item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Post,
    Comment,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }

    /// Fingerprint namespace holding analysis reservations for this kind
    pub fn namespace(&self) -> Namespace {
        match self {
            Self::Post => Namespace::Post,
            Self::Comment => Namespace::Comment,
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed row destined for one table
pub trait Record: Send + Sync {
    fn table(&self) -> Table;

    /// Column/value pairs in insert order
    fn values(&self) -> Vec<(&'static str, SqlValue)>;
}

pub(crate) fn insert_sql(
    record: &dyn Record,
    placeholder: impl Fn(usize) -> String,
) -> (String, Vec<SqlValue>) {
    let values = record.values();
    let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
    let placeholders: Vec<String> = (1..=values.len()).map(placeholder).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT DO NOTHING",
        record.table(),
        columns.join(", "),
        placeholders.join(", ")
    );
    (sql, values.into_iter().map(|(_, v)| v).collect())
}

// ============================================================================
// Store trait
// ============================================================================

/// Relational store contract shared by the Postgres and SQLite backends
#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a record; `Ok(false)` when the natural key already exists
    async fn insert(&self, record: &dyn Record) -> Result<bool>;

    /// Distinct values of `column` in `table`
    async fn existing_ids(&self, table: Table, column: &str) -> Result<HashSet<String>>;

    /// Candidates not yet present in `table.column`, in candidate order
    async fn new_ids(
        &self,
        table: Table,
        column: &str,
        candidates: &[String],
    ) -> Result<Vec<String>> {
        let existing = self.existing_ids(table, column).await?;
        Ok(crate::utils::subtract(candidates.iter().cloned(), &existing))
    }

    /// Items with an analyzable body and no analysis document yet
    async fn unanalyzed_ids(&self, kind: ItemKind) -> Result<Vec<String>>;

    /// Load a post whose body is analyzable
    async fn load_post(&self, post_id: &str) -> Result<Option<PostRecord>>;

    /// Load a comment whose body is analyzable
    async fn load_comment(&self, comment_id: &str) -> Result<Option<CommentRecord>>;

    async fn has_post(&self, post_id: &str) -> Result<bool>;

    async fn has_comment(&self, comment_id: &str) -> Result<bool>;

    /// Distinct author names known from ingested items
    async fn author_names(&self) -> Result<Vec<String>>;

    /// Communities seen in posts but not yet subscribed, excluding user pages
    async fn unsubscribed_subreddits(&self) -> Result<Vec<String>>;

    /// Refresh vote counters on an existing post
    async fn update_post_votes(
        &self,
        post_id: &str,
        upvotes: i64,
        downvotes: i64,
    ) -> Result<bool>;
}
