//! Typed rows, one struct per table

use super::{ItemKind, Record, SqlValue, Table};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Version tag carried by every analysis document
pub const ANALYSIS_SCHEMA_VERSION: &str = "4";

/// A submission as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostRecord {
    pub subreddit: String,
    pub post_id: String,
    pub post_author: String,
    pub post_title: String,
    pub post_body: String,
    pub post_created_utc: i64,
    pub is_post_oc: bool,
    pub is_post_video: bool,
    pub post_upvote_count: i64,
    pub post_downvote_count: i64,
    pub subreddit_members: i64,
}

impl PostRecord {
    /// Text sent to the model: title followed by body
    pub fn analysis_text(&self) -> String {
        format!("{}{}", self.post_title, self.post_body)
    }
}

impl Record for PostRecord {
    fn table(&self) -> Table {
        Table::Posts
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("subreddit", self.subreddit.as_str().into()),
            ("post_id", self.post_id.as_str().into()),
            ("post_author", self.post_author.as_str().into()),
            ("post_title", self.post_title.as_str().into()),
            ("post_body", self.post_body.as_str().into()),
            ("post_created_utc", self.post_created_utc.into()),
            ("is_post_oc", self.is_post_oc.into()),
            ("is_post_video", self.is_post_video.into()),
            ("post_upvote_count", self.post_upvote_count.into()),
            ("post_downvote_count", self.post_downvote_count.into()),
            ("subreddit_members", self.subreddit_members.into()),
        ]
    }
}

/// A comment as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentRecord {
    pub comment_id: String,
    pub comment_author: String,
    pub is_comment_submitter: bool,
    pub is_comment_edited: bool,
    pub comment_created_utc: i64,
    pub comment_upvote_count: i64,
    pub comment_downvote_count: i64,
    pub comment_body: String,
    pub post_id: String,
    pub subreddit: String,
}

impl Record for CommentRecord {
    fn table(&self) -> Table {
        Table::Comments
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("comment_id", self.comment_id.as_str().into()),
            ("comment_author", self.comment_author.as_str().into()),
            ("is_comment_submitter", self.is_comment_submitter.into()),
            ("is_comment_edited", self.is_comment_edited.into()),
            ("comment_created_utc", self.comment_created_utc.into()),
            ("comment_upvote_count", self.comment_upvote_count.into()),
            ("comment_downvote_count", self.comment_downvote_count.into()),
            ("comment_body", self.comment_body.as_str().into()),
            ("post_id", self.post_id.as_str().into()),
            ("subreddit", self.subreddit.as_str().into()),
        ]
    }
}

/// An author profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorRecord {
    pub author_id: String,
    pub author_name: String,
    pub author_created_utc: i64,
}

impl Record for AuthorRecord {
    fn table(&self) -> Table {
        Table::Authors
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("author_id", self.author_id.as_str().into()),
            ("author_name", self.author_name.as_str().into()),
            ("author_created_utc", self.author_created_utc.into()),
        ]
    }
}

/// JSON body of an analysis row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDocument {
    pub schema_version: String,
    pub source: String,
    pub category: ItemKind,
    pub reference_id: String,
    pub llm: String,
    pub analysis: String,
    #[serde(default)]
    pub encrypted: bool,
}

impl AnalysisDocument {
    pub fn new(category: ItemKind, reference_id: &str, llm: &str, analysis: String) -> Self {
        Self {
            schema_version: ANALYSIS_SCHEMA_VERSION.to_string(),
            source: "reddit".to_string(),
            category,
            reference_id: reference_id.to_string(),
            llm: llm.to_string(),
            analysis,
            encrypted: false,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        json!({
            "schema_version": self.schema_version,
            "source": self.source,
            "category": self.category.as_str(),
            "reference_id": self.reference_id,
            "llm": self.llm,
            "analysis": self.analysis,
            "encrypted": self.encrypted,
        })
    }
}

/// One model's analysis of one item
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRecord {
    pub timestamp: DateTime<Utc>,
    pub shasum_512: String,
    pub document: AnalysisDocument,
    pub ollama_ver: String,
}

impl Record for AnalysisRecord {
    fn table(&self) -> Table {
        Table::AnalysisDocuments
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("timestamp", self.timestamp.into()),
            ("shasum_512", self.shasum_512.as_str().into()),
            ("analysis_document", self.document.to_json().into()),
            ("ollama_ver", self.ollama_ver.as_str().into()),
        ]
    }
}

/// Model performance for one completion
#[derive(Debug, Clone, PartialEq)]
pub struct PromptCompletionRecord {
    pub doc_shasum_512: String,
    pub ollama_host: String,
    pub ollama_ver: String,
    pub name: String,
    pub model: String,
    pub size: i64,
    pub digest: String,
    pub details: serde_json::Value,
    pub expires_at: Option<String>,
    pub size_vram: i64,
    /// Wall-clock seconds for the completion
    pub prompt_completion_time: f64,
    pub tokens_per_second: f64,
}

impl Record for PromptCompletionRecord {
    fn table(&self) -> Table {
        Table::PromptCompletionDetails
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("doc_shasum_512", self.doc_shasum_512.as_str().into()),
            ("ollama_host", self.ollama_host.as_str().into()),
            ("ollama_ver", self.ollama_ver.as_str().into()),
            ("name", self.name.as_str().into()),
            ("model", self.model.as_str().into()),
            ("size", self.size.into()),
            ("digest", self.digest.as_str().into()),
            ("details", self.details.clone().into()),
            ("expires_at", self.expires_at.clone().into()),
            ("size_vram", self.size_vram.into()),
            ("prompt_completion_time", self.prompt_completion_time.into()),
            ("tokens_per_second", self.tokens_per_second.into()),
        ]
    }
}

/// Snapshot of a post's reply structure
#[derive(Debug, Clone, PartialEq)]
pub struct CommentTreeRecord {
    pub timestamp: DateTime<Utc>,
    pub shasum256: String,
    pub post_id: String,
    pub parent_child_tree: serde_json::Value,
}

impl Record for CommentTreeRecord {
    fn table(&self) -> Table {
        Table::ParentChildTree
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("timestamp", self.timestamp.into()),
            ("shasum256", self.shasum256.as_str().into()),
            ("post_id", self.post_id.as_str().into()),
            ("parent_child_tree", self.parent_child_tree.clone().into()),
        ]
    }
}

/// A community the account has joined
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionRecord {
    pub datetimesubscribed: DateTime<Utc>,
    pub subreddit: String,
}

impl SubscriptionRecord {
    pub fn new(subreddit: &str) -> Self {
        Self {
            datetimesubscribed: Utc::now(),
            subreddit: subreddit.to_string(),
        }
    }
}

impl Record for SubscriptionRecord {
    fn table(&self) -> Table {
        Table::Subscription
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("datetimesubscribed", self.datetimesubscribed.into()),
            ("subreddit", self.subreddit.as_str().into()),
        ]
    }
}

/// A per-item failure kept for later inspection
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub stage: String,
    pub item_id: String,
    pub error_kind: String,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(stage: &str, item_id: &str, error_kind: &str, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stage: stage.to_string(),
            item_id: item_id.to_string(),
            error_kind: error_kind.to_string(),
            message: message.into(),
        }
    }
}

impl Record for ErrorRecord {
    fn table(&self) -> Table {
        Table::Errors
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("timestamp", self.timestamp.into()),
            ("stage", self.stage.as_str().into()),
            ("item_id", self.item_id.as_str().into()),
            ("error_kind", self.error_kind.as_str().into()),
            ("message", self.message.as_str().into()),
        ]
    }
}

/// A batch-level event mirrored into the database
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceLogRecord {
    pub timestamp: DateTime<Utc>,
    pub log_json: serde_json::Value,
}

impl ServiceLogRecord {
    pub fn new(program_name: &str, severity: &str, message: &str) -> Self {
        let timestamp = Utc::now();
        let host = std::env::var("HOSTNAME").unwrap_or_else(|_| "NO_HOSTNAME_AVAILABLE".into());
        Self {
            timestamp,
            log_json: json!({
                "timestamp": timestamp.to_rfc3339(),
                "host": host,
                "program_name": program_name,
                "program_version": env!("CARGO_PKG_VERSION"),
                "severity": severity,
                "message": message,
            }),
        }
    }
}

impl Record for ServiceLogRecord {
    fn table(&self) -> Table {
        Table::ServiceLogs
    }

    fn values(&self) -> Vec<(&'static str, SqlValue)> {
        vec![
            ("timestamp", self.timestamp.into()),
            ("log_json", self.log_json.clone().into()),
        ]
    }
}
