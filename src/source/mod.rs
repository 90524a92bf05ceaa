//! Content source abstraction and the Reddit implementation
//!
//! The ingestion engine only talks to [`ContentSource`]; production uses
//! [`RedditClient`], tests and replays use [`MemorySource`].

pub mod memory;
pub mod reddit;
pub mod throttle;

pub use memory::MemorySource;
pub use reddit::RedditClient;
pub use throttle::RateGate;

use crate::utils::error::SourceError;
use async_trait::async_trait;
use serde::{Deserialize, Deserializer};

pub type Result<T> = std::result::Result<T, SourceError>;

/// Account name whose content is never treated as an author
pub const AUTOMODERATOR: &str = "AutoModerator";

/// A submission (post)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Submission {
    pub id: String,
    pub subreddit: String,
    #[serde(deserialize_with = "author_name")]
    pub author: Option<String>,
    pub title: String,
    pub selftext: String,
    pub created_utc: f64,
    pub is_original_content: bool,
    pub is_video: bool,
    pub ups: i64,
    pub downs: i64,
    pub subreddit_subscribers: i64,
}

/// A comment, with `parent_id` and `link_id` as fullnames (`t1_…`, `t3_…`)
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub id: String,
    #[serde(deserialize_with = "author_name")]
    pub author: Option<String>,
    pub is_submitter: bool,
    #[serde(deserialize_with = "edited_flag")]
    pub edited: bool,
    pub created_utc: f64,
    pub ups: i64,
    pub downs: i64,
    pub body: String,
    pub parent_id: String,
    pub link_id: String,
    pub subreddit: String,
}

impl Comment {
    /// Bare id of the owning submission
    pub fn post_id(&self) -> &str {
        crate::utils::strip_fullname(&self.link_id)
    }

    /// Bare id of the parent comment, if the parent is a comment
    pub fn parent_comment_id(&self) -> Option<&str> {
        self.parent_id.strip_prefix("t1_")
    }
}

/// An account profile
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Redditor {
    pub id: String,
    pub name: String,
    pub created_utc: f64,
    pub is_suspended: bool,
}

fn author_name<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let name: Option<String> = Option::deserialize(d)?;
    Ok(name.filter(|n| !n.is_empty() && n != "[deleted]"))
}

// `edited` is either `false` or the edit timestamp
fn edited_flag<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<bool, D::Error> {
    let value = serde_json::Value::deserialize(d)?;
    Ok(match value {
        serde_json::Value::Bool(b) => b,
        serde_json::Value::Number(n) => n.as_f64().is_some_and(|t| t > 0.0),
        _ => false,
    })
}

/// Read-side access to the discussion platform plus the subscribe action
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Ids of every submission in a community's hot listing
    async fn list_submission_ids(&self, subreddit: &str) -> Result<Vec<String>>;

    async fn submission(&self, post_id: &str) -> Result<Submission>;

    /// Every comment under a submission, fully expanded and flattened
    async fn submission_comments(&self, post_id: &str) -> Result<Vec<Comment>>;

    async fn comment(&self, comment_id: &str) -> Result<Comment>;

    async fn redditor(&self, name: &str) -> Result<Redditor>;

    /// Ids of every comment in an account's hot comment listing
    async fn redditor_comment_ids(&self, name: &str) -> Result<Vec<String>>;

    async fn subscribe(&self, subreddit: &str) -> Result<()>;
}
