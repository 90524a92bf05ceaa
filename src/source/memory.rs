//! In-process content source
//!
//! Holds submissions, comments and accounts in memory. Used by tests and by
//! local runs that replay a captured crawl without touching the API.

use super::{Comment, ContentSource, Redditor, Result, Submission};
use crate::utils::error::SourceError;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    listings: HashMap<String, Vec<String>>,
    submissions: HashMap<String, Submission>,
    comments: HashMap<String, Comment>,
    comment_order: Vec<String>,
    redditors: HashMap<String, Redditor>,
    suspended: HashSet<String>,
    forbidden: HashSet<String>,
    unavailable: HashSet<String>,
    subscriptions: Vec<String>,
}

#[derive(Debug, Default)]
pub struct MemorySource {
    state: RwLock<State>,
    requests: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn count_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Add a submission to a community's hot listing
    pub fn add_submission(&self, submission: Submission) {
        let mut state = self.write();
        state
            .listings
            .entry(submission.subreddit.clone())
            .or_default()
            .push(submission.id.clone());
        state.submissions.insert(submission.id.clone(), submission);
    }

    /// Add a comment; it shows up under its submission and its author
    pub fn add_comment(&self, comment: Comment) {
        let mut state = self.write();
        if !state.comments.contains_key(&comment.id) {
            state.comment_order.push(comment.id.clone());
        }
        state.comments.insert(comment.id.clone(), comment);
    }

    pub fn add_redditor(&self, redditor: Redditor) {
        self.write()
            .redditors
            .insert(redditor.name.clone(), redditor);
    }

    pub fn suspend(&self, name: &str) {
        self.write().suspended.insert(name.to_string());
    }

    pub fn forbid(&self, name: &str) {
        self.write().forbidden.insert(name.to_string());
    }

    /// Make every lookup of `id` fail with a server error
    pub fn make_unavailable(&self, id: &str) {
        self.write().unavailable.insert(id.to_string());
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.read().subscriptions.clone()
    }

    /// Number of trait calls served so far
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::Relaxed)
    }

    fn check_available(&self, id: &str) -> Result<()> {
        if self.read().unavailable.contains(id) {
            return Err(SourceError::Api {
                status: 503,
                message: format!("{id} unavailable"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ContentSource for MemorySource {
    async fn list_submission_ids(&self, subreddit: &str) -> Result<Vec<String>> {
        self.count_request();
        self.check_available(subreddit)?;
        Ok(self
            .read()
            .listings
            .get(subreddit)
            .cloned()
            .unwrap_or_default())
    }

    async fn submission(&self, post_id: &str) -> Result<Submission> {
        self.count_request();
        self.check_available(post_id)?;
        self.read()
            .submissions
            .get(post_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("t3_{post_id}")))
    }

    async fn submission_comments(&self, post_id: &str) -> Result<Vec<Comment>> {
        self.count_request();
        self.check_available(post_id)?;
        let state = self.read();
        if !state.submissions.contains_key(post_id) {
            return Err(SourceError::NotFound(format!("t3_{post_id}")));
        }
        Ok(state
            .comment_order
            .iter()
            .filter_map(|id| state.comments.get(id))
            .filter(|c| c.post_id() == post_id)
            .cloned()
            .collect())
    }

    async fn comment(&self, comment_id: &str) -> Result<Comment> {
        self.count_request();
        self.check_available(comment_id)?;
        self.read()
            .comments
            .get(comment_id)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(format!("t1_{comment_id}")))
    }

    async fn redditor(&self, name: &str) -> Result<Redditor> {
        self.count_request();
        self.check_available(name)?;
        let state = self.read();
        if state.suspended.contains(name) {
            return Err(SourceError::Suspended(name.to_string()));
        }
        if state.forbidden.contains(name) {
            return Err(SourceError::Forbidden(name.to_string()));
        }
        state
            .redditors
            .get(name)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(name.to_string()))
    }

    async fn redditor_comment_ids(&self, name: &str) -> Result<Vec<String>> {
        self.count_request();
        self.check_available(name)?;
        let state = self.read();
        if state.forbidden.contains(name) {
            return Err(SourceError::Forbidden(name.to_string()));
        }
        if state.suspended.contains(name) {
            return Err(SourceError::Suspended(name.to_string()));
        }
        Ok(state
            .comment_order
            .iter()
            .filter_map(|id| state.comments.get(id))
            .filter(|c| c.author.as_deref() == Some(name))
            .map(|c| c.id.clone())
            .collect())
    }

    async fn subscribe(&self, subreddit: &str) -> Result<()> {
        self.count_request();
        self.check_available(subreddit)?;
        self.write().subscriptions.push(subreddit.to_string());
        Ok(())
    }
}
