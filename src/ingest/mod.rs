//! Incremental ingestion of submissions, comments and authors
//!
//! Every crawl target follows the same walk:
//!
//! ```text
//! FETCH_CANDIDATES ──▶ DIFF (new_ids) ──▶ for each new id:
//!                                          FETCH_DETAIL ─▶ PERSIST_ITEM
//!                                          ─▶ FETCH_COMMENTS ─▶ PERSIST_COMMENTS
//!                                          ─▶ BUILD_TREE ─▶ rate gate
//! ```
//!
//! Source failures on a single item are journaled and the batch moves on.
//! Storage and fingerprint failures abort the batch, since a failed write
//! must not look like progress. Accounts that are gone (not found,
//! suspended, forbidden) are tombstoned in the `author_id` namespace and
//! never looked up again.

pub mod tree;

pub use tree::CommentTree;

use crate::error::{Error, Result};
use crate::fingerprint::{FingerprintStore, Namespace};
use crate::journal::Journal;
use crate::source::{Comment, ContentSource, RateGate, Submission, AUTOMODERATOR};
use crate::storage::{
    AuthorRecord, CommentRecord, PostRecord, Store, SubscriptionRecord, Table,
};
use crate::utils::is_removed_body;
use std::sync::Arc;

// ============================================================================
// Record conversion
// ============================================================================

impl From<&Submission> for PostRecord {
    fn from(post: &Submission) -> Self {
        Self {
            subreddit: post.subreddit.clone(),
            post_id: post.id.clone(),
            post_author: post.author.clone().unwrap_or_default(),
            post_title: post.title.clone(),
            post_body: post.selftext.clone(),
            post_created_utc: post.created_utc as i64,
            is_post_oc: post.is_original_content,
            is_post_video: post.is_video,
            post_upvote_count: post.ups,
            post_downvote_count: post.downs,
            subreddit_members: post.subreddit_subscribers,
        }
    }
}

impl From<&Comment> for CommentRecord {
    fn from(comment: &Comment) -> Self {
        Self {
            comment_id: comment.id.clone(),
            comment_author: comment.author.clone().unwrap_or_default(),
            is_comment_submitter: comment.is_submitter,
            is_comment_edited: comment.edited,
            comment_created_utc: comment.created_utc as i64,
            comment_upvote_count: comment.ups,
            comment_downvote_count: comment.downs,
            comment_body: comment.body.clone(),
            post_id: comment.post_id().to_string(),
            subreddit: comment.subreddit.clone(),
        }
    }
}

// ============================================================================
// Results
// ============================================================================

/// Counters for one crawl target
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    /// Ids visible at the source
    pub candidates: usize,
    /// Ids not yet persisted
    pub new: usize,
    pub ingested: usize,
    pub failed: usize,
}

/// What one submission ingest produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostIngest {
    pub post_id: String,
    pub comments: usize,
    pub tree_digest: String,
}

/// Result of resolving an author reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorStatus {
    Stored,
    /// AutoModerator or an already-tombstoned account
    Ignored,
    /// Account is gone and was tombstoned just now
    Tombstoned,
}

fn is_item_failure(err: &Error) -> bool {
    err.category().is_item_scoped()
}

// ============================================================================
// Engine
// ============================================================================

pub struct IngestEngine {
    source: Arc<dyn ContentSource>,
    store: Arc<dyn Store>,
    fingerprints: Arc<dyn FingerprintStore>,
    gate: RateGate,
    journal: Journal,
}

impl IngestEngine {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: Arc<dyn Store>,
        fingerprints: Arc<dyn FingerprintStore>,
        journal: Journal,
    ) -> Self {
        Self {
            source,
            store,
            fingerprints,
            gate: RateGate::default(),
            journal,
        }
    }

    pub fn with_gate(mut self, gate: RateGate) -> Self {
        self.gate = gate;
        self
    }

    /// Ingest every submission in a community's hot listing not yet stored
    pub async fn ingest_subreddit(&self, subreddit: &str) -> Result<IngestSummary> {
        self.journal
            .info(&format!("Getting posts in subreddit {subreddit}"))
            .await;

        let candidates = match self.source.list_submission_ids(subreddit).await {
            Ok(ids) => ids,
            Err(e) => {
                let err = Error::from(e);
                self.journal.failure("get_sub_posts", subreddit, &err).await;
                return Err(err);
            }
        };
        let new_ids = self
            .store
            .new_ids(Table::Posts, "post_id", &candidates)
            .await?;

        let mut summary = IngestSummary {
            candidates: candidates.len(),
            new: new_ids.len(),
            ..Default::default()
        };
        tracing::info!(
            subreddit = %subreddit,
            candidates = summary.candidates,
            new = summary.new,
            "Computed new submissions"
        );

        let mut counter = 0;
        for post_id in &new_ids {
            match self.ingest_post(post_id).await {
                Ok(_) => summary.ingested += 1,
                Err(e) if is_item_failure(&e) => {
                    self.journal.failure("get_sub_post", post_id, &e).await;
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
            counter = self.gate.sleep_gate(counter).await;
        }

        Ok(summary)
    }

    /// Fetch one submission, its author and its full comment tree
    pub async fn ingest_post(&self, post_id: &str) -> Result<PostIngest> {
        self.journal.info(&format!("Getting post id {post_id}")).await;

        let submission = self.source.submission(post_id).await?;
        self.persist_submission(&submission).await?;

        let comments = self.source.submission_comments(post_id).await?;
        for comment in &comments {
            self.persist_comment(comment).await?;
        }

        let tree = CommentTree::build(&comments);
        self.store.insert(&tree.to_record(post_id)).await?;

        tracing::debug!(
            post_id = %post_id,
            comments = comments.len(),
            edges = tree.edge_count(),
            "Submission ingested"
        );

        Ok(PostIngest {
            post_id: post_id.to_string(),
            comments: comments.len(),
            tree_digest: tree.digest(),
        })
    }

    /// Fetch a single comment and store it with its author
    pub async fn fetch_comment(&self, comment_id: &str) -> Result<CommentRecord> {
        self.journal
            .info(&format!("Getting comment id {comment_id}"))
            .await;
        let comment = self.source.comment(comment_id).await?;
        self.persist_comment(&comment).await
    }

    /// Ingest an account's new comments together with their submissions
    pub async fn ingest_author_comments(&self, author: &str) -> Result<IngestSummary> {
        self.journal
            .info(&format!("Getting comments for {author}"))
            .await;

        let candidates = match self.source.redditor_comment_ids(author).await {
            Ok(ids) => ids,
            Err(e) if e.is_gone() => {
                let err = Error::from(e);
                self.tombstone(author, &err).await?;
                return Err(err);
            }
            Err(e) => return Err(e.into()),
        };

        let new_ids = self
            .store
            .new_ids(Table::Comments, "comment_id", &candidates)
            .await?;
        let mut summary = IngestSummary {
            candidates: candidates.len(),
            new: new_ids.len(),
            ..Default::default()
        };

        if new_ids.is_empty() {
            self.journal
                .info(&format!("{author} has no new comments"))
                .await;
            return Ok(summary);
        }
        self.journal
            .info(&format!("{author} {} new comments", new_ids.len()))
            .await;

        let mut counter = 0;
        for comment_id in &new_ids {
            let result = match self.source.comment(comment_id).await {
                Ok(comment) => self.process_comment(&comment).await,
                Err(e) => Err(e.into()),
            };
            match result {
                Ok(()) => summary.ingested += 1,
                Err(e) if is_item_failure(&e) => {
                    self.journal.failure("author_comment", comment_id, &e).await;
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
            counter = self.gate.sleep_gate(counter).await;
        }

        Ok(summary)
    }

    /// Run [`Self::ingest_author_comments`] for every stored author not tombstoned
    pub async fn ingest_all_author_comments(&self) -> Result<IngestSummary> {
        let authors = self.store.author_names().await?;
        if authors.is_empty() {
            self.journal.warn("No authors found in the database").await;
            return Ok(IngestSummary::default());
        }

        let mut summary = IngestSummary {
            candidates: authors.len(),
            ..Default::default()
        };

        let mut counter = 0;
        for author in &authors {
            if self.fingerprints.exists(Namespace::Author, author).await? {
                continue;
            }
            summary.new += 1;

            match self.ingest_author_comments(author).await {
                Ok(_) => summary.ingested += 1,
                // gone accounts were tombstoned and journaled already
                Err(Error::Source(e)) if e.is_gone() => summary.failed += 1,
                Err(e) if is_item_failure(&e) => {
                    self.journal.failure("get_authors_comments", author, &e).await;
                    summary.failed += 1;
                }
                Err(e) => return Err(e),
            }
            counter = self.gate.sleep_gate(counter).await;
        }

        Ok(summary)
    }

    /// Store an author profile unless the account is AutoModerator or tombstoned
    pub async fn process_author(&self, name: &str) -> Result<AuthorStatus> {
        if name == AUTOMODERATOR || self.fingerprints.exists(Namespace::Author, name).await? {
            return Ok(AuthorStatus::Ignored);
        }

        self.journal.info(&format!("Processing Author {name}")).await;

        match self.source.redditor(name).await {
            Ok(redditor) => {
                let record = AuthorRecord {
                    author_id: redditor.id,
                    author_name: redditor.name,
                    author_created_utc: redditor.created_utc as i64,
                };
                if self.store.insert(&record).await? {
                    crate::metrics::record_item_ingested("author");
                }
                Ok(AuthorStatus::Stored)
            }
            Err(e) if e.is_gone() => {
                self.tombstone(name, &Error::from(e)).await?;
                Ok(AuthorStatus::Tombstoned)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Store a comment found through an author crawl
    ///
    /// Live comments also pull in their submission; removed or deleted ones
    /// are stored alone. Live AutoModerator comments are dropped.
    pub async fn process_comment(&self, comment: &Comment) -> Result<()> {
        let removed = is_removed_body(&comment.body);
        if !removed && comment.author.as_deref() == Some(AUTOMODERATOR) {
            tracing::debug!(comment_id = %comment.id, "Skipping AutoModerator comment");
            return Ok(());
        }

        self.persist_comment(comment).await?;
        if !removed {
            let submission = self.source.submission(comment.post_id()).await?;
            self.persist_submission(&submission).await?;
        }
        Ok(())
    }

    /// Subscribe to every community seen in posts but not yet joined
    pub async fn join_new_subreddits(&self) -> Result<Vec<String>> {
        self.journal.info("Joining New Subs").await;

        let subreddits = self.store.unsubscribed_subreddits().await?;
        if subreddits.is_empty() {
            self.journal.info("No new subreddits to join").await;
            return Ok(Vec::new());
        }

        let mut joined = Vec::new();
        for subreddit in subreddits {
            self.journal
                .info(&format!("Joining new sub {subreddit}"))
                .await;
            match self.source.subscribe(&subreddit).await {
                Ok(()) => {
                    self.store
                        .insert(&SubscriptionRecord::new(&subreddit))
                        .await?;
                    joined.push(subreddit);
                }
                Err(e) => {
                    let err = Error::from(e);
                    self.journal
                        .error(&format!("Unable to join {subreddit} {err}"))
                        .await;
                    self.journal.failure("join_new_subs", &subreddit, &err).await;
                }
            }
        }

        Ok(joined)
    }

    /// Overwrite a stored post's vote counters with the current values
    pub async fn refresh_post_votes(&self, post_id: &str) -> Result<bool> {
        let submission = self.source.submission(post_id).await?;
        Ok(self
            .store
            .update_post_votes(post_id, submission.ups, submission.downs)
            .await?)
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn persist_submission(&self, submission: &Submission) -> Result<PostRecord> {
        if let Some(author) = submission.author.as_deref() {
            self.resolve_author(author).await?;
        }
        let record = PostRecord::from(submission);
        if self.store.insert(&record).await? {
            crate::metrics::record_item_ingested("post");
        }
        Ok(record)
    }

    async fn persist_comment(&self, comment: &Comment) -> Result<CommentRecord> {
        if let Some(author) = comment.author.as_deref() {
            self.resolve_author(author).await?;
        }
        let record = CommentRecord::from(comment);
        if self.store.insert(&record).await? {
            crate::metrics::record_item_ingested("comment");
        }
        Ok(record)
    }

    /// Author lookups never fail the item that referenced them
    async fn resolve_author(&self, name: &str) -> Result<()> {
        match self.process_author(name).await {
            Ok(_) => Ok(()),
            Err(e) if is_item_failure(&e) => {
                self.journal.failure("process_author", name, &e).await;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn tombstone(&self, name: &str, err: &Error) -> Result<()> {
        self.fingerprints.add(Namespace::Author, name).await?;
        self.journal.failure("author", name, err).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::MemoryFingerprintStore;
    use crate::source::{MemorySource, Redditor};
    use crate::storage::SqliteStore;
    use crate::utils::error::FingerprintError;
    use std::collections::HashSet;

    struct Fixture {
        source: Arc<MemorySource>,
        store: Arc<SqliteStore>,
        fingerprints: Arc<MemoryFingerprintStore>,
        engine: IngestEngine,
    }

    fn fixture() -> Fixture {
        let source = Arc::new(MemorySource::new());
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let fingerprints = Arc::new(MemoryFingerprintStore::default());
        let engine = IngestEngine::new(
            source.clone(),
            store.clone(),
            fingerprints.clone(),
            Journal::new(store.clone(), "snoolens-test"),
        );
        Fixture {
            source,
            store,
            fingerprints,
            engine,
        }
    }

    fn submission(id: &str, author: &str) -> Submission {
        Submission {
            id: id.into(),
            subreddit: "rust".into(),
            author: Some(author.into()),
            title: format!("title {id}"),
            selftext: format!("body {id}"),
            ups: 3,
            ..Default::default()
        }
    }

    fn comment(id: &str, post: &str, parent: &str, author: &str, body: &str) -> Comment {
        Comment {
            id: id.into(),
            author: Some(author.into()),
            body: body.into(),
            parent_id: parent.into(),
            link_id: format!("t3_{post}"),
            subreddit: "rust".into(),
            ..Default::default()
        }
    }

    fn redditor(name: &str) -> Redditor {
        Redditor {
            id: format!("id_{name}"),
            name: name.into(),
            created_utc: 1_600_000_000.0,
            is_suspended: false,
        }
    }

    #[test]
    fn test_record_conversion() {
        let post = PostRecord::from(&Submission {
            created_utc: 1_700_000_000.9,
            ..submission("p1", "ferris")
        });
        assert_eq!(post.post_created_utc, 1_700_000_000);
        assert_eq!(post.post_author, "ferris");

        let record = CommentRecord::from(&comment("c1", "p1", "t3_p1", "ferris", "hi"));
        assert_eq!(record.post_id, "p1");
    }

    #[tokio::test]
    async fn test_ingest_subreddit_only_fetches_new_posts() {
        let fx = fixture();
        fx.source.add_redditor(redditor("ferris"));
        for id in ["a", "b", "c"] {
            fx.source.add_submission(submission(id, "ferris"));
        }
        fx.store
            .insert(&PostRecord::from(&submission("a", "ferris")))
            .await
            .unwrap();

        let summary = fx.engine.ingest_subreddit("rust").await.unwrap();
        assert_eq!(summary.candidates, 3);
        assert_eq!(summary.new, 2);
        assert_eq!(summary.ingested, 2);

        let rerun = fx.engine.ingest_subreddit("rust").await.unwrap();
        assert_eq!(rerun.new, 0);
        assert_eq!(fx.store.count(Table::Posts).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_ingest_post_stores_comments_and_tree() {
        let fx = fixture();
        fx.source.add_redditor(redditor("ferris"));
        fx.source.add_submission(submission("p1", "ferris"));
        fx.source
            .add_comment(comment("c1", "p1", "t3_p1", "ferris", "top"));
        fx.source
            .add_comment(comment("c2", "p1", "t1_c1", "AutoModerator", "reply"));

        let result = fx.engine.ingest_post("p1").await.unwrap();
        assert_eq!(result.comments, 2);

        let mut expected = CommentTree::default();
        expected.add_edge("c1", "c2");
        assert_eq!(result.tree_digest, expected.digest());

        assert_eq!(fx.store.count(Table::Comments).unwrap(), 2);
        assert_eq!(fx.store.count(Table::ParentChildTree).unwrap(), 1);
        assert_eq!(fx.store.count(Table::Authors).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_author_is_tombstoned_once() {
        let fx = fixture();

        let status = fx.engine.process_author("ghost").await.unwrap();
        assert_eq!(status, AuthorStatus::Tombstoned);
        assert!(fx
            .fingerprints
            .exists(Namespace::Author, "ghost")
            .await
            .unwrap());
        assert_eq!(fx.store.count(Table::Errors).unwrap(), 1);

        let before = fx.source.request_count();
        let again = fx.engine.process_author("ghost").await.unwrap();
        assert_eq!(again, AuthorStatus::Ignored);
        assert_eq!(fx.source.request_count(), before);
    }

    #[tokio::test]
    async fn test_automoderator_is_never_looked_up() {
        let fx = fixture();
        let status = fx.engine.process_author(AUTOMODERATOR).await.unwrap();
        assert_eq!(status, AuthorStatus::Ignored);
        assert_eq!(fx.source.request_count(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_continues_batch() {
        let fx = fixture();
        fx.source.add_redditor(redditor("ferris"));
        for id in ["a", "b", "c"] {
            fx.source.add_submission(submission(id, "ferris"));
        }
        fx.source.make_unavailable("b");

        let summary = fx.engine.ingest_subreddit("rust").await.unwrap();
        assert_eq!(summary.ingested, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(fx.store.count(Table::Posts).unwrap(), 2);
        assert!(fx.store.count(Table::Errors).unwrap() >= 1);
    }

    struct DownFingerprints;

    #[async_trait::async_trait]
    impl FingerprintStore for DownFingerprints {
        async fn exists(&self, _: Namespace, _: &str) -> crate::fingerprint::Result<bool> {
            Err(FingerprintError::Pool("connection refused".into()))
        }

        async fn add(&self, _: Namespace, _: &str) -> crate::fingerprint::Result<bool> {
            Err(FingerprintError::Pool("connection refused".into()))
        }

        async fn list(&self, _: Namespace) -> crate::fingerprint::Result<HashSet<String>> {
            Err(FingerprintError::Pool("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_fingerprint_outage_aborts_batch() {
        let fx = fixture();
        fx.source.add_redditor(redditor("ferris"));
        for id in ["a", "b"] {
            fx.source.add_submission(submission(id, "ferris"));
        }
        let engine = IngestEngine::new(
            fx.source.clone(),
            fx.store.clone(),
            Arc::new(DownFingerprints),
            Journal::new(fx.store.clone(), "snoolens-test"),
        );

        let err = engine.ingest_subreddit("rust").await.unwrap_err();
        assert!(matches!(err, Error::Fingerprint(_)));
        // the author check on the first post aborts the loop before any insert
        assert_eq!(fx.store.count(Table::Errors).unwrap(), 0);
        assert_eq!(fx.store.count(Table::Posts).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_author_crawl_fetches_parent_posts_for_live_comments() {
        let fx = fixture();
        fx.source.add_redditor(redditor("ferris"));
        fx.source.add_submission(submission("p1", "ferris"));
        fx.source.add_submission(submission("p2", "ferris"));
        fx.source
            .add_comment(comment("c1", "p1", "t3_p1", "ferris", "hello"));
        fx.source
            .add_comment(comment("c2", "p2", "t3_p2", "ferris", "[removed]"));

        let summary = fx.engine.ingest_author_comments("ferris").await.unwrap();
        assert_eq!(summary.new, 2);
        assert_eq!(summary.ingested, 2);

        assert!(fx.store.has_post("p1").await.unwrap());
        assert!(!fx.store.has_post("p2").await.unwrap());
        assert!(fx.store.has_comment("c2").await.unwrap());
    }

    #[tokio::test]
    async fn test_live_automoderator_comment_is_dropped() {
        let fx = fixture();
        fx.source.add_submission(submission("p1", "ferris"));
        let live = comment("c1", "p1", "t3_p1", AUTOMODERATOR, "Your post was approved");
        let removed = comment("c2", "p1", "t3_p1", AUTOMODERATOR, "[removed]");

        fx.engine.process_comment(&live).await.unwrap();
        assert!(!fx.store.has_comment("c1").await.unwrap());
        assert!(!fx.store.has_post("p1").await.unwrap());
        assert_eq!(fx.source.request_count(), 0);

        fx.engine.process_comment(&removed).await.unwrap();
        assert!(fx.store.has_comment("c2").await.unwrap());
        assert!(!fx.store.has_post("p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_forbidden_author_crawl_tombstones() {
        let fx = fixture();
        fx.source.forbid("private");

        let err = fx.engine.ingest_author_comments("private").await.unwrap_err();
        assert!(matches!(err, Error::Source(ref e) if e.is_gone()));
        assert!(fx
            .fingerprints
            .exists(Namespace::Author, "private")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_ingest_all_skips_tombstoned_authors() {
        let fx = fixture();
        for name in ["alice", "bob"] {
            fx.store
                .insert(&AuthorRecord {
                    author_id: format!("id_{name}"),
                    author_name: name.into(),
                    author_created_utc: 0,
                })
                .await
                .unwrap();
        }
        fx.fingerprints.add(Namespace::Author, "bob").await.unwrap();

        let summary = fx.engine.ingest_all_author_comments().await.unwrap();
        assert_eq!(summary.candidates, 2);
        assert_eq!(summary.new, 1);
        assert_eq!(summary.ingested, 1);
    }

    #[tokio::test]
    async fn test_join_new_subreddits() {
        let fx = fixture();
        let mut user_page = submission("p2", "ferris");
        user_page.subreddit = "u_ferris".into();
        fx.store
            .insert(&PostRecord::from(&submission("p1", "ferris")))
            .await
            .unwrap();
        fx.store
            .insert(&PostRecord::from(&user_page))
            .await
            .unwrap();

        let joined = fx.engine.join_new_subreddits().await.unwrap();
        assert_eq!(joined, vec!["rust"]);
        assert_eq!(fx.source.subscriptions(), vec!["rust"]);
        assert!(fx.engine.join_new_subreddits().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_post_votes() {
        let fx = fixture();
        fx.source.add_redditor(redditor("ferris"));
        fx.source.add_submission(submission("p1", "ferris"));
        fx.engine.ingest_post("p1").await.unwrap();

        let mut updated = submission("p1", "ferris");
        updated.ups = 99;
        fx.source.add_submission(updated);

        assert!(fx.engine.refresh_post_votes("p1").await.unwrap());
        let post = fx.store.load_post("p1").await.unwrap().unwrap();
        assert_eq!(post.post_upvote_count, 99);
    }
}
