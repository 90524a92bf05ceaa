//! Failure handling scenarios
//!
//! 1. Unavailable items inside a batch
//! 2. Model endpoint outages
//! 3. Gone accounts
//! 4. Removed content

use std::sync::atomic::Ordering;

use snoolens::error::Error;
use snoolens::fingerprint::{FingerprintStore, Namespace};
use snoolens::storage::{ItemKind, Store, Table};
use snoolens::utils::error::{LlmError, SourceError};

use super::fixtures::{comment, Harness};

// ============================================================================
// Source failures
// ============================================================================

#[tokio::test]
async fn test_unavailable_post_does_not_stop_the_batch() {
    let h = Harness::new();
    h.seed_thread("p1");
    h.seed_thread("p2");
    h.seed_thread("p3");
    h.source.make_unavailable("p2");

    let summary = h.ingest().ingest_subreddit("rust").await.unwrap();
    assert_eq!(summary.new, 3);
    assert_eq!(summary.ingested, 2);
    assert_eq!(summary.failed, 1);
    assert!(!h.store.has_post("p2").await.unwrap());
    assert_eq!(h.store.count(Table::Errors).unwrap(), 1);

    // the failed post is picked up again on the next sync
    let retry = h.ingest().ingest_subreddit("rust").await.unwrap();
    assert_eq!(retry.new, 1);
}

#[tokio::test]
async fn test_unavailable_listing_is_an_error() {
    let h = Harness::new();
    h.source.make_unavailable("rust");

    let result = h.ingest().ingest_subreddit("rust").await;
    assert!(matches!(
        result,
        Err(Error::Source(SourceError::Api { status: 503, .. }))
    ));
    assert_eq!(h.store.count(Table::Errors).unwrap(), 1);
}

// ============================================================================
// Gone accounts
// ============================================================================

#[tokio::test]
async fn test_suspended_author_is_tombstoned_once() {
    let h = Harness::new();
    h.seed_thread("p1");
    h.source.suspend("bob");
    let ingest = h.ingest();

    ingest.ingest_subreddit("rust").await.unwrap();
    assert!(h.fingerprints.exists(Namespace::Author, "bob").await.unwrap());
    // comments by bob are stored, the profile is not
    assert_eq!(h.store.count(Table::Comments).unwrap(), 4);
    assert_eq!(h.store.count(Table::Authors).unwrap(), 2);

    // the second comment by bob hit the tombstone instead of the source
    assert_eq!(h.store.count(Table::Errors).unwrap(), 1);

    ingest.ingest_post("p1").await.unwrap();
    assert_eq!(h.store.count(Table::Errors).unwrap(), 1);
}

#[tokio::test]
async fn test_forbidden_author_crawl() {
    let h = Harness::new();
    h.seed_thread("p1");
    h.source.forbid("alice");

    let result = h.ingest().ingest_author_comments("alice").await;
    assert!(matches!(
        result,
        Err(Error::Source(SourceError::Forbidden(_)))
    ));
    assert!(h.fingerprints.exists(Namespace::Author, "alice").await.unwrap());
}

// ============================================================================
// Model failures
// ============================================================================

#[tokio::test]
async fn test_model_outage_fails_items_and_keeps_going() {
    let h = Harness::new();
    h.seed_thread("p1");
    h.seed_thread("p2");
    h.ingest().ingest_subreddit("rust").await.unwrap();
    h.model.down.store(true, Ordering::SeqCst);

    let stats = h.analysis().analyze_pending_posts().await.unwrap();
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.failed_count, 2);
    assert_eq!(h.store.count(Table::AnalysisDocuments).unwrap(), 0);
    assert_eq!(h.store.count(Table::Errors).unwrap(), 2);

    // reservations remain, so a restarted model does not re-run them early
    h.model.down.store(false, Ordering::SeqCst);
    let again = h.analysis().analyze_pending_posts().await.unwrap();
    assert_eq!(again.total_jobs, 0);
}

#[tokio::test]
async fn test_single_analysis_surfaces_connection_error() {
    let h = Harness::new();
    h.seed_thread("p1");
    h.ingest().ingest_post("p1").await.unwrap();
    h.model.down.store(true, Ordering::SeqCst);

    let result = h.analysis().analyze_post("p1").await;
    assert!(matches!(
        result,
        Err(Error::Llm(LlmError::Connection(_)))
    ));
}

// ============================================================================
// Removed content
// ============================================================================

#[tokio::test]
async fn test_removed_comments_are_never_analyzed() {
    let h = Harness::new();
    h.seed_thread("p1");
    let mut removed = comment("p1c9", "p1", "t3_p1", "alice");
    removed.body = "[removed]".to_string();
    h.source.add_comment(removed);
    h.ingest().ingest_post("p1").await.unwrap();

    let pending = h.store.unanalyzed_ids(ItemKind::Comment).await.unwrap();
    assert_eq!(pending.len(), 4);
    assert!(!pending.contains(&"p1c9".to_string()));

    let outcome = h.analysis().analyze_comment("p1c9").await.unwrap();
    assert_eq!(outcome.to_string(), "no analyzable body");
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 0);
    assert!(!h.fingerprints.exists(Namespace::Comment, "p1c9").await.unwrap());
}
