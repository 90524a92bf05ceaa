//! End-to-end ingest then analyze scenarios

use std::sync::atomic::Ordering;
use std::sync::Arc;

use snoolens::fingerprint::{FingerprintStore, Namespace};
use snoolens::services::Services;
use snoolens::storage::{ItemKind, Store, Table};

use super::fixtures::{Harness, MODELS};

#[tokio::test]
async fn test_ingest_then_analyze_everything() {
    let h = Harness::new();
    h.seed_thread("p1");
    h.seed_thread("p2");

    let summary = h.ingest().ingest_subreddit("rust").await.unwrap();
    assert_eq!(summary.new, 2);
    assert_eq!(summary.ingested, 2);
    assert_eq!(h.store.count(Table::Posts).unwrap(), 2);
    assert_eq!(h.store.count(Table::Comments).unwrap(), 8);
    assert_eq!(h.store.count(Table::Authors).unwrap(), 3);
    assert_eq!(h.store.count(Table::ParentChildTree).unwrap(), 2);

    let engine = h.analysis();
    let posts = engine.analyze_pending_posts().await.unwrap();
    let comments = engine.analyze_pending_comments().await.unwrap();
    assert_eq!(posts.success_count, 2);
    assert_eq!(comments.success_count, 8);

    let expected = (2 + 8) * MODELS.len();
    assert_eq!(h.store.count(Table::AnalysisDocuments).unwrap(), expected as i64);
    assert_eq!(
        h.store.count(Table::PromptCompletionDetails).unwrap(),
        expected as i64
    );
    assert_eq!(h.model.calls.load(Ordering::SeqCst), expected);

    // nothing left: a second pass does no work
    let again = engine.analyze_pending_posts().await.unwrap();
    assert_eq!(again.total_jobs, 0);
    assert!(h.store.unanalyzed_ids(ItemKind::Comment).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_incremental_subreddit_sync() {
    let h = Harness::new();
    h.seed_thread("p1");
    let ingest = h.ingest();

    let first = ingest.ingest_subreddit("rust").await.unwrap();
    assert_eq!((first.candidates, first.new), (1, 1));

    h.seed_thread("p2");
    let second = ingest.ingest_subreddit("rust").await.unwrap();
    assert_eq!((second.candidates, second.new), (2, 1));

    let third = ingest.ingest_subreddit("rust").await.unwrap();
    assert_eq!((third.candidates, third.new, third.ingested), (2, 0, 0));
}

#[tokio::test]
async fn test_engines_sharing_fingerprints_never_duplicate() {
    let h = Harness::new();
    for id in ["p1", "p2", "p3", "p4"] {
        h.seed_thread(id);
    }
    h.ingest().ingest_subreddit("rust").await.unwrap();

    // two independent engines, as two processes would be
    let a = h.analysis();
    let b = h.analysis();
    let (ra, rb) = tokio::join!(a.analyze_pending_posts(), b.analyze_pending_posts());
    let (ra, rb) = (ra.unwrap(), rb.unwrap());

    assert_eq!(ra.success_count + rb.success_count, 4);
    assert_eq!(h.model.calls.load(Ordering::SeqCst), 4 * MODELS.len());
    assert_eq!(
        h.store.count(Table::AnalysisDocuments).unwrap(),
        (4 * MODELS.len()) as i64
    );
}

#[tokio::test]
async fn test_reserved_items_are_not_pending() {
    let h = Harness::new();
    h.seed_thread("p1");
    h.seed_thread("p2");
    h.ingest().ingest_subreddit("rust").await.unwrap();

    h.fingerprints.add(Namespace::Post, "p1").await.unwrap();

    let stats = h.analysis().analyze_pending_posts().await.unwrap();
    assert_eq!(stats.total_jobs, 1);
    // p1 still has no document; its reservation holds it back until expiry
    assert_eq!(
        h.store.unanalyzed_ids(ItemKind::Post).await.unwrap(),
        vec!["p1".to_string()]
    );
}

#[tokio::test]
async fn test_author_crawl_then_fetch_and_analyze() {
    let h = Harness::new();
    h.seed_thread("p1");
    let ingest = h.ingest();

    let summary = ingest.ingest_author_comments("alice").await.unwrap();
    assert_eq!(summary.new, 2);
    assert_eq!(summary.ingested, 2);
    // parent submission pulled in through the comments
    assert!(h.store.has_post("p1").await.unwrap());

    let engine = h.analysis();
    let outcome = engine
        .fetch_and_analyze_comment(&ingest, "p1c4")
        .await
        .unwrap();
    assert_eq!(outcome.to_string(), format!("analyzed ({} documents)", MODELS.len()));
    assert!(h.store.has_comment("p1c4").await.unwrap());
}

#[tokio::test]
async fn test_join_new_subreddits() {
    let h = Harness::new();
    h.seed_thread("p1");
    let ingest = h.ingest();
    ingest.ingest_subreddit("rust").await.unwrap();

    assert_eq!(ingest.join_new_subreddits().await.unwrap(), vec!["rust"]);
    assert_eq!(h.source.subscriptions(), vec!["rust"]);
    assert!(ingest.join_new_subreddits().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_services_wire_shared_collaborators() {
    let h = Harness::new();
    h.seed_thread("p1");

    let services = Services {
        config: Arc::new(snoolens::config::Config::default()),
        source: h.source.clone(),
        store: h.store.clone(),
        fingerprints: h.fingerprints.clone(),
        model: h.model.clone(),
    };

    services.ingest_engine().ingest_post("p1").await.unwrap();
    let outcome = services
        .analysis_engine()
        .unwrap()
        .analyze_post("p1")
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        snoolens::analysis::AnalysisOutcome::Analyzed { .. }
            | snoolens::analysis::AnalysisOutcome::LanguageSkipped(_)
    ));
    assert!(h.fingerprints.exists(Namespace::Post, "p1").await.unwrap());
}

#[tokio::test]
async fn test_services_connect_with_local_backends() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = snoolens::config::Config::default();
    config.database.backend = snoolens::config::DatabaseBackend::Sqlite;
    config.database.sqlite_path = dir.path().join("nested").join("snoolens.db");
    config.fingerprint.redis_url = String::new();

    let services = Services::connect(config).await.unwrap();
    assert!(services.store.author_names().await.unwrap().is_empty());
    assert!(dir.path().join("nested").join("snoolens.db").exists());
}
