//! Shared harness for the end-to-end tests

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use snoolens::analysis::{AnalysisEngine, LanguageDetector};
use snoolens::fingerprint::MemoryFingerprintStore;
use snoolens::ingest::IngestEngine;
use snoolens::journal::Journal;
use snoolens::llm::{self, ChatCompletion, ChatModel, RunningModel};
use snoolens::source::{Comment, MemorySource, Redditor, Submission};
use snoolens::storage::SqliteStore;
use snoolens::utils::error::LlmError;

pub const MODELS: &[&str] = &["llama3", "mistral"];

/// Detector that always reports English
pub struct English;

impl LanguageDetector for English {
    fn detect(&self, _text: &str) -> Option<String> {
        Some("eng".to_string())
    }
}

/// Chat model echoing its prompt; can be switched off to simulate an outage
#[derive(Default)]
pub struct EchoModel {
    pub calls: AtomicUsize,
    pub down: AtomicBool,
}

impl EchoModel {
    fn check(&self) -> llm::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(LlmError::Connection("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatModel for EchoModel {
    async fn chat(&self, model: &str, prompt: &str) -> llm::Result<ChatCompletion> {
        self.check()?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(ChatCompletion {
            content: format!("{model} read: {prompt}"),
            eval_count: 12,
            eval_duration: 600_000_000,
            total_duration: 900_000_000,
        })
    }

    async fn version(&self) -> llm::Result<String> {
        self.check()?;
        Ok("0.1.32".to_string())
    }

    async fn running_models(&self) -> llm::Result<Vec<RunningModel>> {
        Ok(MODELS
            .iter()
            .map(|m| RunningModel {
                name: format!("{m}:latest"),
                model: format!("{m}:latest"),
                size: 4_000_000_000,
                digest: format!("digest-{m}"),
                ..Default::default()
            })
            .collect())
    }

    fn host(&self) -> &str {
        "http://ollama.test:11434"
    }
}

pub struct Harness {
    pub source: Arc<MemorySource>,
    pub store: Arc<SqliteStore>,
    pub fingerprints: Arc<MemoryFingerprintStore>,
    pub model: Arc<EchoModel>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            source: Arc::new(MemorySource::new()),
            store: Arc::new(SqliteStore::in_memory().unwrap()),
            fingerprints: Arc::new(MemoryFingerprintStore::default()),
            model: Arc::new(EchoModel::default()),
        }
    }

    pub fn journal(&self) -> Journal {
        Journal::new(self.store.clone(), "snoolens-it")
    }

    pub fn ingest(&self) -> IngestEngine {
        IngestEngine::new(
            self.source.clone(),
            self.store.clone(),
            self.fingerprints.clone(),
            self.journal(),
        )
    }

    pub fn analysis(&self) -> Arc<AnalysisEngine> {
        Arc::new(
            AnalysisEngine::new(
                self.store.clone(),
                self.fingerprints.clone(),
                self.model.clone(),
                MODELS.iter().map(|m| m.to_string()).collect(),
                self.journal(),
            )
            .with_detector(Arc::new(English))
            .with_workers(3),
        )
    }

    /// Post with a small thread: c1 <- c2 <- c3 and a top-level c4
    pub fn seed_thread(&self, post_id: &str) {
        self.add_author("op");
        self.add_author("alice");
        self.add_author("bob");

        self.source.add_submission(submission(post_id, "op"));
        let link = format!("t3_{post_id}");
        let c = |n: u32| format!("{post_id}c{n}");
        self.source
            .add_comment(comment(&c(1), post_id, &link, "alice"));
        self.source
            .add_comment(comment(&c(2), post_id, &format!("t1_{}", c(1)), "bob"));
        self.source
            .add_comment(comment(&c(3), post_id, &format!("t1_{}", c(2)), "alice"));
        self.source
            .add_comment(comment(&c(4), post_id, &link, "bob"));
    }

    pub fn add_author(&self, name: &str) {
        self.source.add_redditor(Redditor {
            id: format!("id_{name}"),
            name: name.to_string(),
            created_utc: 1_500_000_000.0,
            is_suspended: false,
        });
    }
}

pub fn submission(id: &str, author: &str) -> Submission {
    Submission {
        id: id.to_string(),
        subreddit: "rust".to_string(),
        author: Some(author.to_string()),
        title: format!("Question {id}"),
        selftext: format!("How do I share state between tasks in {id}?"),
        created_utc: 1_700_000_000.0,
        ups: 5,
        subreddit_subscribers: 300_000,
        ..Default::default()
    }
}

pub fn comment(id: &str, post_id: &str, parent: &str, author: &str) -> Comment {
    Comment {
        id: id.to_string(),
        author: Some(author.to_string()),
        body: format!("Use an Arc<Mutex<T>> ({id})"),
        parent_id: parent.to_string(),
        link_id: format!("t3_{post_id}"),
        subreddit: "rust".to_string(),
        created_utc: 1_700_000_100.0,
        ups: 1,
        ..Default::default()
    }
}
