//! LLM analysis of stored posts and comments
//!
//! # Flow per item
//!
//! ```text
//! load body ──▶ reserve fingerprint ──▶ language gate ──▶ for each model:
//!   (skip if     (skip if another        (skip if not        chat ─▶ sanitize ─▶ sha512
//!    no body)     worker holds it)        target language)   ─▶ encrypt? ─▶ insert document
//!                                                            ─▶ telemetry (best effort)
//! ```
//!
//! The reservation is the only mutual exclusion between concurrent runs. It is
//! taken before any model call and is kept when the item is skipped for its
//! language or when a model call fails, so the item is not retried until the
//! reservation expires.

pub mod crypto;
pub mod language;

pub use crypto::{generate_key, Encryptor};
pub use language::{LanguageCheck, LanguageDetector, WhatlangDetector};

use crate::config::{AnalysisConfig, UndetectedLanguage};
use crate::error::{Error, Result};
use crate::fingerprint::FingerprintStore;
use crate::ingest::IngestEngine;
use crate::journal::Journal;
use crate::llm::{ChatCompletion, ChatModel};
use crate::storage::{
    AnalysisDocument, AnalysisRecord, ItemKind, PromptCompletionRecord, Store,
};
use crate::utils::{sanitize_response, sha512_hex, subtract};
use crate::worker::{JobOutcome, StatsSnapshot, WorkerPool};
use chrono::Utc;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const POST_PROMPT: &str = "respond to this post title and post body: ";
const COMMENT_PROMPT: &str = "respond to this comment: ";

/// What happened to one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisOutcome {
    /// Every configured model ran; `documents` rows were newly written
    Analyzed { documents: usize },
    /// Missing, empty or removed body
    NoBody,
    /// Another worker holds the reservation
    AlreadyReserved,
    /// Language gate rejected the text
    LanguageSkipped(LanguageCheck),
}

impl fmt::Display for AnalysisOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyzed { documents } => write!(f, "analyzed ({documents} documents)"),
            Self::NoBody => f.write_str("no analyzable body"),
            Self::AlreadyReserved => f.write_str("already reserved"),
            Self::LanguageSkipped(LanguageCheck::Other(code)) => {
                write!(f, "language detected {code}")
            }
            Self::LanguageSkipped(_) => f.write_str("language detected UNKNOWN"),
        }
    }
}

pub struct AnalysisEngine {
    store: Arc<dyn Store>,
    fingerprints: Arc<dyn FingerprintStore>,
    model: Arc<dyn ChatModel>,
    detector: Arc<dyn LanguageDetector>,
    encryptor: Option<Arc<Encryptor>>,
    models: Vec<String>,
    target_language: String,
    on_undetected: UndetectedLanguage,
    workers: usize,
    journal: Journal,
}

impl AnalysisEngine {
    pub fn new(
        store: Arc<dyn Store>,
        fingerprints: Arc<dyn FingerprintStore>,
        model: Arc<dyn ChatModel>,
        models: Vec<String>,
        journal: Journal,
    ) -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            store,
            fingerprints,
            model,
            detector: Arc::new(WhatlangDetector),
            encryptor: None,
            models,
            target_language: defaults.target_language,
            on_undetected: defaults.on_undetected_language,
            workers: defaults.workers,
            journal,
        }
    }

    /// Apply language policy and worker count; loads the key when encryption is on
    pub fn configure(mut self, config: &AnalysisConfig) -> Result<Self> {
        self.target_language = config.target_language.clone();
        self.on_undetected = config.on_undetected_language;
        self.workers = config.workers;
        if config.encrypt {
            let path = config
                .encryption_key_path
                .as_deref()
                .ok_or_else(|| Error::config("encryption enabled without a key path"))?;
            self.encryptor = Some(Arc::new(Encryptor::from_key_file(path)?));
        }
        Ok(self)
    }

    pub fn with_detector(mut self, detector: Arc<dyn LanguageDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_encryptor(mut self, encryptor: Encryptor) -> Self {
        self.encryptor = Some(Arc::new(encryptor));
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    // ========================================================================
    // Single items
    // ========================================================================

    pub async fn analyze_post(&self, post_id: &str) -> Result<AnalysisOutcome> {
        self.journal
            .info(&format!("Analyzing post ID {post_id}"))
            .await;
        match self.store.load_post(post_id).await? {
            Some(post) => {
                self.analyze_text(ItemKind::Post, post_id, &post.analysis_text())
                    .await
            }
            None => {
                self.journal
                    .info(&format!("Post ID {post_id} contains no body"))
                    .await;
                Ok(AnalysisOutcome::NoBody)
            }
        }
    }

    pub async fn analyze_comment(&self, comment_id: &str) -> Result<AnalysisOutcome> {
        self.journal
            .info(&format!("Analyzing comment ID {comment_id}"))
            .await;
        match self.store.load_comment(comment_id).await? {
            Some(comment) => {
                self.analyze_text(ItemKind::Comment, comment_id, &comment.comment_body)
                    .await
            }
            None => {
                self.journal
                    .info(&format!("Comment ID {comment_id} contains no body"))
                    .await;
                Ok(AnalysisOutcome::NoBody)
            }
        }
    }

    pub async fn analyze(&self, kind: ItemKind, id: &str) -> Result<AnalysisOutcome> {
        match kind {
            ItemKind::Post => self.analyze_post(id).await,
            ItemKind::Comment => self.analyze_comment(id).await,
        }
    }

    /// Ingest the post first when it is not stored yet, then analyze it
    pub async fn fetch_and_analyze_post(
        &self,
        ingest: &IngestEngine,
        post_id: &str,
    ) -> Result<AnalysisOutcome> {
        if !self.store.has_post(post_id).await? {
            self.journal
                .warn(&format!("Post ID {post_id} not found in local database"))
                .await;
            ingest.ingest_post(post_id).await?;
        }
        self.analyze_post(post_id).await
    }

    /// Fetch the comment first when it is not stored yet, then analyze it
    pub async fn fetch_and_analyze_comment(
        &self,
        ingest: &IngestEngine,
        comment_id: &str,
    ) -> Result<AnalysisOutcome> {
        if !self.store.has_comment(comment_id).await? {
            self.journal
                .warn(&format!(
                    "Comment ID {comment_id} not found in local database"
                ))
                .await;
            ingest.fetch_comment(comment_id).await?;
        }
        self.analyze_comment(comment_id).await
    }

    // ========================================================================
    // Batches
    // ========================================================================

    /// Analyze every stored item of `kind` that has no document and no reservation
    pub async fn analyze_pending(self: &Arc<Self>, kind: ItemKind) -> Result<StatsSnapshot> {
        let unanalyzed = self.store.unanalyzed_ids(kind).await?;
        let reserved = self.fingerprints.list(kind.namespace()).await?;
        let ids = subtract(unanalyzed, &reserved);

        let label = match kind {
            ItemKind::Post => "posts",
            ItemKind::Comment => "comments",
        };
        if ids.is_empty() {
            self.journal
                .info(&format!("No unanalyzed {label}"))
                .await;
            return Ok(StatsSnapshot::default());
        }
        self.journal
            .info(&format!("Analyzing {} {label}", ids.len()))
            .await;

        let engine = Arc::clone(self);
        let snapshot = WorkerPool::new(self.workers)
            .run(ids, move |id| {
                let engine = Arc::clone(&engine);
                async move {
                    match engine.analyze(kind, &id).await {
                        Ok(AnalysisOutcome::Analyzed { .. }) => JobOutcome::Done,
                        Ok(outcome) => JobOutcome::Skipped(outcome.to_string()),
                        Err(e) => {
                            let stage = format!("analyze_{kind}");
                            engine.journal.failure(&stage, &id, &e).await;
                            JobOutcome::Failed(e.to_string())
                        }
                    }
                }
            })
            .await;

        self.journal
            .info(&format!("All {label} analyzed"))
            .await;
        Ok(snapshot)
    }

    pub async fn analyze_pending_posts(self: &Arc<Self>) -> Result<StatsSnapshot> {
        self.analyze_pending(ItemKind::Post).await
    }

    pub async fn analyze_pending_comments(self: &Arc<Self>) -> Result<StatsSnapshot> {
        self.analyze_pending(ItemKind::Comment).await
    }

    // ========================================================================
    // Internals
    // ========================================================================

    async fn analyze_text(&self, kind: ItemKind, id: &str, text: &str) -> Result<AnalysisOutcome> {
        let namespace = kind.namespace();
        let reserved = self.fingerprints.add(namespace, id).await?;
        crate::metrics::record_fingerprint(namespace.as_str(), reserved);
        if !reserved {
            tracing::debug!(kind = %kind, id = %id, "Reservation held elsewhere");
            return Ok(AnalysisOutcome::AlreadyReserved);
        }

        let check = language::check(self.detector.as_ref(), &self.target_language, text);
        if !check.proceed(self.on_undetected) {
            let outcome = AnalysisOutcome::LanguageSkipped(check);
            self.journal
                .info(&format!("Skipping {id} - {outcome}"))
                .await;
            return Ok(outcome);
        }
        if check == LanguageCheck::Undetected {
            tracing::info!(id = %id, "Language undetected, analyzing anyway");
        }

        let prompt = match kind {
            ItemKind::Post => format!("{POST_PROMPT}{text}"),
            ItemKind::Comment => format!("{COMMENT_PROMPT}{text}"),
        };
        let version = self.model.version().await?;

        let mut documents = 0;
        for llm in &self.models {
            tracing::info!(kind = %kind, id = %id, llm = %llm, "Running model");

            let started = Instant::now();
            let completion = self.model.chat(llm, &prompt).await?;
            let elapsed = started.elapsed();
            crate::metrics::record_completion_duration(llm, elapsed);

            let analysis = sanitize_response(&completion.content);
            let digest = sha512_hex(&analysis);

            let document = match &self.encryptor {
                Some(encryptor) => {
                    let mut doc =
                        AnalysisDocument::new(kind, id, llm, encryptor.encrypt(&analysis));
                    doc.encrypted = true;
                    doc
                }
                None => AnalysisDocument::new(kind, id, llm, analysis),
            };

            let record = AnalysisRecord {
                timestamp: Utc::now(),
                shasum_512: digest.clone(),
                document,
                ollama_ver: version.clone(),
            };
            let inserted = self.store.insert(&record).await?;
            crate::metrics::record_analysis(llm, if inserted { "analyzed" } else { "duplicate" });
            if inserted {
                documents += 1;
            }

            self.record_telemetry(llm, &digest, &version, &completion, elapsed)
                .await;
        }

        Ok(AnalysisOutcome::Analyzed { documents })
    }

    /// Model performance row; failures are logged and swallowed
    async fn record_telemetry(
        &self,
        llm: &str,
        digest: &str,
        version: &str,
        completion: &ChatCompletion,
        elapsed: Duration,
    ) {
        let running = match self.model.running_models().await {
            Ok(models) => models.into_iter().find(|m| m.matches(llm)),
            Err(e) => {
                self.journal
                    .error(&format!("Failed to list running models: {e}"))
                    .await;
                return;
            }
        };
        let Some(running) = running else {
            tracing::warn!(llm = %llm, "Model not loaded, telemetry skipped");
            return;
        };

        let record = PromptCompletionRecord {
            doc_shasum_512: digest.to_string(),
            ollama_host: self.model.host().to_string(),
            ollama_ver: version.to_string(),
            name: running.name,
            model: running.model,
            size: running.size,
            digest: running.digest,
            details: running.details,
            expires_at: running.expires_at,
            size_vram: running.size_vram,
            prompt_completion_time: elapsed.as_secs_f64(),
            tokens_per_second: completion.tokens_per_second(),
        };
        if let Err(e) = self.store.insert(&record).await {
            self.journal
                .error(&format!("Failed to store telemetry for {llm}: {e}"))
                .await;
        }
    }
}
