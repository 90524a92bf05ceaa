//! Collaborator handles shared by the engines, the CLI and the server

use crate::analysis::AnalysisEngine;
use crate::config::{Config, DatabaseBackend};
use crate::error::Result;
use crate::fingerprint::{FingerprintStore, MemoryFingerprintStore, RedisFingerprintStore};
use crate::ingest::IngestEngine;
use crate::journal::Journal;
use crate::llm::{ChatModel, OllamaClient};
use crate::source::{ContentSource, RateGate, RedditClient};
use crate::storage::{PgStore, SqliteStore, Store};
use std::sync::Arc;

#[derive(Clone)]
pub struct Services {
    pub config: Arc<Config>,
    pub source: Arc<dyn ContentSource>,
    pub store: Arc<dyn Store>,
    pub fingerprints: Arc<dyn FingerprintStore>,
    pub model: Arc<dyn ChatModel>,
}

impl Services {
    /// Connect every production collaborator described by `config`
    pub async fn connect(config: Config) -> Result<Self> {
        let store: Arc<dyn Store> = match config.database.backend {
            DatabaseBackend::Postgres => Arc::new(
                PgStore::connect(&config.database.postgres_url, config.database.pool_size)
                    .await?,
            ),
            DatabaseBackend::Sqlite => Arc::new(SqliteStore::open(&config.database.sqlite_path)?),
        };

        let fingerprints: Arc<dyn FingerprintStore> = if config.fingerprint.redis_url.is_empty() {
            tracing::warn!("No Redis URL configured, fingerprints are process-local");
            Arc::new(MemoryFingerprintStore::default())
        } else {
            Arc::new(
                RedisFingerprintStore::connect(
                    &config.fingerprint.redis_url,
                    config.fingerprint.pool_size,
                    config.fingerprint.reservation_ttl_secs,
                )
                .await?,
            )
        };

        let source = Arc::new(RedditClient::new(&config.reddit)?);
        let model = Arc::new(OllamaClient::new(&config.ollama)?);

        tracing::info!(
            backend = ?config.database.backend,
            models = ?config.ollama.models,
            "Services connected"
        );

        Ok(Self {
            config: Arc::new(config),
            source,
            store,
            fingerprints,
            model,
        })
    }

    pub fn journal(&self) -> Journal {
        Journal::new(Arc::clone(&self.store), self.config.server.service_name.clone())
    }

    pub fn ingest_engine(&self) -> IngestEngine {
        IngestEngine::new(
            Arc::clone(&self.source),
            Arc::clone(&self.store),
            Arc::clone(&self.fingerprints),
            self.journal(),
        )
        .with_gate(RateGate::from_config(&self.config.reddit))
    }

    pub fn analysis_engine(&self) -> Result<Arc<AnalysisEngine>> {
        let engine = AnalysisEngine::new(
            Arc::clone(&self.store),
            Arc::clone(&self.fingerprints),
            Arc::clone(&self.model),
            self.config.ollama.models.clone(),
            self.journal(),
        )
        .configure(&self.config.analysis)?;
        Ok(Arc::new(engine))
    }
}
