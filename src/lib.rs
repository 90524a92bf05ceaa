//! snoolens - Reddit ingestion with incremental dedup and local LLM analysis
//!
//! Crawls submissions, comments and authors from Reddit, persists them, and
//! runs a set of locally hosted models against each item to produce stored
//! analysis documents.
//!
//! # Architecture
//!
//! - [`config`] - Configuration loading and validation
//! - [`source`] - Reddit client, rate gate and an in-process source
//! - [`storage`] - Relational persistence (PostgreSQL, SQLite)
//! - [`fingerprint`] - Processed-item fingerprints and reservations
//! - [`ingest`] - Incremental ingestion of posts, comments and authors
//! - [`analysis`] - Language gate, model fan-out and analysis documents
//! - [`llm`] - Ollama chat client
//! - [`worker`] - Bounded worker pool for batch analysis
//! - [`server`] - Bearer-gated HTTP trigger surface
//! - [`services`] - Wiring of the production collaborators
//!
//! # Example
//!
//! ```no_run
//! use snoolens::config::Config;
//! use snoolens::services::Services;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let services = Services::connect(config).await?;
//!     let summary = services.ingest_engine().ingest_subreddit("rust").await?;
//!     println!("{} new posts", summary.new);
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod ingest;
pub mod journal;
pub mod llm;
pub mod metrics;
pub mod server;
pub mod services;
pub mod source;
pub mod storage;
pub mod utils;
pub mod worker;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::analysis::{AnalysisEngine, AnalysisOutcome};
    pub use crate::config::Config;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::fingerprint::{FingerprintStore, Namespace};
    pub use crate::ingest::{IngestEngine, IngestSummary};
    pub use crate::services::Services;
    pub use crate::source::ContentSource;
    pub use crate::storage::Store;
}

pub use error::{Error, Result};
