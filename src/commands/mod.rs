pub mod analyze;
pub mod ingest;
pub mod key;
pub mod serve;

pub use analyze::{analyze_comment, analyze_pending, analyze_post};
pub use ingest::{ingest_author, ingest_authors, ingest_post, ingest_subreddit, join_subs};
pub use key::gen_key;
pub use serve::serve;

use anyhow::{Context, Result};
use snoolens::config::Config;
use snoolens::services::Services;

/// Validate `config` and connect every collaborator
async fn connect(config: Config) -> Result<Services> {
    config.validate().context("Invalid configuration")?;
    Services::connect(config)
        .await
        .context("Failed to connect services")
}
