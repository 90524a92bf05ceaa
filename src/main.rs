use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use snoolens::config::Config;

mod commands;

#[derive(Parser)]
#[command(
    name = "snoolens",
    version,
    about = "Reddit ingestion pipeline with incremental dedup and local LLM analysis",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file (environment variables are used otherwise)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to logging.format
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the bearer-gated HTTP trigger surface
    Serve {
        /// Override server.bind_addr
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Ingest new submissions of a subreddit
    IngestSub {
        /// Subreddit name without the r/ prefix
        subreddit: String,
    },

    /// Ingest one submission with its comment tree
    IngestPost {
        /// Base-36 submission id
        post_id: String,
    },

    /// Ingest new comments of one author
    IngestAuthor {
        /// Reddit username
        author: String,
    },

    /// Ingest new comments of every stored author
    IngestAuthors,

    /// Analyze one stored post
    AnalyzePost {
        post_id: String,

        /// Ingest the post first when it is not stored
        #[arg(long)]
        fetch: bool,
    },

    /// Analyze one stored comment
    AnalyzeComment {
        comment_id: String,

        /// Fetch the comment first when it is not stored
        #[arg(long)]
        fetch: bool,
    },

    /// Analyze every post without an analysis document
    AnalyzePosts,

    /// Analyze every comment without an analysis document
    AnalyzeComments,

    /// Subscribe to subreddits seen in stored posts
    JoinSubs,

    /// Generate a key file for at-rest encryption
    GenKey {
        /// Write the key here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_format = cli
        .log_format
        .clone()
        .unwrap_or_else(|| config.logging.format.clone());
    setup_tracing(&log_format, &config.logging.level, cli.verbose)?;

    if let Err(e) = snoolens::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics registration failed, continuing without metrics");
    }

    tracing::info!("snoolens starting");

    match cli.command {
        Commands::Serve { bind } => {
            tracing::info!(bind = ?bind, "Starting serve command");
            commands::serve(config, bind).await?;
        }
        Commands::IngestSub { subreddit } => {
            tracing::info!(subreddit = %subreddit, "Starting ingest-sub command");
            commands::ingest_subreddit(config, &subreddit).await?;
        }
        Commands::IngestPost { post_id } => {
            tracing::info!(post_id = %post_id, "Starting ingest-post command");
            commands::ingest_post(config, &post_id).await?;
        }
        Commands::IngestAuthor { author } => {
            tracing::info!(author = %author, "Starting ingest-author command");
            commands::ingest_author(config, &author).await?;
        }
        Commands::IngestAuthors => {
            tracing::info!("Starting ingest-authors command");
            commands::ingest_authors(config).await?;
        }
        Commands::AnalyzePost { post_id, fetch } => {
            tracing::info!(post_id = %post_id, fetch, "Starting analyze-post command");
            commands::analyze_post(config, &post_id, fetch).await?;
        }
        Commands::AnalyzeComment { comment_id, fetch } => {
            tracing::info!(comment_id = %comment_id, fetch, "Starting analyze-comment command");
            commands::analyze_comment(config, &comment_id, fetch).await?;
        }
        Commands::AnalyzePosts => {
            tracing::info!("Starting analyze-posts command");
            commands::analyze_pending(config, snoolens::storage::ItemKind::Post).await?;
        }
        Commands::AnalyzeComments => {
            tracing::info!("Starting analyze-comments command");
            commands::analyze_pending(config, snoolens::storage::ItemKind::Comment).await?;
        }
        Commands::JoinSubs => {
            tracing::info!("Starting join-subs command");
            commands::join_subs(config).await?;
        }
        Commands::GenKey { output } => {
            commands::gen_key(output)?;
        }
    }

    tracing::info!("snoolens completed successfully");
    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Config::from_env().context("Failed to load config from environment"),
    }
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("snoolens=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_new(format!("snoolens={level},warn"))
            .context("Invalid logging.level")?
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
