use anyhow::{Context, Result};

use snoolens::config::Config;
use snoolens::server::{self, AppState};

use super::connect;

pub async fn serve(mut config: Config, bind: Option<String>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind_addr = bind;
    }
    config.validate_server()?;
    let bind_addr = config.server.bind_addr.clone();

    let services = connect(config).await?;
    let state = AppState::from_services(&services).context("Failed to build server state")?;

    println!("snoolens control surface");
    println!("========================");
    println!("  POST /login                    - Exchange the shared secret for a token");
    println!("  GET  /version                  - Build version");
    println!("  GET  /metrics                  - Prometheus metrics");
    println!("  GET  /get_sub_posts?sub=       - Ingest a subreddit");
    println!("  GET  /get_sub_post?post_id=    - Ingest one post");
    println!("  GET  /get_author_comments?author= - Ingest one author");
    println!("  GET  /get_authors_comments     - Ingest every stored author");
    println!("  GET  /analyze_post?post_id=    - Analyze one post");
    println!("  GET  /analyze_posts            - Analyze pending posts");
    println!("  GET  /analyze_comment?comment_id= - Analyze one comment");
    println!("  GET  /analyze_comments         - Analyze pending comments");
    println!("  GET  /join_new_subs            - Subscribe to new subreddits");
    println!("  GET  /get_and_analyze_post?post_id=");
    println!("  GET  /get_and_analyze_comment?comment_id=");
    println!();
    println!("Listening on http://{bind_addr}");
    println!("Press Ctrl+C to stop.\n");

    server::serve(state, &bind_addr, async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
            }
            Err(e) => {
                tracing::error!("Failed to wait for Ctrl+C: {}", e);
            }
        }
    })
    .await
    .with_context(|| format!("Server on {bind_addr} failed"))?;

    println!("Control surface stopped.");
    Ok(())
}
