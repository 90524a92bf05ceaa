use anyhow::Result;

use snoolens::config::Config;
use snoolens::ingest::IngestSummary;

use super::connect;

fn print_summary(title: &str, summary: &IngestSummary) {
    println!("{title}");
    println!("{:=<width$}", "", width = title.len());
    println!("  Candidates: {}", summary.candidates);
    println!("  New:        {}", summary.new);
    println!("  Ingested:   {}", summary.ingested);
    println!("  Failed:     {}", summary.failed);
}

pub async fn ingest_subreddit(config: Config, subreddit: &str) -> Result<()> {
    let services = connect(config).await?;
    let summary = services.ingest_engine().ingest_subreddit(subreddit).await?;
    print_summary(&format!("r/{subreddit}"), &summary);
    Ok(())
}

pub async fn ingest_post(config: Config, post_id: &str) -> Result<()> {
    let services = connect(config).await?;
    let post = services.ingest_engine().ingest_post(post_id).await?;
    println!("Post {}", post.post_id);
    println!("  Comments:    {}", post.comments);
    println!("  Tree digest: {}", post.tree_digest);
    Ok(())
}

pub async fn ingest_author(config: Config, author: &str) -> Result<()> {
    let services = connect(config).await?;
    let summary = services
        .ingest_engine()
        .ingest_author_comments(author)
        .await?;
    print_summary(&format!("u/{author}"), &summary);
    Ok(())
}

pub async fn ingest_authors(config: Config) -> Result<()> {
    let services = connect(config).await?;
    let summary = services.ingest_engine().ingest_all_author_comments().await?;
    print_summary("All authors", &summary);
    Ok(())
}

pub async fn join_subs(config: Config) -> Result<()> {
    let services = connect(config).await?;
    let joined = services.ingest_engine().join_new_subreddits().await?;
    if joined.is_empty() {
        println!("No new subreddits to join");
    } else {
        println!("Joined {} subreddits:", joined.len());
        for name in &joined {
            println!("  r/{name}");
        }
    }
    Ok(())
}
