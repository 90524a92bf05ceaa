use anyhow::Result;

use snoolens::analysis::AnalysisOutcome;
use snoolens::config::Config;
use snoolens::storage::ItemKind;

use super::connect;

pub async fn analyze_post(config: Config, post_id: &str, fetch: bool) -> Result<()> {
    let services = connect(config).await?;
    let engine = services.analysis_engine()?;
    let outcome = if fetch {
        engine
            .fetch_and_analyze_post(&services.ingest_engine(), post_id)
            .await?
    } else {
        engine.analyze_post(post_id).await?
    };
    report(post_id, &outcome);
    Ok(())
}

pub async fn analyze_comment(config: Config, comment_id: &str, fetch: bool) -> Result<()> {
    let services = connect(config).await?;
    let engine = services.analysis_engine()?;
    let outcome = if fetch {
        engine
            .fetch_and_analyze_comment(&services.ingest_engine(), comment_id)
            .await?
    } else {
        engine.analyze_comment(comment_id).await?
    };
    report(comment_id, &outcome);
    Ok(())
}

pub async fn analyze_pending(config: Config, kind: ItemKind) -> Result<()> {
    let services = connect(config).await?;
    let stats = services.analysis_engine()?.analyze_pending(kind).await?;
    println!("Pending {} analysis", kind.as_str());
    println!("  Jobs:      {}", stats.total_jobs);
    println!("  Succeeded: {}", stats.success_count);
    println!("  Skipped:   {}", stats.skipped_count);
    println!("  Failed:    {}", stats.failed_count);
    Ok(())
}

fn report(id: &str, outcome: &AnalysisOutcome) {
    println!("{id}: {outcome}");
}
