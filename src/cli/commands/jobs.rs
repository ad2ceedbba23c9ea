//! Queue inspection.

use crate::pipeline::Pipeline;
use crate::queue::JobKind;

/// Show pending job counts and failed jobs
pub async fn cmd_jobs(pipeline: &Pipeline) -> anyhow::Result<()> {
    let queue = pipeline.queue();

    println!("Pending jobs");
    println!("============");
    for kind in [JobKind::Search, JobKind::Download] {
        println!("  {:<9} {}", kind.as_str(), queue.pending_count(kind).await?);
    }

    let failed = queue.list_failed().await?;
    if failed.is_empty() {
        return Ok(());
    }

    println!();
    println!("Failed jobs ({})", failed.len());
    for job in failed {
        println!(
            "  {} [{}] after {} attempt(s): {}",
            job.id,
            job.kind,
            job.attempts_made,
            job.last_error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
