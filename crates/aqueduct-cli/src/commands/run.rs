use std::path::Path;

use anyhow::Result;

/// Execute the `run` command: deploy a pipeline and run one batch pass.
pub async fn execute(pipeline_path: &Path, window_end: Option<i64>) -> Result<()> {
    let app = super::deploy_pipeline(pipeline_path)?;

    tracing::info!(
        pipeline = %app.config().pipeline,
        stages = app.plan().stages.len(),
        "Pipeline deployed"
    );

    let window_end = window_end.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
    let summary = app.run_batch(window_end).await?;

    println!("Pipeline '{}' completed successfully.", app.config().pipeline);
    println!("  Run id:          {}", summary.run_id);
    println!(
        "  Window:          ({}, {}]",
        summary.window_start, summary.window_end
    );
    println!("  Records read:    {}", summary.stats.records_read);
    println!("  Records written: {}", summary.stats.records_written);
    if summary.stats.records_failed > 0 {
        println!("  Records failed:  {}", summary.stats.records_failed);
    }

    Ok(())
}
