use std::path::Path;

use anyhow::Result;

/// Execute the `worker` command: run a realtime pipeline until Ctrl-C.
pub async fn execute(pipeline_path: &Path) -> Result<()> {
    let app = super::deploy_pipeline(pipeline_path)?;
    let mut worker = app.worker()?;
    worker.start()?;

    println!(
        "Pipeline '{}' workers running. Press Ctrl-C to stop.",
        app.config().pipeline
    );
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown requested, draining workers");
    worker.stop().await;
    Ok(())
}
