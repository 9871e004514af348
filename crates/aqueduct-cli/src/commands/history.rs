use std::path::Path;

use anyhow::{Context, Result};

use aqueduct_engine::config::parser;
use aqueduct_engine::open_state_backend;
use aqueduct_state::StateBackend;
use aqueduct_types::state::PipelineId;

/// Execute the `history` command: list recent runs of a pipeline.
pub fn execute(pipeline_path: &Path, limit: u32) -> Result<()> {
    let config = parser::parse_pipeline(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;
    let state = open_state_backend(&config.state)?;

    let pipeline = PipelineId::new(&config.pipeline);
    let runs = state.list_runs(&pipeline, limit)?;
    if runs.is_empty() {
        println!("No runs recorded for pipeline '{}'.", config.pipeline);
        return Ok(());
    }

    println!(
        "{:>6}  {:10}  {:20}  {:>8}  {:>8}  {:>7}",
        "run", "status", "started", "read", "written", "failed"
    );
    for run in runs {
        println!(
            "{:>6}  {:10}  {:20}  {:>8}  {:>8}  {:>7}",
            run.run_id,
            run.status.as_str(),
            run.started_at,
            run.stats.records_read,
            run.stats.records_written,
            run.stats.records_failed
        );
        if let Some(message) = &run.stats.error_message {
            println!("        {message}");
        }
    }
    Ok(())
}
