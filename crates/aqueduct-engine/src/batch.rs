//! Batch driver: one bounded DAG pass per run.
//!
//! A run processes the window `(watermark, window_end]`. Sinks commit only
//! after the whole pass succeeds, and the watermark advances only on a
//! committed run, so a failed run changes neither sink data nor the window
//! of the next run.

use std::collections::HashMap;
use std::sync::Arc;

use aqueduct_state::StateBackend;
use aqueduct_types::error::{ConnectorError, ErrorCategory, FailedRecord};
use aqueduct_types::record::Record;
use aqueduct_types::state::{PipelineId, RunStats, RunStatus};
use anyhow::{anyhow, Context};
use tracing::{info, warn};

use crate::config::types::{PipelineConfig, RecordErrorPolicy};
use crate::connector::{ConnectorInstance, PluginRegistry, RunContext, Sink, StageContext};
use crate::dataset::DatasetStore;
use crate::error::{compute_backoff, PipelineError};
use crate::graph::ExecutionPlan;

const MAX_RETRIES: u32 = 3;

/// Outcome of a completed batch run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub stats: RunStats,
    pub window_start: i64,
    pub window_end: i64,
}

#[derive(Debug)]
struct DagOutcome {
    records_read: u64,
    records_written: u64,
    failed: Vec<FailedRecord>,
}

/// Execute one batch run ending at `window_end` (epoch millis).
///
/// # Errors
///
/// Returns an error if the run fails after exhausting retries, hits a
/// non-retryable error, or the state backend is unavailable.
#[allow(clippy::too_many_lines)]
pub async fn run_batch(
    config: &PipelineConfig,
    plan: &ExecutionPlan,
    registry: &Arc<PluginRegistry>,
    datasets: &Arc<dyn DatasetStore>,
    state: &Arc<dyn StateBackend>,
    window_end: i64,
) -> anyhow::Result<RunSummary> {
    let pipeline = PipelineId::new(&config.pipeline);
    let window_start = state
        .get_watermark(&pipeline)
        .context("reading watermark")?
        .unwrap_or(0);
    if window_end <= window_start {
        return Err(anyhow!(
            "window end {window_end} is not after the current watermark {window_start}; \
             the window (watermark, end] would be empty or inverted"
        ));
    }
    let run_id = state.start_run(&pipeline).context("recording run")?;
    state.mark_running(run_id).context("recording run")?;

    info!(
        pipeline = %pipeline,
        run_id,
        window_start,
        window_end,
        "Starting batch run"
    );

    let ctx = RunContext {
        pipeline: pipeline.clone(),
        run_id,
        window_start,
        window_end,
        datasets: Arc::clone(datasets),
    };
    let policy = config.on_record_error;

    let mut attempt = 0u32;
    let result = loop {
        attempt += 1;
        let plan = plan.clone();
        let registry = Arc::clone(registry);
        let ctx = ctx.clone();
        let pass = tokio::task::spawn_blocking(move || execute_dag(&plan, &registry, &ctx, policy))
            .await
            .map_err(|e| PipelineError::Infrastructure(anyhow!("DAG task panicked: {e}")));
        let result = match pass {
            Ok(inner) => inner,
            Err(e) => Err(e),
        };

        match result {
            Ok(outcome) => break Ok(outcome),
            Err(ref err) if err.is_retryable() && attempt <= MAX_RETRIES => {
                if let Some(connector_err) = err.as_connector_error() {
                    let delay = compute_backoff(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        category = %connector_err.category,
                        code = %connector_err.code,
                        "Retryable error, will retry"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
            Err(err) => break Err(err),
        }
    };

    match result {
        Ok(outcome) => {
            let stats = RunStats {
                records_read: outcome.records_read,
                records_written: outcome.records_written,
                records_failed: outcome.failed.len() as u64,
                error_message: None,
            };
            state
                .insert_failed_records(&pipeline, run_id, &outcome.failed)
                .context("persisting failed records")?;
            state
                .set_watermark(&pipeline, window_end)
                .context("advancing watermark")?;
            state
                .complete_run(run_id, RunStatus::Succeeded, &stats)
                .context("recording run completion")?;
            info!(
                pipeline = %pipeline,
                run_id,
                records_read = stats.records_read,
                records_written = stats.records_written,
                records_failed = stats.records_failed,
                "Batch run succeeded"
            );
            Ok(RunSummary {
                run_id,
                status: RunStatus::Succeeded,
                stats,
                window_start,
                window_end,
            })
        }
        Err(err) => {
            let stats = RunStats {
                error_message: Some(err.to_string()),
                ..RunStats::default()
            };
            state
                .complete_run(run_id, RunStatus::Failed, &stats)
                .context("recording run completion")?;
            Err(anyhow!("batch run {run_id} failed: {err}"))
        }
    }
}

/// One synchronous pass over the plan: sources read, transforms fan records
/// along each edge independently, sinks buffer, then every sink commits.
fn execute_dag(
    plan: &ExecutionPlan,
    registry: &PluginRegistry,
    ctx: &RunContext,
    policy: RecordErrorPolicy,
) -> Result<DagOutcome, PipelineError> {
    let mut outputs: HashMap<String, Vec<Record>> = HashMap::new();
    let mut sinks: Vec<(String, Box<dyn Sink>)> = Vec::new();
    let mut records_read = 0u64;
    let mut records_written = 0u64;
    let mut failed: Vec<FailedRecord> = Vec::new();

    for stage in &plan.stages {
        let stage_ctx = StageContext {
            stage: stage.name.clone(),
            role: stage.role,
            properties: stage.properties.clone(),
            datasets: Arc::clone(&ctx.datasets),
        };
        let instance = registry.instantiate(&stage.plugin, &stage_ctx)?;
        let input: Vec<Record> = stage
            .inputs
            .iter()
            .flat_map(|name| outputs.get(name).cloned().unwrap_or_default())
            .collect();

        match instance {
            ConnectorInstance::BatchSource(mut source) => {
                let records = source.read(ctx)?;
                records_read += records.len() as u64;
                outputs.insert(stage.name.clone(), records);
            }
            ConnectorInstance::RealtimeSource(_) => {
                return Err(PipelineError::Connector(ConnectorError::config(
                    "REALTIME_SOURCE_IN_BATCH",
                    format!("stage '{}' is a realtime source", stage.name),
                )));
            }
            ConnectorInstance::Transform(mut transform) => {
                let mut emitted = Vec::new();
                for record in &input {
                    match transform.apply(ctx, record, &mut emitted) {
                        Ok(()) => {}
                        Err(err)
                            if err.category == ErrorCategory::Data
                                && policy == RecordErrorPolicy::Skip =>
                        {
                            warn!(
                                stage = %stage.name,
                                code = %err.code,
                                "Routing bad record to failed-record store"
                            );
                            failed.push(failed_record(&stage.name, record, &err));
                        }
                        Err(err) => return Err(PipelineError::Connector(err)),
                    }
                }
                outputs.insert(stage.name.clone(), emitted);
            }
            ConnectorInstance::Sink(mut sink) => {
                sink.write(ctx, &input)?;
                records_written += input.len() as u64;
                sinks.push((stage.name.clone(), sink));
            }
        }
    }

    for (name, sink) in &mut sinks {
        sink.commit(ctx).map_err(|err| {
            warn!(stage = %name.as_str(), code = %err.code, "Sink commit failed");
            PipelineError::Connector(err)
        })?;
    }

    Ok(DagOutcome {
        records_read,
        records_written,
        failed,
    })
}

fn failed_record(stage: &str, record: &Record, err: &ConnectorError) -> FailedRecord {
    FailedRecord {
        stage: stage.to_string(),
        record_json: record.to_json().to_string(),
        error_message: err.message.clone(),
        error_category: err.category,
        failed_at: chrono::Utc::now().to_rfc3339(),
    }
}
