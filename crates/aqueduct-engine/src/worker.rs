//! Realtime driver: long-running polling workers.
//!
//! Each instance owns its own connector set and runs the DAG once per poll
//! tick. `start` and `stop` are idempotent; `stop` cancels the shared token
//! and drains every instance before returning.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use aqueduct_types::error::{ConnectorError, ErrorCategory};
use aqueduct_types::record::Record;
use aqueduct_types::state::PipelineId;
use anyhow::{bail, Result};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::types::{PipelineConfig, RecordErrorPolicy};
use crate::connector::{
    ConnectorInstance, PluginRegistry, RealtimeSource, RunContext, Sink, StageContext, Transform,
};
use crate::dataset::DatasetStore;
use crate::error::compute_backoff;
use crate::graph::{ExecutionPlan, PlannedStage};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Connectors for one worker instance, in plan order.
struct InstanceStages {
    stages: Vec<(PlannedStage, StageConnector)>,
}

enum StageConnector {
    Source(Box<dyn RealtimeSource>),
    Transform(Box<dyn Transform>),
    Sink(Box<dyn Sink>),
}

/// Handle on a deployed realtime pipeline's workers.
pub struct Worker {
    pipeline: PipelineId,
    plan: ExecutionPlan,
    registry: Arc<PluginRegistry>,
    datasets: Arc<dyn DatasetStore>,
    policy: RecordErrorPolicy,
    instances: u32,
    poll_interval: Duration,
    cancel: Option<CancellationToken>,
    tasks: JoinSet<()>,
}

impl Worker {
    pub(crate) fn new(
        config: &PipelineConfig,
        plan: ExecutionPlan,
        registry: Arc<PluginRegistry>,
        datasets: Arc<dyn DatasetStore>,
        instances: u32,
    ) -> Self {
        Self {
            pipeline: PipelineId::new(&config.pipeline),
            plan,
            registry,
            datasets,
            policy: config.on_record_error,
            instances,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel: None,
            tasks: JoinSet::new(),
        }
    }

    /// Override the poll interval (mostly for tests).
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn is_running(&self) -> bool {
        self.cancel.is_some()
    }

    /// Start one polling task per configured instance. A second call while
    /// running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if any stage's connector cannot be instantiated.
    pub fn start(&mut self) -> Result<()> {
        if self.cancel.is_some() {
            return Ok(());
        }

        // Instantiate every instance before spawning anything, so a bad
        // stage leaves no workers behind.
        let mut all_stages = Vec::new();
        for _ in 0..self.instances {
            all_stages.push(self.instantiate()?);
        }

        let cancel = CancellationToken::new();
        for (instance_id, stages) in all_stages.into_iter().enumerate() {
            let cancel = cancel.clone();
            let pipeline = self.pipeline.clone();
            let datasets = Arc::clone(&self.datasets);
            let policy = self.policy;
            let poll_interval = self.poll_interval;
            self.tasks.spawn_blocking(move || {
                run_instance(
                    &pipeline,
                    instance_id as u32,
                    stages,
                    &datasets,
                    policy,
                    poll_interval,
                    &cancel,
                );
            });
        }
        self.cancel = Some(cancel);
        info!(pipeline = %self.pipeline, instances = self.instances, "Worker started");
        Ok(())
    }

    /// Stop all instances and wait for them to drain. A second call, or a
    /// call before `start`, is a no-op.
    pub async fn stop(&mut self) {
        let Some(cancel) = self.cancel.take() else {
            return;
        };
        cancel.cancel();
        while self.tasks.join_next().await.is_some() {}
        info!(pipeline = %self.pipeline, "Worker stopped");
    }

    fn instantiate(&self) -> Result<InstanceStages> {
        let mut stages = Vec::with_capacity(self.plan.stages.len());
        for planned in &self.plan.stages {
            let stage_ctx = StageContext {
                stage: planned.name.clone(),
                role: planned.role,
                properties: planned.properties.clone(),
                datasets: Arc::clone(&self.datasets),
            };
            let connector = match self.registry.instantiate(&planned.plugin, &stage_ctx)? {
                ConnectorInstance::RealtimeSource(source) => StageConnector::Source(source),
                ConnectorInstance::BatchSource(_) => {
                    bail!(
                        "stage '{}' is a batch source, realtime pipelines need polling sources",
                        planned.name
                    );
                }
                ConnectorInstance::Transform(transform) => StageConnector::Transform(transform),
                ConnectorInstance::Sink(sink) => StageConnector::Sink(sink),
            };
            stages.push((planned.clone(), connector));
        }
        Ok(InstanceStages { stages })
    }
}

/// Poll loop for one instance. Runs on a blocking thread until cancelled.
fn run_instance(
    pipeline: &PipelineId,
    instance_id: u32,
    mut stages: InstanceStages,
    datasets: &Arc<dyn DatasetStore>,
    policy: RecordErrorPolicy,
    poll_interval: Duration,
    cancel: &CancellationToken,
) {
    let mut transient_attempts = 0u32;
    while !cancel.is_cancelled() {
        let ctx = RunContext {
            pipeline: pipeline.clone(),
            run_id: i64::from(instance_id),
            window_start: 0,
            window_end: chrono::Utc::now().timestamp_millis(),
            datasets: Arc::clone(datasets),
        };

        match run_tick(&mut stages, &ctx, policy) {
            Ok(()) => {
                transient_attempts = 0;
                std::thread::sleep(poll_interval);
            }
            Err(err) if err.retryable => {
                transient_attempts += 1;
                let delay = compute_backoff(transient_attempts);
                warn!(
                    pipeline = %pipeline,
                    instance_id,
                    code = %err.code,
                    delay_ms = delay.as_millis() as u64,
                    "Transient error in poll loop, backing off"
                );
                std::thread::sleep(delay);
            }
            Err(err) => {
                error!(
                    pipeline = %pipeline,
                    instance_id,
                    category = %err.category,
                    code = %err.code,
                    "Fatal error in poll loop, stopping instance"
                );
                return;
            }
        }
    }
}

/// One DAG pass: poll the sources, fan records along each edge
/// independently, commit sinks at the end of the tick.
fn run_tick(
    instance: &mut InstanceStages,
    ctx: &RunContext,
    policy: RecordErrorPolicy,
) -> Result<(), ConnectorError> {
    let mut outputs: HashMap<String, Vec<Record>> = HashMap::new();

    for (planned, connector) in &mut instance.stages {
        let input: Vec<Record> = planned
            .inputs
            .iter()
            .flat_map(|name| outputs.get(name).cloned().unwrap_or_default())
            .collect();

        match connector {
            StageConnector::Source(source) => {
                outputs.insert(planned.name.clone(), source.poll(ctx)?);
            }
            StageConnector::Transform(transform) => {
                let mut emitted = Vec::new();
                for record in &input {
                    match transform.apply(ctx, record, &mut emitted) {
                        Ok(()) => {}
                        Err(err)
                            if err.category == ErrorCategory::Data
                                && policy == RecordErrorPolicy::Skip =>
                        {
                            warn!(
                                stage = %planned.name,
                                code = %err.code,
                                "Dropping bad record"
                            );
                        }
                        Err(err) => return Err(err),
                    }
                }
                outputs.insert(planned.name.clone(), emitted);
            }
            StageConnector::Sink(sink) => {
                sink.write(ctx, &input)?;
                sink.commit(ctx)?;
            }
        }
    }

    Ok(())
}
