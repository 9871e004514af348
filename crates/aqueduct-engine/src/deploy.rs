//! Deployment: validate a pipeline end to end and hand back a runnable app.
//!
//! Deployment catches everything that can be caught before data moves:
//! config shape, graph structure, plugin resolution, and stage/role fit.
//! A pipeline that deploys cleanly can still fail at runtime, but never
//! because of a typo in its topology.

use std::path::Path;
use std::sync::Arc;

use aqueduct_state::{SqliteStateBackend, StateBackend};
use aqueduct_types::error::ConnectorError;
use tracing::info;

use crate::batch::{run_batch, RunSummary};
use crate::config::types::{PipelineConfig, StateConfig, Trigger};
use crate::config::validator::validate_pipeline;
use crate::connector::{ConnectorInstance, PluginRegistry, StageContext};
use crate::dataset::DatasetStore;
use crate::graph::{self, ExecutionPlan, GraphError, StageRole};
use crate::worker::Worker;

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Validation(anyhow::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("stage '{stage}': {source}")]
    Plugin {
        stage: String,
        #[source]
        source: ConnectorError,
    },

    #[error("stage '{stage}' resolves to a {kind} connector, which cannot act as a {role}")]
    RoleMismatch {
        stage: String,
        kind: &'static str,
        role: &'static str,
    },

    #[error("pipeline '{pipeline}' has a {trigger} trigger, not runnable as {wanted}")]
    WrongTrigger {
        pipeline: String,
        trigger: &'static str,
        wanted: &'static str,
    },
}

/// A deployed pipeline, ready to run.
pub struct App {
    config: PipelineConfig,
    plan: ExecutionPlan,
    registry: Arc<PluginRegistry>,
    datasets: Arc<dyn DatasetStore>,
    state: Arc<dyn StateBackend>,
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App").finish_non_exhaustive()
    }
}

/// Validate `config` against `registry` and build an [`App`].
///
/// Every stage's plugin is instantiated once here so that bad properties
/// surface at deploy time; drivers instantiate fresh connectors per run.
///
/// # Errors
///
/// Returns a [`DeployError`] describing the first unresolvable problem.
pub fn deploy(
    config: PipelineConfig,
    registry: Arc<PluginRegistry>,
    datasets: Arc<dyn DatasetStore>,
    state: Arc<dyn StateBackend>,
) -> Result<App, DeployError> {
    validate_pipeline(&config).map_err(DeployError::Validation)?;
    let plan = graph::plan(&config)?;

    let realtime = matches!(config.trigger, Trigger::Realtime { .. });
    for stage in &plan.stages {
        let stage_ctx = StageContext {
            stage: stage.name.clone(),
            role: stage.role,
            properties: stage.properties.clone(),
            datasets: Arc::clone(&datasets),
        };
        let instance = registry
            .instantiate(&stage.plugin, &stage_ctx)
            .map_err(|source| DeployError::Plugin {
                stage: stage.name.clone(),
                source,
            })?;
        check_role(stage.role, realtime, &instance).map_err(|kind| DeployError::RoleMismatch {
            stage: stage.name.clone(),
            kind,
            role: stage.role.as_str(),
        })?;
    }

    info!(
        pipeline = %config.pipeline,
        stages = plan.stages.len(),
        "Pipeline deployed"
    );
    Ok(App {
        config,
        plan,
        registry,
        datasets,
        state,
    })
}

/// Ok, or the connector kind that does not fit the stage role.
fn check_role(
    role: StageRole,
    realtime: bool,
    instance: &ConnectorInstance,
) -> Result<(), &'static str> {
    let fits = match (role, instance) {
        (StageRole::Source, ConnectorInstance::BatchSource(_)) => !realtime,
        (StageRole::Source, ConnectorInstance::RealtimeSource(_)) => realtime,
        (StageRole::Transform, ConnectorInstance::Transform(_))
        | (StageRole::Sink, ConnectorInstance::Sink(_)) => true,
        _ => false,
    };
    if fits {
        Ok(())
    } else {
        Err(instance.kind())
    }
}

impl App {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    /// Run one batch pass over the window ending at `window_end`.
    ///
    /// # Errors
    ///
    /// Returns a [`DeployError::WrongTrigger`] for realtime pipelines, or
    /// the run error.
    pub async fn run_batch(&self, window_end: i64) -> anyhow::Result<RunSummary> {
        if let Trigger::Realtime { .. } = self.config.trigger {
            return Err(DeployError::WrongTrigger {
                pipeline: self.config.pipeline.clone(),
                trigger: "realtime",
                wanted: "batch",
            }
            .into());
        }
        run_batch(
            &self.config,
            &self.plan,
            &self.registry,
            &self.datasets,
            &self.state,
            window_end,
        )
        .await
    }

    /// Build the realtime worker for this pipeline. The worker is returned
    /// stopped; call [`Worker::start`].
    ///
    /// # Errors
    ///
    /// Returns a [`DeployError::WrongTrigger`] for batch pipelines.
    pub fn worker(&self) -> Result<Worker, DeployError> {
        let Trigger::Realtime { instances } = self.config.trigger else {
            return Err(DeployError::WrongTrigger {
                pipeline: self.config.pipeline.clone(),
                trigger: "batch",
                wanted: "realtime",
            });
        };
        Ok(Worker::new(
            &self.config,
            self.plan.clone(),
            Arc::clone(&self.registry),
            Arc::clone(&self.datasets),
            instances,
        ))
    }
}

/// Open the state backend described by a pipeline's `state` section.
///
/// # Errors
///
/// Returns an error for unknown backends or an unopenable database.
pub fn open_state_backend(config: &StateConfig) -> anyhow::Result<Arc<dyn StateBackend>> {
    match config.backend.as_str() {
        "sqlite" => {
            let backend = match &config.connection {
                Some(path) => SqliteStateBackend::open(Path::new(path))?,
                None => SqliteStateBackend::open(Path::new(".aqueduct/state.db"))?,
            };
            Ok(Arc::new(backend))
        }
        other => anyhow::bail!("unsupported state backend '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::parser::parse_pipeline_str;
    use crate::dataset::InMemoryDatasetStore;

    fn try_deploy(yaml: &str) -> Result<App, DeployError> {
        let config = parse_pipeline_str(yaml).unwrap();
        deploy(
            config,
            Arc::new(PluginRegistry::with_builtins()),
            Arc::new(InMemoryDatasetStore::new()),
            Arc::new(SqliteStateBackend::in_memory().unwrap()),
        )
    }

    #[test]
    fn test_deploy_realtime_pipeline() {
        let app = try_deploy(
            r#"
version: "1.0"
pipeline: rt
trigger:
  type: realtime
  instances: 2
sources:
  - name: gen
    plugin: data-generator
sinks:
  - name: out
    plugin: stream
    properties:
      dataset: events
"#,
        )
        .unwrap();
        assert_eq!(app.plan().stages.len(), 2);
        assert!(app.worker().is_ok());
    }

    #[test]
    fn test_unknown_plugin_rejected_at_deploy() {
        let err = try_deploy(
            r#"
version: "1.0"
pipeline: p
sources:
  - name: src
    plugin: no-such-plugin
sinks:
  - name: out
    plugin: table
    properties:
      dataset: out
      row.key.field: id
"#,
        )
        .unwrap_err();
        match err {
            DeployError::Plugin { stage, source } => {
                assert_eq!(stage, "src");
                assert_eq!(source.code, "UNKNOWN_PLUGIN");
            }
            other => panic!("expected plugin error, got {other}"),
        }
    }

    #[test]
    fn test_missing_property_rejected_at_deploy() {
        let err = try_deploy(
            r#"
version: "1.0"
pipeline: p
trigger:
  type: realtime
sources:
  - name: gen
    plugin: data-generator
sinks:
  - name: out
    plugin: table
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DeployError::Plugin { source, .. } if source.code == "MISSING_PROPERTY"));
    }

    #[test]
    fn test_realtime_source_rejected_in_batch_pipeline() {
        let err = try_deploy(
            r#"
version: "1.0"
pipeline: p
sources:
  - name: gen
    plugin: data-generator
sinks:
  - name: out
    plugin: table
    properties:
      dataset: out
      row.key.field: id
"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            DeployError::RoleMismatch { kind: "realtime_source", .. }
        ));
    }

    #[test]
    fn test_worker_on_batch_pipeline_rejected() {
        let app = try_deploy(
            r#"
version: "1.0"
pipeline: p
sources:
  - name: src
    plugin: tpfs-source
    properties:
      dataset: fs
sinks:
  - name: out
    plugin: table
    properties:
      dataset: out
      row.key.field: id
"#,
        )
        .unwrap();
        assert!(matches!(
            app.worker(),
            Err(DeployError::WrongTrigger { .. })
        ));
    }

    #[test]
    fn test_cycle_rejected_at_deploy() {
        let err = try_deploy(
            r#"
version: "1.0"
pipeline: cyclic
sources:
  - name: src
    plugin: tpfs-source
    properties:
      dataset: fs
transforms:
  - name: a
    plugin: projection
  - name: b
    plugin: projection
sinks:
  - name: out
    plugin: table
    properties:
      dataset: out
      row.key.field: id
connections:
  - from: src
    to: a
  - from: a
    to: b
  - from: b
    to: a
  - from: b
    to: out
"#,
        )
        .unwrap_err();
        assert!(matches!(err, DeployError::Graph(GraphError::Cycle(_))));
    }
}
