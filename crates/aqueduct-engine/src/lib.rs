//! Aqueduct pipeline engine.
//!
//! Parses pipeline configs into stage DAGs, validates and deploys them, and
//! drives them in batch (bounded windows with watermarks) or realtime
//! (polling workers) mode over pluggable connectors.

pub mod batch;
pub mod config;
pub mod connector;
pub mod dataset;
pub mod deploy;
pub mod error;
pub mod graph;
pub mod plugins;
pub mod worker;

pub use batch::RunSummary;
pub use config::{parse_pipeline, parse_pipeline_str, validate_pipeline, PipelineConfig};
pub use connector::{
    BatchSource, ConnectorInstance, PluginRegistry, RealtimeSource, RunContext, Sink,
    StageContext, Transform,
};
pub use dataset::{DatasetStore, InMemoryDatasetStore, StreamEvent};
pub use deploy::{deploy, open_state_backend, App, DeployError};
pub use error::PipelineError;
pub use graph::{ExecutionPlan, GraphError, StageRole};
pub use worker::Worker;
