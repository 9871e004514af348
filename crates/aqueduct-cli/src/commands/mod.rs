pub mod check;
pub mod history;
pub mod run;
pub mod worker;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use aqueduct_engine::config::parser;
use aqueduct_engine::{deploy, open_state_backend, App, InMemoryDatasetStore, PluginRegistry};

/// Parse, validate, and deploy a pipeline file with the built-in plugins.
pub fn deploy_pipeline(pipeline_path: &Path) -> Result<App> {
    let config = parser::parse_pipeline(pipeline_path)
        .with_context(|| format!("Failed to parse pipeline: {}", pipeline_path.display()))?;
    let state = open_state_backend(&config.state)?;
    let app = deploy(
        config,
        Arc::new(PluginRegistry::with_builtins()),
        Arc::new(InMemoryDatasetStore::new()),
        state,
    )?;
    Ok(app)
}
