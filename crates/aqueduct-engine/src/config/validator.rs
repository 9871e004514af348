//! Semantic validation for parsed pipeline configuration values.

use anyhow::{bail, Result};

use crate::config::types::{PipelineConfig, StageConfig, Trigger};

fn validate_stage(stage: &StageConfig, context: &str, errors: &mut Vec<String>) {
    if stage.name.trim().is_empty() {
        errors.push(format!("{context}: stage name must not be empty"));
    }
    if stage.plugin.trim().is_empty() {
        errors.push(format!(
            "{context}: stage '{}' has an empty plugin reference",
            stage.name
        ));
    }
}

/// Validate a parsed pipeline configuration.
/// Returns `Ok(())` if valid, Err with all validation errors if not.
///
/// Structural graph checks (cycles, unknown endpoints, reachability) live in
/// the planner; this pass covers everything checkable stage-by-stage.
///
/// # Errors
///
/// Returns an error listing all validation failures found in the pipeline config.
pub fn validate_pipeline(config: &PipelineConfig) -> Result<()> {
    let mut errors = Vec::new();

    if config.version != "1.0" {
        errors.push(format!(
            "Unsupported pipeline version '{}', expected '1.0'",
            config.version
        ));
    }

    if config.pipeline.trim().is_empty() {
        errors.push("Pipeline name must not be empty".to_string());
    }

    if config.sources.is_empty() {
        errors.push("Pipeline must define at least one source".to_string());
    }

    if config.sinks.is_empty() {
        errors.push("Pipeline must define at least one sink".to_string());
    }

    for (i, stage) in config.sources.iter().enumerate() {
        validate_stage(stage, &format!("sources[{i}]"), &mut errors);
    }
    for (i, stage) in config.transforms.iter().enumerate() {
        validate_stage(stage, &format!("transforms[{i}]"), &mut errors);
    }
    for (i, stage) in config.sinks.iter().enumerate() {
        validate_stage(stage, &format!("sinks[{i}]"), &mut errors);
    }

    let mut seen_edges = std::collections::HashSet::new();
    for (i, conn) in config.connections.iter().enumerate() {
        if conn.from.trim().is_empty() || conn.to.trim().is_empty() {
            errors.push(format!("connections[{i}]: endpoints must not be empty"));
        }
        if conn.from == conn.to {
            errors.push(format!(
                "connections[{i}]: self-loop on stage '{}'",
                conn.from
            ));
        }
        // A duplicate edge would deliver every record twice downstream.
        if !seen_edges.insert((conn.from.as_str(), conn.to.as_str())) {
            errors.push(format!(
                "connections[{i}]: duplicate connection '{}' -> '{}'",
                conn.from, conn.to
            ));
        }
    }

    // With multiple sources or sinks the implicit linear chain is ambiguous.
    if config.connections.is_empty() && (config.sources.len() > 1 || config.sinks.len() > 1) {
        errors.push(
            "Pipelines with multiple sources or sinks must declare explicit connections"
                .to_string(),
        );
    }

    if let Trigger::Realtime { instances } = config.trigger {
        if instances == 0 {
            errors.push("Realtime trigger requires at least 1 instance".to_string());
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        bail!("Pipeline validation failed:\n  - {}", errors.join("\n  - "));
    }
}
