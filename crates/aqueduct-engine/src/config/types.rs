use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub version: String,
    pub pipeline: String,
    #[serde(default)]
    pub trigger: Trigger,
    pub sources: Vec<StageConfig>,
    #[serde(default)]
    pub transforms: Vec<StageConfig>,
    pub sinks: Vec<StageConfig>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default)]
    pub on_record_error: RecordErrorPolicy,
    #[serde(default)]
    pub state: StateConfig,
}

impl PipelineConfig {
    /// Connections as declared, or the implicit linear chain
    /// sources -> transforms -> sinks when none are declared.
    pub fn effective_connections(&self) -> Vec<Connection> {
        if !self.connections.is_empty() {
            return self.connections.clone();
        }
        let order: Vec<&str> = self
            .sources
            .iter()
            .chain(self.transforms.iter())
            .chain(self.sinks.iter())
            .map(|s| s.name.as_str())
            .collect();
        order
            .windows(2)
            .map(|pair| Connection {
                from: pair[0].to_string(),
                to: pair[1].to_string(),
            })
            .collect()
    }

    /// All stage configs in declaration order (sources, transforms, sinks).
    pub fn all_stages(&self) -> impl Iterator<Item = &StageConfig> {
        self.sources
            .iter()
            .chain(self.transforms.iter())
            .chain(self.sinks.iter())
    }
}

/// One stage of the pipeline: a named plugin instance with string properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub plugin: String,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A directed edge between two stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
}

/// How the pipeline is driven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// One bounded run per invocation, with an optional cron schedule hint.
    Batch {
        #[serde(default)]
        schedule: Option<String>,
    },
    /// Long-running polling workers.
    Realtime {
        #[serde(default = "default_instances")]
        instances: u32,
    },
}

fn default_instances() -> u32 {
    1
}

impl Default for Trigger {
    fn default() -> Self {
        Self::Batch { schedule: None }
    }
}

/// Policy for records a transform or sink rejects mid-run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordErrorPolicy {
    /// Route the record to the failed-record store and continue.
    #[default]
    Skip,
    /// Fail the whole run on the first rejected record.
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    pub connection: Option<String>,
}

fn default_backend() -> String {
    "sqlite".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connection: None,
        }
    }
}
