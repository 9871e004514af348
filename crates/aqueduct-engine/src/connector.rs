//! Connector interfaces and the plugin registry.
//!
//! Connectors are synchronous; drivers run them on blocking worker threads.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::Record;
use aqueduct_types::state::PipelineId;

use crate::dataset::DatasetStore;
use crate::graph::StageRole;

/// Per-run execution context shared by every stage.
#[derive(Clone)]
pub struct RunContext {
    pub pipeline: PipelineId,
    pub run_id: i64,
    /// Batch window start, epoch millis (exclusive lower bound).
    pub window_start: i64,
    /// Batch window end, epoch millis (inclusive upper bound).
    pub window_end: i64,
    pub datasets: Arc<dyn DatasetStore>,
}

/// Bounded source: produces the full record set for one batch window.
pub trait BatchSource: Send {
    /// # Errors
    ///
    /// Returns a [`ConnectorError`] if reading fails.
    fn read(&mut self, ctx: &RunContext) -> Result<Vec<Record>, ConnectorError>;
}

/// Unbounded source: produces whatever is available right now.
/// An empty result means "nothing yet, poll again".
pub trait RealtimeSource: Send {
    /// # Errors
    ///
    /// Returns a [`ConnectorError`] if polling fails.
    fn poll(&mut self, ctx: &RunContext) -> Result<Vec<Record>, ConnectorError>;
}

/// Record-at-a-time transform. May emit zero, one, or many records per input.
pub trait Transform: Send {
    /// # Errors
    ///
    /// Returns a [`ConnectorError`] if the record cannot be transformed;
    /// the driver's record error policy decides whether the run continues.
    fn apply(
        &mut self,
        ctx: &RunContext,
        record: &Record,
        out: &mut Vec<Record>,
    ) -> Result<(), ConnectorError>;
}

/// Batch-of-records sink. Writes buffer until [`Sink::commit`]; a run that
/// fails before commit leaves the sink's dataset untouched.
pub trait Sink: Send {
    /// # Errors
    ///
    /// Returns a [`ConnectorError`] if buffering the records fails.
    fn write(&mut self, ctx: &RunContext, records: &[Record]) -> Result<(), ConnectorError>;

    /// # Errors
    ///
    /// Returns a [`ConnectorError`] if publishing buffered writes fails.
    fn commit(&mut self, ctx: &RunContext) -> Result<(), ConnectorError>;
}

/// An instantiated stage connector.
pub enum ConnectorInstance {
    BatchSource(Box<dyn BatchSource>),
    RealtimeSource(Box<dyn RealtimeSource>),
    Transform(Box<dyn Transform>),
    Sink(Box<dyn Sink>),
}

impl std::fmt::Debug for ConnectorInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ConnectorInstance").field(&self.kind()).finish()
    }
}

impl ConnectorInstance {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BatchSource(_) => "batch_source",
            Self::RealtimeSource(_) => "realtime_source",
            Self::Transform(_) => "transform",
            Self::Sink(_) => "sink",
        }
    }
}

/// Everything a plugin factory sees at instantiation time.
pub struct StageContext {
    pub stage: String,
    pub role: StageRole,
    pub properties: BTreeMap<String, String>,
    pub datasets: Arc<dyn DatasetStore>,
}

impl StageContext {
    /// Required string property.
    ///
    /// # Errors
    ///
    /// Returns a config [`ConnectorError`] if the property is absent.
    pub fn require(&self, key: &str) -> Result<&str, ConnectorError> {
        self.properties.get(key).map(String::as_str).ok_or_else(|| {
            ConnectorError::config(
                "MISSING_PROPERTY",
                format!("stage '{}' requires property '{key}'", self.stage),
            )
        })
    }

    /// Optional string property.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

type Factory = Box<dyn Fn(&StageContext) -> Result<ConnectorInstance, ConnectorError> + Send + Sync>;

/// Registry mapping plugin names to connector factories.
pub struct PluginRegistry {
    factories: HashMap<String, Factory>,
}

impl PluginRegistry {
    /// Empty registry, no plugins registered.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry preloaded with the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::plugins::register_builtins(&mut registry);
        registry
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&StageContext) -> Result<ConnectorInstance, ConnectorError> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Box::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the named plugin for a stage.
    ///
    /// # Errors
    ///
    /// Returns a config [`ConnectorError`] if the plugin is unknown or its
    /// factory rejects the stage properties.
    pub fn instantiate(
        &self,
        plugin: &str,
        ctx: &StageContext,
    ) -> Result<ConnectorInstance, ConnectorError> {
        let factory = self.factories.get(plugin).ok_or_else(|| {
            ConnectorError::config(
                "UNKNOWN_PLUGIN",
                format!("no plugin registered under '{plugin}'"),
            )
        })?;
        factory(ctx)
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}
