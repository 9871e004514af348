//! Shared model types for Aqueduct pipelines.
//!
//! Pure data types with no I/O: record schemas, records, run-state
//! newtypes, and the typed connector error model. Kept in a separate
//! crate so the engine, state backend, and CLI can share them without
//! circular dependencies.

pub mod error;
pub mod record;
pub mod schema;
pub mod state;

pub use error::{ConnectorError, ErrorCategory, FailedRecord};
pub use record::{Record, Value};
pub use schema::{Field, FieldType, Schema, SchemaError};
pub use state::{DatasetName, PipelineId, RunRecord, RunStats, RunStatus, StageName};
