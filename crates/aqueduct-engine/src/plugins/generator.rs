//! Deterministic record generator for wiring up and exercising pipelines.

use std::sync::Arc;

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::Record;
use aqueduct_types::schema::{Field, FieldType, Schema};

use crate::connector::{RealtimeSource, RunContext, StageContext};

/// What shape of record to generate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GeneratorType {
    /// One event-shaped record per poll: body `Hello`, header `h1: v1`.
    Stream,
    /// One row-shaped record per poll: a fixed user row plus a timestamp.
    Table,
}

/// Realtime source emitting one well-known record per poll.
#[derive(Debug)]
pub struct DataGeneratorSource {
    schema: Arc<Schema>,
    generator_type: GeneratorType,
}

impl DataGeneratorSource {
    /// Build from stage properties. The `type` property selects the record
    /// shape and defaults to `stream`.
    ///
    /// # Errors
    ///
    /// Returns a config error for an unrecognized `type`.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        let generator_type = match ctx.get("type").unwrap_or("stream") {
            "stream" => GeneratorType::Stream,
            "table" => GeneratorType::Table,
            other => {
                return Err(ConnectorError::config(
                    "BAD_GENERATOR_TYPE",
                    format!("unknown generator type '{other}', expected 'stream' or 'table'"),
                ))
            }
        };

        let schema = match generator_type {
            GeneratorType::Stream => Schema::record_of(
                "event",
                vec![
                    Field::of("body", FieldType::String),
                    Field::of("h1", FieldType::String),
                ],
            ),
            GeneratorType::Table => Schema::record_of(
                "row",
                vec![
                    Field::of("id", FieldType::Int),
                    Field::of("name", FieldType::String),
                    Field::of("score", FieldType::Double),
                    Field::of("graduated", FieldType::Boolean),
                    Field::nullable_of("binary", FieldType::Bytes),
                    Field::of("time", FieldType::Long),
                ],
            ),
        }
        .map_err(|e| ConnectorError::config("BAD_SCHEMA", e.to_string()))?;

        Ok(Self {
            schema: Arc::new(schema),
            generator_type,
        })
    }

    fn generate(&self) -> Result<Record, ConnectorError> {
        match self.generator_type {
            GeneratorType::Stream => Record::builder(Arc::clone(&self.schema))
                .set("body", "Hello")?
                .set("h1", "v1")?
                .build(),
            GeneratorType::Table => Record::builder(Arc::clone(&self.schema))
                .set("id", 1)?
                .set("name", "Bob")?
                .set("score", 3.4)?
                .set("graduated", false)?
                .set("binary", b"Bob".as_slice())?
                .set("time", chrono::Utc::now().timestamp_millis())?
                .build(),
        }
    }
}

impl RealtimeSource for DataGeneratorSource {
    fn poll(&mut self, _ctx: &RunContext) -> Result<Vec<Record>, ConnectorError> {
        Ok(vec![self.generate()?])
    }
}
