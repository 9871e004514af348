//! Keyed table sink and source.

use std::sync::Arc;

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::{Record, Value};
use aqueduct_types::schema::{FieldType, Schema};
use tracing::warn;

use crate::connector::{BatchSource, RunContext, Sink, StageContext};
use crate::dataset::Row;

fn key_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Bytes(bytes) => bytes.clone(),
        other => other.render().into_bytes(),
    }
}

/// Sink writing each record as a row keyed by one of its fields.
///
/// The key field is excluded from the stored columns; null column values are
/// not stored. A record whose key field is null is skipped with a warning.
#[derive(Debug)]
pub struct TableSink {
    dataset: String,
    row_key_field: String,
    buffered: Vec<(Vec<u8>, Row)>,
}

impl TableSink {
    /// # Errors
    ///
    /// Returns a config error if `dataset` or `row.key.field` is missing.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            dataset: ctx.require("dataset")?.to_string(),
            row_key_field: ctx.require("row.key.field")?.to_string(),
            buffered: Vec::new(),
        })
    }
}

impl Sink for TableSink {
    fn write(&mut self, _ctx: &RunContext, records: &[Record]) -> Result<(), ConnectorError> {
        for record in records {
            let key = match record.get(&self.row_key_field) {
                Some(value) if !value.is_null() => key_bytes(value),
                Some(_) => {
                    warn!(
                        dataset = %self.dataset,
                        field = %self.row_key_field,
                        "skipping record with null row key"
                    );
                    continue;
                }
                None => {
                    return Err(ConnectorError::data(
                        "MISSING_ROW_KEY",
                        format!(
                            "record schema has no row key field '{}'",
                            self.row_key_field
                        ),
                    ))
                }
            };

            let columns: Row = record
                .schema()
                .fields()
                .iter()
                .zip(record.values())
                .filter(|(field, value)| field.name != self.row_key_field && !value.is_null())
                .map(|(field, value)| (field.name.clone(), value.clone()))
                .collect();
            self.buffered.push((key, columns));
        }
        Ok(())
    }

    fn commit(&mut self, ctx: &RunContext) -> Result<(), ConnectorError> {
        for (key, columns) in self.buffered.drain(..) {
            ctx.datasets.put_row(&self.dataset, key, columns)?;
        }
        Ok(())
    }
}

/// Batch source reading every row of a table back into records.
pub struct TableSource {
    dataset: String,
    row_key_field: Option<String>,
    schema: Arc<Schema>,
}

impl TableSource {
    /// # Errors
    ///
    /// Returns a config error if `dataset` or `schema` is missing, or the
    /// schema JSON does not parse.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        let dataset = ctx.require("dataset")?.to_string();
        let schema = Schema::from_json(ctx.require("schema")?)
            .map_err(|e| ConnectorError::config("BAD_SCHEMA", e.to_string()))?;
        Ok(Self {
            dataset,
            row_key_field: ctx.get("row.key.field").map(str::to_string),
            schema: Arc::new(schema),
        })
    }

    fn key_value(key: &[u8], field_type: FieldType) -> Result<Value, ConnectorError> {
        if field_type == FieldType::Bytes {
            return Ok(Value::Bytes(key.to_vec()));
        }
        Value::parse_as(&String::from_utf8_lossy(key), field_type)
    }
}

impl BatchSource for TableSource {
    fn read(&mut self, ctx: &RunContext) -> Result<Vec<Record>, ConnectorError> {
        let rows = ctx.datasets.scan_rows(&self.dataset)?;
        let mut records = Vec::with_capacity(rows.len());
        for (key, columns) in rows {
            let mut builder = Record::builder(Arc::clone(&self.schema));
            for field in self.schema.fields() {
                let value = if Some(&field.name) == self.row_key_field.as_ref() {
                    Some(Self::key_value(&key, field.field_type)?)
                } else {
                    columns.get(&field.name).cloned()
                };
                if let Some(value) = value {
                    builder = builder.set(&field.name, value)?;
                }
            }
            records.push(builder.build()?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use aqueduct_types::schema::Field;
    use aqueduct_types::state::PipelineId;

    use crate::dataset::{DatasetStore, InMemoryDatasetStore};
    use crate::graph::StageRole;

    fn stage_ctx(
        role: StageRole,
        properties: &[(&str, &str)],
        datasets: Arc<InMemoryDatasetStore>,
    ) -> StageContext {
        StageContext {
            stage: "t".into(),
            role,
            properties: properties
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect::<BTreeMap<_, _>>(),
            datasets,
        }
    }

    fn run_ctx(datasets: Arc<InMemoryDatasetStore>) -> RunContext {
        RunContext {
            pipeline: PipelineId::new("p"),
            run_id: 1,
            window_start: 0,
            window_end: 1,
            datasets,
        }
    }

    fn user_schema() -> Arc<Schema> {
        Arc::new(
            Schema::record_of(
                "user",
                vec![
                    Field::of("id", FieldType::Int),
                    Field::of("name", FieldType::String),
                    Field::nullable_of("binary", FieldType::Bytes),
                ],
            )
            .unwrap(),
        )
    }

    fn user(id: i32, name: &str, binary: Option<&[u8]>) -> Record {
        let mut builder = Record::builder(user_schema())
            .set("id", id)
            .unwrap()
            .set("name", name)
            .unwrap();
        if let Some(bytes) = binary {
            builder = builder.set("binary", bytes).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_sink_excludes_key_and_nulls() {
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let ctx = stage_ctx(
            StageRole::Sink,
            &[("dataset", "out"), ("row.key.field", "binary")],
            Arc::clone(&datasets),
        );
        let mut sink = TableSink::from_stage(&ctx).unwrap();
        let run = run_ctx(Arc::clone(&datasets));

        sink.write(&run, &[user(1, "Bob", Some(b"Bob"))]).unwrap();
        sink.commit(&run).unwrap();

        let row = datasets.get_row("out", b"Bob").unwrap().unwrap();
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("name"), Some(&Value::String("Bob".into())));
        assert!(!row.contains_key("binary"));
    }

    #[test]
    fn test_sink_skips_null_key() {
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let ctx = stage_ctx(
            StageRole::Sink,
            &[("dataset", "out"), ("row.key.field", "binary")],
            Arc::clone(&datasets),
        );
        let mut sink = TableSink::from_stage(&ctx).unwrap();
        let run = run_ctx(Arc::clone(&datasets));

        sink.write(&run, &[user(1, "Bob", None), user(2, "Rob", Some(b"Rob"))])
            .unwrap();
        sink.commit(&run).unwrap();

        let rows = datasets.scan_rows("out").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].0, b"Rob".to_vec());
    }

    #[test]
    fn test_sink_buffers_until_commit() {
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let ctx = stage_ctx(
            StageRole::Sink,
            &[("dataset", "out"), ("row.key.field", "name")],
            Arc::clone(&datasets),
        );
        let mut sink = TableSink::from_stage(&ctx).unwrap();
        let run = run_ctx(Arc::clone(&datasets));

        sink.write(&run, &[user(1, "Bob", None)]).unwrap();
        // Not committed yet: dataset should not exist.
        assert!(datasets.scan_rows("out").is_err());

        sink.commit(&run).unwrap();
        assert_eq!(datasets.scan_rows("out").unwrap().len(), 1);
    }

    #[test]
    fn test_source_round_trip_with_key_field() {
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let sink_ctx = stage_ctx(
            StageRole::Sink,
            &[("dataset", "users"), ("row.key.field", "name")],
            Arc::clone(&datasets),
        );
        let mut sink = TableSink::from_stage(&sink_ctx).unwrap();
        let run = run_ctx(Arc::clone(&datasets));
        sink.write(&run, &[user(7, "Ann", Some(b"x"))]).unwrap();
        sink.commit(&run).unwrap();

        let schema_json = user_schema().to_json();
        let source_ctx = stage_ctx(
            StageRole::Source,
            &[
                ("dataset", "users"),
                ("row.key.field", "name"),
                ("schema", schema_json.as_str()),
            ],
            Arc::clone(&datasets),
        );
        let mut source = TableSource::from_stage(&source_ctx).unwrap();
        let records = source.read(&run).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("id"), Some(&Value::Int(7)));
        assert_eq!(records[0].get("name"), Some(&Value::String("Ann".into())));
        assert_eq!(records[0].get("binary"), Some(&Value::Bytes(b"x".to_vec())));
    }

    #[test]
    fn test_source_missing_dataset_errors() {
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let schema_json = user_schema().to_json();
        let ctx = stage_ctx(
            StageRole::Source,
            &[("dataset", "nowhere"), ("schema", schema_json.as_str())],
            Arc::clone(&datasets),
        );
        let mut source = TableSource::from_stage(&ctx).unwrap();
        let err = source.read(&run_ctx(datasets)).unwrap_err();
        assert_eq!(err.code, "DATASET_NOT_FOUND");
    }

    #[test]
    fn test_sink_requires_properties() {
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let ctx = stage_ctx(StageRole::Sink, &[("dataset", "out")], datasets);
        let err = TableSink::from_stage(&ctx).unwrap_err();
        assert_eq!(err.code, "MISSING_PROPERTY");
    }
}
