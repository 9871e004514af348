//! Time-partitioned fileset source and sink.
//!
//! The sink lands each run's records in a partition stamped with the run's
//! window end; the source reads exactly the partitions inside the run's
//! window `(start, end]`. Together they give incremental hand-off between
//! scheduled pipelines without reprocessing.

use aqueduct_types::error::ConnectorError;
use aqueduct_types::record::Record;

use crate::connector::{BatchSource, RunContext, Sink, StageContext};

/// Sink appending records as one partition per committed run.
pub struct TpfsSink {
    dataset: String,
    buffered: Vec<Record>,
}

impl TpfsSink {
    /// # Errors
    ///
    /// Returns a config error if `dataset` is missing.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            dataset: ctx.require("dataset")?.to_string(),
            buffered: Vec::new(),
        })
    }
}

impl Sink for TpfsSink {
    fn write(&mut self, _ctx: &RunContext, records: &[Record]) -> Result<(), ConnectorError> {
        self.buffered.extend_from_slice(records);
        Ok(())
    }

    fn commit(&mut self, ctx: &RunContext) -> Result<(), ConnectorError> {
        if self.buffered.is_empty() {
            return Ok(());
        }
        let records = std::mem::take(&mut self.buffered);
        ctx.datasets
            .add_partition(&self.dataset, ctx.window_end, records)
    }
}

/// Source reading the partitions that fall inside the run window.
pub struct TpfsSource {
    dataset: String,
}

impl TpfsSource {
    /// # Errors
    ///
    /// Returns a config error if `dataset` is missing.
    pub fn from_stage(ctx: &StageContext) -> Result<Self, ConnectorError> {
        Ok(Self {
            dataset: ctx.require("dataset")?.to_string(),
        })
    }
}

impl BatchSource for TpfsSource {
    fn read(&mut self, ctx: &RunContext) -> Result<Vec<Record>, ConnectorError> {
        ctx.datasets
            .partitions_in_range(&self.dataset, ctx.window_start, ctx.window_end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use aqueduct_types::record::Value;
    use aqueduct_types::schema::{Field, FieldType, Schema};
    use aqueduct_types::state::PipelineId;

    use crate::dataset::InMemoryDatasetStore;
    use crate::graph::StageRole;

    fn stage_ctx(role: StageRole, datasets: Arc<InMemoryDatasetStore>) -> StageContext {
        StageContext {
            stage: "fs".into(),
            role,
            properties: [("dataset".to_string(), "fs".to_string())]
                .into_iter()
                .collect(),
            datasets,
        }
    }

    fn run_ctx(datasets: Arc<InMemoryDatasetStore>, start: i64, end: i64) -> RunContext {
        RunContext {
            pipeline: PipelineId::new("p"),
            run_id: 1,
            window_start: start,
            window_end: end,
            datasets,
        }
    }

    fn record(id: i32) -> Record {
        let schema = Arc::new(
            Schema::record_of("r", vec![Field::of("id", FieldType::Int)]).unwrap(),
        );
        Record::builder(schema)
            .set("id", id)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_sink_partition_visible_in_matching_window() {
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let mut sink = TpfsSink::from_stage(&stage_ctx(StageRole::Sink, Arc::clone(&datasets))).unwrap();
        let write_run = run_ctx(Arc::clone(&datasets), 0, 100);
        sink.write(&write_run, &[record(1)]).unwrap();
        sink.commit(&write_run).unwrap();

        let mut source =
            TpfsSource::from_stage(&stage_ctx(StageRole::Source, Arc::clone(&datasets))).unwrap();

        // Window covering the partition sees the record.
        let records = source.read(&run_ctx(Arc::clone(&datasets), 0, 100)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("id"), Some(&Value::Int(1)));

        // A later, disjoint window sees nothing.
        let records = source.read(&run_ctx(datasets, 100, 200)).unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_empty_run_creates_no_partition() {
        let datasets = Arc::new(InMemoryDatasetStore::new());
        let mut sink = TpfsSink::from_stage(&stage_ctx(StageRole::Sink, Arc::clone(&datasets))).unwrap();
        let run = run_ctx(Arc::clone(&datasets), 0, 100);
        sink.commit(&run).unwrap();

        // Nothing written, dataset never created.
        let mut source =
            TpfsSource::from_stage(&stage_ctx(StageRole::Source, Arc::clone(&datasets))).unwrap();
        assert!(source.read(&run).is_err());
    }
}
