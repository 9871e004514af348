//! State backend trait definition.
//!
//! [`StateBackend`] defines the storage contract for pipeline run
//! history, watermarks, and dead-letter records.

use aqueduct_types::error::FailedRecord;
use aqueduct_types::state::{PipelineId, RunRecord, RunStats, RunStatus};

use crate::error;

/// Storage contract for pipeline run state.
///
/// Implementations must be `Send + Sync` for use behind `Arc<dyn StateBackend>`.
pub trait StateBackend: Send + Sync {
    /// Record a new run in `Scheduled` state, returning its unique ID.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn start_run(&self, pipeline: &PipelineId) -> error::Result<i64>;

    /// Transition a run from `Scheduled` to `Running`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn mark_running(&self, run_id: i64) -> error::Result<()>;

    /// Finalize a run with a terminal status and aggregate stats.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn complete_run(&self, run_id: i64, status: RunStatus, stats: &RunStats)
        -> error::Result<()>;

    /// Read the watermark (end of the last committed window, epoch millis)
    /// for a pipeline. `Ok(None)` when no run has committed yet.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn get_watermark(&self, pipeline: &PipelineId) -> error::Result<Option<i64>>;

    /// Advance the watermark for a pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn set_watermark(&self, pipeline: &PipelineId, millis: i64) -> error::Result<()>;

    /// Persist dead-letter records for a run. Returns the count inserted.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn insert_failed_records(
        &self,
        pipeline: &PipelineId,
        run_id: i64,
        records: &[FailedRecord],
    ) -> error::Result<u64>;

    /// Dead-letter records persisted for a run, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_failed_records(
        &self,
        pipeline: &PipelineId,
        run_id: i64,
    ) -> error::Result<Vec<FailedRecord>>;

    /// Most recent runs for a pipeline, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StateError`](crate::error::StateError) on storage failure.
    fn list_runs(&self, pipeline: &PipelineId, limit: u32) -> error::Result<Vec<RunRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Verify the trait is object-safe (can be used as `dyn StateBackend`).
    #[test]
    fn trait_is_object_safe() {
        fn _assert_object_safe(_: &dyn StateBackend) {}
    }
}
