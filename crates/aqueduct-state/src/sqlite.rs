//! `SQLite`-backed implementation of [`StateBackend`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use aqueduct_types::error::{ErrorCategory, FailedRecord};
use aqueduct_types::state::{PipelineId, RunRecord, RunStats, RunStatus};
use chrono::NaiveDateTime;
use rusqlite::Connection;

use crate::backend::StateBackend;
use crate::error::{self, StateError};

/// `SQLite` datetime format (UTC, no timezone suffix).
const SQLITE_DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

/// Idempotent DDL for state tables.
const CREATE_TABLES: &str = r"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS pipeline_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline TEXT NOT NULL,
    status TEXT NOT NULL,
    started_at TEXT NOT NULL DEFAULT (datetime('now')),
    finished_at TEXT,
    records_read INTEGER DEFAULT 0,
    records_written INTEGER DEFAULT 0,
    records_failed INTEGER DEFAULT 0,
    error_message TEXT
);

CREATE TABLE IF NOT EXISTS watermarks (
    pipeline TEXT PRIMARY KEY,
    watermark_millis INTEGER NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS failed_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    pipeline TEXT NOT NULL,
    run_id INTEGER NOT NULL REFERENCES pipeline_runs(id),
    stage TEXT NOT NULL,
    record_json TEXT NOT NULL,
    error_message TEXT NOT NULL,
    error_category TEXT NOT NULL,
    failed_at TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_failed_pipeline_run ON failed_records (pipeline, run_id);
";

/// `SQLite`-backed state storage.
///
/// Create with [`SqliteStateBackend::open`] for file-backed persistence
/// or [`SqliteStateBackend::in_memory`] for tests.
pub struct SqliteStateBackend {
    conn: Mutex<Connection>,
}

impl SqliteStateBackend {
    /// Open or create a `SQLite` state database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created, or a
    /// backend error if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| StateError::backend("open", e))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StateError::backend("create_tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory `SQLite` backend (for testing).
    ///
    /// # Errors
    ///
    /// Returns a backend error if the in-memory database can't be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StateError::backend("open_in_memory", e))?;
        conn.execute_batch(CREATE_TABLES)
            .map_err(|e| StateError::backend("create_tables", e))?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    /// Convert a `SQLite` datetime string to ISO-8601.
    fn sqlite_to_iso8601(raw: &str) -> String {
        NaiveDateTime::parse_from_str(raw, SQLITE_DATETIME_FMT).map_or_else(
            |_| raw.to_string(),
            |ndt| format!("{}Z", ndt.format("%Y-%m-%dT%H:%M:%S")),
        )
    }
}

impl StateBackend for SqliteStateBackend {
    fn start_run(&self, pipeline: &PipelineId) -> error::Result<i64> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO pipeline_runs (pipeline, status) VALUES (?1, ?2)",
            rusqlite::params![pipeline.as_str(), RunStatus::Scheduled.as_str()],
        )
        .map_err(|e| StateError::backend("start_run", e))?;
        Ok(conn.last_insert_rowid())
    }

    fn mark_running(&self, run_id: i64) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE pipeline_runs SET status = ?1 WHERE id = ?2",
            rusqlite::params![RunStatus::Running.as_str(), run_id],
        )
        .map_err(|e| StateError::backend("mark_running", e))?;
        Ok(())
    }

    #[allow(clippy::cast_possible_wrap)]
    fn complete_run(
        &self,
        run_id: i64,
        status: RunStatus,
        stats: &RunStats,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "UPDATE pipeline_runs SET status = ?1, finished_at = datetime('now'), \
             records_read = ?2, records_written = ?3, records_failed = ?4, error_message = ?5 \
             WHERE id = ?6",
            rusqlite::params![
                status.as_str(),
                stats.records_read as i64,
                stats.records_written as i64,
                stats.records_failed as i64,
                stats.error_message,
                run_id,
            ],
        )
        .map_err(|e| StateError::backend("complete_run", e))?;
        Ok(())
    }

    fn get_watermark(&self, pipeline: &PipelineId) -> error::Result<Option<i64>> {
        let conn = self.lock_conn()?;
        let result = conn.query_row(
            "SELECT watermark_millis FROM watermarks WHERE pipeline = ?1",
            rusqlite::params![pipeline.as_str()],
            |row| row.get::<_, i64>(0),
        );
        match result {
            Ok(millis) => Ok(Some(millis)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StateError::backend("get_watermark", e)),
        }
    }

    fn set_watermark(&self, pipeline: &PipelineId, millis: i64) -> error::Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO watermarks (pipeline, watermark_millis, updated_at) \
             VALUES (?1, ?2, datetime('now')) \
             ON CONFLICT(pipeline) \
             DO UPDATE SET watermark_millis = ?2, updated_at = datetime('now')",
            rusqlite::params![pipeline.as_str(), millis],
        )
        .map_err(|e| StateError::backend("set_watermark", e))?;
        Ok(())
    }

    fn insert_failed_records(
        &self,
        pipeline: &PipelineId,
        run_id: i64,
        records: &[FailedRecord],
    ) -> error::Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let conn = self.lock_conn()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| StateError::backend("insert_failed_records: begin tx", e))?;
        let mut stmt = tx
            .prepare(
                "INSERT INTO failed_records \
                 (pipeline, run_id, stage, record_json, error_message, error_category, failed_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(|e| StateError::backend("insert_failed_records: prepare", e))?;

        let mut count = 0u64;
        for record in records {
            stmt.execute(rusqlite::params![
                pipeline.as_str(),
                run_id,
                record.stage,
                record.record_json,
                record.error_message,
                record.error_category.as_str(),
                record.failed_at,
            ])
            .map_err(|e| StateError::backend("insert_failed_records: execute", e))?;
            count += 1;
        }
        drop(stmt);
        tx.commit()
            .map_err(|e| StateError::backend("insert_failed_records: commit", e))?;

        Ok(count)
    }

    fn list_failed_records(
        &self,
        pipeline: &PipelineId,
        run_id: i64,
    ) -> error::Result<Vec<FailedRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT stage, record_json, error_message, error_category, failed_at \
                 FROM failed_records WHERE pipeline = ?1 AND run_id = ?2 ORDER BY id",
            )
            .map_err(|e| StateError::backend("list_failed_records: prepare", e))?;

        let rows = stmt
            .query_map(rusqlite::params![pipeline.as_str(), run_id], |row| {
                let category_raw: String = row.get(3)?;
                Ok(FailedRecord {
                    stage: row.get(0)?,
                    record_json: row.get(1)?,
                    error_message: row.get(2)?,
                    error_category: match category_raw.as_str() {
                        "config" => ErrorCategory::Config,
                        "transient" => ErrorCategory::Transient,
                        _ => ErrorCategory::Data,
                    },
                    failed_at: row.get(4)?,
                })
            })
            .map_err(|e| StateError::backend("list_failed_records: query", e))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(|e| StateError::backend("list_failed_records: row", e))?);
        }
        Ok(records)
    }

    #[allow(clippy::cast_sign_loss)]
    fn list_runs(&self, pipeline: &PipelineId, limit: u32) -> error::Result<Vec<RunRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, status, started_at, finished_at, \
                 records_read, records_written, records_failed, error_message \
                 FROM pipeline_runs WHERE pipeline = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| StateError::backend("list_runs: prepare", e))?;

        let rows = stmt
            .query_map(rusqlite::params![pipeline.as_str(), limit], |row| {
                let status_raw: String = row.get(1)?;
                let started_at: String = row.get(2)?;
                let finished_at: Option<String> = row.get(3)?;
                Ok(RunRecord {
                    run_id: row.get(0)?,
                    pipeline: pipeline.clone(),
                    status: RunStatus::parse(&status_raw).unwrap_or(RunStatus::Failed),
                    started_at: Self::sqlite_to_iso8601(&started_at),
                    finished_at: finished_at.as_deref().map(Self::sqlite_to_iso8601),
                    stats: RunStats {
                        records_read: row.get::<_, i64>(4)? as u64,
                        records_written: row.get::<_, i64>(5)? as u64,
                        records_failed: row.get::<_, i64>(6)? as u64,
                        error_message: row.get(7)?,
                    },
                })
            })
            .map_err(|e| StateError::backend("list_runs: query", e))?;

        let mut runs = Vec::new();
        for row in rows {
            runs.push(row.map_err(|e| StateError::backend("list_runs: row", e))?);
        }
        Ok(runs)
    }
}
