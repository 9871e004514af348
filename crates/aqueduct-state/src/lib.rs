//! State backend for Aqueduct pipelines.
//!
//! Persists run history (the `Scheduled → Running → {Succeeded, Failed}`
//! state machine), per-pipeline watermarks used to bound batch windows,
//! and dead-letter records for per-record failures. Model types live in
//! [`aqueduct_types::state`].

pub mod backend;
pub mod error;
pub mod sqlite;

pub use backend::StateBackend;
pub use error::{Result, StateError};
pub use sqlite::SqliteStateBackend;
