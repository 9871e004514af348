//! Typed connector error model.
//!
//! Connectors report failures as [`ConnectorError`] values with a
//! category and a stable code; the engine uses the category and the
//! `retryable` flag to decide between failing a run, retrying it, and
//! isolating a single bad record.

use serde::{Deserialize, Serialize};

/// Broad classification of a connector failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Bad configuration: surfaced at deploy time, never retried.
    Config,
    /// A single record could not be processed; isolated per record.
    Data,
    /// Transient environment failure (connection reset, lock timeout).
    Transient,
}

impl ErrorCategory {
    /// Wire-format string for storage.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Data => "data",
            Self::Transient => "transient",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed connector failure with retry metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorError {
    pub category: ErrorCategory,
    /// Stable machine-readable code, e.g. `MISSING_PROPERTY`.
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ConnectorError {
    /// A configuration error (never retryable).
    #[must_use]
    pub fn config(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Config,
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// A per-record data error (never retryable).
    #[must_use]
    pub fn data(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Data,
            code: code.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// A transient environment error (retryable).
    #[must_use]
    pub fn transient(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category: ErrorCategory::Transient,
            code: code.into(),
            message: message.into(),
            retryable: true,
        }
    }
}

impl std::fmt::Display for ConnectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} error [{}]: {}", self.category, self.code, self.message)
    }
}

impl std::error::Error for ConnectorError {}

/// A record that failed inside a transform or sink, persisted to the
/// dead-letter table so bad data never silently disappears.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecord {
    /// Stage where the failure occurred.
    pub stage: String,
    /// JSON rendering of the offending record.
    pub record_json: String,
    pub error_message: String,
    pub error_category: ErrorCategory,
    /// ISO-8601 UTC timestamp of the failure.
    pub failed_at: String,
}
