//! Pipeline error model and retry backoff policy helpers.

use std::time::Duration;

use aqueduct_types::error::ConnectorError;

const BACKOFF_BASE_MS: u64 = 1_000;
const BACKOFF_MAX_MS: u64 = 60_000;

/// Categorized pipeline error for retry decisions.
///
/// `Connector` wraps a typed `ConnectorError` whose `retryable` flag drives
/// the retry loop. `Infrastructure` wraps opaque host-side errors (state
/// backend, task join, channel) that are never retried.
#[derive(Debug)]
pub enum PipelineError {
    /// Typed connector error with retry metadata.
    Connector(ConnectorError),
    /// Infrastructure error (state backend, task join, etc.)
    Infrastructure(anyhow::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connector(e) => write!(f, "{e}"),
            Self::Infrastructure(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<anyhow::Error> for PipelineError {
    fn from(e: anyhow::Error) -> Self {
        Self::Infrastructure(e)
    }
}

impl From<ConnectorError> for PipelineError {
    fn from(e: ConnectorError) -> Self {
        Self::Connector(e)
    }
}

impl PipelineError {
    /// Returns `true` if this is a typed connector error that the connector
    /// has marked as retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connector(e) => e.retryable,
            Self::Infrastructure(_) => false,
        }
    }

    /// Returns the typed connector error if this is a `Connector` variant.
    pub fn as_connector_error(&self) -> Option<&ConnectorError> {
        match self {
            Self::Connector(e) => Some(e),
            Self::Infrastructure(_) => None,
        }
    }
}

/// Compute the retry delay for the given attempt number (1-based).
pub(crate) fn compute_backoff(attempt: u32) -> Duration {
    let delay_ms = BACKOFF_BASE_MS.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)));
    Duration::from_millis(delay_ms.min(BACKOFF_MAX_MS))
}
