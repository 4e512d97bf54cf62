//! Status page client error types.

use thiserror::Error;

use pagewatch_core::{ComponentId, MetricId};

/// Result type alias for status page calls.
pub type StatusPageResult<T> = Result<T, StatusPageError>;

/// Errors returned by [`StatusPageClient`](crate::StatusPageClient).
#[derive(Debug, Error)]
pub enum StatusPageError {
    #[error("invalid request url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("{method} {url} failed: {reason}")]
    Transport {
        method: String,
        url: String,
        reason: String,
    },

    #[error("{method} {url} timed out")]
    Timeout { method: String, url: String },

    #[error("{method} {url} returned HTTP {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("component {0} does not exist")]
    ComponentNotFound(ComponentId),

    #[error("metric {0} does not exist")]
    MetricNotFound(MetricId),
}

impl StatusPageError {
    /// HTTP status of a rejected call, if the server answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            StatusPageError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
