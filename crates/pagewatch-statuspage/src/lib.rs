//! pagewatch-statuspage — client for the remote status page service.
//!
//! Covers the narrow slice of the API the monitor depends on: reading and
//! updating components, reading a metric's default value and adding
//! points to it, and opening and resolving incidents. Authentication uses
//! a token header on every call except the component status read.

pub mod client;
pub mod error;
#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod types;

pub use client::{StatusPageClient, TOKEN_HEADER};
pub use error::{StatusPageError, StatusPageResult};
pub use types::{ComponentUpdate, IncidentResolution, MetricPoint, NewIncident};
