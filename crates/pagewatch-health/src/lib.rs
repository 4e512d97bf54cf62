//! pagewatch-health — endpoint evaluation and status page reconciliation.
//!
//! Probes each configured endpoint on a fixed frequency, judges the
//! response against the configured expectations, debounces failures and
//! keeps the status page's component status, latency metric and incidents
//! in line with what was observed.
//!
//! # Architecture
//!
//! ```text
//! Monitor
//!   └── Per-endpoint background task (one Mutex<EndpointState> each)
//!       └── CycleContext::run()
//!           ├── Evaluator::evaluate() → EvaluationResult
//!           │   ├── Prober (request, timeout, version lookup)
//!           │   └── assess() over the Expectation list
//!           ├── reconcile() → Decision (pure)
//!           ├── StatusPageClient pushes (status, metric, incident)
//!           └── EndpointState::apply()
//! ```
//!
//! # Debounce
//!
//! A non-operational result is only pushed once the endpoint has failed
//! more than `allowed_fails` cycles in a row. The first pushed failure
//! opens an incident; the first operational result afterwards resolves it.

pub mod cycle;
pub mod expectation;
pub mod monitor;
pub mod probe;
pub mod reconcile;
pub mod state;

pub use cycle::{CycleContext, CycleReport, CycleSettings, MetricSettings};
pub use expectation::{Expectation, assess};
pub use monitor::Monitor;
pub use probe::{EvaluationResult, Evaluator, ProbeError, ProbeResponse, Prober};
pub use reconcile::{Decision, IncidentAction, reconcile};
pub use state::{EndpointState, Phase};
