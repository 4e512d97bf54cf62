//! Expectations — declarative checks applied to a probe response.
//!
//! Each expectation yields a status and an explanatory message. A set of
//! expectations is folded into one verdict by keeping the worst status;
//! on ties the earliest expectation's message wins.

use std::fmt;

use regex::{Regex, RegexBuilder};

use pagewatch_core::{ComponentStatus, ConfigError, ConfigResult, ExpectationConfig};

use crate::probe::ProbeResponse;

/// A compiled expectation.
#[derive(Debug, Clone)]
pub enum Expectation {
    /// Operational iff `min <= status < max`.
    HttpStatus { min: u16, max: u16 },
    /// Operational iff the response arrived within `threshold` seconds.
    Latency { threshold: f64 },
    /// Operational iff the pattern matches at the start of the body.
    Regex { pattern: String, regex: Regex },
}

impl Expectation {
    /// Build an expectation from its configuration descriptor.
    pub fn from_config(config: &ExpectationConfig) -> ConfigResult<Self> {
        match config {
            ExpectationConfig::HttpStatus { status_range } => {
                let (min, max) = status_range.bounds()?;
                Ok(Expectation::HttpStatus { min, max })
            }
            ExpectationConfig::Latency { threshold } => Ok(Expectation::Latency {
                threshold: *threshold,
            }),
            ExpectationConfig::Regex { regex } => {
                // Anchored at the start only; `.` spans newlines.
                let compiled = RegexBuilder::new(&format!("^(?:{regex})"))
                    .dot_matches_new_line(true)
                    .unicode(true)
                    .build()
                    .map_err(|e| {
                        ConfigError::invalid("endpoint.expectation.regex", e.to_string())
                    })?;
                Ok(Expectation::Regex {
                    pattern: regex.clone(),
                    regex: compiled,
                })
            }
        }
    }

    /// Build every configured expectation, preserving order.
    pub fn compile_all(configs: &[ExpectationConfig]) -> ConfigResult<Vec<Self>> {
        configs.iter().map(Self::from_config).collect()
    }

    /// The status this expectation assigns to `response`.
    pub fn status(&self, response: &ProbeResponse) -> ComponentStatus {
        match self {
            Expectation::HttpStatus { min, max } => {
                if (*min..*max).contains(&response.status) {
                    ComponentStatus::Operational
                } else {
                    ComponentStatus::PartialOutage
                }
            }
            Expectation::Latency { threshold } => {
                if response.elapsed_secs() <= *threshold {
                    ComponentStatus::Operational
                } else {
                    ComponentStatus::PerformanceIssues
                }
            }
            Expectation::Regex { regex, .. } => {
                if regex.is_match(&response.body) {
                    ComponentStatus::Operational
                } else {
                    ComponentStatus::PartialOutage
                }
            }
        }
    }

    /// Why `response` failed this expectation.
    pub fn message(&self, response: &ProbeResponse) -> String {
        match self {
            Expectation::HttpStatus { .. } => {
                format!("Unexpected HTTP status ({})", response.status)
            }
            Expectation::Latency { .. } => format!(
                "Latency above threshold: {:.4} seconds",
                response.elapsed_secs()
            ),
            Expectation::Regex { .. } => "Regex did not match anything in the body".to_string(),
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::HttpStatus { min, max } => write!(f, "HTTP status range: [{min}, {max})"),
            Expectation::Latency { threshold } => {
                write!(f, "Latency threshold: {threshold:.4} seconds")
            }
            Expectation::Regex { pattern, .. } => write!(f, "Regex: {pattern}"),
        }
    }
}

/// Fold every expectation into the worst status and its message.
///
/// Starts from operational with an empty message. A later expectation
/// replaces the verdict only when strictly worse.
pub fn assess(expectations: &[Expectation], response: &ProbeResponse) -> (ComponentStatus, String) {
    let mut worst = ComponentStatus::Operational;
    let mut message = String::new();
    for expectation in expectations {
        let status = expectation.status(response);
        if status > worst {
            worst = status;
            message = expectation.message(response);
        }
    }
    (worst, message)
}
