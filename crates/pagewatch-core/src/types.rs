//! Shared types used across pagewatch crates.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Identifier of a component on the status page.
pub type ComponentId = u64;

/// Identifier of an incident on the status page.
pub type IncidentId = u64;

/// Identifier of a metric on the status page.
pub type MetricId = u64;

// ── Status ────────────────────────────────────────────────────────

/// Component severity, ordered from healthy to worst.
///
/// The discriminants are the integers the status page uses for component
/// statuses. Comparisons follow severity, so folding several verdicts is a
/// plain `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum ComponentStatus {
    Operational = 1,
    PerformanceIssues = 2,
    PartialOutage = 3,
    MajorOutage = 4,
}

impl ComponentStatus {
    /// The integer transmitted to the status page.
    pub fn as_api(self) -> u8 {
        self as u8
    }

    pub fn is_operational(self) -> bool {
        self == ComponentStatus::Operational
    }

    pub fn label(self) -> &'static str {
        match self {
            ComponentStatus::Operational => "operational",
            ComponentStatus::PerformanceIssues => "performance issues",
            ComponentStatus::PartialOutage => "partial outage",
            ComponentStatus::MajorOutage => "major outage",
        }
    }
}

impl From<ComponentStatus> for u8 {
    fn from(status: ComponentStatus) -> u8 {
        status.as_api()
    }
}

impl TryFrom<u8> for ComponentStatus {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ComponentStatus::Operational),
            2 => Ok(ComponentStatus::PerformanceIssues),
            3 => Ok(ComponentStatus::PartialOutage),
            4 => Ok(ComponentStatus::MajorOutage),
            other => Err(format!("unknown component status {other}")),
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.as_api())
    }
}

// ── Latency unit ──────────────────────────────────────────────────

/// Unit in which latency metric points are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LatencyUnit {
    #[serde(rename = "ms")]
    Milliseconds,
    #[default]
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
}

impl LatencyUnit {
    /// Convert a duration expressed in seconds into this unit.
    pub fn convert(self, seconds: f64) -> f64 {
        match self {
            LatencyUnit::Milliseconds => seconds * 1000.0,
            LatencyUnit::Seconds => seconds,
            LatencyUnit::Minutes => seconds / 60.0,
            LatencyUnit::Hours => seconds / 3600.0,
        }
    }

    pub fn suffix(self) -> &'static str {
        match self {
            LatencyUnit::Milliseconds => "ms",
            LatencyUnit::Seconds => "s",
            LatencyUnit::Minutes => "m",
            LatencyUnit::Hours => "h",
        }
    }
}

impl FromStr for LatencyUnit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "ms" => Ok(LatencyUnit::Milliseconds),
            "s" => Ok(LatencyUnit::Seconds),
            "m" => Ok(LatencyUnit::Minutes),
            "h" => Ok(LatencyUnit::Hours),
            other => Err(ConfigError::Invalid {
                field: "status_page.latency_unit".to_string(),
                reason: format!("unknown unit {other:?}, expected ms, s, m or h"),
            }),
        }
    }
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
