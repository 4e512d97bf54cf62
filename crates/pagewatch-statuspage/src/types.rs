//! Wire payloads for the status page API.
//!
//! Responses wrap their payload in a `data` envelope. Some deployments
//! return numbers as strings, so numeric response fields are decoded
//! leniently.

use serde::{Deserialize, Deserializer, Serialize};

use pagewatch_core::{ComponentId, ComponentStatus, IncidentId};

/// Incident status sent when an incident is opened ("investigating").
pub const INCIDENT_INVESTIGATING: u8 = 1;

/// Incident status sent when an incident is resolved ("fixed").
pub const INCIDENT_FIXED: u8 = 4;

/// Name given to every incident this monitor opens.
pub const INCIDENT_NAME: &str = "URL unavailable";

// ── Requests ──────────────────────────────────────────────────────

/// `PUT /components/{id}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentUpdate {
    pub status: ComponentStatus,
    /// Carries the observed version string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// `POST /metrics/{id}/points`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub value: f64,
    pub timestamp: u64,
}

/// `POST /incidents`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewIncident {
    pub name: String,
    pub message: String,
    pub status: u8,
    pub visible: bool,
    pub component_id: ComponentId,
    pub component_status: ComponentStatus,
    pub notify: bool,
}

impl NewIncident {
    pub fn new(
        component_id: ComponentId,
        component_status: ComponentStatus,
        message: impl Into<String>,
        visible: bool,
    ) -> Self {
        Self {
            name: INCIDENT_NAME.to_string(),
            message: message.into(),
            status: INCIDENT_INVESTIGATING,
            visible,
            component_id,
            component_status,
            notify: true,
        }
    }
}

/// `PUT /incidents/{id}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IncidentResolution {
    pub status: u8,
    pub visible: bool,
    pub component_id: ComponentId,
    pub component_status: ComponentStatus,
    pub notify: bool,
}

impl IncidentResolution {
    pub fn new(component_id: ComponentId, component_status: ComponentStatus, visible: bool) -> Self {
        Self {
            status: INCIDENT_FIXED,
            visible,
            component_id,
            component_status,
            notify: true,
        }
    }
}

// ── Responses ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ComponentData {
    #[serde(deserialize_with = "lenient_u64")]
    pub status: u64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MetricData {
    #[serde(deserialize_with = "lenient_f64")]
    pub default_value: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IncidentData {
    #[serde(deserialize_with = "lenient_u64")]
    pub id: IncidentId,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    Text(String),
}

fn lenient_u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n
            .as_u64()
            .ok_or_else(|| serde::de::Error::custom(format!("{n} is not an unsigned integer"))),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn lenient_f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n
            .as_f64()
            .ok_or_else(|| serde::de::Error::custom(format!("{n} is not a number"))),
        NumberOrString::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}
