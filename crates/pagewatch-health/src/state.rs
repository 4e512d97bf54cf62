//! Per-endpoint state carried across polling cycles.

use pagewatch_core::{ComponentConfig, ComponentId, ComponentStatus, IncidentId};

use crate::probe::EvaluationResult;
use crate::reconcile::{Decision, IncidentAction};

/// Incident lifecycle phase of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    HealthyNoIncident,
    UnhealthyNoIncident,
    UnhealthyIncidentOpen,
}

/// Everything remembered about one monitored endpoint.
///
/// Created once per discovered endpoint and mutated only through
/// [`EndpointState::apply`], after a cycle's decision is complete.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointState {
    component_id: ComponentId,
    endpoint_url: String,
    version_url: Option<String>,
    consecutive_failures: u32,
    open_incident: Option<IncidentId>,
    last_pushed_status: Option<ComponentStatus>,
    last_status: Option<ComponentStatus>,
    last_message: String,
    version: Option<String>,
    last_poll: Option<u64>,
}

impl EndpointState {
    pub fn new(component: &ComponentConfig) -> Self {
        Self {
            component_id: component.id,
            endpoint_url: component.url.clone(),
            version_url: component.version_url.clone(),
            consecutive_failures: 0,
            open_incident: None,
            last_pushed_status: None,
            last_status: None,
            last_message: String::new(),
            version: None,
            last_poll: None,
        }
    }

    /// Seed the last pushed status with what the status page reports.
    pub fn with_remote_status(mut self, status: ComponentStatus) -> Self {
        self.last_pushed_status = Some(status);
        self
    }

    pub fn component_id(&self) -> ComponentId {
        self.component_id
    }

    pub fn endpoint_url(&self) -> &str {
        &self.endpoint_url
    }

    pub fn version_url(&self) -> Option<&str> {
        self.version_url.as_deref()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn open_incident(&self) -> Option<IncidentId> {
        self.open_incident
    }

    pub fn last_pushed_status(&self) -> Option<ComponentStatus> {
        self.last_pushed_status
    }

    /// Status of the most recent evaluation, pushed or not.
    pub fn last_status(&self) -> Option<ComponentStatus> {
        self.last_status
    }

    pub fn last_message(&self) -> &str {
        &self.last_message
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Unix seconds of the most recent evaluation.
    pub fn last_poll(&self) -> Option<u64> {
        self.last_poll
    }

    pub fn phase(&self) -> Phase {
        match (self.open_incident, self.last_pushed_status) {
            (Some(_), _) => Phase::UnhealthyIncidentOpen,
            (None, Some(status)) if !status.is_operational() => Phase::UnhealthyNoIncident,
            _ => Phase::HealthyNoIncident,
        }
    }

    /// Commit a cycle.
    ///
    /// `opened` is the identifier returned by the status page when the
    /// decision opened an incident. A close always clears the local handle,
    /// whether or not the remote call succeeded.
    pub fn apply(&mut self, result: &EvaluationResult, decision: &Decision, opened: Option<IncidentId>) {
        self.consecutive_failures = decision.consecutive_failures;
        self.last_status = Some(result.status);
        self.last_message = result.message.clone();
        self.last_poll = Some(result.timestamp);
        if let Some(version) = &result.version {
            self.version = Some(version.clone());
        }

        if !decision.push {
            return;
        }
        self.last_pushed_status = Some(result.status);
        match decision.incident_action {
            IncidentAction::Open => {
                if opened.is_some() {
                    self.open_incident = opened;
                }
            }
            IncidentAction::Close => self.open_incident = None,
            IncidentAction::None => {}
        }
    }
}
