//! One polling cycle for one endpoint.
//!
//! evaluate → reconcile → push (status, metric, incident) → commit.
//! Each push is independent and best-effort: a rejected call is logged
//! and the cycle carries on. State is committed last, so a cycle that is
//! dropped midway leaves it untouched.

use std::sync::Arc;

use tracing::{info, warn};

use pagewatch_core::{ComponentId, ComponentStatus, IncidentId, LatencyUnit, MetricId};
use pagewatch_statuspage::{
    ComponentUpdate, IncidentResolution, MetricPoint, NewIncident, StatusPageClient,
    StatusPageResult,
};

use crate::probe::{EvaluationResult, Evaluator};
use crate::reconcile::{Decision, IncidentAction, reconcile};
use crate::state::EndpointState;

/// Latency metric reporting.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSettings {
    pub id: MetricId,
    pub unit: LatencyUnit,
    /// Reported instead of latency while the endpoint is not operational.
    pub default_value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    pub allowed_fails: u32,
    pub public_incidents: bool,
    pub metric: Option<MetricSettings>,
}

/// What a cycle did, for logging and tests.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub component_id: ComponentId,
    pub status: ComponentStatus,
    pub decision: Decision,
    /// Incident id after the cycle.
    pub incident_id: Option<IncidentId>,
    /// Remote calls that were attempted and failed.
    pub failed_pushes: u32,
}

/// Shared collaborators for running cycles.
#[derive(Clone)]
pub struct CycleContext {
    evaluator: Arc<Evaluator>,
    client: StatusPageClient,
    settings: Arc<CycleSettings>,
}

impl CycleContext {
    pub fn new(evaluator: Evaluator, client: StatusPageClient, settings: CycleSettings) -> Self {
        Self {
            evaluator: Arc::new(evaluator),
            client,
            settings: Arc::new(settings),
        }
    }

    /// Run a full cycle against `state`.
    pub async fn run(&self, state: &mut EndpointState) -> CycleReport {
        let result = self.evaluator.evaluate(state).await;
        let decision = reconcile(&result, state, self.settings.allowed_fails);

        let mut failed_pushes = 0;
        let mut opened = None;
        if decision.push {
            if !self.push_status(state, &result).await {
                failed_pushes += 1;
            }
            if !self.push_metric(&result).await {
                failed_pushes += 1;
            }
            match self.push_incident(state, &result, decision.incident_action).await {
                Ok(id) => opened = id,
                Err(_) => failed_pushes += 1,
            }
        }

        state.apply(&result, &decision, opened);

        CycleReport {
            component_id: state.component_id(),
            status: result.status,
            decision,
            incident_id: state.open_incident(),
            failed_pushes,
        }
    }

    async fn push_status(&self, state: &EndpointState, result: &EvaluationResult) -> bool {
        let component_id = state.component_id();
        let update = ComponentUpdate {
            status: result.status,
            description: result.version.clone().or_else(|| state.version().map(str::to_string)),
        };
        match self.client.update_component(component_id, &update).await {
            Ok(()) => {
                info!(component_id, status = %result.status, "component status pushed");
                true
            }
            Err(e) => {
                warn!(
                    component_id,
                    status = %result.status,
                    error = %e,
                    "component status push failed"
                );
                false
            }
        }
    }

    /// Latency when operational, the metric's default value otherwise.
    /// Nothing is sent when the probe never got a response.
    async fn push_metric(&self, result: &EvaluationResult) -> bool {
        let (Some(metric), Some(elapsed)) = (&self.settings.metric, result.elapsed_secs()) else {
            return true;
        };
        let value = if result.status.is_operational() {
            metric.unit.convert(elapsed)
        } else {
            metric.default_value
        };
        let point = MetricPoint {
            value,
            timestamp: result.timestamp,
        };
        match self.client.add_metric_point(metric.id, &point).await {
            Ok(()) => {
                info!(metric_id = metric.id, value, unit = metric.unit.suffix(), "metric uploaded");
                true
            }
            Err(e) => {
                warn!(metric_id = metric.id, error = %e, "metric upload failed");
                false
            }
        }
    }

    /// Returns the new incident id when one was opened.
    async fn push_incident(
        &self,
        state: &EndpointState,
        result: &EvaluationResult,
        action: IncidentAction,
    ) -> StatusPageResult<Option<IncidentId>> {
        let component_id = state.component_id();
        let visible = self.settings.public_incidents;
        match action {
            IncidentAction::None => Ok(None),
            IncidentAction::Open => {
                let incident = NewIncident::new(component_id, result.status, &result.message, visible);
                match self.client.create_incident(&incident).await {
                    Ok(id) => {
                        info!(
                            component_id,
                            incident_id = id,
                            status = %result.status,
                            message = %result.message,
                            "incident opened"
                        );
                        Ok(Some(id))
                    }
                    Err(e) => {
                        warn!(
                            component_id,
                            error = %e,
                            message = %result.message,
                            "incident creation failed"
                        );
                        Err(e)
                    }
                }
            }
            IncidentAction::Close => {
                let Some(incident_id) = state.open_incident() else {
                    return Ok(None);
                };
                let resolution = IncidentResolution::new(component_id, result.status, visible);
                match self.client.resolve_incident(incident_id, &resolution).await {
                    Ok(()) => {
                        info!(component_id, incident_id, "incident resolved, endpoint healthy again");
                        Ok(None)
                    }
                    Err(e) => {
                        // The local handle is dropped anyway; the remote
                        // incident has to be closed by hand.
                        warn!(
                            component_id,
                            incident_id,
                            error = %e,
                            "incident resolution failed"
                        );
                        Err(e)
                    }
                }
            }
        }
    }
}
