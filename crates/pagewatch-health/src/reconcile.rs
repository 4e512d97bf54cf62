//! Push and incident decisions.
//!
//! `reconcile` is a pure function of the evaluation, the prior state and
//! the allowed-fails threshold. Nothing is mutated until the caller hands
//! the decision to [`EndpointState::apply`](crate::state::EndpointState::apply).

use tracing::debug;

use crate::probe::EvaluationResult;
use crate::state::EndpointState;

/// What to do with the endpoint's remote incident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentAction {
    None,
    Open,
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether status, metric and incident updates are sent this cycle.
    pub push: bool,
    pub incident_action: IncidentAction,
    /// Failure counter to commit.
    pub consecutive_failures: u32,
}

/// Decide whether to push this cycle and how the incident moves.
///
/// Non-operational results increment the failure counter; while the
/// counter stays within `allowed_fails` nothing is pushed. Operational
/// results always push and reset the counter.
pub fn reconcile(result: &EvaluationResult, state: &EndpointState, allowed_fails: u32) -> Decision {
    if !result.status.is_operational() {
        let failures = state.consecutive_failures().saturating_add(1);
        debug!(
            component_id = state.component_id(),
            failures,
            threshold = allowed_fails,
            "non-operational result"
        );
        if failures <= allowed_fails {
            return Decision {
                push: false,
                incident_action: IncidentAction::None,
                consecutive_failures: failures,
            };
        }
        let incident_action = if state.open_incident().is_none() {
            IncidentAction::Open
        } else {
            IncidentAction::None
        };
        return Decision {
            push: true,
            incident_action,
            consecutive_failures: failures,
        };
    }

    let incident_action = if state.open_incident().is_some() {
        IncidentAction::Close
    } else {
        IncidentAction::None
    };
    Decision {
        push: true,
        incident_action,
        consecutive_failures: 0,
    }
}
