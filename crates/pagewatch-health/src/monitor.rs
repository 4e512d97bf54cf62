//! Monitor — schedules polling cycles for every registered endpoint.
//!
//! Each endpoint runs in its own background task that loops
//! cycle → sleep(frequency). The endpoint's state sits behind its own
//! mutex, held for a whole cycle, so two cycles for the same endpoint never
//! interleave while different endpoints proceed independently.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock, watch};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

use pagewatch_core::ComponentId;

use crate::cycle::{CycleContext, CycleReport};
use crate::state::EndpointState;

type SharedState = Arc<Mutex<EndpointState>>;

/// Per-endpoint background task.
struct MonitorSlot {
    handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

pub struct Monitor {
    context: CycleContext,
    frequency: Duration,
    /// component id → state.
    endpoints: Arc<RwLock<BTreeMap<ComponentId, SharedState>>>,
    /// component id → running loop.
    monitors: Arc<RwLock<HashMap<ComponentId, MonitorSlot>>>,
}

impl std::fmt::Debug for Monitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Monitor")
            .field("frequency", &self.frequency)
            .finish_non_exhaustive()
    }
}

impl Monitor {
    pub fn new(context: CycleContext, frequency: Duration) -> Self {
        Self {
            context,
            frequency,
            endpoints: Arc::new(RwLock::new(BTreeMap::new())),
            monitors: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Add an endpoint. Replaces any state already held for its component.
    pub async fn register(&self, state: EndpointState) {
        let component_id = state.component_id();
        info!(component_id, url = %state.endpoint_url(), "monitoring endpoint");
        self.endpoints
            .write()
            .await
            .insert(component_id, Arc::new(Mutex::new(state)));
    }

    /// Registered component ids, ascending.
    pub async fn components(&self) -> Vec<ComponentId> {
        self.endpoints.read().await.keys().copied().collect()
    }

    /// Copy of every endpoint's state.
    ///
    /// Waits for in-flight cycles on each endpoint to finish.
    pub async fn snapshot(&self) -> Vec<EndpointState> {
        let endpoints: Vec<SharedState> = self.endpoints.read().await.values().cloned().collect();
        let mut states = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            states.push(endpoint.lock().await.clone());
        }
        states
    }

    /// Run one cycle for every endpoint concurrently and wait for all.
    pub async fn poll_once(&self) -> Vec<CycleReport> {
        let endpoints: Vec<SharedState> = self.endpoints.read().await.values().cloned().collect();
        let mut cycles = JoinSet::new();
        for endpoint in endpoints {
            let context = self.context.clone();
            cycles.spawn(async move {
                let mut state = endpoint.lock().await;
                context.run(&mut state).await
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = cycles.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => error!(error = %e, "endpoint cycle task failed"),
            }
        }
        reports.sort_by_key(|r| r.component_id);
        reports
    }

    /// Start a background loop for every registered endpoint.
    pub async fn start(&self) {
        let endpoints: Vec<(ComponentId, SharedState)> = self
            .endpoints
            .read()
            .await
            .iter()
            .map(|(id, state)| (*id, state.clone()))
            .collect();

        let mut monitors = self.monitors.write().await;
        for (component_id, endpoint) in endpoints {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let context = self.context.clone();
            let frequency = self.frequency;
            let handle = tokio::spawn(async move {
                run_endpoint_loop(component_id, endpoint, context, frequency, shutdown_rx).await;
            });

            if let Some(old) = monitors.insert(component_id, MonitorSlot { handle, shutdown_tx }) {
                let _ = old.shutdown_tx.send(true);
                old.handle.abort();
            }
        }
        info!(
            endpoints = monitors.len(),
            frequency_secs = self.frequency.as_secs(),
            "monitor started"
        );
    }

    /// Stop every loop. In-flight cycles are abandoned without committing.
    pub async fn stop_all(&self) {
        let mut monitors = self.monitors.write().await;
        for (component_id, slot) in monitors.drain() {
            let _ = slot.shutdown_tx.send(true);
            if let Err(e) = slot.handle.await {
                if !e.is_cancelled() {
                    error!(component_id, error = %e, "endpoint loop ended abnormally");
                }
            }
            debug!(component_id, "endpoint loop stopped");
        }
        info!("all endpoint loops stopped");
    }

    /// Start all loops and run until `shutdown` fires.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        self.start().await;
        let _ = shutdown.changed().await;
        info!("monitor shutting down");
        self.stop_all().await;
    }

    /// Components with a running loop.
    pub async fn active_monitors(&self) -> Vec<ComponentId> {
        let mut ids: Vec<ComponentId> = self.monitors.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn is_monitoring(&self, component_id: ComponentId) -> bool {
        self.monitors.read().await.contains_key(&component_id)
    }
}

/// Cycle loop for a single endpoint.
async fn run_endpoint_loop(
    component_id: ComponentId,
    endpoint: SharedState,
    context: CycleContext,
    frequency: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(component_id, "endpoint loop starting");

    loop {
        tokio::select! {
            report = async {
                let mut state = endpoint.lock().await;
                context.run(&mut state).await
            } => {
                debug!(
                    component_id,
                    status = %report.status,
                    pushed = report.decision.push,
                    incident = ?report.incident_id,
                    "cycle finished"
                );
            }
            _ = shutdown.changed() => break,
        }

        tokio::select! {
            _ = tokio::time::sleep(frequency) => {}
            _ = shutdown.changed() => break,
        }
    }

    debug!(component_id, "endpoint loop shutting down");
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use http::Method;
    use serde_json::json;

    use pagewatch_core::config::StatusRangeSpec;
    use pagewatch_core::{ComponentConfig, ComponentStatus, ExpectationConfig};
    use pagewatch_statuspage::StatusPageClient;
    use pagewatch_statuspage::fake::{FakeResponse, FakeServer, RecordedRequest};

    use super::*;
    use crate::cycle::CycleSettings;
    use crate::expectation::Expectation;
    use crate::probe::{Evaluator, Prober};

    fn context(status_page: &FakeServer) -> CycleContext {
        let expectations = Expectation::compile_all(&[ExpectationConfig::HttpStatus {
            status_range: StatusRangeSpec::Text("200-300".to_string()),
        }])
        .unwrap();
        CycleContext::new(
            Evaluator::new(Prober::new(Method::GET, Duration::from_secs(2)), expectations),
            StatusPageClient::new(&status_page.url(), "token"),
            CycleSettings {
                allowed_fails: 0,
                public_incidents: true,
                metric: None,
            },
        )
    }

    async fn status_page() -> FakeServer {
        FakeServer::start(Arc::new(|req: &RecordedRequest| {
            if req.method == "POST" && req.path == "/incidents" {
                FakeResponse::json(200, json!({ "data": { "id": 900 } }))
            } else {
                FakeResponse::json(200, json!({ "data": {} }))
            }
        }))
        .await
        .unwrap()
    }

    fn component(id: u64, url: String) -> EndpointState {
        EndpointState::new(&ComponentConfig {
            id,
            url,
            version_url: None,
        })
    }

    #[tokio::test]
    async fn debug_output_shows_frequency() {
        let page = status_page().await;
        let monitor = Monitor::new(context(&page), Duration::from_secs(45));
        let rendered = format!("{monitor:?}");
        assert!(rendered.starts_with("Monitor"));
        assert!(rendered.contains("45s"));
    }

    #[tokio::test]
    async fn monitor_starts_and_stops() {
        let page = status_page().await;
        let monitor = Monitor::new(context(&page), Duration::from_secs(60));
        monitor.register(component(1, "http://127.0.0.1:1".to_string())).await;
        monitor.register(component(2, "http://127.0.0.1:1".to_string())).await;

        assert!(monitor.active_monitors().await.is_empty());

        monitor.start().await;
        assert_eq!(monitor.active_monitors().await, vec![1, 2]);
        assert!(monitor.is_monitoring(1).await);

        monitor.stop_all().await;
        assert!(monitor.active_monitors().await.is_empty());
    }

    #[tokio::test]
    async fn poll_once_evaluates_every_endpoint() {
        let page = status_page().await;
        let healthy = FakeServer::fixed(FakeResponse::new(200, "ok")).await.unwrap();
        let broken = FakeServer::fixed(FakeResponse::new(500, "err")).await.unwrap();

        let monitor = Monitor::new(context(&page), Duration::from_secs(60));
        monitor.register(component(10, healthy.url())).await;
        monitor.register(component(20, broken.url())).await;

        let reports = monitor.poll_once().await;
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].component_id, 10);
        assert_eq!(reports[0].status, ComponentStatus::Operational);
        assert_eq!(reports[1].component_id, 20);
        assert_eq!(reports[1].status, ComponentStatus::PartialOutage);
        assert_eq!(reports[1].incident_id, Some(900));

        let states = monitor.snapshot().await;
        assert_eq!(states[1].open_incident(), Some(900));
        assert_eq!(page.requests_to("PUT", "/components/10").len(), 1);
        assert_eq!(page.requests_to("PUT", "/components/20").len(), 1);
    }

    #[tokio::test]
    async fn background_loop_keeps_polling() {
        let page = status_page().await;
        let endpoint = FakeServer::fixed(FakeResponse::new(200, "")).await.unwrap();

        let monitor = Monitor::new(context(&page), Duration::from_millis(20));
        monitor.register(component(3, endpoint.url())).await;
        let (tx, rx) = watch::channel(false);

        let running = async {
            monitor.run(rx).await;
        };
        let driver = async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            tx.send(true).unwrap();
        };
        tokio::join!(running, driver);

        assert!(endpoint.requests().len() >= 2);
        assert!(monitor.active_monitors().await.is_empty());
        let state = &monitor.snapshot().await[0];
        assert_eq!(state.last_status(), Some(ComponentStatus::Operational));
        assert!(page.requests_to("PUT", "/components/3").len() >= 2);
    }

    #[tokio::test]
    async fn shutdown_mid_cycle_leaves_state_untouched() {
        let page = status_page().await;
        let slow = FakeServer::fixed(
            FakeResponse::new(500, "").delayed(Duration::from_millis(500)),
        )
        .await
        .unwrap();

        let monitor = Monitor::new(context(&page), Duration::from_secs(60));
        monitor.register(component(5, slow.url())).await;
        monitor.start().await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop_all().await;

        let state = &monitor.snapshot().await[0];
        assert_eq!(state.last_poll(), None);
        assert_eq!(state.consecutive_failures(), 0);
        assert!(page.requests().is_empty());
    }
}
