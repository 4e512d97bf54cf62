//! Start-up — turns a validated configuration into a running monitor.
//!
//! Everything that can fail here is a configuration fault and aborts the
//! process before the first cycle:
//! 1. Compile expectations and the request method
//! 2. Read the metric's default value, when a metric is configured
//! 3. Read every component's current status to seed its state

use std::path::Path;

use anyhow::Context;
use http::Method;
use tracing::{info, warn};

use pagewatch_core::MonitorConfig;
use pagewatch_health::{
    CycleContext, CycleSettings, EndpointState, Evaluator, Expectation, MetricSettings, Monitor,
    Prober,
};
use pagewatch_statuspage::StatusPageClient;

/// Load and validate the configuration file, logging the effective result.
pub fn load_config(path: &Path) -> anyhow::Result<MonitorConfig> {
    let config = MonitorConfig::from_file(path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    match config.redacted() {
        Ok(rendered) => info!(path = %path.display(), "effective configuration:\n{rendered}"),
        Err(e) => warn!(error = %e, "could not render configuration"),
    }
    Ok(config)
}

/// Build the evaluator without contacting any remote.
pub fn evaluator(config: &MonitorConfig) -> anyhow::Result<Evaluator> {
    let expectations = Expectation::compile_all(&config.endpoint.expectation)
        .context("invalid endpoint expectation")?;
    let method = Method::from_bytes(config.endpoint.method.as_bytes())
        .with_context(|| format!("invalid HTTP method {:?}", config.endpoint.method))?;
    for expectation in &expectations {
        info!(%expectation, "expectation registered");
    }
    Ok(Evaluator::new(Prober::new(method, config.timeout()), expectations))
}

/// Resolve remote identifiers and register every component.
pub async fn build_monitor(config: &MonitorConfig) -> anyhow::Result<Monitor> {
    let evaluator = evaluator(config)?;
    let client = StatusPageClient::new(&config.status_page.api_url, &config.status_page.token);
    info!(api_url = client.api_url(), "status page client ready");

    let metric = match config.status_page.metric_id {
        Some(id) => {
            let default_value = client
                .metric_default_value(id)
                .await
                .with_context(|| format!("failed to resolve metric {id}"))?;
            info!(metric_id = id, default_value, "metric resolved");
            Some(MetricSettings {
                id,
                unit: config.status_page.latency_unit,
                default_value,
            })
        }
        None => None,
    };

    let mut states = Vec::with_capacity(config.components.len());
    for component in &config.components {
        let status = client
            .component_status(component.id)
            .await
            .with_context(|| format!("failed to resolve component {}", component.id))?;
        info!(component_id = component.id, %status, "component resolved");
        states.push(EndpointState::new(component).with_remote_status(status));
    }

    let context = CycleContext::new(
        evaluator,
        client,
        CycleSettings {
            allowed_fails: config.endpoint.allowed_fails,
            public_incidents: config.status_page.public_incidents,
            metric,
        },
    );
    let monitor = Monitor::new(context, config.frequency());
    for state in states {
        monitor.register(state).await;
    }
    Ok(monitor)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use serde_json::json;

    use pagewatch_core::ComponentStatus;
    use pagewatch_statuspage::fake::{FakeResponse, FakeServer, RecordedRequest};

    use super::*;

    fn config(api_url: &str, metric: Option<u64>) -> MonitorConfig {
        let metric = metric.map(|id| format!("metric_id = {id}\n")).unwrap_or_default();
        let text = format!(
            r#"
frequency = 30

[endpoint]
method = "GET"
timeout = 1.0

[[endpoint.expectation]]
type = "HTTP_STATUS"
status_range = "200-300"

[status_page]
api_url = "{api_url}"
token = "t0k3n"
latency_unit = "ms"
{metric}
[[components]]
id = 1
url = "http://127.0.0.1:1/health"

[[components]]
id = 2
url = "http://127.0.0.1:1/health"
"#
        );
        let mut config = MonitorConfig::parse(&text).unwrap();
        config.normalize();
        config.validate().unwrap();
        config
    }

    async fn status_page() -> FakeServer {
        FakeServer::start(Arc::new(|req: &RecordedRequest| match req.path.as_str() {
            "/components/1" => FakeResponse::json(200, json!({ "data": { "status": 1 } })),
            "/components/2" => FakeResponse::json(200, json!({ "data": { "status": "3" } })),
            "/metrics/5" => FakeResponse::json(200, json!({ "data": { "default_value": 0.5 } })),
            _ => FakeResponse::new(404, "not found"),
        }))
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn seeds_states_from_remote_status() {
        let page = status_page().await;
        let monitor = build_monitor(&config(&page.url(), Some(5))).await.unwrap();

        assert_eq!(monitor.components().await, vec![1, 2]);
        let states = monitor.snapshot().await;
        assert_eq!(states[0].last_pushed_status(), Some(ComponentStatus::Operational));
        assert_eq!(states[1].last_pushed_status(), Some(ComponentStatus::PartialOutage));

        // Component reads are unauthenticated; metric reads carry the token.
        let component = &page.requests_to("GET", "/components/1")[0];
        assert_eq!(component.header("x-cachet-token"), None);
        let metric = &page.requests_to("GET", "/metrics/5")[0];
        assert_eq!(metric.header("x-cachet-token"), Some("t0k3n"));
    }

    #[tokio::test]
    async fn unknown_metric_is_fatal() {
        let page = status_page().await;
        let err = build_monitor(&config(&page.url(), Some(9))).await.unwrap_err();
        assert!(err.to_string().contains("metric 9"));
    }

    #[tokio::test]
    async fn unknown_component_is_fatal() {
        let page = FakeServer::fixed(FakeResponse::new(404, "")).await.unwrap();
        let err = build_monitor(&config(&page.url(), None)).await.unwrap_err();
        assert!(err.to_string().contains("component 1"));
    }

    #[test]
    fn evaluator_compiles_configured_expectations() {
        let evaluator = evaluator(&config("http://status.local", None)).unwrap();
        assert_eq!(evaluator.expectations().len(), 1);
    }

    #[test]
    fn load_config_reports_path_on_failure() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "frequency = 0").unwrap();
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("failed to load configuration"));
    }
}
