//! HTTP client for the status page API.
//!
//! Every call is a single best-effort request: no retries, no
//! transactions across calls. Callers decide what a failure means.

use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use http::{Method, Request, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use pagewatch_core::{ComponentId, ComponentStatus, IncidentId, MetricId};

use crate::error::{StatusPageError, StatusPageResult};
use crate::types::*;

/// Header carrying the API access token.
pub const TOKEN_HEADER: &str = "X-Cachet-Token";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the component, metric and incident endpoints.
#[derive(Clone)]
pub struct StatusPageClient {
    http: Client<HttpConnector, Full<Bytes>>,
    api_url: String,
    token: String,
    timeout: Duration,
}

impl std::fmt::Debug for StatusPageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPageClient")
            .field("api_url", &self.api_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StatusPageClient {
    /// Create a client for `api_url` (e.g. `http://status.local/api/v1`).
    pub fn new(api_url: &str, token: &str) -> Self {
        Self {
            http: Client::builder(TokioExecutor::new()).build_http(),
            api_url: api_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-call timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Read a component's current status. This call is unauthenticated.
    pub async fn component_status(&self, id: ComponentId) -> StatusPageResult<ComponentStatus> {
        let path = format!("/components/{id}");
        let body = match self.send(Method::GET, &path, false, None::<&()>).await {
            Ok(body) => body,
            Err(StatusPageError::Status { .. }) => return Err(StatusPageError::ComponentNotFound(id)),
            Err(e) => return Err(e),
        };
        let envelope: Envelope<ComponentData> = self.decode(&path, &body)?;
        u8::try_from(envelope.data.status)
            .ok()
            .and_then(|raw| ComponentStatus::try_from(raw).ok())
            .ok_or_else(|| StatusPageError::Decode {
                url: self.url(&path),
                reason: format!("unknown component status {}", envelope.data.status),
            })
    }

    /// Read the value a metric reports when no sample is available.
    pub async fn metric_default_value(&self, id: MetricId) -> StatusPageResult<f64> {
        let path = format!("/metrics/{id}");
        let body = match self.send(Method::GET, &path, true, None::<&()>).await {
            Ok(body) => body,
            Err(StatusPageError::Status { .. }) => return Err(StatusPageError::MetricNotFound(id)),
            Err(e) => return Err(e),
        };
        let envelope: Envelope<MetricData> = self.decode(&path, &body)?;
        Ok(envelope.data.default_value)
    }

    /// Push a component's status and description.
    pub async fn update_component(
        &self,
        id: ComponentId,
        update: &ComponentUpdate,
    ) -> StatusPageResult<()> {
        let path = format!("/components/{id}");
        self.send(Method::PUT, &path, true, Some(update)).await?;
        debug!(component_id = id, status = update.status.as_api(), "component updated");
        Ok(())
    }

    /// Add a point to a metric.
    pub async fn add_metric_point(&self, id: MetricId, point: &MetricPoint) -> StatusPageResult<()> {
        let path = format!("/metrics/{id}/points");
        self.send(Method::POST, &path, true, Some(point)).await?;
        debug!(metric_id = id, value = point.value, "metric point added");
        Ok(())
    }

    /// Open an incident and return its identifier.
    pub async fn create_incident(&self, incident: &NewIncident) -> StatusPageResult<IncidentId> {
        let path = "/incidents";
        let body = self.send(Method::POST, path, true, Some(incident)).await?;
        let envelope: Envelope<IncidentData> = self.decode(path, &body)?;
        debug!(
            incident_id = envelope.data.id,
            component_id = incident.component_id,
            "incident created"
        );
        Ok(envelope.data.id)
    }

    /// Mark an incident as fixed.
    pub async fn resolve_incident(
        &self,
        id: IncidentId,
        resolution: &IncidentResolution,
    ) -> StatusPageResult<()> {
        let path = format!("/incidents/{id}");
        self.send(Method::PUT, &path, true, Some(resolution)).await?;
        debug!(incident_id = id, component_id = resolution.component_id, "incident resolved");
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn decode<T: DeserializeOwned>(&self, path: &str, body: &Bytes) -> StatusPageResult<T> {
        serde_json::from_slice(body).map_err(|e| StatusPageError::Decode {
            url: self.url(path),
            reason: e.to_string(),
        })
    }

    /// Send one request and return the body of a 2xx response.
    async fn send<B: Serialize>(
        &self,
        method: Method,
        path: &str,
        authenticated: bool,
        payload: Option<&B>,
    ) -> StatusPageResult<Bytes> {
        let url = self.url(path);
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
            StatusPageError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            }
        })?;

        let body = match payload {
            Some(payload) => {
                Bytes::from(serde_json::to_vec(payload).map_err(|e| StatusPageError::Decode {
                    url: url.clone(),
                    reason: e.to_string(),
                })?)
            }
            None => Bytes::new(),
        };

        let mut builder = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("pagewatch/", env!("CARGO_PKG_VERSION")));
        if payload.is_some() {
            builder = builder.header(CONTENT_TYPE, "application/json");
        }
        if authenticated {
            builder = builder.header(TOKEN_HEADER, &self.token);
        }
        let request = builder
            .body(Full::new(body))
            .map_err(|e| StatusPageError::InvalidUrl {
                url: url.clone(),
                reason: e.to_string(),
            })?;

        let exchange = async {
            let response = self.http.request(request).await.map_err(|e| {
                StatusPageError::Transport {
                    method: method.to_string(),
                    url: url.clone(),
                    reason: e.to_string(),
                }
            })?;
            let status = response.status();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| StatusPageError::Transport {
                    method: method.to_string(),
                    url: url.clone(),
                    reason: e.to_string(),
                })?
                .to_bytes();
            Ok::<(StatusCode, Bytes), StatusPageError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| StatusPageError::Timeout {
                method: method.to_string(),
                url: url.clone(),
            })??;

        if !status.is_success() {
            return Err(StatusPageError::Status {
                method: method.to_string(),
                url,
                status: status.as_u16(),
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::fake::{FakeResponse, FakeServer, RecordedRequest};

    fn client_for(server: &FakeServer) -> StatusPageClient {
        StatusPageClient::new(&format!("{}/api/v1/", server.url()), "secret")
            .with_timeout(Duration::from_secs(2))
    }

    #[tokio::test]
    async fn component_status_is_read_without_token() {
        let server = FakeServer::fixed(FakeResponse::json(
            200,
            json!({ "data": { "id": 5, "status": 2 } }),
        ))
        .await
        .unwrap();
        let client = client_for(&server);

        let status = client.component_status(5).await.unwrap();
        assert_eq!(status, ComponentStatus::PerformanceIssues);

        let requests = server.requests_to("GET", "/api/v1/components/5");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header(TOKEN_HEADER), None);
    }

    #[tokio::test]
    async fn missing_component_is_reported() {
        let server = FakeServer::fixed(FakeResponse::new(404, "not found"))
            .await
            .unwrap();
        let client = client_for(&server);

        let err = client.component_status(9).await.unwrap_err();
        assert!(matches!(err, StatusPageError::ComponentNotFound(9)));
    }

    #[tokio::test]
    async fn unknown_remote_status_is_a_decode_error() {
        let server = FakeServer::fixed(FakeResponse::json(200, json!({ "data": { "status": 0 } })))
            .await
            .unwrap();
        let err = client_for(&server).component_status(1).await.unwrap_err();
        assert!(matches!(err, StatusPageError::Decode { .. }));
    }

    #[tokio::test]
    async fn metric_default_value_and_missing_metric() {
        let server = FakeServer::start(Arc::new(|req: &RecordedRequest| {
            if req.path == "/api/v1/metrics/3" {
                FakeResponse::json(200, json!({ "data": { "default_value": 0.0 } }))
            } else {
                FakeResponse::new(404, "")
            }
        }))
        .await
        .unwrap();
        let client = client_for(&server);

        assert_eq!(client.metric_default_value(3).await.unwrap(), 0.0);
        assert!(matches!(
            client.metric_default_value(4).await,
            Err(StatusPageError::MetricNotFound(4))
        ));
        let reads = server.requests_to("GET", "/api/v1/metrics/3");
        assert_eq!(reads[0].header(TOKEN_HEADER), Some("secret"));
    }

    #[tokio::test]
    async fn update_component_sends_status_and_description() {
        let server = FakeServer::fixed(FakeResponse::json(200, json!({ "data": {} })))
            .await
            .unwrap();
        let client = client_for(&server);

        client
            .update_component(
                8,
                &ComponentUpdate {
                    status: ComponentStatus::PartialOutage,
                    description: Some("2.0.1".to_string()),
                },
            )
            .await
            .unwrap();

        let requests = server.requests_to("PUT", "/api/v1/components/8");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].header(TOKEN_HEADER), Some("secret"));
        assert_eq!(requests[0].header("content-type"), Some("application/json"));
        assert_eq!(requests[0].json(), json!({ "status": 3, "description": "2.0.1" }));
    }

    #[tokio::test]
    async fn rejected_push_reports_http_status() {
        let server = FakeServer::fixed(FakeResponse::new(500, "boom")).await.unwrap();
        let client = client_for(&server);

        let err = client
            .add_metric_point(2, &MetricPoint { value: 12.5, timestamp: 1_700_000_000 })
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), Some(500));

        let sent = server.requests_to("POST", "/api/v1/metrics/2/points");
        assert_eq!(sent[0].json(), json!({ "value": 12.5, "timestamp": 1_700_000_000u64 }));
    }

    #[tokio::test]
    async fn incident_lifecycle_calls() {
        let server = FakeServer::start(Arc::new(|req: &RecordedRequest| {
            match (req.method.as_str(), req.path.as_str()) {
                ("POST", "/api/v1/incidents") => {
                    FakeResponse::json(200, json!({ "data": { "id": 77 } }))
                }
                ("PUT", "/api/v1/incidents/77") => FakeResponse::json(200, json!({ "data": {} })),
                _ => FakeResponse::new(404, ""),
            }
        }))
        .await
        .unwrap();
        let client = client_for(&server);

        let id = client
            .create_incident(&NewIncident::new(4, ComponentStatus::PartialOutage, "down", true))
            .await
            .unwrap();
        assert_eq!(id, 77);

        client
            .resolve_incident(id, &IncidentResolution::new(4, ComponentStatus::Operational, true))
            .await
            .unwrap();

        let resolved = server.requests_to("PUT", "/api/v1/incidents/77");
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].json()["status"], 4);
        assert_eq!(resolved[0].json()["component_status"], 1);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = FakeServer::fixed(
            FakeResponse::new(200, "{}").delayed(Duration::from_millis(500)),
        )
        .await
        .unwrap();
        let client = client_for(&server).with_timeout(Duration::from_millis(50));

        let err = client.component_status(1).await.unwrap_err();
        assert!(matches!(err, StatusPageError::Timeout { .. }));
    }

    #[tokio::test]
    async fn unreachable_server_is_a_transport_error() {
        let client = StatusPageClient::new("http://127.0.0.1:1", "secret")
            .with_timeout(Duration::from_secs(2));
        let err = client
            .update_component(
                1,
                &ComponentUpdate {
                    status: ComponentStatus::Operational,
                    description: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StatusPageError::Transport { .. }));
    }
}
