//! Endpoint probing and evaluation.
//!
//! The prober issues one request per endpoint per cycle and classifies
//! transport failures before any expectation runs. The evaluator combines
//! the probe, the expectation fold and the best-effort version lookup into
//! an [`EvaluationResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::USER_AGENT;
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use thiserror::Error;
use tracing::{debug, warn};

use pagewatch_core::{ComponentStatus, epoch_secs};

use crate::expectation::{Expectation, assess};
use crate::state::EndpointState;

/// Marker that terminates the version string in a version document.
pub const VERSION_DELIMITER: &str = "-->";

/// Version recorded when the version URL answers with a non-success status.
pub const UNKNOWN_VERSION: &str = "Unknown";

/// A response the expectations can be applied to.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResponse {
    pub status: u16,
    /// Time until the response head arrived.
    pub elapsed: Duration,
    pub body: String,
}

impl ProbeResponse {
    pub fn elapsed_secs(&self) -> f64 {
        self.elapsed.as_secs_f64()
    }
}

/// A transport fault detected before any expectation runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("The URL is unreachable: {method} {url}")]
    Connect { method: String, url: String },

    #[error("Unexpected HTTP response")]
    Protocol { reason: String },

    #[error("Request timed out")]
    Timeout,
}

impl ProbeError {
    /// Degraded status assigned to this fault.
    pub fn status(&self) -> ComponentStatus {
        match self {
            ProbeError::Connect { .. } | ProbeError::Protocol { .. } => {
                ComponentStatus::PartialOutage
            }
            ProbeError::Timeout => ComponentStatus::PerformanceIssues,
        }
    }
}

/// Issues requests with a fixed method and timeout.
#[derive(Clone)]
pub struct Prober {
    http: Client<HttpConnector, Full<Bytes>>,
    method: Method,
    timeout: Duration,
}

impl Prober {
    pub fn new(method: Method, timeout: Duration) -> Self {
        Self {
            http: Client::builder(TokioExecutor::new()).build_http(),
            method,
            timeout,
        }
    }

    /// Request `url` with the configured method.
    pub async fn request(&self, url: &str) -> Result<ProbeResponse, ProbeError> {
        self.send(self.method.clone(), url).await
    }

    /// Fetch the version document behind `url`.
    ///
    /// A 2xx body is cut at the first [`VERSION_DELIMITER`] and the prefix
    /// kept verbatim, whitespace included; any other
    /// status yields [`UNKNOWN_VERSION`]. Transport faults yield `None` and
    /// leave the previously known version in place.
    pub async fn fetch_version(&self, url: &str) -> Option<String> {
        match self.send(Method::GET, url).await {
            Ok(response) if (200..300).contains(&response.status) => {
                let version = response
                    .body
                    .split(VERSION_DELIMITER)
                    .next()
                    .unwrap_or_default();
                Some(version.to_string())
            }
            Ok(response) => {
                debug!(%url, status = response.status, "version lookup returned non-success");
                Some(UNKNOWN_VERSION.to_string())
            }
            Err(e) => {
                warn!(%url, error = %e, "version lookup failed");
                None
            }
        }
    }

    async fn send(&self, method: Method, url: &str) -> Result<ProbeResponse, ProbeError> {
        let uri: Uri = url.parse().map_err(|e: http::uri::InvalidUri| ProbeError::Protocol {
            reason: e.to_string(),
        })?;
        let request = Request::builder()
            .method(method.clone())
            .uri(uri)
            .header(USER_AGENT, concat!("pagewatch/", env!("CARGO_PKG_VERSION")))
            .body(Full::new(Bytes::new()))
            .map_err(|e| ProbeError::Protocol {
                reason: e.to_string(),
            })?;

        let exchange = async {
            let started = Instant::now();
            let response = self.http.request(request).await.map_err(|e| {
                if e.is_connect() {
                    debug!(error = %e, %url, "probe connection failed");
                    ProbeError::Connect {
                        method: method.to_string(),
                        url: url.to_string(),
                    }
                } else {
                    debug!(error = %e, %url, "probe request failed");
                    ProbeError::Protocol {
                        reason: e.to_string(),
                    }
                }
            })?;
            let elapsed = started.elapsed();
            let status = response.status().as_u16();
            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| ProbeError::Protocol {
                    reason: e.to_string(),
                })?
                .to_bytes();
            Ok(ProbeResponse {
                status,
                elapsed,
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => {
                debug!(%url, timeout = ?self.timeout, "probe timed out");
                Err(ProbeError::Timeout)
            }
        }
    }
}

/// Outcome of evaluating one endpoint in one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub status: ComponentStatus,
    /// Empty when operational.
    pub message: String,
    /// `None` when the request never produced a response.
    pub elapsed: Option<Duration>,
    /// `None` when no version was looked up or the lookup failed.
    pub version: Option<String>,
    /// Unix seconds.
    pub timestamp: u64,
}

impl EvaluationResult {
    /// Result for a probe that ended in a transport fault.
    pub fn from_fault(fault: &ProbeError) -> Self {
        Self {
            status: fault.status(),
            message: fault.to_string(),
            elapsed: None,
            version: None,
            timestamp: epoch_secs(),
        }
    }

    pub fn elapsed_secs(&self) -> Option<f64> {
        self.elapsed.map(|e| e.as_secs_f64())
    }
}

/// Requests an endpoint and judges the response.
pub struct Evaluator {
    prober: Prober,
    expectations: Arc<[Expectation]>,
}

impl Evaluator {
    pub fn new(prober: Prober, expectations: Vec<Expectation>) -> Self {
        Self {
            prober,
            expectations: expectations.into(),
        }
    }

    pub fn expectations(&self) -> &[Expectation] {
        &self.expectations
    }

    /// Probe the endpoint behind `state` and fold the expectations.
    ///
    /// Does not touch `state`; the caller commits the result later.
    pub async fn evaluate(&self, state: &EndpointState) -> EvaluationResult {
        let url = state.endpoint_url();
        let response = match self.prober.request(url).await {
            Ok(response) => response,
            Err(fault) => {
                warn!(
                    component_id = state.component_id(),
                    %url,
                    error = %fault,
                    "endpoint probe failed"
                );
                return EvaluationResult::from_fault(&fault);
            }
        };
        let timestamp = epoch_secs();

        let version = match state.version_url() {
            Some(version_url) => self.prober.fetch_version(version_url).await,
            None => None,
        };

        let (status, message) = assess(&self.expectations, &response);
        if !status.is_operational() {
            debug!(
                component_id = state.component_id(),
                status = %status,
                %message,
                "expectation failed"
            );
        }

        EvaluationResult {
            status,
            message,
            elapsed: Some(response.elapsed),
            version,
            timestamp,
        }
    }
}
