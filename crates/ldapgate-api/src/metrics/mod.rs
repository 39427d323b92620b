//! Prometheus metrics for ldapgate
//!
//! Exposes metrics at `/metrics` endpoint in Prometheus format.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Metric names
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "ldapgate_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "ldapgate_http_request_duration_seconds";

    // Login metrics
    pub const LOGIN_ATTEMPTS_TOTAL: &str = "ldapgate_login_attempts_total";
    pub const LOGIN_DURATION_SECONDS: &str = "ldapgate_login_duration_seconds";
    pub const ACCOUNTS_PROVISIONED_TOTAL: &str = "ldapgate_accounts_provisioned_total";
    pub const ACTIVE_SESSIONS: &str = "ldapgate_active_sessions";

    // System metrics
    pub const UPTIME_SECONDS: &str = "ldapgate_uptime_seconds";
    pub const INFO: &str = "ldapgate_info";
}

/// Which entry point a login attempt came through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginKind {
    Password,
    Sso,
    SeamlessSso,
}

impl LoginKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Password => "password",
            Self::Sso => "sso",
            Self::SeamlessSso => "seamless_sso",
        }
    }
}

/// Metrics recorder
#[derive(Clone)]
pub struct MetricsRecorder {
    handle: PrometheusHandle,
    start_time: Instant,
}

impl MetricsRecorder {
    /// Install the global Prometheus recorder
    pub fn new() -> Result<Self, BuildError> {
        let handle = PrometheusBuilder::new().install_recorder()?;

        gauge!(names::INFO, "version" => ldapgate_core::VERSION).set(1.0);

        Ok(Self {
            handle,
            start_time: Instant::now(),
        })
    }

    /// Recorder that is not installed globally; renders nothing.
    ///
    /// Only one global recorder may exist per process, so tests and
    /// embedders that manage their own use this.
    pub fn detached() -> Self {
        let recorder = PrometheusBuilder::new().build_recorder();
        Self {
            handle: recorder.handle(),
            start_time: Instant::now(),
        }
    }

    /// Get metrics output in Prometheus format
    pub fn render(&self) -> String {
        gauge!(names::UPTIME_SECONDS).set(self.start_time.elapsed().as_secs_f64());

        self.handle.render()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Record an HTTP request
    pub fn record_http_request(&self, method: &str, status: u16, duration_secs: f64) {
        let status_class = format!("{}xx", status / 100);

        counter!(
            names::HTTP_REQUESTS_TOTAL,
            "method" => method.to_string(),
            "status" => status.to_string(),
            "status_class" => status_class
        )
        .increment(1);

        histogram!(
            names::HTTP_REQUEST_DURATION_SECONDS,
            "method" => method.to_string()
        )
        .record(duration_secs);
    }

    /// Record a login attempt; `outcome` is "success" or an error code
    pub fn record_login(&self, kind: LoginKind, outcome: &str, duration_secs: f64) {
        counter!(
            names::LOGIN_ATTEMPTS_TOTAL,
            "kind" => kind.as_str(),
            "outcome" => outcome.to_string()
        )
        .increment(1);

        histogram!(
            names::LOGIN_DURATION_SECONDS,
            "kind" => kind.as_str()
        )
        .record(duration_secs);
    }

    pub fn record_provisioned(&self) {
        counter!(names::ACCOUNTS_PROVISIONED_TOTAL).increment(1);
    }

    pub fn set_active_sessions(&self, count: usize) {
        gauge!(names::ACTIVE_SESSIONS).set(count as f64);
    }
}

/// Axum middleware for recording HTTP metrics
pub async fn metrics_middleware(
    State(metrics): State<Arc<MetricsRecorder>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    metrics.record_http_request(&method, status, duration);

    debug!(
        method = %method,
        path = %path,
        status = %status,
        duration_ms = %(duration * 1000.0),
        "Request completed"
    );

    response
}

/// Handler for /metrics endpoint
pub async fn metrics_handler(State(metrics): State<Arc<MetricsRecorder>>) -> impl IntoResponse {
    let output = metrics.render();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        output,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_login_kind_labels() {
        assert_eq!(LoginKind::Password.as_str(), "password");
        assert_eq!(LoginKind::Sso.as_str(), "sso");
        assert_eq!(LoginKind::SeamlessSso.as_str(), "seamless_sso");
    }

    #[test]
    fn test_detached_recorder_renders() {
        let metrics = MetricsRecorder::detached();
        metrics.record_login(LoginKind::Password, "success", 0.01);
        // nothing installed globally, so the handle has nothing to show
        assert!(!metrics.render().contains("ldapgate_login_attempts_total"));
    }
}
