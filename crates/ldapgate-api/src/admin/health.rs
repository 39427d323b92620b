//! Health check handler

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use tracing::warn;

use crate::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "healthy", "degraded" (a directory is down) or "unhealthy" (store down)
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub store: ComponentHealth,
    pub directories: Vec<DirectoryHealth>,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DirectoryHealth {
    pub sid: String,
    pub enabled: bool,
    pub reachable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET /api/v1/health
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store = match state.authenticator.store().health_check().await {
        Ok(()) => ComponentHealth {
            healthy: true,
            error: None,
        },
        Err(e) => {
            warn!(error = %e, "Account store health check failed");
            ComponentHealth {
                healthy: false,
                error: Some(e.to_string()),
            }
        }
    };

    let mut directories = Vec::new();
    for directory in state.authenticator.registry().all() {
        let enabled = directory.definition().enabled;
        let (reachable, error) = if enabled {
            match directory.test_connection().await {
                Ok(_) => (true, None),
                Err(e) => (false, Some(e.to_string())),
            }
        } else {
            (false, None)
        };
        directories.push(DirectoryHealth {
            sid: directory.sid().to_string(),
            enabled,
            reachable,
            error,
        });
    }

    let (status_code, status) = if !store.healthy {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    } else if directories.iter().any(|d| d.enabled && !d.reachable) {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::OK, "healthy")
    };

    let body = HealthResponse {
        status,
        version: ldapgate_core::VERSION,
        uptime_seconds: state.start_time.elapsed().as_secs(),
        store,
        directories,
        active_sessions: state.sessions.active().await,
    };

    (status_code, Json(body))
}

#[cfg(test)]
mod tests {
    use crate::server::create_router;
    use crate::server::test_support::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn health() -> Request<Body> {
        Request::get("/api/v1/health").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_healthy_without_credentials() {
        let app = create_router(state().await);

        let response = app.oneshot(health()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["store"]["healthy"], true);
        assert_eq!(body["directories"][0]["sid"], "hogwarts");
        assert_eq!(body["directories"][0]["reachable"], true);
    }

    #[tokio::test]
    async fn test_degraded_when_directory_down() {
        let directory = Arc::new(hogwarts());
        directory.set_unavailable(true);
        let app = create_router(state_with(auth_config(), directory).await);

        let response = app.oneshot(health()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["directories"][0]["reachable"], false);
    }
}
