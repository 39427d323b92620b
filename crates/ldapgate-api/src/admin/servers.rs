//! Directory server handlers
//!
//! Provides endpoints for:
//! - Listing server definitions (passwords removed)
//! - Connection testing
//! - User search testing

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ldapgate_auth::{SanitizedServer, TestConnectionResponse};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::ApiResponse;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct TestServerRequest {
    /// Username to look up after the connection test
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TestServerResponse {
    pub connection: TestConnectionResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<TestSearchResult>,
}

#[derive(Debug, Default, Serialize)]
pub struct TestSearchResult {
    pub username: String,
    pub found: bool,
    pub dn: Option<String>,
    pub account_name: Option<String>,
    pub mail: Option<String>,
    pub persistent_id: Option<String>,
    pub error: Option<String>,
}

/// GET /api/v1/servers
pub async fn list_servers(State(state): State<AppState>) -> impl IntoResponse {
    debug!("GET /api/v1/servers");

    let servers: Vec<SanitizedServer> = state
        .authenticator
        .registry()
        .all()
        .iter()
        .map(|d| SanitizedServer::from(d.definition()))
        .collect();

    Json(ApiResponse::success(servers))
}

/// POST /api/v1/servers/{sid}/test
///
/// The body is optional; `{"username": "..."}` adds a search test.
pub async fn test_server(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    body: Bytes,
) -> Response {
    let request: TestServerRequest = if body.is_empty() {
        TestServerRequest::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(request) => request,
            Err(e) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::<()>::error(format!("Invalid request: {}", e))),
                )
                    .into_response()
            }
        }
    };

    let Some(directory) = state.authenticator.registry().get(&sid) else {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<()>::error(format!("Unknown LDAP server '{}'", sid))),
        )
            .into_response();
    };

    info!(sid = %sid, "Testing LDAP server");

    let connection = match directory.test_connection().await {
        Ok(info) => TestConnectionResponse {
            sid: sid.clone(),
            success: true,
            message: "Connection successful".to_string(),
            server_info: Some(info),
        },
        Err(e) => {
            warn!(sid = %sid, error = %e, "LDAP server test failed");
            TestConnectionResponse {
                sid: sid.clone(),
                success: false,
                message: format!("Connection failed: {}", e),
                server_info: None,
            }
        }
    };

    let search = match request.username.as_deref().map(str::trim) {
        Some(username) if !username.is_empty() && connection.success => {
            let definition = directory.definition();
            let mut result = TestSearchResult {
                username: username.to_string(),
                ..Default::default()
            };

            match directory.find_entry(username, None).await {
                Ok(Some(entry)) => {
                    result.found = true;
                    result.account_name = entry
                        .get_attr(definition.account_name_attr())
                        .map(str::to_string);
                    result.mail = entry.get_attr(&definition.mail_attr).map(str::to_string);
                    result.persistent_id = definition
                        .unique_persistent_attr
                        .as_deref()
                        .and_then(|attr| entry.get_attr(attr))
                        .map(str::to_string);
                    result.dn = Some(entry.dn);
                }
                Ok(None) => {}
                Err(e) => result.error = Some(e.to_string()),
            }
            Some(result)
        }
        _ => None,
    };

    Json(ApiResponse::success(TestServerResponse { connection, search })).into_response()
}
