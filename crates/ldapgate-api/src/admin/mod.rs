//! Admin API routes for ldapgate management
//!
//! These endpoints manage the authentication settings, inspect directory
//! servers and local accounts, and report health. Everything except the
//! health check requires the site owner's credentials.

mod accounts;
mod authentication;
mod health;
mod servers;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use serde::Serialize;

use crate::middleware::auth::admin_auth;
use crate::server::AppState;

pub use accounts::*;
pub use authentication::*;
pub use health::*;
pub use servers::*;

/// Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Create the admin API router
pub fn admin_routes(state: AppState) -> Router<AppState> {
    let protected = Router::new()
        // Authentication settings
        .route(
            "/authentication/config",
            get(get_authentication_config).put(update_authentication_config),
        )
        // Directory servers
        .route("/servers", get(list_servers))
        .route("/servers/{sid}/test", post(test_server))
        // Local accounts
        .route("/accounts", get(list_accounts))
        .route_layer(middleware::from_fn_with_state(state, admin_auth));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
}
