//! Local account handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tracing::{debug, error};

use super::ApiResponse;
use crate::server::AppState;

/// GET /api/v1/accounts
pub async fn list_accounts(State(state): State<AppState>) -> Response {
    debug!("GET /api/v1/accounts");

    match state.authenticator.store().list_accounts().await {
        Ok(accounts) => Json(ApiResponse::success(accounts)).into_response(),
        Err(e) => {
            error!("Failed to list accounts: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(e.to_string())),
            )
                .into_response()
        }
    }
}
