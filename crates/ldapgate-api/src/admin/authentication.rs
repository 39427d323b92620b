//! Authentication settings handlers

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ldapgate_core::types::{AuthenticationConfig, AuthenticationForm};
use ldapgate_core::Error;
use serde::Serialize;
use tracing::{debug, error, info};

use super::ApiResponse;
use crate::server::AppState;

/// Current settings in both shapes
#[derive(Debug, Serialize)]
pub struct AuthenticationSettings {
    pub config: AuthenticationConfig,
    pub form: AuthenticationForm,
}

/// GET /api/v1/authentication/config
pub async fn get_authentication_config(State(state): State<AppState>) -> impl IntoResponse {
    debug!("GET /api/v1/authentication/config");

    let config = state.authenticator.config().await;
    let form = AuthenticationForm::from_config(&config);
    Json(ApiResponse::success(AuthenticationSettings { config, form }))
}

/// PUT /api/v1/authentication/config
///
/// Takes the form shape, with list fields as newline-delimited text.
pub async fn update_authentication_config(
    State(state): State<AppState>,
    Json(form): Json<AuthenticationForm>,
) -> Response {
    let current = state.authenticator.config().await;
    let config = form.into_config(&current);

    match state.authenticator.update_config(config.clone()).await {
        Ok(()) => {
            info!(sids = ?config.sids, mode = ?config.authentication_mode, "Authentication settings saved");
            let form = AuthenticationForm::from_config(&config);
            Json(ApiResponse::success(AuthenticationSettings { config, form })).into_response()
        }
        Err(Error::InvalidArgument(message)) => {
            debug!(error = %message, "Rejected authentication settings");
            (
                StatusCode::BAD_REQUEST,
                Json(ApiResponse::<()>::error(message)),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to save authentication settings");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(e.to_string())),
            )
                .into_response()
        }
    }
}
