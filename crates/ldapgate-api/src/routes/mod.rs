//! Login routes
//!
//! Password login, explicit SSO login, logout and session inspection.

mod login;

pub use login::*;
pub(crate) use login::establish_session;

use axum::{
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, SameSite};
use ldapgate_auth::sso::{LOGIN_PATH, SSO_PATH};
use ldapgate_core::types::RequestContext;
use ldapgate_core::{Error, SESSION_COOKIE};
use serde::Serialize;

use crate::server::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route(LOGIN_PATH, post(login))
        .route(SSO_PATH, get(sso_login))
        .route("/user/logout", post(logout))
        .route("/user/session", get(current_session))
}

/// Body of a failed login
#[derive(Debug, Serialize)]
pub struct FailureBody {
    pub success: bool,
    pub error: String,
    pub code: &'static str,
}

/// Error response carrying the login form message
pub async fn login_failure(state: &AppState, err: &Error) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = FailureBody {
        success: false,
        error: state.authenticator.failure_message(err).await,
        code: err.code(),
    };
    (status, Json(body)).into_response()
}

/// Signed session cookie
pub fn session_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(secure)
        .build()
}

/// SSO input for a request.
///
/// Every header becomes a server variable, so the front-end proxy must
/// strip any client-supplied copy of the remote user header.
pub fn request_context(headers: &HeaderMap, uri: &Uri) -> RequestContext {
    let host = headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .or_else(|| uri.host())
        .unwrap_or_default();
    let host = match host.rsplit_once(':') {
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    };

    let mut ctx = RequestContext::new(uri.path(), host);
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            ctx.server_vars.insert(name.as_str().to_string(), value.to_string());
        }
    }
    ctx
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_request_context_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("intranet.hogwarts.edu:8080"));
        headers.insert("remote_user", HeaderValue::from_static("hpotter@HOGWARTS"));

        let uri: Uri = "/node/12?page=2".parse().unwrap();
        let ctx = request_context(&headers, &uri);

        assert_eq!(ctx.path, "/node/12");
        assert_eq!(ctx.host, "intranet.hogwarts.edu");
        assert_eq!(ctx.var("REMOTE_USER"), Some("hpotter@HOGWARTS"));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("abc.def".to_string(), true);
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.path(), Some("/"));
    }
}
