//! Login, logout and session handlers

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Extension, Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use chrono::{DateTime, Utc};
use ldapgate_auth::{LoginMethod, LoginOutcome};
use ldapgate_core::types::LocalAccount;
use ldapgate_core::{Result, SESSION_COOKIE};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info};

use super::{login_failure, request_context, session_cookie, FailureBody};
use crate::admin::ApiResponse;
use crate::metrics::LoginKind;
use crate::server::AppState;
use crate::session::Session;

/// Submitted login form
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(alias = "username")]
    pub name: String,
    #[serde(alias = "pass")]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub success: bool,
    pub account: LocalAccount,
    pub method: LoginMethod,
    pub provisioned: bool,
    pub messages: Vec<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub account: LocalAccount,
}

/// Accepts JSON, otherwise treats the body as a urlencoded form
fn parse_login(headers: &HeaderMap, body: &[u8]) -> std::result::Result<LoginRequest, String> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if content_type.starts_with("application/json") {
        serde_json::from_slice(body).map_err(|e| format!("Invalid login request: {}", e))
    } else {
        serde_urlencoded::from_bytes(body).map_err(|e| format!("Invalid login form: {}", e))
    }
}

/// Create a session for an admitted login and add its cookie
pub(crate) async fn establish_session(
    state: &AppState,
    jar: CookieJar,
    outcome: LoginOutcome,
) -> (CookieJar, Session, LoginResponse) {
    let (session, value) = state
        .sessions
        .create(&outcome.account, outcome.method.clone())
        .await;
    state.metrics.set_active_sessions(state.sessions.active().await);

    let jar = jar.add(session_cookie(value, state.config.session.cookie_secure));
    let response = LoginResponse {
        success: true,
        account: outcome.account,
        method: outcome.method,
        provisioned: outcome.provisioned,
        messages: outcome.messages,
        expires_at: session.expires_at,
    };
    (jar, session, response)
}

/// Record the attempt, then answer with a session or the failure message
async fn finish_login(
    state: &AppState,
    jar: CookieJar,
    kind: LoginKind,
    start: Instant,
    result: Result<LoginOutcome>,
) -> Response {
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(outcome) => {
            state.metrics.record_login(kind, "success", elapsed);
            if outcome.provisioned {
                state.metrics.record_provisioned();
            }
            let (jar, _, body) = establish_session(state, jar, outcome).await;
            (jar, Json(body)).into_response()
        }
        Err(err) => {
            state.metrics.record_login(kind, err.code(), elapsed);
            if err.is_login_failure() {
                info!(kind = kind.as_str(), code = err.code(), "Login failed");
            } else {
                error!(kind = kind.as_str(), error = %err, "Login errored");
            }
            login_failure(state, &err).await
        }
    }
}

/// POST /user/login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = match parse_login(&headers, &body) {
        Ok(request) => request,
        Err(message) => {
            debug!(error = %message, "Rejected login request body");
            let body = FailureBody {
                success: false,
                error: message,
                code: "InvalidArgument",
            };
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };

    let start = Instant::now();
    let result = state
        .authenticator
        .login(&request.name, &request.password)
        .await;
    finish_login(&state, jar, LoginKind::Password, start, result).await
}

/// GET /user/login/sso
pub async fn sso_login(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let ctx = request_context(&headers, &uri);

    let start = Instant::now();
    let result = state.authenticator.sso_login(&ctx).await;
    finish_login(&state, jar, LoginKind::Sso, start, result).await
}

/// POST /user/logout
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> impl IntoResponse {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if let Some(session) = state.sessions.remove(cookie.value()).await {
            info!(uid = session.uid, name = %session.name, "Logged out");
        }
    }
    state.metrics.set_active_sessions(state.sessions.active().await);

    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, StatusCode::NO_CONTENT)
}

/// GET /user/session
pub async fn current_session(
    State(state): State<AppState>,
    jar: CookieJar,
    seamless: Option<Extension<Session>>,
) -> Response {
    let session = match seamless {
        Some(Extension(session)) => Some(session),
        None => match jar.get(SESSION_COOKIE) {
            Some(cookie) => state.sessions.get(cookie.value()).await,
            None => None,
        },
    };

    let Some(session) = session else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(ApiResponse::<()>::error("Not logged in")),
        )
            .into_response();
    };

    match state.authenticator.store().get_account(session.uid).await {
        Ok(Some(account)) if account.is_active() => {
            Json(ApiResponse::success(SessionView { session, account })).into_response()
        }
        Ok(_) => {
            info!(uid = session.uid, "Session refers to a missing or blocked account");
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiResponse::<()>::error("Not logged in")),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Failed to load session account");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiResponse::<()>::error(e.to_string())),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::server::create_router;
    use crate::server::test_support::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use ldapgate_core::messages;
    use ldapgate_core::types::AuthenticationConfig;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn json_login(name: &str, password: &str) -> Request<Body> {
        Request::post("/user/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                serde_json::json!({ "name": name, "password": password }).to_string(),
            ))
            .unwrap()
    }

    fn session_cookie_of(response: &axum::http::Response<Body>) -> String {
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    async fn app() -> Router {
        create_router(state().await)
    }

    #[tokio::test]
    async fn test_json_login_sets_session_cookie() {
        let response = app().await.oneshot(json_login("hpotter", "pass")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("ldapgate_session="));
        assert!(set_cookie.contains("HttpOnly"));

        let body = json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["provisioned"], true);
        assert_eq!(body["account"]["name"], "hpotter");
        assert_eq!(body["method"]["type"], "ldap");
        assert_eq!(body["method"]["sid"], "hogwarts");
    }

    #[tokio::test]
    async fn test_form_login() {
        let request = Request::post("/user/login")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("name=hpotter&pass=pass"))
            .unwrap();

        let response = app().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_bad_credentials_are_401() {
        let response = app().await.oneshot(json_login("hpotter", "wrong")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let body = json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "InvalidCredentials");
        assert_eq!(body["error"], messages::BAD_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_unknown_user_shares_credentials_message() {
        let response = app().await.oneshot(json_login("dmalfoy", "pass")).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let body = json(response).await;
        assert_eq!(body["code"], "NotFound");
        assert_eq!(body["error"], messages::BAD_CREDENTIALS);
    }

    #[tokio::test]
    async fn test_disallowed_user_is_403() {
        let config = AuthenticationConfig {
            allow_only_if_text_in_dn: vec!["pot".to_string()],
            help_link_url: Some("https://help.hogwarts.edu".to_string()),
            help_link_text: Some("Help desk".to_string()),
            ..auth_config()
        };
        let app = create_router(state_with(config, Arc::new(hogwarts())).await);

        let response = app.oneshot(json_login("ssnape", "pass")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = json(response).await;
        assert_eq!(body["code"], "UserDisallowed");
        let error = body["error"].as_str().unwrap();
        assert!(error.starts_with(messages::USER_DISALLOWED));
        assert!(error.contains("https://help.hogwarts.edu"));
    }

    #[tokio::test]
    async fn test_unavailable_directory_is_503() {
        let directory = Arc::new(hogwarts());
        directory.set_unavailable(true);
        let app = create_router(state_with(auth_config(), directory).await);

        let response = app.oneshot(json_login("hpotter", "pass")).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(json(response).await["code"], "ServerError");
    }

    #[tokio::test]
    async fn test_malformed_body_is_400() {
        let request = Request::post("/user/login")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"name\":"))
            .unwrap();

        let response = app().await.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json(response).await["code"], "InvalidArgument");
    }

    #[tokio::test]
    async fn test_session_and_logout() {
        let app = app().await;

        let response = app.clone().oneshot(json_login("hpotter", "pass")).await.unwrap();
        let cookie = session_cookie_of(&response);

        let response = app
            .clone()
            .oneshot(
                Request::get("/user/session")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json(response).await;
        assert_eq!(body["data"]["account"]["name"], "hpotter");
        assert_eq!(body["data"]["session"]["name"], "hpotter");

        let response = app
            .clone()
            .oneshot(
                Request::post("/user/logout")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(
                Request::get("/user/session")
                    .header(header::COOKIE, &cookie)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_site_owner_logs_in_locally() {
        let response = app().await.oneshot(json_login(OWNER, OWNER_PASSWORD)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["account"]["uid"], 1);
        assert_eq!(body["method"]["type"], "local");
    }

    fn sso_config(enabled: bool) -> AuthenticationConfig {
        let mut config = auth_config();
        config.sso.enabled = enabled;
        config.sso.strip_domain_name = true;
        config.sso.notify_authentication = true;
        config
    }

    #[tokio::test]
    async fn test_sso_endpoint() {
        let app = create_router(state_with(sso_config(true), Arc::new(hogwarts())).await);

        let response = app
            .oneshot(
                Request::get("/user/login/sso")
                    .header("remote_user", "hpotter@hogwarts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json(response).await;
        assert_eq!(body["account"]["name"], "hpotter");
        assert_eq!(body["method"]["type"], "sso");
        assert_eq!(body["messages"][0], messages::SSO_LOGGED_IN);
    }

    #[tokio::test]
    async fn test_sso_endpoint_disabled() {
        let app = create_router(state_with(sso_config(false), Arc::new(hogwarts())).await);

        let response = app
            .oneshot(
                Request::get("/user/login/sso")
                    .header("remote_user", "hpotter")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json(response).await["code"], "SsoDisabled");
    }
}
