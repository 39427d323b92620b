//! Seamless single sign-on
//!
//! Logs anonymous visitors in from the identity asserted by the front-end
//! web server, according to the configured seamless mode. A failed attempt
//! leaves the request anonymous.

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use ldapgate_auth::sso::{self, LOGIN_PATH, SSO_PATH};
use ldapgate_core::SESSION_COOKIE;
use std::time::Instant;
use tracing::{debug, info};

use crate::metrics::LoginKind;
use crate::routes::{establish_session, request_context};
use crate::server::AppState;

pub async fn seamless_sso(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if let Some(cookie) = jar.get(SESSION_COOKIE) {
        if state.sessions.get(cookie.value()).await.is_some() {
            return next.run(request).await;
        }
    }

    // explicit logins are handled by their own routes
    let path = request.uri().path();
    if path == SSO_PATH || (path == LOGIN_PATH && request.method() == Method::POST) {
        return next.run(request).await;
    }

    let config = state.authenticator.config().await;
    let ctx = request_context(request.headers(), request.uri());
    if !sso::should_auto_login(&ctx, &config.sso) {
        return next.run(request).await;
    }

    let start = Instant::now();
    match state.authenticator.sso_login(&ctx).await {
        Ok(outcome) => {
            state
                .metrics
                .record_login(LoginKind::SeamlessSso, "success", start.elapsed().as_secs_f64());
            if outcome.provisioned {
                state.metrics.record_provisioned();
            }

            let (jar, session, _) = establish_session(&state, jar, outcome).await;
            info!(uid = session.uid, path = %ctx.path, "Seamless SSO login");

            request.extensions_mut().insert(session);
            let response = next.run(request).await;
            (jar, response).into_response()
        }
        Err(e) => {
            state
                .metrics
                .record_login(LoginKind::SeamlessSso, e.code(), start.elapsed().as_secs_f64());
            debug!(path = %ctx.path, code = e.code(), "Seamless SSO did not log in; continuing anonymously");
            next.run(request).await
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::server::create_router;
    use crate::server::test_support::*;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use ldapgate_core::types::{AuthenticationConfig, SeamlessLogin};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn seamless(mode: SeamlessLogin) -> AuthenticationConfig {
        let mut config = auth_config();
        config.sso.enabled = true;
        config.sso.seamless_login = mode;
        config.sso.excluded_paths = vec!["/api/*".to_string()];
        config
    }

    fn session_request(user: Option<&str>) -> Request<Body> {
        let mut builder = Request::get("/user/session");
        if let Some(user) = user {
            builder = builder.header("remote_user", user);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_every_page_logs_in() {
        let app = create_router(
            state_with(seamless(SeamlessLogin::EveryPage), Arc::new(hogwarts())).await,
        );

        let response = app.oneshot(session_request(Some("hpotter"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::SET_COOKIE).is_some());
        assert_eq!(json(response).await["data"]["account"]["name"], "hpotter");
    }

    #[tokio::test]
    async fn test_off_leaves_request_anonymous() {
        let app =
            create_router(state_with(seamless(SeamlessLogin::Off), Arc::new(hogwarts())).await);

        let response = app.oneshot(session_request(Some("hpotter"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_login_path_only() {
        let app = create_router(
            state_with(seamless(SeamlessLogin::LoginPathOnly), Arc::new(hogwarts())).await,
        );

        // not under /user/login
        let response = app
            .oneshot(session_request(Some("hpotter")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_failed_sso_continues_anonymously() {
        let app = create_router(
            state_with(seamless(SeamlessLogin::EveryPage), Arc::new(hogwarts())).await,
        );

        let response = app.clone().oneshot(session_request(Some("dmalfoy"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app.oneshot(session_request(None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_excluded_path_skipped() {
        let app = create_router(
            state_with(seamless(SeamlessLogin::EveryPage), Arc::new(hogwarts())).await,
        );

        let response = app
            .oneshot(
                Request::get("/api/v1/health")
                    .header("remote_user", "hpotter")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }
}
