//! Authentication middleware for Admin API

use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tracing::{debug, warn};

use crate::server::AppState;

/// Admin authentication middleware
///
/// Accepts HTTP Basic credentials of the site owner (uid 1), checked
/// against the local password hash only. The owner account is added to the
/// request extensions.
pub async fn admin_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let credentials = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(decode_basic);

    let Some((name, password)) = credentials else {
        return challenge();
    };

    match state.authenticator.verify_site_owner(&name, &password).await {
        Ok(owner) => {
            debug!(uid = owner.uid, "Admin request authenticated");
            request.extensions_mut().insert(owner);
            next.run(request).await
        }
        Err(e) => {
            warn!(name = %name, error = %e, "Admin authentication failed");
            challenge()
        }
    }
}

/// Decode `Basic <base64(name:password)>`
fn decode_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;

    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    let parts: Vec<&str> = credentials.splitn(2, ':').collect();
    if parts.len() != 2 {
        return None;
    }

    Some((parts[0].to_string(), parts[1].to_string()))
}

fn challenge() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"ldapgate\"")],
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_basic() {
        let header = format!("Basic {}", BASE64.encode("admin:pa:ss"));
        assert_eq!(
            decode_basic(&header),
            Some(("admin".to_string(), "pa:ss".to_string()))
        );

        assert_eq!(decode_basic("Bearer abc"), None);
        assert_eq!(decode_basic("Basic !!!"), None);
        assert_eq!(decode_basic(&format!("Basic {}", BASE64.encode("nocolon"))), None);
    }
}
