//! HTTP basic auth for the dashboard endpoints

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use secrecy::ExposeSecret;
use tracing::debug;

use crate::server::state::{Credentials, ServerState};

const REALM: &str = "Basic realm=\"pod\"";

/// Reject requests without valid dashboard credentials
pub async fn require_basic_auth(
    State(state): State<Arc<ServerState>>,
    request: Request,
    next: Next,
) -> Response {
    if is_authorized(request.headers(), &state.credentials) {
        return next.run(request).await;
    }
    debug!("Rejected unauthenticated request to {}", request.uri());
    let mut response = StatusCode::UNAUTHORIZED.into_response();
    response
        .headers_mut()
        .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
    response
}

fn is_authorized(headers: &HeaderMap, credentials: &Credentials) -> bool {
    let Some((username, password)) = basic_credentials(headers) else {
        return false;
    };
    username == credentials.username && password == credentials.password.expose_secret()
}

/// Decode `Authorization: Basic <base64(user:pass)>`
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}
