//! HTTP Basic authentication middleware
//!
//! Lifecycle requests (POST/DELETE) always require credentials, checked
//! before any handler runs so a rejected request has no side effects.
//! Read requests pass through unless `protect_reads` is enabled.

use axum::extract::{Request, State};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::prelude::*;
use tracing::warn;

use crate::error::Error;
use crate::server::api::ApiResponse;
use crate::server::AppState;

/// Gate requests on HTTP Basic credentials
pub async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    // Reads stay open unless the deployment opts in to protecting them
    if request.method() == Method::GET && !state.auth.protect_reads {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_basic);

    match provided {
        Some((username, password))
            if username == state.auth.username && password == state.auth.password =>
        {
            next.run(request).await
        }
        _ => {
            warn!(
                "Rejected unauthenticated {} {}",
                request.method(),
                request.uri().path()
            );
            unauthorized()
        }
    }
}

/// Decode a `Basic` authorization header into credentials
///
/// The password keeps everything after the first colon, so passwords
/// containing colons survive.
fn parse_basic(header: &str) -> Option<(String, String)> {
    let encoded = header.strip_prefix("Basic ")?;
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (username, password) = text.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn unauthorized() -> Response {
    let err = Error::AuthenticationFailure;
    (
        err.status_code(),
        [(WWW_AUTHENTICATE, "Basic realm=\"kelpie\"")],
        Json(ApiResponse::<()>::error(err.public_message())),
    )
        .into_response()
}
