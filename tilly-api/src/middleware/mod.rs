pub mod auth;

pub use auth::{auth_middleware, issue_token, Claims, CurrentUser};

use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::state::AppState;

const MAX_LOGGED_BODY: usize = 1024 * 1024;

/// Logs JSON request bodies at debug level when enabled in configuration.
pub async fn log_request_body(State(state): State<AppState>, req: Request, next: Next) -> Result<Response, StatusCode> {
    if !state.log_request_bodies {
        return Ok(next.run(req).await);
    }

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_LOGGED_BODY)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;
    if !bytes.is_empty() {
        tracing::debug!(
            "{} {} body: {}",
            parts.method,
            parts.uri,
            String::from_utf8_lossy(&bytes)
        );
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
