use super::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, header::HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use subtle::ConstantTimeEq;
use tracing::warn;

pub(super) fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .filter(|t| !t.is_empty())
}

pub(super) fn is_admin_authorized(headers: &HeaderMap, expected_token: &str) -> bool {
    if expected_token.is_empty() {
        return false;
    }
    extract_bearer_token(headers)
        .is_some_and(|token| bool::from(token.as_bytes().ct_eq(expected_token.as_bytes())))
}

/// Guards `/api`. With no token configured every request passes.
pub(super) async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let expected = state.config.admin_token.as_str();
    if expected.is_empty() || is_admin_authorized(request.headers(), expected) {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Rejected unauthorized API request");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": "Unauthorized" })),
    )
        .into_response()
}
