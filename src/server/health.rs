//! Liveness check.

use axum::http::StatusCode;

/// Returns 200 with the body `OK` while the server accepts connections.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}
