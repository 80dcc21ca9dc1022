//! Liveness and storage readiness.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// `ok`, or `degraded` when a dependency is down.
    pub status: &'static str,
    /// `ok` or `unavailable`.
    pub store: &'static str,
    /// Whether a Stripe key is configured.
    pub gateway_configured: bool,
    /// Service version.
    pub version: &'static str,
}

/// Report whether the billing store answers.
///
/// The gateway is not called; a missing key only shows up as
/// `gateway_configured: false`.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, store) = match state.store.ping().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(e) => {
            tracing::error!(error = %e, "Store health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    };

    let body = HealthResponse {
        status: if status.is_success() { "ok" } else { "degraded" },
        store,
        gateway_configured: state
            .config
            .stripe_api_key
            .as_deref()
            .is_some_and(|k| !k.is_empty()),
        version: env!("CARGO_PKG_VERSION"),
    };

    (status, Json(body))
}
