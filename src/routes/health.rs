//! Unauthenticated health-check endpoint.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// `GET /healthz` — liveness probe.
///
/// Reports uptime, version, and the number of live web sessions. Does not
/// touch the backend, so it stays green while the backend is down.
pub async fn healthz(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "web_sessions": state.store.session_count().await,
    }))
}
