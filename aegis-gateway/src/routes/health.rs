//! Health and metrics endpoints

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use aegis_core::day::now_millis;
use aegis_core::metrics::MetricsSnapshot;
use aegis_ledger::kv::KvStore;
use aegis_ledger::ANCHOR_LOCK_KEY;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub store_ok: bool,
    pub upstream_ok: bool,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub version: String,
    pub store_ok: bool,
    pub upstream_ok: bool,
    pub anchor_lock_held: bool,
    pub failed_queue_depth: u64,
    pub anchoring_enabled: bool,
}

/// Round-trip a probe key through the store.
async fn probe_store(state: &AppState) -> bool {
    let stamp = now_millis().to_string();
    if state
        .store
        .set("health:probe", &stamp, Some(std::time::Duration::from_secs(60)))
        .await
        .is_err()
    {
        return false;
    }
    matches!(state.store.get("health:probe").await, Ok(Some(read)) if read == stamp)
}

/// Health: OK when the store and the upstream both answered the probe.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = probe_store(&state).await;
    let upstream_ok = state.forwarder.probe().await;
    let healthy = store_ok && upstream_ok;

    let body = HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        version: state.version.clone(),
        store_ok,
        upstream_ok,
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Readiness: the health probes plus anchoring state.
pub async fn ready_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ok = probe_store(&state).await;
    let upstream_ok = state.forwarder.probe().await;
    let anchor_lock_held = state
        .store
        .exists(ANCHOR_LOCK_KEY)
        .await
        .unwrap_or(false);
    let failed_queue_depth = state.queue.total_failed_depth().await.unwrap_or(0);
    let ready = store_ok && upstream_ok;

    let body = ReadyResponse {
        status: if ready { "ready" } else { "degraded" }.to_string(),
        version: state.version.clone(),
        store_ok,
        upstream_ok,
        anchor_lock_held,
        failed_queue_depth,
        anchoring_enabled: state.worker.is_some(),
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

/// Counter snapshot.
pub async fn metrics_snapshot(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
