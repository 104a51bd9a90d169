//! Route handlers

pub mod anchor;
pub mod health;
pub mod policy;
pub mod rpc;

use axum::{routing::get, routing::post, Router};

use crate::state::AppState;

/// Create the gateway router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Firewall data plane
        .route("/rpc", post(rpc::rpc_endpoint))
        // Health endpoints
        .route("/health", get(health::health_check))
        .route("/ready", get(health::ready_check))
        // Policy inspection
        .route("/policy/:user/:agent", get(policy::inspect_policy))
        // Anchoring and failed-queue operations
        .route("/anchor/run", post(anchor::run_anchor))
        .route("/failed/:user/:agent", get(anchor::list_failed))
        .route("/failed/:user/:agent/requeue", post(anchor::requeue_failed))
        // Metrics snapshot
        .route("/metrics", get(health::metrics_snapshot))
        // State
        .with_state(state)
}
