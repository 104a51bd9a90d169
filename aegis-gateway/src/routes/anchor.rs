//! Anchor trigger and failed-queue operations
//!
//! All routes here are operator surface and sit behind the configured
//! bearer token. The one-shot trigger runs a single worker iteration
//! under the same distributed lock the background runner uses, with the
//! lock TTL as its hard timeout.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use aegis_anchor::{IterationOutcome, IterationReport};
use aegis_core::types::{EvmAddress, Identity};
use aegis_ledger::LOCK_TTL;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
pub struct FailedQueueView {
    pub user: String,
    pub agent: String,
    pub depth: usize,
    pub records: Vec<Value>,
}

#[derive(Serialize)]
pub struct RequeueResult {
    pub moved: usize,
}

fn authorize(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(secret) = state.config.anchor_secret.as_deref() else {
        return Err(ApiError::Unauthorized(
            "anchor secret is not configured".into(),
        ));
    };
    let presented = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match presented {
        Some(token) if token == secret => Ok(()),
        _ => Err(ApiError::Unauthorized("invalid bearer token".into())),
    }
}

fn parse_identity(user: &str, agent: &str) -> ApiResult<Identity> {
    let user = EvmAddress::parse(user).map_err(ApiError::BadRequest)?;
    let agent = EvmAddress::parse(agent).map_err(ApiError::BadRequest)?;
    Ok(Identity::new(user, agent))
}

/// Run one anchor iteration now. 409 when the lock is held elsewhere.
pub async fn run_anchor(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<IterationReport>> {
    authorize(&state, &headers)?;

    let Some(worker) = state.worker.as_ref() else {
        return Err(ApiError::Unavailable(
            "anchoring disabled: no facilitator key configured".into(),
        ));
    };

    let outcome = tokio::time::timeout(LOCK_TTL, worker.run_iteration())
        .await
        .map_err(|_| ApiError::Internal("anchor iteration timed out".into()))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    match outcome {
        IterationOutcome::LockHeld => Err(ApiError::Conflict(
            "anchor lock is held by another instance".into(),
        )),
        IterationOutcome::Completed(report) => Ok(Json(report)),
    }
}

/// Snapshot one failed queue.
pub async fn list_failed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user, agent)): Path<(String, String)>,
) -> ApiResult<Json<FailedQueueView>> {
    authorize(&state, &headers)?;
    let identity = parse_identity(&user, &agent)?;

    let raw_records = state
        .queue
        .list_failed(&identity)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    // Undecodable entries are shown as raw strings rather than hidden.
    let records = raw_records
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.clone())))
        .collect::<Vec<_>>();

    Ok(Json(FailedQueueView {
        user: identity.user.to_string(),
        agent: identity.agent.to_string(),
        depth: records.len(),
        records,
    }))
}

/// Move every failed record back onto the pending queue.
pub async fn requeue_failed(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((user, agent)): Path<(String, String)>,
) -> ApiResult<Json<RequeueResult>> {
    authorize(&state, &headers)?;
    let identity = parse_identity(&user, &agent)?;

    let moved = state
        .queue
        .requeue_failed(&identity)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(RequeueResult { moved }))
}
