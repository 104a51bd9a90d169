//! Admission Pipeline
//!
//! One call in, one JSON-RPC response value out. Every step fails
//! closed: a policy that cannot be read denies, a reservation that
//! cannot commit denies, and any failure after the reservation commits
//! rolls it back before the response leaves the process. Rollback runs
//! on the request's own critical path, never on a detached task.

use axum::http::HeaderMap;
use serde_json::Value;
use std::time::Instant;
use tracing::{error, info, warn};

use aegis_chain::PolicySource;
use aegis_core::day::now_millis;
use aegis_core::error::AegisError;
use aegis_core::types::{Identity, PendingRecord};
use aegis_ledger::ReserveError;

use crate::identity::resolve_identity;
use crate::rpc::{error_response, extract_tx_hash, has_error, is_intercepted, request_id, request_method};
use crate::state::AppState;
use crate::tx::{self, ParsedTx};

/// Process one JSON-RPC call to completion.
pub async fn process_call(state: &AppState, headers: &HeaderMap, call: Value) -> Value {
    let id = request_id(&call);

    let Some(method) = request_method(&call).map(str::to_string) else {
        let err = AegisError::MalformedRequest("request has no method".into());
        return error_response(id, &err);
    };

    if !is_intercepted(&method) {
        return passthrough(state, &call, id).await;
    }

    let parsed = match tx::parse_intercepted(&method, &call) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(method, error = %err, "intercepted call failed to parse");
            return error_response(id, &err);
        }
    };

    // Zero-value calls carry no spend; they pass through untouched.
    if parsed.value.is_zero() {
        return passthrough(state, &call, id).await;
    }

    admit_and_forward(state, headers, call, id, &method, parsed).await
}

async fn passthrough(state: &AppState, call: &Value, id: Value) -> Value {
    match state.forwarder.forward_call(call).await {
        Ok(response) => {
            state.metrics.record_passthrough();
            response
        }
        Err(err) => error_response(id, &err),
    }
}

async fn admit_and_forward(
    state: &AppState,
    headers: &HeaderMap,
    call: Value,
    id: Value,
    method: &str,
    parsed: ParsedTx,
) -> Value {
    let started = Instant::now();

    let identity = match resolve_identity(headers, parsed.from.as_ref(), &state.config) {
        Ok(identity) => identity,
        Err(err) => {
            warn!(method, error = %err, "identity resolution failed");
            return error_response(id, &err);
        }
    };

    // 1. Policy: missing or kill-switched pairs deny before any write.
    let policy = match state.policies.policy(&identity).await {
        Ok(policy) => policy,
        Err(e) => {
            let err = AegisError::PolicyRead(e.to_string());
            return deny(state, &identity, method, &parsed, started, id, err);
        }
    };
    if !policy.exists {
        let err = AegisError::NoPolicy {
            user: identity.user.to_string(),
            agent: identity.agent.to_string(),
        };
        return deny(state, &identity, method, &parsed, started, id, err);
    }
    if !policy.is_active {
        let err = AegisError::KillSwitch {
            user: identity.user.to_string(),
            agent: identity.agent.to_string(),
        };
        return deny(state, &identity, method, &parsed, started, id, err);
    }

    // 2. Reserve against the raw 256-bit limit. The ledger, not the
    // chain's stale currentSpend, is the admission authority.
    match state
        .ledger
        .reserve(&identity, parsed.value, policy.daily_limit)
        .await
    {
        Ok(_) => {}
        Err(ReserveError::LimitExceeded {
            current,
            requested,
            limit,
        }) => {
            let err = AegisError::LimitExceeded {
                requested: requested.to_string(),
                remaining: limit.saturating_sub(current).to_string(),
            };
            return deny(state, &identity, method, &parsed, started, id, err);
        }
        Err(other) => {
            let err = AegisError::ReserveFailed(other.to_string());
            return deny(state, &identity, method, &parsed, started, id, err);
        }
    }

    // 3. Forward. From here on every failure path must release the
    // reservation before responding.
    match state.forwarder.forward_call(&call).await {
        Err(err) => {
            release_reservation(state, &identity, &parsed).await;
            decision(&identity, method, &parsed, "FORWARD_FAILED", started);
            error_response(id, &err)
        }
        Ok(response) if has_error(&response) => {
            release_reservation(state, &identity, &parsed).await;
            state.metrics.record_upstream_error();
            decision(&identity, method, &parsed, "UPSTREAM_ERROR", started);
            // The upstream error object goes back verbatim.
            response
        }
        Ok(response) => {
            let tx_hash = extract_tx_hash(&response);
            let record = PendingRecord::new(tx_hash, parsed.value, now_millis());
            if let Err(e) = state.queue.push_pending(&identity, &record).await {
                // The spend already settled upstream; losing the record
                // only delays anchoring, so respond normally but loudly.
                error!(
                    identity = %identity,
                    error = %e,
                    "pending enqueue failed after successful forward"
                );
            }
            state.metrics.record_admitted();
            decision(&identity, method, &parsed, "ADMITTED", started);
            response
        }
    }
}

/// Reject before forward: count it, log it, shape the error response.
fn deny(
    state: &AppState,
    identity: &Identity,
    method: &str,
    parsed: &ParsedTx,
    started: Instant,
    id: Value,
    err: AegisError,
) -> Value {
    state.metrics.record_rejection(err.kind());
    decision(identity, method, parsed, err.kind(), started);
    error_response(id, &err)
}

async fn release_reservation(state: &AppState, identity: &Identity, parsed: &ParsedTx) {
    match state.ledger.rollback(identity, parsed.value).await {
        Ok(_) => state.metrics.record_rollback(),
        // Reconciled by the 72h day-bucket expiry.
        Err(e) => warn!(identity = %identity, error = %e, "reservation rollback failed"),
    }
}

/// The one structured log line per admission decision.
fn decision(identity: &Identity, method: &str, parsed: &ParsedTx, outcome: &str, started: Instant) {
    info!(
        user = %identity.user,
        agent = %identity.agent,
        method,
        value_wei = %parsed.value,
        outcome,
        duration_ms = started.elapsed().as_millis() as u64,
        "admission decision"
    );
}
