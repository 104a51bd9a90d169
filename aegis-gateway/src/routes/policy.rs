//! Policy inspection endpoint

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use aegis_chain::PolicySource;
use aegis_core::types::{format_wei_as_eth, EvmAddress, Identity};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyView {
    pub daily_limit: String,
    pub daily_limit_eth: String,
    pub current_spend: String,
    pub current_spend_eth: String,
    pub last_reset: u64,
    pub is_active: bool,
    pub exists: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyInspection {
    pub user: String,
    pub agent: String,
    pub policy: PolicyView,
    pub reserved_today: String,
    pub reserved_today_eth: String,
    pub remaining_today: String,
    pub pending_records: usize,
    pub failed_records: usize,
}

/// Registry tuple plus ledger state for one (user, agent) pair.
pub async fn inspect_policy(
    State(state): State<AppState>,
    Path((user, agent)): Path<(String, String)>,
) -> ApiResult<Json<PolicyInspection>> {
    let user = EvmAddress::parse(&user).map_err(ApiError::BadRequest)?;
    let agent = EvmAddress::parse(&agent).map_err(ApiError::BadRequest)?;
    let identity = Identity::new(user, agent);

    let policy = state
        .policies
        .policy(&identity)
        .await
        .map_err(|e| ApiError::Internal(format!("policy read failed: {e}")))?;

    let reserved = state
        .ledger
        .reserved_today(&identity)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let pending_records = state
        .queue
        .pending_len(&identity)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let failed_records = state
        .queue
        .failed_len(&identity)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let remaining = policy.daily_limit.saturating_sub(reserved);

    Ok(Json(PolicyInspection {
        user: identity.user.to_string(),
        agent: identity.agent.to_string(),
        policy: PolicyView {
            daily_limit: policy.daily_limit.to_string(),
            daily_limit_eth: policy.daily_limit_eth(),
            current_spend: policy.current_spend.to_string(),
            current_spend_eth: policy.current_spend_eth(),
            last_reset: policy.last_reset,
            is_active: policy.is_active,
            exists: policy.exists,
        },
        reserved_today: reserved.to_string(),
        reserved_today_eth: format_wei_as_eth(reserved),
        remaining_today: remaining.to_string(),
        pending_records,
        failed_records,
    }))
}
