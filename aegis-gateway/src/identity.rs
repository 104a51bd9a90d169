//! Identity Resolution
//!
//! One explicit function owns the header/transaction/config fallback
//! order so the priority is testable in isolation. For each half of the
//! pair: the override header wins, then the transaction's sender, then
//! the configured default.

use axum::http::HeaderMap;

use aegis_core::config::FirewallConfig;
use aegis_core::error::{AegisError, AegisResult};
use aegis_core::types::{EvmAddress, Identity};

/// Header overriding the user half of the identity.
pub const USER_HEADER: &str = "x-aegis-user";

/// Header overriding the agent half of the identity.
pub const AGENT_HEADER: &str = "x-aegis-agent";

/// Resolve the (user, agent) pair for one request.
pub fn resolve_identity(
    headers: &HeaderMap,
    tx_from: Option<&EvmAddress>,
    config: &FirewallConfig,
) -> AegisResult<Identity> {
    let user = resolve_half(headers, USER_HEADER, tx_from, config.default_user.as_ref())?;
    let agent = resolve_half(headers, AGENT_HEADER, tx_from, config.default_agent.as_ref())?;
    Ok(Identity::new(user, agent))
}

fn resolve_half(
    headers: &HeaderMap,
    header_name: &str,
    tx_from: Option<&EvmAddress>,
    fallback: Option<&EvmAddress>,
) -> AegisResult<EvmAddress> {
    if let Some(raw) = headers.get(header_name) {
        let raw = raw
            .to_str()
            .map_err(|_| AegisError::ParseFailure(format!("{header_name} is not valid UTF-8")))?;
        return EvmAddress::parse(raw)
            .map_err(|e| AegisError::ParseFailure(format!("{header_name}: {e}")));
    }
    if let Some(from) = tx_from {
        return Ok(from.clone());
    }
    if let Some(fallback) = fallback {
        return Ok(fallback.clone());
    }
    Err(AegisError::ParseFailure(format!(
        "unable to resolve identity: no {header_name} header, no transaction sender, no configured default"
    )))
}
