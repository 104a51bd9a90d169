//! Ledger Key Schema
//!
//! All keys the firewall writes, in one place. The spend and queue layers
//! format keys through these helpers only, so the schema stays consistent
//! with what the anchor worker parses back out of `pending:*` scans.

use aegis_core::types::{EvmAddress, Identity};

/// Singleton anchor lock key.
pub const ANCHOR_LOCK_KEY: &str = "anchor:lock";

/// Day-bucketed reservation counter for one (user, agent) pair.
pub fn spend_key(identity: &Identity, day: &str) -> String {
    format!(
        "spend:{{user:{}:agent:{}}}:{}",
        identity.user, identity.agent, day
    )
}

/// Pending-record FIFO for one (user, agent) pair.
pub fn pending_key(identity: &Identity) -> String {
    format!("pending:{{user:{}:agent:{}}}", identity.user, identity.agent)
}

/// Failed-record FIFO, parallel to the pending queue.
pub fn failed_key(identity: &Identity) -> String {
    format!("failed:{{user:{}:agent:{}}}", identity.user, identity.agent)
}

/// Replay-guard marker for one anchored transaction hash.
pub fn processed_key(identity: &Identity, tx_hash: &str) -> String {
    format!("{}:processed:{}", pending_key(identity), tx_hash)
}

/// Recover the identity from a `pending:{user:<u>:agent:<a>}` key.
///
/// Returns `None` for anything that does not match the template exactly,
/// including processed markers sharing the prefix; the worker logs and
/// skips those.
pub fn parse_pending_key(key: &str) -> Option<Identity> {
    let inner = key
        .strip_prefix("pending:{user:")?
        .strip_suffix('}')?;
    let (user_raw, agent_raw) = inner.split_once(":agent:")?;
    let user = EvmAddress::parse(user_raw).ok()?;
    let agent = EvmAddress::parse(agent_raw).ok()?;
    Some(Identity::new(user, agent))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::new(
            EvmAddress::parse("0x1111111111111111111111111111111111111111").unwrap(),
            EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap(),
        )
    }

    #[test]
    fn test_spend_key_schema() {
        let key = spend_key(&identity(), "2026-03-07");
        assert_eq!(
            key,
            "spend:{user:0x1111111111111111111111111111111111111111:agent:0x2222222222222222222222222222222222222222}:2026-03-07"
        );
    }

    #[test]
    fn test_pending_key_roundtrip() {
        let id = identity();
        let key = pending_key(&id);
        assert_eq!(parse_pending_key(&key), Some(id));
    }

    #[test]
    fn test_parse_rejects_processed_markers() {
        let id = identity();
        let marker = processed_key(&id, &("0x".to_string() + &"ab".repeat(32)));
        assert_eq!(parse_pending_key(&marker), None);
    }

    #[test]
    fn test_parse_rejects_malformed_keys() {
        assert_eq!(parse_pending_key("pending:{user:garbage}"), None);
        assert_eq!(parse_pending_key("pending:{user:0x1:agent:0x2}"), None);
        assert_eq!(parse_pending_key("failed:{user:x:agent:y}"), None);
        assert_eq!(parse_pending_key(""), None);
    }
}
