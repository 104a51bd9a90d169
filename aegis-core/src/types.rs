//! Core firewall types
//!
//! Routing identities, the on-chain policy tuple and the spend records that
//! move through the pending/failed queues. Amounts are carried as `U256`
//! end to end; the only floating-point views produced here are for logging
//! and display.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Length of a 0x-prefixed 32-byte transaction hash.
pub const TX_HASH_HEX_LEN: usize = 66;

/// A 20-byte EVM address, stored 0x-prefixed and lowercased.
///
/// Addresses double as routing keys in the reservation ledger and the
/// pending queues, so normalization happens exactly once, at parse time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EvmAddress(String);

impl EvmAddress {
    /// Parse and normalize an address.
    ///
    /// Accepts any hex casing with or without the `0x` prefix; rejects
    /// anything that is not exactly 20 bytes of hex.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("invalid EVM address: {trimmed}"));
        }
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// The normalized `0x…` form used as a routing key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The 20 raw bytes of the address.
    pub fn to_bytes(&self) -> [u8; 20] {
        let mut out = [0u8; 20];
        // Infallible: the constructor guarantees 40 hex digits.
        if let Ok(bytes) = hex::decode(&self.0[2..]) {
            out.copy_from_slice(&bytes);
        }
        out
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EvmAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for EvmAddress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EvmAddress {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// The `(user, agent)` pair one policy applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    /// Human principal owning the policy
    pub user: EvmAddress,
    /// Agent issuing the value-bearing request
    pub agent: EvmAddress,
}

impl Identity {
    pub fn new(user: EvmAddress, agent: EvmAddress) -> Self {
        Self { user, agent }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user, self.agent)
    }
}

/// Read-only mirror of one registry entry.
///
/// `daily_limit` and `current_spend` are authoritative as raw 256-bit
/// values; admission arithmetic must never go through the float views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Daily spend limit in wei
    pub daily_limit: U256,
    /// Most recent anchored spend within the current window
    pub current_spend: U256,
    /// Seconds-since-epoch start of the current 24h window
    pub last_reset: u64,
    /// Kill switch: false denies all admissions
    pub is_active: bool,
    /// False means no policy is registered for the pair
    pub exists: bool,
}

impl Policy {
    /// A registered, active policy with the given limit. Used by tests and
    /// the policy inspection endpoint.
    pub fn active(daily_limit: U256) -> Self {
        Self {
            daily_limit,
            current_spend: U256::ZERO,
            last_reset: 0,
            is_active: true,
            exists: true,
        }
    }

    /// The absent-policy tuple the registry returns for unknown pairs.
    pub fn missing() -> Self {
        Self {
            daily_limit: U256::ZERO,
            current_spend: U256::ZERO,
            last_reset: 0,
            is_active: false,
            exists: false,
        }
    }

    /// Human-readable limit, for logs and inspection output only.
    pub fn daily_limit_eth(&self) -> String {
        format_wei_as_eth(self.daily_limit)
    }

    /// Human-readable anchored spend, for logs and inspection output only.
    pub fn current_spend_eth(&self) -> String {
        format_wei_as_eth(self.current_spend)
    }
}

/// One settled-but-unanchored spend, queued per (user, agent).
///
/// Records are appended after a successful upstream forward and consumed
/// FIFO by the anchor worker. A missing or malformed `tx_hash` routes the
/// record to the failed queue instead of the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRecord {
    /// 32-byte transaction hash extracted from the upstream response
    pub tx_hash: Option<String>,
    /// Admitted amount in wei
    #[serde(with = "wei_string")]
    pub amount_wei: U256,
    /// Milliseconds-since-epoch admission time
    pub timestamp_ms: u64,
}

impl PendingRecord {
    pub fn new(tx_hash: Option<String>, amount_wei: U256, timestamp_ms: u64) -> Self {
        Self {
            tx_hash,
            amount_wei,
            timestamp_ms,
        }
    }

    /// Whether `tx_hash` is present and a well-formed 32-byte hex string.
    pub fn has_valid_tx_hash(&self) -> bool {
        self.tx_hash.as_deref().is_some_and(is_tx_hash)
    }
}

/// Whether `s` is a 0x-prefixed 32-byte hex string.
pub fn is_tx_hash(s: &str) -> bool {
    s.len() == TX_HASH_HEX_LEN
        && s.starts_with("0x")
        && s[2..].chars().all(|c| c.is_ascii_hexdigit())
}

/// Parse a 0x-prefixed hex quantity into a `U256`.
///
/// `0x` alone parses as zero, matching JSON-RPC quantity semantics.
pub fn parse_hex_quantity(raw: &str) -> Option<U256> {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix("0x")?;
    if digits.is_empty() {
        return Some(U256::ZERO);
    }
    U256::from_str_radix(digits, 16).ok()
}

/// Render a wei amount as a decimal ETH string, trimming trailing zeros.
///
/// Display-only; admission arithmetic never round-trips through this.
pub fn format_wei_as_eth(wei: U256) -> String {
    let one_eth = U256::from(1_000_000_000_000_000_000u128);
    let whole = wei / one_eth;
    let remainder = wei % one_eth;
    if remainder.is_zero() {
        return whole.to_string();
    }

    let mut frac = format!("{remainder:018}");
    while frac.ends_with('0') {
        frac.pop();
    }
    format!("{whole}.{frac}")
}

/// Serde adapter carrying `U256` as a decimal string, the encoding the
/// ledger and queues use on the wire.
pub mod wei_string {
    use alloy_primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_str(&raw).map_err(serde::de::Error::custom)
    }
}
