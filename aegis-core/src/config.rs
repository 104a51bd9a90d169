//! Firewall Configuration
//!
//! Typed runtime configuration built once at startup from `AEGIS_*`
//! environment variables. Required fields (upstream endpoint, registry
//! address, ledger connection) refuse to start when absent; every optional
//! knob has an explicit default.

use serde::{Deserialize, Serialize};
use std::env;

use crate::error::{AegisError, AegisResult};
use crate::types::EvmAddress;

/// Anchor worker drain mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnchorMode {
    /// Stop after the first successful anchor per invocation (caps gas in
    /// demo environments)
    OneShot,
    /// Drain every pending queue each iteration
    Continuous,
}

impl Default for AnchorMode {
    fn default() -> Self {
        Self::Continuous
    }
}

impl AnchorMode {
    /// Parse from string (for environment variables)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "one-shot" | "oneshot" | "once" => Some(Self::OneShot),
            "continuous" | "drain" => Some(Self::Continuous),
            _ => None,
        }
    }
}

/// Aegis firewall configuration
#[derive(Debug, Clone)]
pub struct FirewallConfig {
    /// Upstream JSON-RPC endpoint forwards go to
    pub upstream_url: String,
    /// Policy registry contract address
    pub registry_address: EvmAddress,
    /// Ledger connection string (`mem://` or `sled://<path>`)
    pub kv_url: String,
    /// HTTP listen port
    pub listen_port: u16,
    /// Fallback user identity when neither headers nor the transaction
    /// carry one
    pub default_user: Option<EvmAddress>,
    /// Fallback agent identity
    pub default_agent: Option<EvmAddress>,
    /// Facilitator signing key (hex), required only when anchoring is on
    pub facilitator_key: Option<String>,
    /// Anchor worker period in seconds
    pub anchor_epoch_seconds: u64,
    /// Per-key batch size for one anchor iteration
    pub anchor_batch_size: usize,
    /// Bearer token guarding the one-shot anchor trigger
    pub anchor_secret: Option<String>,
    /// One-shot vs continuous drain
    pub anchor_mode: AnchorMode,
    /// Per-request upstream forward deadline in seconds
    pub request_timeout_secs: u64,
    /// Enable permissive CORS on the admin surface
    pub enable_cors: bool,
}

fn default_epoch_seconds() -> u64 {
    900
}

fn default_batch_size() -> usize {
    20
}

fn default_request_timeout() -> u64 {
    10
}

fn default_listen_port() -> u16 {
    8547
}

impl FirewallConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - AEGIS_UPSTREAM_URL: upstream JSON-RPC endpoint (required)
    /// - AEGIS_CONTRACT_ADDRESS: policy registry address (required)
    /// - AEGIS_KV_URL: ledger connection string (required)
    /// - AEGIS_LISTEN_PORT: HTTP port (default 8547)
    /// - AEGIS_ADMIN_DEFAULT_USER / AEGIS_ADMIN_DEFAULT_AGENT: identity fallbacks
    /// - AEGIS_FACILITATOR_KEY: recordSpend signer key
    /// - AEGIS_ANCHOR_EPOCH_SECONDS: worker period (default 900)
    /// - AEGIS_ANCHOR_BATCH_SIZE: per-key cap (default 20)
    /// - AEGIS_ANCHOR_SECRET: bearer token for the one-shot trigger
    /// - AEGIS_ANCHOR_MODE: one-shot | continuous (default continuous)
    /// - AEGIS_REQUEST_TIMEOUT_SECS: forward deadline (default 10)
    /// - AEGIS_ENABLE_CORS: true/false (default false)
    pub fn from_env() -> AegisResult<Self> {
        let upstream_url = required("AEGIS_UPSTREAM_URL")?;
        let registry_address = EvmAddress::parse(&required("AEGIS_CONTRACT_ADDRESS")?)
            .map_err(AegisError::Configuration)?;
        let kv_url = required("AEGIS_KV_URL")?;

        let default_user = optional_address("AEGIS_ADMIN_DEFAULT_USER")?;
        let default_agent = optional_address("AEGIS_ADMIN_DEFAULT_AGENT")?;

        let anchor_mode = match env::var("AEGIS_ANCHOR_MODE") {
            Ok(raw) => AnchorMode::from_str(&raw).ok_or_else(|| {
                AegisError::Configuration(format!("unrecognized AEGIS_ANCHOR_MODE: {raw}"))
            })?,
            Err(_) => AnchorMode::default(),
        };

        Ok(Self {
            upstream_url,
            registry_address,
            kv_url,
            listen_port: parse_or("AEGIS_LISTEN_PORT", default_listen_port())?,
            default_user,
            default_agent,
            facilitator_key: env::var("AEGIS_FACILITATOR_KEY").ok(),
            anchor_epoch_seconds: parse_or("AEGIS_ANCHOR_EPOCH_SECONDS", default_epoch_seconds())?,
            anchor_batch_size: parse_or("AEGIS_ANCHOR_BATCH_SIZE", default_batch_size())?,
            anchor_secret: env::var("AEGIS_ANCHOR_SECRET").ok(),
            anchor_mode,
            request_timeout_secs: parse_or(
                "AEGIS_REQUEST_TIMEOUT_SECS",
                default_request_timeout(),
            )?,
            enable_cors: env::var("AEGIS_ENABLE_CORS")
                .map(|s| s.to_lowercase() == "true" || s == "1")
                .unwrap_or(false),
        })
    }

    /// Create a development configuration pointed at a local node and an
    /// in-memory ledger.
    pub fn development(registry_address: EvmAddress) -> Self {
        Self {
            upstream_url: "http://127.0.0.1:8545".to_string(),
            registry_address,
            kv_url: "mem://".to_string(),
            listen_port: default_listen_port(),
            default_user: None,
            default_agent: None,
            facilitator_key: None,
            anchor_epoch_seconds: default_epoch_seconds(),
            anchor_batch_size: default_batch_size(),
            anchor_secret: None,
            anchor_mode: AnchorMode::default(),
            request_timeout_secs: default_request_timeout(),
            enable_cors: true,
        }
    }
}

fn required(key: &str) -> AegisResult<String> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(AegisError::Configuration(format!(
            "missing required environment variable {key}"
        ))),
    }
}

fn optional_address(key: &str) -> AegisResult<Option<EvmAddress>> {
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => EvmAddress::parse(&raw)
            .map(Some)
            .map_err(|e| AegisError::Configuration(format!("{key}: {e}"))),
        _ => Ok(None),
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> AegisResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| AegisError::Configuration(format!("unparseable value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_mode_parsing() {
        assert_eq!(AnchorMode::from_str("one-shot"), Some(AnchorMode::OneShot));
        assert_eq!(AnchorMode::from_str("ONESHOT"), Some(AnchorMode::OneShot));
        assert_eq!(
            AnchorMode::from_str("continuous"),
            Some(AnchorMode::Continuous)
        );
        assert_eq!(AnchorMode::from_str("sometimes"), None);
    }

    #[test]
    fn test_development_defaults() {
        let registry =
            EvmAddress::parse("0x00000000000000000000000000000000000000a1").unwrap();
        let config = FirewallConfig::development(registry);
        assert_eq!(config.anchor_epoch_seconds, 900);
        assert_eq!(config.anchor_batch_size, 20);
        assert_eq!(config.anchor_mode, AnchorMode::Continuous);
        assert_eq!(config.request_timeout_secs, 10);
        assert_eq!(config.kv_url, "mem://");
    }
}
