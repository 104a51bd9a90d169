//! Policy Registry Client
//!
//! Read side of the on-chain registry. The firewall is a strict read-only
//! consumer here: it never mutates a policy, and it carries the raw
//! 256-bit values through to the admission arithmetic. A short time-based
//! cache smooths bursts from the same (user, agent) pair without letting
//! a kill switch linger for more than its TTL.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

use aegis_core::types::{EvmAddress, Identity, Policy};

use crate::abi;
use crate::error::ChainResult;
use crate::rpc::EthRpcClient;

/// Cache window for policy reads. Time-based invalidation only.
pub const POLICY_CACHE_TTL: Duration = Duration::from_secs(2);

/// Read access to policy tuples.
///
/// The gateway depends on this trait rather than the concrete client so
/// admission tests can script policies without a chain.
#[async_trait]
pub trait PolicySource: Send + Sync {
    /// Fetch the policy tuple for one (user, agent) pair.
    async fn policy(&self, identity: &Identity) -> ChainResult<Policy>;
}

/// Registry view-call client with a short-TTL cache.
pub struct RegistryClient {
    rpc: Arc<EthRpcClient>,
    registry: EvmAddress,
    cache_ttl: Duration,
    cache: RwLock<HashMap<Identity, (Policy, Instant)>>,
}

impl RegistryClient {
    pub fn new(rpc: Arc<EthRpcClient>, registry: EvmAddress) -> Self {
        Self {
            rpc,
            registry,
            cache_ttl: POLICY_CACHE_TTL,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Override the cache window; `Duration::ZERO` disables caching.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    async fn cached(&self, identity: &Identity) -> Option<Policy> {
        if self.cache_ttl.is_zero() {
            return None;
        }
        let cache = self.cache.read().await;
        cache.get(identity).and_then(|(policy, at)| {
            (at.elapsed() < self.cache_ttl).then(|| policy.clone())
        })
    }
}

#[async_trait]
impl PolicySource for RegistryClient {
    async fn policy(&self, identity: &Identity) -> ChainResult<Policy> {
        if let Some(policy) = self.cached(identity).await {
            debug!(identity = %identity, "policy cache hit");
            return Ok(policy);
        }

        let calldata = abi::encode_get_policy(&identity.user, &identity.agent);
        let returned: String = self
            .rpc
            .call(
                "eth_call",
                json!([
                    { "to": self.registry.as_str(), "data": calldata },
                    "latest"
                ]),
            )
            .await?;

        let policy = abi::decode_policy(&returned)?;
        debug!(
            identity = %identity,
            exists = policy.exists,
            is_active = policy.is_active,
            daily_limit_eth = %policy.daily_limit_eth(),
            "policy fetched"
        );

        if !self.cache_ttl.is_zero() {
            let mut cache = self.cache.write().await;
            cache.insert(identity.clone(), (policy.clone(), Instant::now()));
        }
        Ok(policy)
    }
}
