//! Application state for the gateway

use std::sync::Arc;
use std::time::Duration;

use aegis_anchor::AnchorWorker;
use aegis_chain::{EthRpcClient, Facilitator, PolicySource, RegistryClient, SpendRecorder};
use aegis_core::config::FirewallConfig;
use aegis_core::error::{AegisError, AegisResult};
use aegis_core::metrics::FirewallMetrics;
use aegis_ledger::kv::{open_store, KvStore};
use aegis_ledger::{PendingQueue, ReservationLedger};

use crate::forward::Forwarder;

/// Shared state behind every route.
#[derive(Clone)]
pub struct AppState {
    /// Runtime configuration
    pub config: Arc<FirewallConfig>,
    /// Shared key/value store
    pub store: Arc<dyn KvStore>,
    /// Reservation arithmetic over the store
    pub ledger: ReservationLedger<dyn KvStore>,
    /// Pending/failed queue operations over the store
    pub queue: PendingQueue<dyn KvStore>,
    /// Policy registry reader
    pub policies: Arc<dyn PolicySource>,
    /// Upstream forwarder
    pub forwarder: Arc<Forwarder>,
    /// Anchor worker; absent when no facilitator key is configured
    pub worker: Option<Arc<AnchorWorker>>,
    /// Shared counters
    pub metrics: Arc<FirewallMetrics>,
    /// Crate version, reported by the health endpoint
    pub version: String,
}

impl AppState {
    /// Wire up state from explicit components. Tests inject scripted
    /// policy sources and recorders through here.
    pub fn new(
        config: FirewallConfig,
        store: Arc<dyn KvStore>,
        policies: Arc<dyn PolicySource>,
        recorder: Option<Arc<dyn SpendRecorder>>,
    ) -> AegisResult<Self> {
        let forwarder = Arc::new(Forwarder::new(
            &config.upstream_url,
            Duration::from_secs(config.request_timeout_secs),
        )?);
        let metrics = Arc::new(FirewallMetrics::new());

        let worker = recorder.map(|recorder| {
            Arc::new(AnchorWorker::new(
                store.clone(),
                recorder,
                metrics.clone(),
                config.anchor_batch_size,
                config.anchor_mode,
            ))
        });

        Ok(Self {
            config: Arc::new(config),
            ledger: ReservationLedger::new(store.clone()),
            queue: PendingQueue::new(store.clone()),
            store,
            policies,
            forwarder,
            worker,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Wire up production state from configuration alone: store from
    /// `kv_url`, registry client and (when a key is present) facilitator
    /// against the upstream endpoint.
    pub fn from_config(config: FirewallConfig) -> AegisResult<Self> {
        let store = open_store(&config.kv_url)
            .map_err(|e| AegisError::Configuration(e.to_string()))?;

        let rpc = Arc::new(
            EthRpcClient::new(
                config.upstream_url.clone(),
                Duration::from_secs(config.request_timeout_secs),
            )
            .map_err(|e| AegisError::Configuration(e.to_string()))?,
        );

        let policies: Arc<dyn PolicySource> = Arc::new(RegistryClient::new(
            rpc.clone(),
            config.registry_address.clone(),
        ));

        let recorder: Option<Arc<dyn SpendRecorder>> = match &config.facilitator_key {
            Some(key) => Some(Arc::new(
                Facilitator::from_hex_key(rpc, config.registry_address.clone(), key)
                    .map_err(|e| AegisError::Configuration(e.to_string()))?,
            )),
            None => None,
        };

        Self::new(config, store, policies, recorder)
    }
}
