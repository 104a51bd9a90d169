//! Shared fixtures for the gateway integration tests: a scripted mock
//! upstream node, a static policy source and a counting spend recorder.
//!
//! Each integration binary uses its own subset of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use aegis_chain::{ChainError, ChainResult, PolicySource, SpendRecorder};
use aegis_core::config::FirewallConfig;
use aegis_core::types::{EvmAddress, Identity, Policy};
use aegis_gateway::AppState;
use aegis_ledger::kv::{KvStore, MemoryKv};
use alloy_primitives::U256;

pub const TEST_SECRET: &str = "test-anchor-secret";

/// How the mock upstream answers the next requests.
#[derive(Clone)]
pub enum Behavior {
    /// `{"jsonrpc":"2.0","id":<echo>,"result":"<hash>"}`
    ResultHash(String),
    /// Arbitrary `result` value
    Result(Value),
    /// JSON-RPC-level error object
    RpcError { code: i64, message: String },
    /// Plain HTTP failure (e.g. 502)
    HttpStatus(u16),
    /// Exact bytes, for byte-equivalence assertions
    RawBody(String),
}

type UpstreamState = (Arc<Mutex<Vec<Value>>>, Arc<Mutex<Behavior>>);

/// In-process upstream JSON-RPC node with scriptable behavior.
pub struct MockUpstream {
    addr: SocketAddr,
    calls: Arc<Mutex<Vec<Value>>>,
    behavior: Arc<Mutex<Behavior>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let calls: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));
        let behavior = Arc::new(Mutex::new(Behavior::ResultHash(default_tx_hash())));

        let router: Router = Router::new()
            .route("/", post(upstream_handler))
            .with_state((calls.clone(), behavior.clone()));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr,
            calls,
            behavior,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Bodies of every request the upstream saw.
    pub fn calls(&self) -> Vec<Value> {
        self.calls.lock().unwrap().clone()
    }

    /// Requests for a given method (health probes use web3_clientVersion,
    /// so scenario assertions filter by method).
    pub fn calls_for(&self, method: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|c| c.get("method").and_then(Value::as_str) == Some(method))
            .collect()
    }
}

async fn upstream_handler(
    State((calls, behavior)): State<UpstreamState>,
    body: Bytes,
) -> Response {
    let value: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    calls.lock().unwrap().push(value);

    let behavior = behavior.lock().unwrap().clone();
    match behavior {
        Behavior::ResultHash(hash) => {
            Json(json!({"jsonrpc": "2.0", "id": id, "result": hash})).into_response()
        }
        Behavior::Result(result) => {
            Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
        }
        Behavior::RpcError { code, message } => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": code, "message": message }
        }))
        .into_response(),
        Behavior::HttpStatus(status) => (
            StatusCode::from_u16(status).unwrap(),
            "upstream unavailable",
        )
            .into_response(),
        Behavior::RawBody(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
    }
}

/// Static policy table.
pub struct StubPolicies {
    policies: Mutex<HashMap<Identity, Policy>>,
    fail_reads: Mutex<bool>,
}

impl StubPolicies {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            policies: Mutex::new(HashMap::new()),
            fail_reads: Mutex::new(false),
        })
    }

    pub fn insert(&self, identity: Identity, policy: Policy) {
        self.policies.lock().unwrap().insert(identity, policy);
    }

    pub fn fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }
}

#[async_trait]
impl PolicySource for StubPolicies {
    async fn policy(&self, identity: &Identity) -> ChainResult<Policy> {
        if *self.fail_reads.lock().unwrap() {
            return Err(ChainError::Transport("registry unreachable".into()));
        }
        Ok(self
            .policies
            .lock()
            .unwrap()
            .get(identity)
            .cloned()
            .unwrap_or_else(Policy::missing))
    }
}

/// Counting spend recorder with optional per-hash reverts.
#[derive(Default)]
pub struct CountingRecorder {
    calls: Mutex<HashMap<String, u64>>,
    reverts: Mutex<Vec<String>>,
}

impl CountingRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn revert_on(&self, tx_hash: &str) {
        self.reverts.lock().unwrap().push(tx_hash.to_string());
    }

    pub fn calls_for(&self, tx_hash: &str) -> u64 {
        *self.calls.lock().unwrap().get(tx_hash).unwrap_or(&0)
    }

    pub fn total_calls(&self) -> u64 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl SpendRecorder for CountingRecorder {
    async fn record_spend(
        &self,
        _identity: &Identity,
        _amount: U256,
        tx_hash: &str,
    ) -> ChainResult<String> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(tx_hash.to_string())
            .or_insert(0) += 1;
        if self.reverts.lock().unwrap().iter().any(|h| h == tx_hash) {
            return Err(ChainError::Reverted {
                tx_hash: tx_hash.to_string(),
            });
        }
        Ok(format!("0xanchor{}", &tx_hash[2..10]))
    }
}

pub fn addr(tag: u64) -> EvmAddress {
    EvmAddress::parse(&format!("0x{tag:040x}")).unwrap()
}

pub fn agent_identity() -> Identity {
    // The agent signs, so with no headers both halves resolve to `from`
    Identity::new(agent_addr(), agent_addr())
}

pub fn agent_addr() -> EvmAddress {
    addr(0xf0)
}

pub fn default_tx_hash() -> String {
    format!("0x{}", "ab".repeat(32))
}

pub fn one_eth() -> U256 {
    U256::from(1_000_000_000_000_000_000u128)
}

/// A full fixture: mock upstream + state wired over MemoryKv.
pub struct Fixture {
    pub upstream: MockUpstream,
    pub state: AppState,
    pub policies: Arc<StubPolicies>,
    pub recorder: Arc<CountingRecorder>,
    pub store: Arc<MemoryKv>,
}

impl Fixture {
    pub async fn new() -> Self {
        let upstream = MockUpstream::start().await;
        let policies = StubPolicies::new();
        let recorder = CountingRecorder::new();
        let store = Arc::new(MemoryKv::new());

        let mut config = FirewallConfig::development(addr(0xa1));
        config.upstream_url = upstream.url();
        config.anchor_secret = Some(TEST_SECRET.to_string());
        // Short timeout keeps transport-failure tests fast
        config.request_timeout_secs = 2;

        let state = AppState::new(
            config,
            store.clone() as Arc<dyn KvStore>,
            policies.clone(),
            Some(recorder.clone() as Arc<dyn SpendRecorder>),
        )
        .unwrap();

        Self {
            upstream,
            state,
            policies,
            recorder,
            store,
        }
    }

    /// Grant `identity` an active policy with `limit` wei per day.
    pub fn grant(&self, identity: Identity, limit: U256) {
        self.policies.insert(identity, Policy::active(limit));
    }

    pub fn server(&self) -> axum_test::TestServer {
        axum_test::TestServer::new(aegis_gateway::create_router(self.state.clone())).unwrap()
    }
}

/// Build a signed EIP-155 legacy transaction with a fixed test key and
/// return `(raw_hex, signer_address)`.
pub fn build_signed_raw_tx(value: U256) -> (String, EvmAddress) {
    use aegis_chain::rlp;
    use alloy_primitives::keccak256;
    use k256::ecdsa::SigningKey;

    let key = SigningKey::from_slice(&[0x77u8; 32]).unwrap();
    let signer = aegis_chain::envelope::address_of_key(key.verifying_key());

    let chain_id = 31337u64;
    let fields = vec![
        rlp::encode_bytes(&rlp::u64_bytes(1)),                              // nonce
        rlp::encode_bytes(&rlp::u256_bytes(U256::from(1_000_000_000u64))),  // gasPrice
        rlp::encode_bytes(&rlp::u64_bytes(21_000)),                         // gas
        rlp::encode_bytes(&addr(0xf1).to_bytes()),                          // to
        rlp::encode_bytes(&rlp::u256_bytes(value)),                         // value
        rlp::encode_bytes(&[]),                                             // data
    ];

    let mut unsigned = fields.clone();
    unsigned.push(rlp::encode_bytes(&rlp::u64_bytes(chain_id)));
    unsigned.push(rlp::encode_bytes(&[]));
    unsigned.push(rlp::encode_bytes(&[]));
    let prehash = keccak256(rlp::encode_list(&unsigned));

    let (signature, recovery_id) = key.sign_prehash_recoverable(prehash.as_slice()).unwrap();
    let sig = signature.to_bytes();
    let v = 35 + chain_id * 2 + u64::from(recovery_id.to_byte());

    let mut signed = fields;
    signed.push(rlp::encode_bytes(&rlp::u64_bytes(v)));
    signed.push(rlp::encode_bytes(&rlp::u256_bytes(U256::from_be_slice(&sig[..32]))));
    signed.push(rlp::encode_bytes(&rlp::u256_bytes(U256::from_be_slice(&sig[32..]))));

    (
        format!("0x{}", hex::encode(rlp::encode_list(&signed))),
        signer,
    )
}

/// `Authorization: Bearer <TEST_SECRET>` header pair.
pub fn bearer_auth() -> (axum::http::HeaderName, axum::http::HeaderValue) {
    (
        axum::http::header::AUTHORIZATION,
        axum::http::HeaderValue::from_str(&format!("Bearer {TEST_SECRET}")).unwrap(),
    )
}

/// Arbitrary header pair for identity overrides.
pub fn header_pair(name: &'static str, value: &str) -> (axum::http::HeaderName, axum::http::HeaderValue) {
    (
        axum::http::HeaderName::from_static(name),
        axum::http::HeaderValue::from_str(value).unwrap(),
    )
}

/// A send-transaction call with the agent address as sender.
pub fn send_tx_call(id: u64, value_hex: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "eth_sendTransaction",
        "params": [{
            "from": agent_addr().as_str(),
            "to": addr(0xf1).as_str(),
            "value": value_hex
        }]
    })
}
