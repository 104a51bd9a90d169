//! EVM JSON-RPC Client
//!
//! Shared transport for the registry reader and the facilitator. One
//! reqwest client, one id counter, typed request/response envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use crate::error::{ChainError, ChainResult};

/// JSON-RPC request
#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorBody>,
    #[allow(dead_code)]
    #[serde(default)]
    id: Value,
}

/// JSON-RPC error body
#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Minimal EVM JSON-RPC client.
pub struct EthRpcClient {
    client: reqwest::Client,
    url: String,
    request_id: AtomicU64,
}

impl EthRpcClient {
    /// Create a client against `url` with a per-request timeout.
    pub fn new(url: impl Into<String>, timeout: Duration) -> ChainResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            request_id: AtomicU64::new(0),
        })
    }

    /// Endpoint this client talks to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Make an RPC call, returning the raw `result` value (`null` when the
    /// node answered with null).
    pub async fn call_value(&self, method: &str, params: Value) -> ChainResult<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = RpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        debug!(method, id, "eth rpc call");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Transport(format!(
                "http status {status} from {}",
                self.url
            )));
        }

        let body: RpcResponse = response.json().await?;
        if let Some(err) = body.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(body.result)
    }

    /// Make an RPC call, decoding a non-null `result` into `T`.
    pub async fn call<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
    ) -> ChainResult<T> {
        let value = self.call_value(method, params).await?;
        if value.is_null() {
            return Err(ChainError::Response(format!("{method}: null result")));
        }
        serde_json::from_value(value)
            .map_err(|e| ChainError::Response(format!("{method}: {e}")))
    }

    /// Like [`EthRpcClient::call`], but a `null` result decodes to `None`.
    ///
    /// `eth_getTransactionReceipt` legitimately returns null while the
    /// transaction is unmined.
    pub async fn call_nullable<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Value,
    ) -> ChainResult<Option<T>> {
        let value = self.call_value(method, params).await?;
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ChainError::Response(format!("{method}: {e}")))
    }
}
