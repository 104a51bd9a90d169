//! Upstream Forwarder
//!
//! The single client the gateway uses to reach the upstream node. Two
//! paths: parsed per-call forwarding for pipeline traffic and batch
//! items, and a raw byte-preserving path for single non-intercepted
//! payloads so their responses round-trip bit-for-bit.

use axum::body::Bytes;
use axum::http::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use aegis_core::error::{AegisError, AegisResult};

/// Upstream JSON-RPC forwarder.
pub struct Forwarder {
    client: reqwest::Client,
    url: String,
}

impl Forwarder {
    /// `timeout` is the per-request forward deadline.
    pub fn new(url: impl Into<String>, timeout: Duration) -> AegisResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AegisError::Configuration(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Upstream endpoint.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Forward one parsed JSON-RPC call; returns the upstream response
    /// verbatim as a `Value`.
    ///
    /// Any transport-level problem (refused, timeout, non-2xx status,
    /// unparseable body) is a `ForwardFailed`; JSON-RPC-level errors come
    /// back as ordinary values for the caller to inspect.
    pub async fn forward_call(&self, call: &Value) -> AegisResult<Value> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(call)
            .send()
            .await
            .map_err(|e| AegisError::ForwardFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AegisError::ForwardFailed(format!(
                "upstream returned http {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AegisError::ForwardFailed(format!("upstream body unreadable: {e}")))
    }

    /// Forward the original request bytes untouched and hand back the
    /// upstream's status and body bytes.
    pub async fn forward_bytes(&self, body: Bytes) -> AegisResult<(StatusCode, Bytes)> {
        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| AegisError::ForwardFailed(e.to_string()))?;

        let status =
            StatusCode::from_u16(response.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AegisError::ForwardFailed(format!("upstream body unreadable: {e}")))?;
        debug!(status = %status, bytes = bytes.len(), "raw passthrough complete");
        Ok((status, bytes))
    }

    /// Cheap reachability probe for the health endpoint.
    pub async fn probe(&self) -> bool {
        let ping = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 0,
            "method": "web3_clientVersion",
            "params": []
        });
        match self.client.post(&self.url).json(&ping).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
