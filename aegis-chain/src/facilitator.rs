//! Facilitator Signer
//!
//! The one privileged key the firewall holds. It signs nothing but
//! `recordSpend` anchoring transactions: legacy EIP-155 envelopes built
//! and RLP-encoded in-process, broadcast through the upstream node, then
//! confirmed by polling for the receipt. Submissions are sequential per
//! facilitator, so nonce management is a read of the pending count before
//! each send.

use alloy_primitives::{keccak256, U256};
use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use aegis_core::types::{EvmAddress, Identity};

use crate::abi;
use crate::envelope::address_of_key;
use crate::error::{ChainError, ChainResult};
use crate::rlp;
use crate::rpc::EthRpcClient;

/// Gas ceiling used when estimation fails; generous for one storage write.
const FALLBACK_GAS_LIMIT: u64 = 200_000;

/// How often the receipt poll fires.
const RECEIPT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long to wait for one confirmation before giving up.
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(60);

/// Write access to the registry's `recordSpend`.
///
/// The anchor worker depends on this trait so its drain logic can be
/// tested against scripted outcomes.
#[async_trait]
pub trait SpendRecorder: Send + Sync {
    /// Submit `recordSpend(user, agent, amount, txHash)`, wait for one
    /// confirmation, and return the anchor transaction hash.
    async fn record_spend(
        &self,
        identity: &Identity,
        amount: U256,
        tx_hash: &str,
    ) -> ChainResult<String>;
}

#[derive(Debug, Deserialize)]
struct Receipt {
    status: Option<String>,
    #[serde(rename = "transactionHash")]
    transaction_hash: String,
}

/// The privileged `recordSpend` signer.
pub struct Facilitator {
    rpc: Arc<EthRpcClient>,
    registry: EvmAddress,
    key: SigningKey,
    address: EvmAddress,
    chain_id: tokio::sync::OnceCell<u64>,
}

impl Facilitator {
    /// Build from a hex-encoded private key.
    pub fn from_hex_key(
        rpc: Arc<EthRpcClient>,
        registry: EvmAddress,
        key_hex: &str,
    ) -> ChainResult<Self> {
        let digits = key_hex.trim().strip_prefix("0x").unwrap_or(key_hex.trim());
        let bytes = hex::decode(digits)
            .map_err(|e| ChainError::Signer(format!("facilitator key is not hex: {e}")))?;
        let key = SigningKey::from_slice(&bytes)
            .map_err(|e| ChainError::Signer(format!("invalid facilitator key: {e}")))?;
        let address = address_of_key(key.verifying_key());
        Ok(Self {
            rpc,
            registry,
            key,
            address,
            chain_id: tokio::sync::OnceCell::new(),
        })
    }

    /// The facilitator's own address.
    pub fn address(&self) -> &EvmAddress {
        &self.address
    }

    async fn chain_id(&self) -> ChainResult<u64> {
        let id = self
            .chain_id
            .get_or_try_init(|| async {
                let raw: String = self.rpc.call("eth_chainId", json!([])).await?;
                aegis_core::types::parse_hex_quantity(&raw)
                    .and_then(|v| u64::try_from(v).ok())
                    .ok_or_else(|| ChainError::Response(format!("bad chain id {raw}")))
            })
            .await?;
        Ok(*id)
    }

    async fn next_nonce(&self) -> ChainResult<u64> {
        let raw: String = self
            .rpc
            .call(
                "eth_getTransactionCount",
                json!([self.address.as_str(), "pending"]),
            )
            .await?;
        aegis_core::types::parse_hex_quantity(&raw)
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| ChainError::Response(format!("bad nonce {raw}")))
    }

    async fn gas_price(&self) -> ChainResult<U256> {
        let raw: String = self.rpc.call("eth_gasPrice", json!([])).await?;
        aegis_core::types::parse_hex_quantity(&raw)
            .ok_or_else(|| ChainError::Response(format!("bad gas price {raw}")))
    }

    async fn estimate_gas(&self, calldata: &str) -> u64 {
        let estimated: ChainResult<String> = self
            .rpc
            .call(
                "eth_estimateGas",
                json!([{
                    "from": self.address.as_str(),
                    "to": self.registry.as_str(),
                    "data": calldata
                }]),
            )
            .await;
        estimated
            .ok()
            .and_then(|raw| aegis_core::types::parse_hex_quantity(&raw))
            .and_then(|v| u64::try_from(v).ok())
            // Headroom over the node's estimate
            .map(|gas| gas + gas / 4)
            .unwrap_or(FALLBACK_GAS_LIMIT)
    }

    /// Sign a legacy EIP-155 transaction carrying `calldata` to the
    /// registry and return the raw `0x…` envelope.
    fn sign_legacy(
        &self,
        chain_id: u64,
        nonce: u64,
        gas_price: U256,
        gas_limit: u64,
        calldata: &str,
    ) -> ChainResult<String> {
        let data = hex::decode(calldata.strip_prefix("0x").unwrap_or(calldata))
            .map_err(|e| ChainError::Abi(e.to_string()))?;

        let fields = vec![
            rlp::encode_bytes(&rlp::u64_bytes(nonce)),
            rlp::encode_bytes(&rlp::u256_bytes(gas_price)),
            rlp::encode_bytes(&rlp::u64_bytes(gas_limit)),
            rlp::encode_bytes(&self.registry.to_bytes()),
            rlp::encode_bytes(&[]), // value: recordSpend carries none
            rlp::encode_bytes(&data),
        ];

        let mut unsigned = fields.clone();
        unsigned.push(rlp::encode_bytes(&rlp::u64_bytes(chain_id)));
        unsigned.push(rlp::encode_bytes(&[]));
        unsigned.push(rlp::encode_bytes(&[]));
        let prehash = keccak256(rlp::encode_list(&unsigned));

        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(prehash.as_slice())
            .map_err(|e| ChainError::Signer(e.to_string()))?;
        let sig_bytes = signature.to_bytes();
        let v = 35 + chain_id * 2 + u64::from(recovery_id.to_byte());

        let mut signed = fields;
        signed.push(rlp::encode_bytes(&rlp::u64_bytes(v)));
        signed.push(rlp::encode_bytes(&rlp::u256_bytes(U256::from_be_slice(
            &sig_bytes[..32],
        ))));
        signed.push(rlp::encode_bytes(&rlp::u256_bytes(U256::from_be_slice(
            &sig_bytes[32..],
        ))));

        Ok(format!("0x{}", hex::encode(rlp::encode_list(&signed))))
    }

    /// Poll for the receipt until confirmed, reverted or timed out.
    async fn wait_for_receipt(&self, tx_hash: &str) -> ChainResult<Receipt> {
        let deadline = tokio::time::Instant::now() + RECEIPT_TIMEOUT;
        loop {
            let receipt: Option<Receipt> = self
                .rpc
                .call_nullable("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if let Some(receipt) = receipt {
                return Ok(receipt);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ChainError::ConfirmationTimeout {
                    tx_hash: tx_hash.to_string(),
                });
            }
            tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl SpendRecorder for Facilitator {
    async fn record_spend(
        &self,
        identity: &Identity,
        amount: U256,
        tx_hash: &str,
    ) -> ChainResult<String> {
        let digits = tx_hash.strip_prefix("0x").ok_or_else(|| {
            ChainError::Abi(format!("tx hash missing 0x prefix: {tx_hash}"))
        })?;
        let hash_bytes = hex::decode(digits).map_err(|e| ChainError::Abi(e.to_string()))?;
        let hash: [u8; 32] = hash_bytes
            .try_into()
            .map_err(|_| ChainError::Abi(format!("tx hash is not 32 bytes: {tx_hash}")))?;

        let calldata =
            abi::encode_record_spend(&identity.user, &identity.agent, amount, &hash);

        let chain_id = self.chain_id().await?;
        let nonce = self.next_nonce().await?;
        let gas_price = self.gas_price().await?;
        let gas_limit = self.estimate_gas(&calldata).await;

        let raw = self.sign_legacy(chain_id, nonce, gas_price, gas_limit, &calldata)?;
        debug!(identity = %identity, nonce, gas_limit, "submitting recordSpend");

        let anchor_hash: String = self
            .rpc
            .call("eth_sendRawTransaction", json!([raw]))
            .await?;

        let receipt = self.wait_for_receipt(&anchor_hash).await?;
        let confirmed = receipt.status.as_deref() == Some("0x1");
        if !confirmed {
            return Err(ChainError::Reverted {
                tx_hash: receipt.transaction_hash,
            });
        }

        info!(
            identity = %identity,
            amount = %amount,
            anchor_tx = %anchor_hash,
            "recordSpend confirmed"
        );
        Ok(anchor_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::decode_raw_transaction;

    fn facilitator() -> Facilitator {
        let rpc = Arc::new(EthRpcClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap());
        let registry =
            EvmAddress::parse("0x00000000000000000000000000000000000000a1").unwrap();
        Facilitator::from_hex_key(rpc, registry, &"11".repeat(32)).unwrap()
    }

    #[test]
    fn test_key_parsing_accepts_prefixed_hex() {
        let rpc = Arc::new(EthRpcClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap());
        let registry =
            EvmAddress::parse("0x00000000000000000000000000000000000000a1").unwrap();
        let plain = Facilitator::from_hex_key(rpc.clone(), registry.clone(), &"11".repeat(32))
            .unwrap();
        let prefixed =
            Facilitator::from_hex_key(rpc, registry, &format!("0x{}", "11".repeat(32))).unwrap();
        assert_eq!(plain.address(), prefixed.address());
    }

    #[test]
    fn test_key_parsing_rejects_garbage() {
        let rpc = Arc::new(EthRpcClient::new("http://127.0.0.1:1", Duration::from_secs(1)).unwrap());
        let registry =
            EvmAddress::parse("0x00000000000000000000000000000000000000a1").unwrap();
        assert!(Facilitator::from_hex_key(rpc.clone(), registry.clone(), "zz").is_err());
        assert!(Facilitator::from_hex_key(rpc, registry, "1234").is_err());
    }

    #[test]
    fn test_signed_anchor_tx_recovers_to_facilitator() {
        let facilitator = facilitator();
        let user = EvmAddress::parse("0x1111111111111111111111111111111111111111").unwrap();
        let agent = EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap();
        let calldata =
            abi::encode_record_spend(&user, &agent, U256::from(42u64), &[0xabu8; 32]);

        let raw = facilitator
            .sign_legacy(31337, 7, U256::from(1_000_000_000u64), 100_000, &calldata)
            .unwrap();

        // The signed envelope round-trips through our own decoder and the
        // recovered sender matches the facilitator address.
        let envelope = decode_raw_transaction(&raw).unwrap();
        assert_eq!(&envelope.from, facilitator.address());
        assert_eq!(envelope.to.unwrap().as_str(), facilitator.registry.as_str());
        assert_eq!(envelope.value, U256::ZERO);
    }
}
