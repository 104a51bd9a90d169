//! Signed Transaction Envelopes
//!
//! Decodes the raw transactions agents submit through
//! `eth_sendRawTransaction` far enough for the admission pipeline:
//! sender, recipient and value. Legacy (with and without EIP-155),
//! EIP-2930 and EIP-1559 envelopes are supported; the sender is recovered
//! from the signature so identity resolution can fall back to the actual
//! signer when no override headers are present.

use alloy_primitives::{keccak256, U256};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};

use aegis_core::types::EvmAddress;

use crate::error::{ChainError, ChainResult};
use crate::rlp::{self, Item};

/// The admission-relevant view of a signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxEnvelope {
    /// Recovered signer
    pub from: EvmAddress,
    /// Recipient; `None` for contract creation
    pub to: Option<EvmAddress>,
    /// Transferred value in wei
    pub value: U256,
}

/// Decode a `0x`-prefixed signed raw transaction.
pub fn decode_raw_transaction(raw: &str) -> ChainResult<TxEnvelope> {
    let digits = raw
        .trim()
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Envelope("raw transaction missing 0x prefix".into()))?;
    let bytes = hex::decode(digits)?;
    let first = *bytes
        .first()
        .ok_or_else(|| ChainError::Envelope("empty raw transaction".into()))?;

    match first {
        0x02 => decode_eip1559(&bytes[1..]),
        0x01 => decode_eip2930(&bytes[1..]),
        b if b >= 0xc0 => decode_legacy(&bytes),
        b => Err(ChainError::Envelope(format!(
            "unsupported transaction type 0x{b:02x}"
        ))),
    }
}

/// Legacy envelope: `[nonce, gasPrice, gas, to, value, data, v, r, s]`.
fn decode_legacy(bytes: &[u8]) -> ChainResult<TxEnvelope> {
    let items = rlp::decode_list(bytes)?;
    if items.len() != 9 {
        return Err(ChainError::Envelope(format!(
            "legacy transaction has {} fields, expected 9",
            items.len()
        )));
    }

    let to = decode_to(&items[3])?;
    let value = items[4].as_u256()?;
    let v = items[6].as_u64()?;
    let r = items[7].as_bytes()?;
    let s = items[8].as_bytes()?;

    // EIP-155 folds the chain id into v; pre-155 uses bare 27/28.
    let (recovery_id, chain_id) = match v {
        27 | 28 => ((v - 27) as u8, None),
        v if v >= 35 => (((v - 35) % 2) as u8, Some((v - 35) / 2)),
        v => {
            return Err(ChainError::Envelope(format!(
                "legacy transaction has invalid v {v}"
            )))
        }
    };

    let mut unsigned: Vec<Vec<u8>> = items[..6].iter().map(rlp::encode_item).collect();
    if let Some(chain_id) = chain_id {
        unsigned.push(rlp::encode_bytes(&rlp::u64_bytes(chain_id)));
        unsigned.push(rlp::encode_bytes(&[]));
        unsigned.push(rlp::encode_bytes(&[]));
    }
    let prehash = keccak256(rlp::encode_list(&unsigned));

    let from = recover_address(prehash.as_slice(), r, s, recovery_id)?;
    Ok(TxEnvelope { from, to, value })
}

/// EIP-2930 payload: `[chainId, nonce, gasPrice, gas, to, value, data,
/// accessList, yParity, r, s]`.
fn decode_eip2930(payload: &[u8]) -> ChainResult<TxEnvelope> {
    decode_typed(payload, 0x01, 11, 4, 5, 8)
}

/// EIP-1559 payload: `[chainId, nonce, maxPriorityFee, maxFee, gas, to,
/// value, data, accessList, yParity, r, s]`.
fn decode_eip1559(payload: &[u8]) -> ChainResult<TxEnvelope> {
    decode_typed(payload, 0x02, 12, 5, 6, 9)
}

fn decode_typed(
    payload: &[u8],
    tx_type: u8,
    field_count: usize,
    to_index: usize,
    value_index: usize,
    parity_index: usize,
) -> ChainResult<TxEnvelope> {
    let items = rlp::decode_list(payload)?;
    if items.len() != field_count {
        return Err(ChainError::Envelope(format!(
            "type-{tx_type} transaction has {} fields, expected {field_count}",
            items.len()
        )));
    }

    let to = decode_to(&items[to_index])?;
    let value = items[value_index].as_u256()?;
    let parity = items[parity_index].as_u64()?;
    if parity > 1 {
        return Err(ChainError::Envelope(format!(
            "invalid signature parity {parity}"
        )));
    }
    let r = items[parity_index + 1].as_bytes()?;
    let s = items[parity_index + 2].as_bytes()?;

    // The signing hash covers the type byte plus the unsigned fields.
    let unsigned: Vec<Vec<u8>> = items[..parity_index].iter().map(rlp::encode_item).collect();
    let mut preimage = vec![tx_type];
    preimage.extend_from_slice(&rlp::encode_list(&unsigned));
    let prehash = keccak256(&preimage);

    let from = recover_address(prehash.as_slice(), r, s, parity as u8)?;
    Ok(TxEnvelope { from, to, value })
}

fn decode_to(item: &Item) -> ChainResult<Option<EvmAddress>> {
    let bytes = item.as_bytes()?;
    if bytes.is_empty() {
        return Ok(None);
    }
    if bytes.len() != 20 {
        return Err(ChainError::Envelope(format!(
            "recipient field has {} bytes, expected 20",
            bytes.len()
        )));
    }
    EvmAddress::parse(&hex::encode(bytes))
        .map(Some)
        .map_err(ChainError::Envelope)
}

/// Recover the signer address from a prehash and compact signature parts.
pub fn recover_address(
    prehash: &[u8],
    r: &[u8],
    s: &[u8],
    recovery_id: u8,
) -> ChainResult<EvmAddress> {
    let mut compact = [0u8; 64];
    copy_padded(&mut compact[..32], r)?;
    copy_padded(&mut compact[32..], s)?;

    let signature = Signature::from_slice(&compact)
        .map_err(|e| ChainError::Envelope(format!("invalid signature: {e}")))?;
    let recovery_id = RecoveryId::from_byte(recovery_id)
        .ok_or_else(|| ChainError::Envelope(format!("invalid recovery id {recovery_id}")))?;

    let key = VerifyingKey::recover_from_prehash(prehash, &signature, recovery_id)
        .map_err(|e| ChainError::Envelope(format!("sender recovery failed: {e}")))?;

    Ok(address_of_key(&key))
}

/// Keccak of the uncompressed public key, last 20 bytes.
pub fn address_of_key(key: &VerifyingKey) -> EvmAddress {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    // Infallible: the digest tail is always 20 hex-able bytes.
    EvmAddress::parse(&hex::encode(&digest[12..]))
        .unwrap_or_else(|_| unreachable!("keccak tail is a valid address"))
}

fn copy_padded(dest: &mut [u8], src: &[u8]) -> ChainResult<()> {
    if src.len() > dest.len() {
        return Err(ChainError::Envelope("signature component too wide".into()));
    }
    let start = dest.len() - src.len();
    dest[start..].copy_from_slice(src);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn test_key() -> SigningKey {
        SigningKey::from_slice(&[0x42u8; 32]).unwrap()
    }

    fn sign(prehash: &[u8]) -> (Vec<u8>, Vec<u8>, u8) {
        let (signature, recovery_id) = test_key().sign_prehash_recoverable(prehash).unwrap();
        let bytes = signature.to_bytes();
        (
            rlp::u256_bytes(U256::from_be_slice(&bytes[..32])),
            rlp::u256_bytes(U256::from_be_slice(&bytes[32..])),
            recovery_id.to_byte(),
        )
    }

    fn signer_address() -> EvmAddress {
        address_of_key(test_key().verifying_key())
    }

    fn to_address() -> Vec<u8> {
        vec![0x35; 20]
    }

    /// Build a signed EIP-155 legacy transaction with the test key.
    fn build_legacy(chain_id: u64, value: U256) -> String {
        let fields = vec![
            rlp::encode_bytes(&rlp::u64_bytes(9)),                         // nonce
            rlp::encode_bytes(&rlp::u256_bytes(U256::from(20_000_000_000u64))), // gasPrice
            rlp::encode_bytes(&rlp::u64_bytes(21_000)),                    // gas
            rlp::encode_bytes(&to_address()),                              // to
            rlp::encode_bytes(&rlp::u256_bytes(value)),                    // value
            rlp::encode_bytes(&[]),                                        // data
        ];

        let mut unsigned = fields.clone();
        unsigned.push(rlp::encode_bytes(&rlp::u64_bytes(chain_id)));
        unsigned.push(rlp::encode_bytes(&[]));
        unsigned.push(rlp::encode_bytes(&[]));
        let prehash = keccak256(rlp::encode_list(&unsigned));

        let (r, s, recid) = sign(prehash.as_slice());
        let v = 35 + chain_id * 2 + u64::from(recid);

        let mut signed = fields;
        signed.push(rlp::encode_bytes(&rlp::u64_bytes(v)));
        signed.push(rlp::encode_bytes(&r));
        signed.push(rlp::encode_bytes(&s));
        format!("0x{}", hex::encode(rlp::encode_list(&signed)))
    }

    /// Build a signed EIP-1559 transaction with the test key.
    fn build_eip1559(chain_id: u64, value: U256) -> String {
        let fields = vec![
            rlp::encode_bytes(&rlp::u64_bytes(chain_id)),
            rlp::encode_bytes(&rlp::u64_bytes(9)),                        // nonce
            rlp::encode_bytes(&rlp::u64_bytes(1_000_000_000)),            // maxPriorityFee
            rlp::encode_bytes(&rlp::u64_bytes(30_000_000_000)),           // maxFee
            rlp::encode_bytes(&rlp::u64_bytes(21_000)),                   // gas
            rlp::encode_bytes(&to_address()),                             // to
            rlp::encode_bytes(&rlp::u256_bytes(value)),                   // value
            rlp::encode_bytes(&[]),                                       // data
            rlp::encode_list(&[]),                                        // accessList
        ];

        let mut preimage = vec![0x02];
        preimage.extend_from_slice(&rlp::encode_list(&fields));
        let prehash = keccak256(&preimage);

        let (r, s, recid) = sign(prehash.as_slice());
        let mut signed = fields;
        signed.push(rlp::encode_bytes(&rlp::u64_bytes(u64::from(recid))));
        signed.push(rlp::encode_bytes(&r));
        signed.push(rlp::encode_bytes(&s));

        let mut out = vec![0x02];
        out.extend_from_slice(&rlp::encode_list(&signed));
        format!("0x{}", hex::encode(out))
    }

    #[test]
    fn test_legacy_roundtrip_recovers_sender() {
        let value = U256::from(10_000_000_000_000_000u64); // 0.01 ETH
        let raw = build_legacy(1, value);
        let envelope = decode_raw_transaction(&raw).unwrap();

        assert_eq!(envelope.from, signer_address());
        assert_eq!(
            envelope.to,
            Some(EvmAddress::parse(&hex::encode(to_address())).unwrap())
        );
        assert_eq!(envelope.value, value);
    }

    #[test]
    fn test_legacy_with_large_chain_id() {
        let raw = build_legacy(31337, U256::from(5u64));
        let envelope = decode_raw_transaction(&raw).unwrap();
        assert_eq!(envelope.from, signer_address());
        assert_eq!(envelope.value, U256::from(5u64));
    }

    #[test]
    fn test_eip1559_roundtrip_recovers_sender() {
        let value = U256::from(2_000_000_000_000_000_000u128); // 2 ETH
        let raw = build_eip1559(1, value);
        let envelope = decode_raw_transaction(&raw).unwrap();

        assert_eq!(envelope.from, signer_address());
        assert_eq!(envelope.value, value);
    }

    #[test]
    fn test_zero_value_decodes() {
        let raw = build_eip1559(1, U256::ZERO);
        let envelope = decode_raw_transaction(&raw).unwrap();
        assert_eq!(envelope.value, U256::ZERO);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(decode_raw_transaction("not-hex").is_err());
        assert!(decode_raw_transaction("0x").is_err());
        assert!(decode_raw_transaction("0x03deadbeef").is_err());
        // A valid RLP list with the wrong arity
        let short = format!("0x{}", hex::encode(rlp::encode_list(&[rlp::encode_bytes(&[1])])));
        assert!(decode_raw_transaction(&short).is_err());
    }
}
