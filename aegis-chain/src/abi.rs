//! Registry ABI Coding
//!
//! Hand-rolled selectors and 32-byte word coding for the two registry
//! entry points the firewall touches:
//!
//! ```text
//! getPolicy(address,address)
//!   -> (uint256 dailyLimit, uint256 currentSpend, uint256 lastReset,
//!       bool isActive, bool exists)
//! recordSpend(address,address,uint256,bytes32)
//! ```

use alloy_primitives::{keccak256, U256};

use aegis_core::types::{EvmAddress, Policy};

use crate::error::{ChainError, ChainResult};

/// Four-byte function selector for a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Left-pad an address into a 32-byte word.
pub fn encode_address(addr: &EvmAddress) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&addr.to_bytes());
    word
}

/// Big-endian 32-byte word for a uint256.
pub fn encode_u256(value: U256) -> [u8; 32] {
    value.to_be_bytes()
}

/// bytes32 passes through unchanged.
pub fn encode_bytes32(value: &[u8; 32]) -> [u8; 32] {
    *value
}

/// Assemble `0x`-prefixed calldata from a selector and words.
pub fn build_calldata(selector: [u8; 4], words: &[[u8; 32]]) -> String {
    let mut bytes = selector.to_vec();
    for word in words {
        bytes.extend_from_slice(word);
    }
    format!("0x{}", hex::encode(bytes))
}

/// Split `0x`-prefixed return data into 32-byte words.
pub fn decode_words(data: &str) -> ChainResult<Vec<[u8; 32]>> {
    let digits = data
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Abi(format!("return data missing 0x prefix: {data}")))?;
    let bytes = hex::decode(digits).map_err(|e| ChainError::Abi(e.to_string()))?;
    if bytes.len() % 32 != 0 {
        return Err(ChainError::Abi(format!(
            "return data length {} not word-aligned",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(32)
        .map(|chunk| {
            let mut word = [0u8; 32];
            word.copy_from_slice(chunk);
            word
        })
        .collect())
}

/// Decode a word as uint256.
pub fn decode_u256(word: &[u8; 32]) -> U256 {
    U256::from_be_bytes(*word)
}

/// Decode a word as bool; anything non-zero is true.
pub fn decode_bool(word: &[u8; 32]) -> bool {
    word.iter().any(|b| *b != 0)
}

/// Calldata for `getPolicy(user, agent)`.
pub fn encode_get_policy(user: &EvmAddress, agent: &EvmAddress) -> String {
    build_calldata(
        selector("getPolicy(address,address)"),
        &[encode_address(user), encode_address(agent)],
    )
}

/// Decode the five-word `getPolicy` return tuple.
pub fn decode_policy(data: &str) -> ChainResult<Policy> {
    let words = decode_words(data)?;
    if words.len() != 5 {
        return Err(ChainError::Abi(format!(
            "getPolicy returned {} words, expected 5",
            words.len()
        )));
    }
    let last_reset = decode_u256(&words[2]);
    Ok(Policy {
        daily_limit: decode_u256(&words[0]),
        current_spend: decode_u256(&words[1]),
        last_reset: last_reset.try_into().unwrap_or(u64::MAX),
        is_active: decode_bool(&words[3]),
        exists: decode_bool(&words[4]),
    })
}

/// Calldata for `recordSpend(user, agent, amount, txHash)`.
pub fn encode_record_spend(
    user: &EvmAddress,
    agent: &EvmAddress,
    amount: U256,
    tx_hash: &[u8; 32],
) -> String {
    build_calldata(
        selector("recordSpend(address,address,uint256,bytes32)"),
        &[
            encode_address(user),
            encode_address(agent),
            encode_u256(amount),
            encode_bytes32(tx_hash),
        ],
    )
}
