//! Chain Error Types

use thiserror::Error;

/// Chain-side failure
#[derive(Error, Debug)]
pub enum ChainError {
    /// Transport failure reaching the RPC endpoint
    #[error("rpc transport error: {0}")]
    Transport(String),

    /// JSON-RPC-level error from the node
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Response shape did not match the request
    #[error("unexpected rpc response: {0}")]
    Response(String),

    /// ABI coding failure
    #[error("abi error: {0}")]
    Abi(String),

    /// Raw transaction envelope could not be decoded
    #[error("envelope error: {0}")]
    Envelope(String),

    /// Signing or key-handling failure
    #[error("signer error: {0}")]
    Signer(String),

    /// Receipt never arrived within the wait budget
    #[error("confirmation timeout for {tx_hash}")]
    ConfirmationTimeout { tx_hash: String },

    /// Transaction mined but reverted
    #[error("transaction reverted: {tx_hash}")]
    Reverted { tx_hash: String },
}

/// Chain result type
pub type ChainResult<T> = Result<T, ChainError>;

impl From<reqwest::Error> for ChainError {
    fn from(e: reqwest::Error) -> Self {
        ChainError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for ChainError {
    fn from(e: serde_json::Error) -> Self {
        ChainError::Response(e.to_string())
    }
}

impl From<hex::FromHexError> for ChainError {
    fn from(e: hex::FromHexError) -> Self {
        ChainError::Envelope(format!("hex decode error: {e}"))
    }
}
