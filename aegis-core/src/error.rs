//! Firewall Error Taxonomy
//!
//! Every failure the firewall can surface, with its mapping into the
//! application-defined JSON-RPC error band. The gateway turns these into
//! RPC error objects; the admin surface maps them onto HTTP statuses.

use thiserror::Error;

/// Aegis firewall error
#[derive(Error, Debug)]
pub enum AegisError {
    /// Request body is not a JSON-RPC object (no `method`)
    #[error("malformed JSON-RPC request: {0}")]
    MalformedRequest(String),

    /// Transaction parameters could not be parsed
    #[error("transaction parse failure: {0}")]
    ParseFailure(String),

    /// Registry view call failed
    #[error("policy read failed: {0}")]
    PolicyRead(String),

    /// No policy registered for the pair
    #[error("no policy registered for {user}/{agent}")]
    NoPolicy { user: String, agent: String },

    /// Policy kill switch engaged
    #[error("kill switch engaged for {user}/{agent}")]
    KillSwitch { user: String, agent: String },

    /// Reservation would exceed the daily limit
    #[error("daily limit exceeded: requested {requested} wei, {remaining} wei remaining")]
    LimitExceeded { requested: String, remaining: String },

    /// Reservation failed for a reason other than the limit
    #[error("reservation failed: {0}")]
    ReserveFailed(String),

    /// Upstream transport failure during forward
    #[error("upstream forward failed: {0}")]
    ForwardFailed(String),

    /// Anchor submission failed before mining
    #[error("anchor submission failed: {0}")]
    AnchorSubmit(String),

    /// Anchor transaction mined but reverted
    #[error("anchor reverted: {0}")]
    AnchorRevert(String),

    /// Queue record could not be decoded
    #[error("malformed queue record: {0}")]
    MalformedQueueRecord(String),

    /// Configuration error at startup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Key/value store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Unhandled failure; process stays up
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Aegis result type
pub type AegisResult<T> = Result<T, AegisError>;

impl AegisError {
    /// JSON-RPC error code for this kind.
    ///
    /// Codes follow the allocation in the firewall's wire contract:
    /// -32600 malformed, -32602 parse, -32001 policy denial, -32002
    /// internal, -32003 forward failure, -32099 fatal.
    pub fn code(&self) -> i32 {
        match self {
            AegisError::MalformedRequest(_) => -32600,
            AegisError::ParseFailure(_) => -32602,
            AegisError::NoPolicy { .. }
            | AegisError::KillSwitch { .. }
            | AegisError::LimitExceeded { .. } => -32001,
            AegisError::PolicyRead(_)
            | AegisError::ReserveFailed(_)
            | AegisError::AnchorSubmit(_)
            | AegisError::AnchorRevert(_)
            | AegisError::MalformedQueueRecord(_)
            | AegisError::Configuration(_)
            | AegisError::Storage(_) => -32002,
            AegisError::ForwardFailed(_) => -32003,
            AegisError::Fatal(_) => -32099,
        }
    }

    /// Stable machine-readable kind, used as the RPC error message
    /// (`Aegis: <kind>`) and in decision logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AegisError::MalformedRequest(_) => "INVALID_REQUEST",
            AegisError::ParseFailure(_) => "PARSE_FAILURE",
            AegisError::PolicyRead(_) => "POLICY_READ",
            AegisError::NoPolicy { .. } => "NO_POLICY",
            AegisError::KillSwitch { .. } => "KILL_SWITCH",
            AegisError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            AegisError::ReserveFailed(_) => "RESERVE_FAILED",
            AegisError::ForwardFailed(_) => "FORWARD_FAILED",
            AegisError::AnchorSubmit(_) => "ANCHOR_SUBMIT",
            AegisError::AnchorRevert(_) => "ANCHOR_REVERT",
            AegisError::MalformedQueueRecord(_) => "MALFORMED_RECORD",
            AegisError::Configuration(_) => "CONFIGURATION",
            AegisError::Storage(_) => "STORAGE",
            AegisError::Fatal(_) => "FATAL",
        }
    }

    /// The `message` field of the RPC error object.
    pub fn rpc_message(&self) -> String {
        format!("Aegis: {}", self.kind())
    }
}

impl From<serde_json::Error> for AegisError {
    fn from(e: serde_json::Error) -> Self {
        AegisError::ParseFailure(e.to_string())
    }
}
