//! Aegis Chain - Registry and Envelope Plumbing
//!
//! Everything the firewall needs from the EVM side:
//!
//! - **EthRpcClient**: minimal JSON-RPC client shared by the registry
//!   reader and the facilitator
//! - **abi**: selectors and 32-byte word coding for the registry calls
//! - **envelope**: signed raw-transaction decoding (legacy, EIP-2930,
//!   EIP-1559) with sender recovery, used by the gateway to classify
//!   `eth_sendRawTransaction` traffic
//! - **RegistryClient**: `getPolicy` view reads behind the `PolicySource`
//!   trait, with a short time-based cache
//! - **Facilitator**: the privileged `recordSpend` signer behind the
//!   `SpendRecorder` trait
//!
//! The firewall never signs intercepted transactions; the only key held
//! here is the facilitator's, used exclusively for anchoring.

pub mod abi;
pub mod envelope;
pub mod error;
pub mod facilitator;
pub mod registry;
pub mod rlp;
pub mod rpc;

pub use envelope::{decode_raw_transaction, TxEnvelope};
pub use error::{ChainError, ChainResult};
pub use facilitator::{Facilitator, SpendRecorder};
pub use registry::{PolicySource, RegistryClient, POLICY_CACHE_TTL};
pub use rpc::EthRpcClient;
