//! Aegis Core - Shared Firewall Types
//!
//! This crate provides the vocabulary shared by every layer of the Aegis
//! economic firewall: routing identities, the on-chain policy tuple, the
//! pending/failed spend records, the error taxonomy with its JSON-RPC code
//! mapping, the typed runtime configuration and the metrics counters.
//!
//! # Architecture
//!
//! The firewall sits between autonomous agents and an upstream EVM JSON-RPC
//! endpoint:
//!
//! ```text
//! agent ── JSON-RPC ──> gateway ──> reservation ledger (KV, CAS)
//!                          │               │
//!                          └──> upstream   └──> pending queue ──> anchor worker
//!                                                                     │
//!                                                  policy registry <──┘
//! ```
//!
//! Nothing in this crate performs I/O; the ledger, chain and gateway crates
//! build on these definitions.

pub mod config;
pub mod day;
pub mod error;
pub mod metrics;
pub mod types;

pub use config::{AnchorMode, FirewallConfig};
pub use day::{day_bucket, utc_day};
pub use error::{AegisError, AegisResult};
pub use metrics::{FirewallMetrics, MetricsSnapshot};
pub use types::{
    format_wei_as_eth, parse_hex_quantity, EvmAddress, Identity, PendingRecord, Policy,
    TX_HASH_HEX_LEN,
};
