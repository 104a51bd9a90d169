//! Aegis Gateway - Economic Firewall Data Plane
//!
//! The HTTP surface agents talk to. `POST /rpc` accepts one JSON-RPC
//! object or a batch; value-bearing `eth_sendTransaction` /
//! `eth_sendRawTransaction` calls run the admission pipeline, everything
//! else is forwarded to the upstream node untouched.
//!
//! ## Admission pipeline
//!
//! ```text
//! parse -> resolve (user, agent) -> load policy -> reserve -> forward
//!   │            │                      │             │          │
//!   │            │                      │             │          ├─ upstream error: rollback, verbatim
//!   │            │                      │             │          ├─ transport error: rollback, -32003
//!   │            │                      │             │          └─ success: enqueue pending, verbatim
//!   │            │                      │             └─ limit: -32001 / internal: -32002
//!   │            │                      └─ missing/kill-switched: -32001
//!   │            └─ unresolvable: -32602
//!   └─ malformed: -32600
//! ```
//!
//! ## Admin surface
//!
//! - `GET /health`, `GET /ready` - store and upstream probes
//! - `GET /policy/:user/:agent` - registry tuple plus ledger state
//! - `POST /anchor/run` - token-guarded one-shot anchor iteration
//! - `GET /failed/:user/:agent`, `POST /failed/:user/:agent/requeue`
//! - `GET /metrics` - counter snapshot

pub mod error;
pub mod forward;
pub mod identity;
pub mod pipeline;
pub mod routes;
pub mod rpc;
pub mod server;
pub mod state;
pub mod tx;

pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use server::{create_server, run_server, start_background_server};
pub use state::AppState;
