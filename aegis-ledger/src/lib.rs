//! Aegis Ledger - Off-Chain Spend Accounting
//!
//! The shared key/value layer the firewall reserves spend against, plus the
//! pending/failed queues the anchor worker drains and the distributed lock
//! that keeps anchoring singleton across instances.
//!
//! # Components
//!
//! - **KvStore**: optimistic-concurrency key/value abstraction with
//!   in-memory and sled-backed implementations
//! - **ReservationLedger**: day-bucketed CAS reserve/rollback arithmetic
//! - **PendingQueue**: per-(user, agent) FIFO of settled-but-unanchored
//!   records with replay-guard markers and a parallel failed queue
//! - **AnchorLock**: short-TTL create-if-absent lock for the worker
//!
//! # Key schema
//!
//! ```text
//! spend:{user:<u>:agent:<a>}:<yyyy-mm-dd>      -> u256 wei (72h TTL)
//! pending:{user:<u>:agent:<a>}                 -> list of record JSON
//! failed:{user:<u>:agent:<a>}                  -> list of record JSON
//! pending:{user:<u>:agent:<a>}:processed:<tx>  -> timestamp ms (7d TTL)
//! anchor:lock                                  -> holder tag (120s TTL)
//! ```

pub mod keys;
pub mod kv;
pub mod lock;
pub mod queue;
pub mod reservation;

pub use keys::{failed_key, parse_pending_key, pending_key, processed_key, spend_key, ANCHOR_LOCK_KEY};
pub use kv::{open_store, KvStore, MemoryKv, SledKv, StoreError, StoreResult};
pub use lock::{AnchorLock, LOCK_TTL};
pub use queue::{PendingQueue, PROCESSED_TTL};
pub use reservation::{ReservationLedger, ReserveError, MAX_CAS_RETRIES, RESERVATION_TTL};
