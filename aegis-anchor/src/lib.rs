//! Aegis Anchor - Settlement Worker
//!
//! Drains the per-(user, agent) pending queues and writes settled spend
//! back to the on-chain registry through the facilitator signer.
//!
//! # Iteration shape
//!
//! One iteration takes the distributed anchor lock, scans `pending:*`
//! list keys, and pops up to the configured batch from each queue. Every
//! popped record terminates in exactly one of two places: a
//! `processed:<txHash>` marker after a confirmed `recordSpend`, or the
//! parallel failed queue. A submission or revert failure stops draining
//! that key for the iteration so systemic reverts cannot hot-loop.
//!
//! # Record state machine
//!
//! ```text
//! enqueued ── pop ──> in-flight ── confirmed ──> anchored (processed marker)
//!                         │
//!                         └────── any error ───> failed (failed queue)
//! ```

pub mod runner;
pub mod worker;

pub use runner::{spawn_runner, RunnerHandle};
pub use worker::{AnchorWorker, IterationOutcome, IterationReport};
