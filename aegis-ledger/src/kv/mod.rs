//! Key/Value Store Abstraction
//!
//! The reservation ledger and queues are written against this trait so the
//! same arithmetic runs over the in-memory store in tests and development
//! and the sled-backed store in deployments. The contract every backend
//! must honor:
//!
//! - `compare_and_swap` is atomic with respect to concurrent callers of
//!   any mutation on the same key
//! - expired entries read as absent everywhere, including inside CAS
//! - list pushes go to the head, pops come from the tail (FIFO)

pub mod memory;
pub mod sled;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub use self::memory::MemoryKv;
pub use self::sled::SledKv;

/// Store error
#[derive(Error, Debug)]
pub enum StoreError {
    /// Backend failure (I/O, corruption)
    #[error("store backend error: {0}")]
    Backend(String),

    /// Stored bytes could not be decoded
    #[error("store codec error: {0}")]
    Codec(String),

    /// Unrecognized connection string
    #[error("unsupported kv url: {0}")]
    Unsupported(String),
}

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;

/// Shared key/value service with optimistic concurrency.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a scalar value; expired entries read as absent.
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    /// Write a scalar value, replacing any previous one.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<()>;

    /// Write only if the key is absent. Returns true when the write
    /// happened. This is the create-if-absent primitive the anchor lock
    /// builds on.
    async fn set_nx(&self, key: &str, value: &str, ttl: Option<Duration>) -> StoreResult<bool>;

    /// Atomically replace `expected` with `new`; `expected == None` means
    /// "key absent". Returns false when the current value no longer
    /// matches, in which case the caller re-reads and retries.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: &str,
        ttl: Option<Duration>,
    ) -> StoreResult<bool>;

    /// Remove a scalar or list key.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Whether a live (unexpired) entry exists.
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Push a value to the head of the list at `key`.
    async fn push_front(&self, key: &str, value: &str) -> StoreResult<()>;

    /// Pop a value from the tail of the list at `key`.
    async fn pop_back(&self, key: &str) -> StoreResult<Option<String>>;

    /// Number of entries in the list at `key` (0 when absent).
    async fn list_len(&self, key: &str) -> StoreResult<usize>;

    /// Snapshot the list head-to-tail without consuming it.
    async fn list_all(&self, key: &str) -> StoreResult<Vec<String>>;

    /// All list-typed keys with the given prefix.
    async fn scan_lists(&self, prefix: &str) -> StoreResult<Vec<String>>;
}

/// Open a store from a connection string.
///
/// Recognized schemes: `mem://` for the in-memory store, `sled://<path>`
/// for the embedded persistent store.
pub fn open_store(kv_url: &str) -> StoreResult<Arc<dyn KvStore>> {
    if kv_url == "mem://" {
        return Ok(Arc::new(MemoryKv::new()));
    }
    if let Some(path) = kv_url.strip_prefix("sled://") {
        return Ok(Arc::new(SledKv::open(path)?));
    }
    Err(StoreError::Unsupported(kv_url.to_string()))
}
