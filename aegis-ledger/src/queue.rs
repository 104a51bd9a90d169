//! Pending and Failed Queues
//!
//! Per-(user, agent) FIFO of settled-but-unanchored spend records, the
//! parallel failed queue operators consume, and the `processed:<txHash>`
//! replay guards. The invariant enforced together with the anchor worker:
//! every record popped from a pending queue ends as a processed marker or
//! a failed-queue entry, never silently dropped.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use aegis_core::types::{Identity, PendingRecord};

use crate::keys::{failed_key, pending_key, processed_key};
use crate::kv::{KvStore, StoreError, StoreResult};

/// Processed markers guard replays for a week, comfortably past any
/// realistic retry horizon.
pub const PROCESSED_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Queue operations over the shared store.
pub struct PendingQueue<S: KvStore + ?Sized> {
    store: Arc<S>,
}

impl<S: KvStore + ?Sized> Clone for PendingQueue<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: KvStore + ?Sized> PendingQueue<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Append a record after a successful forward.
    pub async fn push_pending(
        &self,
        identity: &Identity,
        record: &PendingRecord,
    ) -> StoreResult<()> {
        let encoded = encode_record(record)?;
        self.store
            .push_front(&pending_key(identity), &encoded)
            .await?;
        debug!(identity = %identity, tx_hash = ?record.tx_hash, "pending record queued");
        Ok(())
    }

    /// Pop the oldest raw record, if any. Raw so the caller can route
    /// undecodable entries to the failed queue instead of losing them.
    pub async fn pop_pending_raw(&self, identity: &Identity) -> StoreResult<Option<String>> {
        self.store.pop_back(&pending_key(identity)).await
    }

    /// Decode a raw queue entry.
    pub fn decode_record(raw: &str) -> StoreResult<PendingRecord> {
        serde_json::from_str(raw).map_err(|e| StoreError::Codec(e.to_string()))
    }

    /// Move a raw (possibly undecodable) record to the failed queue.
    pub async fn push_failed_raw(&self, identity: &Identity, raw: &str) -> StoreResult<()> {
        self.store.push_front(&failed_key(identity), raw).await
    }

    /// Move a decoded record to the failed queue.
    pub async fn push_failed(
        &self,
        identity: &Identity,
        record: &PendingRecord,
    ) -> StoreResult<()> {
        let encoded = encode_record(record)?;
        self.push_failed_raw(identity, &encoded).await
    }

    /// Set the replay guard for an anchored transaction.
    pub async fn mark_processed(&self, identity: &Identity, tx_hash: &str) -> StoreResult<()> {
        self.store
            .set(
                &processed_key(identity, tx_hash),
                &aegis_core::day::now_millis().to_string(),
                Some(PROCESSED_TTL),
            )
            .await
    }

    /// Whether the replay guard is set for `tx_hash`.
    pub async fn is_processed(&self, identity: &Identity, tx_hash: &str) -> StoreResult<bool> {
        self.store.exists(&processed_key(identity, tx_hash)).await
    }

    /// Every pending-queue key currently in the store. Keys are raw; the
    /// worker parses and warns on anything off-template.
    pub async fn scan_pending_keys(&self) -> StoreResult<Vec<String>> {
        self.store.scan_lists("pending:").await
    }

    /// Every failed-queue key currently in the store.
    pub async fn scan_failed_keys(&self) -> StoreResult<Vec<String>> {
        self.store.scan_lists("failed:").await
    }

    /// Depth of one pending queue.
    pub async fn pending_len(&self, identity: &Identity) -> StoreResult<usize> {
        self.store.list_len(&pending_key(identity)).await
    }

    /// Depth of one failed queue.
    pub async fn failed_len(&self, identity: &Identity) -> StoreResult<usize> {
        self.store.list_len(&failed_key(identity)).await
    }

    /// Snapshot one failed queue for operator inspection.
    pub async fn list_failed(&self, identity: &Identity) -> StoreResult<Vec<String>> {
        self.store.list_all(&failed_key(identity)).await
    }

    /// Move every failed record back to the pending queue. Returns how
    /// many records moved.
    pub async fn requeue_failed(&self, identity: &Identity) -> StoreResult<usize> {
        let mut moved = 0;
        while let Some(raw) = self.store.pop_back(&failed_key(identity)).await? {
            self.store
                .push_front(&pending_key(identity), &raw)
                .await?;
            moved += 1;
        }
        Ok(moved)
    }

    /// Total failed-queue depth across all pairs, for the metrics gauge.
    pub async fn total_failed_depth(&self) -> StoreResult<u64> {
        let mut depth = 0u64;
        for key in self.scan_failed_keys().await? {
            depth += self.store.list_len(&key).await? as u64;
        }
        Ok(depth)
    }
}

fn encode_record(record: &PendingRecord) -> StoreResult<String> {
    serde_json::to_string(record).map_err(|e| StoreError::Codec(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use aegis_core::types::EvmAddress;
    use alloy_primitives::U256;

    fn identity() -> Identity {
        Identity::new(
            EvmAddress::parse("0x1111111111111111111111111111111111111111").unwrap(),
            EvmAddress::parse("0x2222222222222222222222222222222222222222").unwrap(),
        )
    }

    fn record(tag: u64) -> PendingRecord {
        PendingRecord::new(
            Some(format!("0x{:064x}", tag)),
            U256::from(tag),
            1_700_000_000_000 + tag,
        )
    }

    fn queue() -> PendingQueue<MemoryKv> {
        PendingQueue::new(Arc::new(MemoryKv::new()))
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let queue = queue();
        let id = identity();

        queue.push_pending(&id, &record(1)).await.unwrap();
        queue.push_pending(&id, &record(2)).await.unwrap();
        queue.push_pending(&id, &record(3)).await.unwrap();

        for expected in 1..=3u64 {
            let raw = queue.pop_pending_raw(&id).await.unwrap().unwrap();
            let decoded = PendingQueue::<MemoryKv>::decode_record(&raw).unwrap();
            assert_eq!(decoded, record(expected));
        }
        assert_eq!(queue.pop_pending_raw(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_processed_marker() {
        let queue = queue();
        let id = identity();
        let tx = format!("0x{:064x}", 7);

        assert!(!queue.is_processed(&id, &tx).await.unwrap());
        queue.mark_processed(&id, &tx).await.unwrap();
        assert!(queue.is_processed(&id, &tx).await.unwrap());
    }

    #[tokio::test]
    async fn test_failed_queue_and_requeue() {
        let queue = queue();
        let id = identity();

        queue.push_failed(&id, &record(1)).await.unwrap();
        queue.push_failed_raw(&id, "not-json").await.unwrap();
        assert_eq!(queue.failed_len(&id).await.unwrap(), 2);
        assert_eq!(queue.total_failed_depth().await.unwrap(), 2);

        let listed = queue.list_failed(&id).await.unwrap();
        assert_eq!(listed.len(), 2);

        let moved = queue.requeue_failed(&id).await.unwrap();
        assert_eq!(moved, 2);
        assert_eq!(queue.failed_len(&id).await.unwrap(), 0);
        assert_eq!(queue.pending_len(&id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_scan_pending_keys_skips_markers() {
        let queue = queue();
        let id = identity();
        let tx = format!("0x{:064x}", 9);

        queue.push_pending(&id, &record(1)).await.unwrap();
        queue.mark_processed(&id, &tx).await.unwrap();
        queue.push_failed(&id, &record(2)).await.unwrap();

        let keys = queue.scan_pending_keys().await.unwrap();
        assert_eq!(keys, vec![pending_key(&id)]);
    }

    #[tokio::test]
    async fn test_decode_rejects_malformed() {
        assert!(PendingQueue::<MemoryKv>::decode_record("{").is_err());
        assert!(PendingQueue::<MemoryKv>::decode_record("{}").is_err());
    }
}
