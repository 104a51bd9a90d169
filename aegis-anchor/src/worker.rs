//! Anchor Worker
//!
//! One lock-guarded drain over every pending queue. The worker is the
//! only consumer of pending records and the only caller of the
//! facilitator; the gateway only ever appends.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use aegis_chain::{ChainError, SpendRecorder};
use aegis_core::error::{AegisError, AegisResult};
use aegis_core::metrics::FirewallMetrics;
use aegis_core::types::{Identity, PendingRecord};
use aegis_core::AnchorMode;
use aegis_ledger::kv::KvStore;
use aegis_ledger::{parse_pending_key, AnchorLock, PendingQueue};

/// Pause between queues, keeping the RPC endpoint off bursty drains.
const INTER_KEY_DELAY: Duration = Duration::from_millis(50);

static WORKER_SEQ: AtomicU64 = AtomicU64::new(0);

/// What one iteration did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IterationReport {
    /// Records anchored with a confirmed `recordSpend`
    pub processed: u64,
    /// Pending queues visited
    pub scanned: u64,
    /// Anchor transaction hashes, submission order
    pub txs: Vec<String>,
}

/// Result of asking for an iteration.
#[derive(Debug)]
pub enum IterationOutcome {
    /// Another instance holds the anchor lock
    LockHeld,
    /// The iteration ran to completion
    Completed(IterationReport),
}

/// What happened to one popped record.
enum RecordOutcome {
    /// Confirmed on chain; processed marker set
    Anchored(String),
    /// Replay guard hit; nothing submitted
    Replayed,
    /// Bad record (malformed JSON / bad hash); moved to failed queue,
    /// keep draining this key
    FailedRecord,
    /// Submission or revert; moved to failed queue, stop this key
    FailedSubmit,
}

/// The anchoring worker.
pub struct AnchorWorker {
    queue: PendingQueue<dyn KvStore>,
    lock: AnchorLock<dyn KvStore>,
    recorder: Arc<dyn SpendRecorder>,
    metrics: Arc<FirewallMetrics>,
    batch_size: usize,
    mode: AnchorMode,
    stopping: AtomicBool,
}

impl AnchorWorker {
    pub fn new(
        store: Arc<dyn KvStore>,
        recorder: Arc<dyn SpendRecorder>,
        metrics: Arc<FirewallMetrics>,
        batch_size: usize,
        mode: AnchorMode,
    ) -> Self {
        let holder = format!(
            "worker-{}-{}",
            std::process::id(),
            WORKER_SEQ.fetch_add(1, Ordering::Relaxed)
        );
        Self {
            queue: PendingQueue::new(store.clone()),
            lock: AnchorLock::new(store, holder),
            recorder,
            metrics,
            batch_size,
            mode,
            stopping: AtomicBool::new(false),
        }
    }

    /// Ask the worker to wind down: the in-flight record completes, then
    /// the drain exits.
    pub fn request_stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }

    /// Whether a stop has been requested.
    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    /// Run one iteration under the anchor lock.
    pub async fn run_iteration(&self) -> AegisResult<IterationOutcome> {
        if !self.lock.acquire().await.map_err(storage)? {
            return Ok(IterationOutcome::LockHeld);
        }

        let result = self.drain_all().await;

        if let Err(e) = self.lock.release().await {
            warn!(error = %e, "failed to release anchor lock; TTL will clear it");
        }

        result.map(IterationOutcome::Completed)
    }

    async fn drain_all(&self) -> AegisResult<IterationReport> {
        let mut report = IterationReport::default();
        let keys = self.queue.scan_pending_keys().await.map_err(storage)?;
        let key_count = keys.len();

        'keys: for (index, key) in keys.into_iter().enumerate() {
            let Some(identity) = parse_pending_key(&key) else {
                warn!(key = %key, "skipping malformed pending key");
                continue;
            };
            report.scanned += 1;

            for _ in 0..self.batch_size {
                if self.is_stopping() {
                    info!("anchor drain stopping early on shutdown request");
                    break 'keys;
                }
                let Some(raw) = self
                    .queue
                    .pop_pending_raw(&identity)
                    .await
                    .map_err(storage)?
                else {
                    break;
                };

                match self.anchor_record(&identity, &raw).await? {
                    RecordOutcome::Anchored(anchor_tx) => {
                        report.processed += 1;
                        report.txs.push(anchor_tx);
                        if self.mode == AnchorMode::OneShot {
                            info!("one-shot anchor mode: stopping after first success");
                            break 'keys;
                        }
                    }
                    RecordOutcome::Replayed | RecordOutcome::FailedRecord => {}
                    RecordOutcome::FailedSubmit => break,
                }
            }

            if index + 1 < key_count {
                tokio::time::sleep(INTER_KEY_DELAY).await;
            }
        }

        match self.queue.total_failed_depth().await {
            Ok(depth) => self.metrics.set_failed_queue_depth(depth),
            Err(e) => warn!(error = %e, "failed-queue depth probe failed"),
        }

        Ok(report)
    }

    /// Drive one record through the state machine. The record is already
    /// off its queue; every exit path below re-homes it.
    async fn anchor_record(
        &self,
        identity: &Identity,
        raw: &str,
    ) -> AegisResult<RecordOutcome> {
        let record = match PendingQueue::<dyn KvStore>::decode_record(raw) {
            Ok(record) => record,
            Err(e) => {
                warn!(identity = %identity, error = %e, "malformed pending record moved to failed queue");
                self.queue
                    .push_failed_raw(identity, raw)
                    .await
                    .map_err(storage)?;
                self.metrics.record_anchor_failure();
                return Ok(RecordOutcome::FailedRecord);
            }
        };

        let Some(tx_hash) = record.tx_hash.as_deref().filter(|_| record.has_valid_tx_hash())
        else {
            warn!(
                identity = %identity,
                tx_hash = ?record.tx_hash,
                "pending record without usable tx hash moved to failed queue"
            );
            self.queue
                .push_failed(identity, &record)
                .await
                .map_err(storage)?;
            self.metrics.record_anchor_failure();
            return Ok(RecordOutcome::FailedRecord);
        };

        if self
            .queue
            .is_processed(identity, tx_hash)
            .await
            .map_err(storage)?
        {
            info!(identity = %identity, tx_hash, outcome = "replayed", "anchor attempt");
            self.metrics.record_anchor_replay();
            return Ok(RecordOutcome::Replayed);
        }

        match self
            .recorder
            .record_spend(identity, record.amount_wei, tx_hash)
            .await
        {
            Ok(anchor_tx) => {
                self.queue
                    .mark_processed(identity, tx_hash)
                    .await
                    .map_err(storage)?;
                info!(
                    identity = %identity,
                    tx_hash,
                    anchor_tx = %anchor_tx,
                    amount_wei = %record.amount_wei,
                    outcome = "anchored",
                    "anchor attempt"
                );
                self.metrics.record_anchored();
                Ok(RecordOutcome::Anchored(anchor_tx))
            }
            Err(e) => {
                let kind = match &e {
                    ChainError::Reverted { .. } => "reverted",
                    _ => "submit-failed",
                };
                error!(
                    identity = %identity,
                    tx_hash,
                    outcome = kind,
                    error = %e,
                    "anchor attempt"
                );
                self.queue
                    .push_failed(identity, &record)
                    .await
                    .map_err(storage)?;
                self.metrics.record_anchor_failure();
                Ok(RecordOutcome::FailedSubmit)
            }
        }
    }

    /// Reserved total currently queued for one pair; used by inspection.
    pub async fn pending_depth(&self, identity: &Identity) -> AegisResult<usize> {
        self.queue.pending_len(identity).await.map_err(storage)
    }
}

fn storage(e: aegis_ledger::kv::StoreError) -> AegisError {
    AegisError::Storage(e.to_string())
}
