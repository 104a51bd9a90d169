//! Background Runner
//!
//! Long-lived task driving periodic anchor iterations. Exactly one runner
//! per process; cross-instance exclusion is the store-side anchor lock,
//! not anything process-local.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::worker::{AnchorWorker, IterationOutcome};

/// Handle to a spawned runner.
pub struct RunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RunnerHandle {
    /// Signal shutdown and wait for the runner to drain out. Mid-sleep the
    /// runner wakes immediately; mid-batch it finishes the record in
    /// flight first.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            error!(error = %e, "anchor runner task join failed");
        }
    }
}

/// Spawn the periodic anchor loop.
pub fn spawn_runner(worker: Arc<AnchorWorker>, epoch: Duration) -> RunnerHandle {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    let task = tokio::spawn(async move {
        let mut ticker = interval(epoch);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(epoch_secs = epoch.as_secs(), "anchor runner started");

        'outer: loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("anchor runner received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let iteration = worker.run_iteration();
                    tokio::pin!(iteration);

                    // Keep polling the in-flight iteration across a
                    // shutdown signal so the current recordSpend wait
                    // completes before we exit.
                    loop {
                        tokio::select! {
                            _ = shutdown_rx.recv() => {
                                info!("shutdown during anchor iteration; finishing current record");
                                worker.request_stop();
                            }
                            result = &mut iteration => {
                                match result {
                                    Ok(IterationOutcome::Completed(report)) => {
                                        if report.processed > 0 || report.scanned > 0 {
                                            info!(
                                                processed = report.processed,
                                                scanned = report.scanned,
                                                "anchor iteration complete"
                                            );
                                        } else {
                                            debug!("anchor iteration found no pending work");
                                        }
                                    }
                                    Ok(IterationOutcome::LockHeld) => {
                                        debug!("anchor lock held elsewhere; skipping iteration");
                                    }
                                    Err(e) => {
                                        error!(error = %e, "anchor iteration failed");
                                    }
                                }
                                break;
                            }
                        }
                    }

                    if worker.is_stopping() {
                        break 'outer;
                    }
                }
            }
        }

        info!("anchor runner stopped");
    });

    RunnerHandle { shutdown_tx, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_chain::{ChainResult, SpendRecorder};
    use aegis_core::metrics::FirewallMetrics;
    use aegis_core::types::Identity;
    use aegis_core::AnchorMode;
    use aegis_ledger::kv::{KvStore, MemoryKv};
    use alloy_primitives::U256;
    use async_trait::async_trait;

    struct NullRecorder;

    #[async_trait]
    impl SpendRecorder for NullRecorder {
        async fn record_spend(
            &self,
            _identity: &Identity,
            _amount: U256,
            tx_hash: &str,
        ) -> ChainResult<String> {
            Ok(tx_hash.to_string())
        }
    }

    #[tokio::test]
    async fn test_runner_stops_promptly_mid_sleep() {
        let store: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
        let worker = Arc::new(AnchorWorker::new(
            store,
            Arc::new(NullRecorder),
            Arc::new(FirewallMetrics::new()),
            20,
            AnchorMode::Continuous,
        ));

        // Long epoch: after the immediate first tick the runner sleeps
        let handle = spawn_runner(worker, Duration::from_secs(3600));
        tokio::time::sleep(Duration::from_millis(50)).await;

        // stop() must return quickly even though the next tick is an hour out
        tokio::time::timeout(Duration::from_secs(2), handle.stop())
            .await
            .expect("runner did not stop promptly");
    }
}
