//! Firewall Metrics
//!
//! Lock-free counters for the admission and anchoring paths. The counters
//! are observability-only: nothing in the admission pipeline reads them
//! back, and they never participate in spend decisions.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics collector shared across the gateway and the anchor worker.
#[derive(Debug, Default)]
pub struct FirewallMetrics {
    /// Value-bearing requests admitted and forwarded
    admitted: AtomicU64,
    /// Rejections by policy (NO_POLICY / KILL_SWITCH / LIMIT_EXCEEDED)
    rejected_no_policy: AtomicU64,
    rejected_kill_switch: AtomicU64,
    rejected_limit: AtomicU64,
    /// Fail-closed internal rejections (-32002)
    internal_errors: AtomicU64,
    /// Non-intercepted traffic forwarded transparently
    passthrough: AtomicU64,
    /// Reservations rolled back after forward failures or upstream errors
    rollbacks: AtomicU64,
    /// Upstream JSON-RPC-level errors returned verbatim
    upstream_errors: AtomicU64,
    /// Records anchored by the worker
    anchored: AtomicU64,
    /// Records moved to a failed queue
    anchor_failures: AtomicU64,
    /// Replayed records skipped by the processed marker
    anchor_replays: AtomicU64,
    /// Last observed total failed-queue depth
    failed_queue_depth: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub admitted: u64,
    pub rejected_no_policy: u64,
    pub rejected_kill_switch: u64,
    pub rejected_limit: u64,
    pub internal_errors: u64,
    pub passthrough: u64,
    pub rollbacks: u64,
    pub upstream_errors: u64,
    pub anchored: u64,
    pub anchor_failures: u64,
    pub anchor_replays: u64,
    pub failed_queue_depth: u64,
}

impl FirewallMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_admitted(&self) {
        self.admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejection(&self, kind: &str) {
        match kind {
            "NO_POLICY" => self.rejected_no_policy.fetch_add(1, Ordering::Relaxed),
            "KILL_SWITCH" => self.rejected_kill_switch.fetch_add(1, Ordering::Relaxed),
            "LIMIT_EXCEEDED" => self.rejected_limit.fetch_add(1, Ordering::Relaxed),
            _ => self.internal_errors.fetch_add(1, Ordering::Relaxed),
        };
    }

    pub fn record_passthrough(&self) {
        self.passthrough.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rollback(&self) {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_error(&self) {
        self.upstream_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anchored(&self) {
        self.anchored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anchor_failure(&self) {
        self.anchor_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_anchor_replay(&self) {
        self.anchor_replays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_failed_queue_depth(&self, depth: u64) {
        self.failed_queue_depth.store(depth, Ordering::Relaxed);
    }

    /// Snapshot every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: self.admitted.load(Ordering::Relaxed),
            rejected_no_policy: self.rejected_no_policy.load(Ordering::Relaxed),
            rejected_kill_switch: self.rejected_kill_switch.load(Ordering::Relaxed),
            rejected_limit: self.rejected_limit.load(Ordering::Relaxed),
            internal_errors: self.internal_errors.load(Ordering::Relaxed),
            passthrough: self.passthrough.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            anchored: self.anchored.load(Ordering::Relaxed),
            anchor_failures: self.anchor_failures.load(Ordering::Relaxed),
            anchor_replays: self.anchor_replays.load(Ordering::Relaxed),
            failed_queue_depth: self.failed_queue_depth.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = FirewallMetrics::new();
        metrics.record_admitted();
        metrics.record_admitted();
        metrics.record_rejection("KILL_SWITCH");
        metrics.record_rejection("LIMIT_EXCEEDED");
        metrics.record_rejection("RESERVE_FAILED");
        metrics.record_rollback();
        metrics.set_failed_queue_depth(3);

        let snap = metrics.snapshot();
        assert_eq!(snap.admitted, 2);
        assert_eq!(snap.rejected_kill_switch, 1);
        assert_eq!(snap.rejected_limit, 1);
        assert_eq!(snap.internal_errors, 1);
        assert_eq!(snap.rollbacks, 1);
        assert_eq!(snap.failed_queue_depth, 3);
    }
}
