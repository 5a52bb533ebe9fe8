//! Pool counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Running counters, updated without taking the pool lock.
#[derive(Debug, Default)]
pub struct PoolStats {
    check_ins: AtomicU64,
    check_outs: AtomicU64,
    conflicts: AtomicU64,
    misses: AtomicU64,
    materializations: AtomicU64,
    creation_failures: AtomicU64,
    closes: AtomicU64,
    close_failures: AtomicU64,
}

/// Point-in-time copy of [`PoolStats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatsSnapshot {
    /// Successful check-ins (proxy or concrete).
    pub check_ins: u64,
    /// Successful check-outs.
    pub check_outs: u64,
    /// Check-outs rejected with `AlreadyInUse`.
    pub conflicts: u64,
    /// Check-outs rejected with `NotFound`.
    pub misses: u64,
    /// Proxies turned into writers.
    pub materializations: u64,
    /// Proxies that failed to produce a writer.
    pub creation_failures: u64,
    /// Writers closed by the pool.
    pub closes: u64,
    /// Writers whose close failed.
    pub close_failures: u64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_check_in(&self) {
        self.check_ins.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_check_out(&self) {
        self.check_outs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_conflict(&self) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_materialization(&self) {
        self.materializations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_creation_failure(&self) {
        self.creation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_close(&self, success: bool) {
        self.closes.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.close_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            check_ins: self.check_ins.load(Ordering::Relaxed),
            check_outs: self.check_outs.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            materializations: self.materializations.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
        }
    }
}
