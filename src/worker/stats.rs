//! Worker pool counters

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::consumer::DeliveryOutcome;

/// Counters shared by every worker in a pool
#[derive(Debug, Default)]
pub struct WorkerStats {
    completed: AtomicU64,
    failed: AtomicU64,
    requeued: AtomicU64,
    dead_lettered: AtomicU64,
}

/// Point-in-time copy of [`WorkerStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    /// Acknowledged after the transaction completed
    pub completed: u64,
    /// Acknowledged after a business failure
    pub failed: u64,
    /// Rejected for redelivery after a system failure
    pub requeued: u64,
    /// Rejected without redelivery because the message was malformed
    pub dead_lettered: u64,
}

impl WorkerStatsSnapshot {
    /// Messages settled in total
    pub fn settled(&self) -> u64 {
        self.completed + self.failed + self.requeued + self.dead_lettered
    }
}

impl WorkerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &DeliveryOutcome) {
        let counter = match outcome {
            DeliveryOutcome::Completed(_) => &self.completed,
            DeliveryOutcome::Failed(_) => &self.failed,
            DeliveryOutcome::Requeued(_) => &self.requeued,
            DeliveryOutcome::DeadLettered(_) => &self.dead_lettered,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
        }
    }
}
