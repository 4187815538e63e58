//! Worker pool with cooperative shutdown
//!
//! This module provides `WorkerPool`, which starts a fixed number of
//! `TransactionWorker`s, each bound 1:1 to its own subscription, and stops
//! them on request.
//!
//! # Shutdown
//!
//! `shutdown` cancels a shared token. Every worker finishes the message it is
//! processing and stops pulling new ones. Workers still running when the
//! grace period ends are aborted; their unsettled deliveries are dropped and
//! therefore requeued for a future consumer.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::consumer::TransactionWorker;
use super::stats::{WorkerStats, WorkerStatsSnapshot};
use crate::core::TransactionEngine;
use crate::queue::MessageChannel;
use crate::types::LedgerError;

pub const DEFAULT_WORKER_COUNT: usize = 5;
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Configuration for the worker pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Number of concurrent consumers
    pub worker_count: usize,
    /// How long shutdown waits for in-flight messages before aborting
    pub shutdown_grace: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl WorkerConfig {
    /// Create a new WorkerConfig with custom values
    ///
    /// Zero values are replaced by the defaults with a warning.
    pub fn new(worker_count: usize, shutdown_grace: Duration) -> Self {
        let default = Self::default();

        let worker_count = if worker_count == 0 {
            warn!(
                "Invalid worker_count ({}), using default ({})",
                worker_count, default.worker_count
            );
            default.worker_count
        } else {
            worker_count
        };

        let shutdown_grace = if shutdown_grace.is_zero() {
            warn!(
                "Invalid shutdown_grace ({:?}), using default ({:?})",
                shutdown_grace, default.shutdown_grace
            );
            default.shutdown_grace
        } else {
            shutdown_grace
        };

        Self {
            worker_count,
            shutdown_grace,
        }
    }
}

/// How a pool shutdown ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers still running at the end of the grace period
    pub aborted: usize,
    pub stats: WorkerStatsSnapshot,
}

/// Running set of workers
pub struct WorkerPool {
    workers: JoinSet<()>,
    shutdown: CancellationToken,
    grace: Duration,
    stats: Arc<WorkerStats>,
}

impl WorkerPool {
    /// Subscribe `worker_count` consumers and start them
    ///
    /// # Errors
    ///
    /// Fails with the channel's error if any subscription cannot be opened;
    /// workers started before the failure are stopped.
    pub async fn start(
        config: &WorkerConfig,
        engine: Arc<TransactionEngine>,
        channel: Arc<dyn MessageChannel>,
    ) -> Result<Self, LedgerError> {
        let shutdown = CancellationToken::new();
        let stats = Arc::new(WorkerStats::new());
        let mut workers = JoinSet::new();

        for id in 1..=config.worker_count {
            let subscription = match channel.subscribe().await {
                Ok(subscription) => subscription,
                Err(subscribe_error) => {
                    shutdown.cancel();
                    workers.shutdown().await;
                    return Err(subscribe_error);
                }
            };
            let worker = TransactionWorker::new(id, Arc::clone(&engine), Arc::clone(&stats));
            workers.spawn(worker.run(subscription, shutdown.child_token()));
        }

        info!(workers = config.worker_count, "Worker pool started");
        Ok(Self {
            workers,
            shutdown,
            grace: config.shutdown_grace,
            stats,
        })
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of workers that have not exited yet
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Token that stops every worker when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Stop every worker, waiting up to the grace period
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!("Shutting down worker pool");
        self.shutdown.cancel();

        let workers = &mut self.workers;
        let drained = tokio::time::timeout(self.grace, async {
            while let Some(joined) = workers.join_next().await {
                if let Err(join_error) = joined {
                    warn!(error = %join_error, "Worker task ended abnormally");
                }
            }
        })
        .await
        .is_ok();

        let aborted = if drained {
            0
        } else {
            let remaining = self.workers.len();
            warn!(
                remaining,
                grace = ?self.grace,
                "Workers did not stop within the grace period, aborting"
            );
            self.workers.shutdown().await;
            remaining
        };

        let stats = self.stats.snapshot();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            requeued = stats.requeued,
            dead_lettered = stats.dead_lettered,
            "Worker pool stopped"
        );
        ShutdownReport { aborted, stats }
    }
}
