//! Asynchronous transaction workers
//!
//! - `consumer`: one worker bound to one subscription, with the
//!   ack/requeue/dead-letter policy
//! - `pool`: a configurable number of workers and their shutdown
//! - `stats`: counters shared by the pool

pub mod consumer;
pub mod pool;
pub mod stats;

pub use consumer::{DeliveryOutcome, TransactionWorker};
pub use pool::{
    ShutdownReport, WorkerConfig, WorkerPool, DEFAULT_SHUTDOWN_GRACE, DEFAULT_WORKER_COUNT,
};
pub use stats::{WorkerStats, WorkerStatsSnapshot};
