//! Asynchronous queued processing strategy
//!
//! Deposits and withdrawals are submitted with `prefer_async`, so each one is
//! recorded as pending, published to an in-memory broker and applied by the
//! worker pool. Account openings are always applied inline.
//!
//! # Architecture
//!
//! ```text
//! AsyncProcessingStrategy
//!     ├── AsyncConfig
//!     │     ├── BatchConfig   (batch_size, max_concurrent_batches)
//!     │     ├── WorkerConfig  (worker_count, shutdown_grace)
//!     │     └── ChannelConfig (message_ttl)
//!     ├── AsyncReader (batch CSV reading)
//!     ├── LedgerDriver → LedgerService → InMemoryBroker
//!     └── WorkerPool → TransactionWorker → TransactionEngine
//! ```
//!
//! # Ordering
//!
//! Batches are processed one after another. Within a batch, rows are
//! partitioned by account label: different labels are submitted
//! concurrently. Each queued row is waited on until its worker settles it
//! before the next row of the same label is submitted, so a label's rows take
//! effect in file order and the output matches the synchronous strategy. The
//! broker is drained before the next batch is read.

use crate::core::{InMemoryBalanceStore, InMemoryLedgerStore, LedgerService, TransactionEngine};
use crate::io::async_reader::AsyncReader;
use crate::io::csv_format::{write_accounts_csv, LedgerCommand};
use crate::queue::{ChannelConfig, InMemoryBroker, MessageChannel};
use crate::strategy::{LedgerDriver, ProcessingStrategy};
use crate::types::LedgerError;
use crate::worker::{WorkerConfig, WorkerPool};
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{info, warn};

/// Configuration for batch reading
///
/// Controls how many rows are read per batch and the number of runtime
/// worker threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BatchConfig {
    /// Number of rows per batch
    pub batch_size: usize,
    /// Runtime worker threads available to submitters and consumers
    pub max_concurrent_batches: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            max_concurrent_batches: num_cpus::get(),
        }
    }
}

impl BatchConfig {
    /// Create a new BatchConfig with custom values
    ///
    /// Zero values fall back to the defaults with a warning.
    pub fn new(batch_size: usize, max_concurrent_batches: usize) -> Self {
        let default = Self::default();

        let batch_size = if batch_size == 0 {
            warn!(
                batch_size,
                default = default.batch_size,
                "Invalid batch_size, using default"
            );
            default.batch_size
        } else {
            batch_size
        };

        let max_concurrent_batches = if max_concurrent_batches == 0 {
            warn!(
                max_concurrent_batches,
                default = default.max_concurrent_batches,
                "Invalid max_concurrent_batches, using default"
            );
            default.max_concurrent_batches
        } else {
            max_concurrent_batches
        };

        Self {
            batch_size,
            max_concurrent_batches,
        }
    }
}

/// Everything the queued strategy needs to run
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AsyncConfig {
    pub batch: BatchConfig,
    pub workers: WorkerConfig,
    pub channel: ChannelConfig,
}

/// Queued processing strategy
///
/// AsyncProcessingStrategy is Send + Sync. Each call to `process` builds its
/// own runtime, broker, stores and worker pool, so runs are independent.
#[derive(Debug, Clone)]
pub struct AsyncProcessingStrategy {
    config: AsyncConfig,
}

impl AsyncProcessingStrategy {
    /// Create a new AsyncProcessingStrategy with the specified configuration
    pub fn new(config: AsyncConfig) -> Self {
        Self { config }
    }

    async fn run(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), LedgerError> {
        let file = tokio::fs::File::open(input_path)
            .await
            .map_err(|e| LedgerError::IoError {
                message: format!("Failed to open file '{}': {}", input_path.display(), e),
            })?;
        let mut reader = AsyncReader::new(tokio_util::compat::TokioAsyncReadCompatExt::compat(file));

        let engine = Arc::new(TransactionEngine::new(
            Arc::new(InMemoryBalanceStore::new()),
            Arc::new(InMemoryLedgerStore::new()),
        ));
        let broker = InMemoryBroker::new(self.config.channel.clone());
        let channel: Arc<dyn MessageChannel> = Arc::new(broker.clone());

        let pool =
            WorkerPool::start(&self.config.workers, Arc::clone(&engine), Arc::clone(&channel))
                .await?;
        let driver = Arc::new(
            LedgerDriver::new(LedgerService::new(engine, Some(channel)))
                .with_settle_timeout(self.config.channel.message_ttl),
        );
        let readiness = driver.service().readiness().await;
        info!(
            ready = readiness.ready,
            mode = %readiness.processing.mode,
            queue = readiness.processing.queue,
            "Ledger started"
        );

        let mut rejected = 0usize;
        loop {
            let batch = reader.read_batch(self.config.batch.batch_size).await;
            if batch.is_empty() {
                break;
            }

            rejected += submit_batch(&driver, batch).await;
            broker.wait_idle().await;
        }

        let report = pool.shutdown().await;
        broker.close();
        for dead in broker.take_dead_letters() {
            warn!(message_id = %dead.message_id, reason = ?dead.reason, "Message dead-lettered");
        }
        driver.report_unreconciled();
        info!(
            rejected,
            completed = report.stats.completed,
            failed = report.stats.failed,
            aborted = report.aborted,
            "Input processed"
        );

        let summaries = driver.summaries().await?;
        write_accounts_csv(&summaries, output)
    }
}

/// Partition a batch by account label, keeping file order within a label
fn partition_by_label(batch: Vec<LedgerCommand>) -> HashMap<String, Vec<LedgerCommand>> {
    let mut partitions: HashMap<String, Vec<LedgerCommand>> = HashMap::new();
    for command in batch {
        partitions
            .entry(command.label().to_string())
            .or_default()
            .push(command);
    }
    partitions
}

/// Apply one batch, one task per label, and return the number of rejected rows
async fn submit_batch(driver: &Arc<LedgerDriver>, batch: Vec<LedgerCommand>) -> usize {
    let mut submitters = JoinSet::new();

    for (label, commands) in partition_by_label(batch) {
        let driver = Arc::clone(driver);
        submitters.spawn(async move {
            let mut rejected = 0usize;
            for command in commands {
                if let Err(e) = driver.apply(command, true).await {
                    rejected += 1;
                    warn!(label = %label, error = %e, "Row rejected");
                }
            }
            rejected
        });
    }

    let mut rejected = 0;
    while let Some(joined) = submitters.join_next().await {
        match joined {
            Ok(count) => rejected += count,
            Err(join_error) => warn!(error = %join_error, "Submitter task ended abnormally"),
        }
    }
    rejected
}

impl ProcessingStrategy for AsyncProcessingStrategy {
    /// Process rows from input file and write results to output
    ///
    /// 1. Builds a multi-threaded runtime sized by `max_concurrent_batches`
    /// 2. Starts the broker and worker pool
    /// 3. Reads and submits batches, draining the broker after each one
    /// 4. Shuts the pool down and writes the account summaries
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), LedgerError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.config.batch.max_concurrent_batches)
            .enable_all()
            .build()
            .map_err(|e| LedgerError::IoError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        runtime.block_on(self.run(input_path, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionRequest;
    use rstest::rstest;
    use rust_decimal_macros::dec;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    /// Helper function to create a temporary CSV file for testing
    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn config(batch_size: usize) -> AsyncConfig {
        AsyncConfig {
            batch: BatchConfig::new(batch_size, 2),
            workers: WorkerConfig::new(3, Duration::from_secs(5)),
            channel: ChannelConfig::default(),
        }
    }

    fn run(content: &str, batch_size: usize) -> String {
        let file = create_temp_csv(content);
        let mut output = Vec::new();
        AsyncProcessingStrategy::new(config(batch_size))
            .process(file.path(), &mut output)
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[rstest]
    #[case::zero_batch_size(0, 4, 1000, 4)]
    #[case::zero_threads(10, 0, 10, num_cpus::get())]
    #[case::custom(10, 4, 10, 4)]
    fn test_batch_config_new(
        #[case] batch_size: usize,
        #[case] threads: usize,
        #[case] expected_batch_size: usize,
        #[case] expected_threads: usize,
    ) {
        let config = BatchConfig::new(batch_size, threads);
        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_threads);
    }

    #[test]
    fn test_partition_by_label_keeps_order() {
        let submit = |label: &str, amount| LedgerCommand::Submit {
            label: label.to_string(),
            request: TransactionRequest::new("deposit", amount, ""),
        };
        let batch = vec![
            submit("a", dec!(1)),
            submit("b", dec!(2)),
            submit("a", dec!(3)),
        ];

        let partitions = partition_by_label(batch);

        assert_eq!(partitions.len(), 2);
        assert_eq!(partitions["a"], vec![submit("a", dec!(1)), submit("a", dec!(3))]);
        assert_eq!(partitions["b"], vec![submit("b", dec!(2))]);
    }

    #[test]
    fn test_async_strategy_processes_through_workers() {
        let output = run(
            "type,account,amount,description\n\
             open,alice,500.00,Alice\n\
             open,bob,100.00,Bob\n\
             deposit,alice,250.00,salary\n\
             withdraw,bob,40.00,rent\n",
            1000,
        );

        assert_eq!(
            output,
            "account,owner,balance,transactions\nalice,Alice,750.00,2\nbob,Bob,60.00,2\n"
        );
    }

    #[test]
    fn test_async_strategy_settles_batches_in_order() {
        // With one row per batch every deposit has settled before the next
        // withdrawal is pre-checked
        let output = run(
            "type,account,amount,description\n\
             open,carol,0,Carol\n\
             deposit,carol,100.00,\n\
             withdraw,carol,80.00,\n\
             deposit,carol,5.00,\n",
            1,
        );

        assert_eq!(
            output,
            "account,owner,balance,transactions\ncarol,Carol,25.00,3\n"
        );
    }

    #[test]
    fn test_async_strategy_applies_queued_deposit_before_withdrawal() {
        let output = run(
            "type,account,amount,description\n\
             open,alice,0,Alice\n\
             deposit,alice,10.00,\n\
             withdraw,alice,5.00,\n",
            1000,
        );

        assert_eq!(
            output,
            "account,owner,balance,transactions\nalice,Alice,5.00,2\n"
        );
    }

    #[test]
    fn test_async_strategy_skips_rejected_rows() {
        let output = run(
            "type,account,amount,description\n\
             open,dave,10.00,Dave\n\
             withdraw,dave,50.00,\n\
             deposit,nobody,1.00,\n\
             transfer,dave,1.00,\n",
            1000,
        );

        assert_eq!(
            output,
            "account,owner,balance,transactions\ndave,Dave,10.00,1\n"
        );
    }

    #[test]
    fn test_async_strategy_handles_missing_file() {
        let strategy = AsyncProcessingStrategy::new(AsyncConfig::default());
        let mut output = Vec::new();

        let err = strategy
            .process(Path::new("nonexistent.csv"), &mut output)
            .unwrap_err();

        assert!(err.to_string().contains("Failed to open file"));
    }
}
