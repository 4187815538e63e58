//! Synchronous processing strategy
//!
//! Every row is applied inline: accounts are opened, and deposits and
//! withdrawals go straight through the engine's atomic update and ledger
//! write. The service has no message channel, so nothing is queued.
//!
//! # Design
//!
//! The SyncProcessingStrategy focuses on orchestration, delegating:
//! - CSV parsing to `SyncReader` (iterator interface)
//! - Label handling and ledger calls to `LedgerDriver`
//! - CSV output to `csv_format::write_accounts_csv`
//!
//! The stores are async, so a current-thread tokio runtime drives them. Rows
//! are still applied one at a time, in file order.

use crate::core::{InMemoryBalanceStore, InMemoryLedgerStore, LedgerService, TransactionEngine};
use crate::io::csv_format::write_accounts_csv;
use crate::io::sync_reader::SyncReader;
use crate::strategy::{LedgerDriver, ProcessingStrategy};
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Synchronous processing strategy
///
/// # Examples
///
/// ```no_run
/// use banking_ledger::strategy::{ProcessingStrategy, SyncProcessingStrategy};
/// use std::path::Path;
/// use std::io;
///
/// let strategy = SyncProcessingStrategy;
/// let mut output = io::stdout();
///
/// strategy.process(Path::new("ledger.csv"), &mut output)
///     .expect("Processing failed");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SyncProcessingStrategy;

impl ProcessingStrategy for SyncProcessingStrategy {
    /// Process rows from input file and write results to output
    ///
    /// 1. Opens the input with a SyncReader (fatal if it cannot be opened)
    /// 2. Applies each row through the LedgerDriver, logging rejected rows
    /// 3. Writes the account summaries
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), LedgerError> {
        let reader = SyncReader::new(input_path)?;

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| LedgerError::IoError {
                message: format!("Failed to create tokio runtime: {}", e),
            })?;

        runtime.block_on(async {
            let engine = Arc::new(TransactionEngine::new(
                Arc::new(InMemoryBalanceStore::new()),
                Arc::new(InMemoryLedgerStore::new()),
            ));
            let driver = LedgerDriver::new(LedgerService::new(engine, None));

            let mut applied = 0usize;
            let mut rejected = 0usize;
            for row in reader {
                match row {
                    Ok(command) => {
                        let label = command.label().to_string();
                        match driver.apply(command, false).await {
                            Ok(()) => applied += 1,
                            Err(e) => {
                                rejected += 1;
                                warn!(label = %label, error = %e, "Row rejected");
                            }
                        }
                    }
                    Err(e) => {
                        rejected += 1;
                        warn!(error = %e, "Skipping invalid row");
                    }
                }
            }
            info!(applied, rejected, "Input processed");
            driver.report_unreconciled();

            let summaries = driver.summaries().await?;
            write_accounts_csv(&summaries, output)
        })
    }
}
