//! Processing strategy module
//!
//! This module defines the Strategy pattern for complete ledger pipelines,
//! covering CSV parsing, applying commands through the `LedgerService` and
//! writing the account summaries. The processing mode is selected at runtime:
//!
//! - `sync`: every transaction is applied inline by the engine
//! - `async`: transactions are queued on an in-memory broker and applied by a
//!   worker pool

use crate::cli::StrategyType;
use crate::types::LedgerError;
use std::io::Write;
use std::path::Path;

pub mod r#async;
pub mod driver;
pub mod sync;

pub use self::r#async::{AsyncConfig, AsyncProcessingStrategy, BatchConfig};
pub use driver::LedgerDriver;
pub use sync::SyncProcessingStrategy;

/// Processing strategy trait for complete ledger pipelines
///
/// Each strategy reads ledger commands from a CSV file, applies them, and
/// writes the final account summaries to the output.
pub trait ProcessingStrategy: Send + Sync {
    /// Process commands from input file and write results to output
    ///
    /// # Arguments
    ///
    /// * `input_path` - Path to the input CSV file
    /// * `output` - Writer receiving the account summaries
    ///
    /// # Returns
    ///
    /// * `Ok(())` if processing completed (rejected rows included)
    /// * `Err(LedgerError)` if a fatal error occurred (file not found, I/O
    ///   error, runtime could not be built)
    ///
    /// Individual row errors are logged and skipped.
    fn process(&self, input_path: &Path, output: &mut dyn Write) -> Result<(), LedgerError>;
}

/// Create a processing strategy based on the specified strategy type
///
/// # Arguments
///
/// * `strategy_type` - The type of processing strategy to create (Sync or Async)
/// * `config` - Optional configuration for queued processing (ignored for sync)
///
/// # Returns
///
/// A boxed trait object implementing the ProcessingStrategy trait
pub fn create_strategy(
    strategy_type: StrategyType,
    config: Option<AsyncConfig>,
) -> Box<dyn ProcessingStrategy> {
    match strategy_type {
        StrategyType::Sync => Box::new(SyncProcessingStrategy),
        StrategyType::Async => {
            let config = config.unwrap_or_default();
            Box::new(AsyncProcessingStrategy::new(config))
        }
    }
}
