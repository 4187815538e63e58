//! Banking Ledger CLI
//!
//! Applies ledger rows from a CSV file and prints the resulting accounts.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- ledger.csv > accounts.csv
//! cargo run -- --mode sync ledger.csv > accounts.csv
//! cargo run -- --mode async --workers 8 --batch-size 500 ledger.csv > accounts.csv
//! LOG_FORMAT=json RUST_LOG=debug cargo run -- ledger.csv > accounts.csv
//! ```
//!
//! Account summaries go to stdout, logs to stderr.
//!
//! # Exit Codes
//!
//! - 0: Success
//! - 1: Error (missing arguments, file not found, file not readable, etc.)

use banking_ledger::cli;
use banking_ledger::logging;
use banking_ledger::strategy;
use std::process;
use tracing::error;

fn main() {
    let args = cli::parse_args();
    logging::init_logging(&args.to_log_config());

    let strategy = {
        let config = if args.mode == cli::StrategyType::Async {
            Some(args.to_async_config())
        } else {
            None
        };
        strategy::create_strategy(args.mode, config)
    };

    let mut output = std::io::stdout();
    if let Err(e) = strategy.process(&args.input_file, &mut output) {
        error!(error = %e, "Processing failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
