// CLI module
// Command-line interface and argument parsing

mod args;

pub use args::{CliArgs, StrategyType};

use clap::Parser;

/// Parse command-line arguments using clap
///
/// Each option can also come from its environment variable (`LEDGER_MODE`,
/// `WORKER_COUNT`, `MESSAGE_TTL_SECS`, `SHUTDOWN_GRACE_SECS`, `LOG_LEVEL`,
/// `LOG_FORMAT`); an explicit flag wins. On invalid arguments or `--help`
/// clap prints the message and exits the process.
pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}
