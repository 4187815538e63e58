use crate::logging::{LogConfig, LogFormat};
use crate::queue::ChannelConfig;
use crate::strategy::{AsyncConfig, BatchConfig};
use crate::worker::WorkerConfig;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

/// Apply deposits and withdrawals to a ledger of accounts
#[derive(Parser, Debug)]
#[command(name = "banking-ledger")]
#[command(about = "Apply deposits and withdrawals to a ledger of accounts", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger rows
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Processing mode
    #[arg(
        long = "mode",
        value_name = "MODE",
        env = "LEDGER_MODE",
        default_value = "async",
        help = "Processing mode: 'sync' applies inline, 'async' queues transactions for workers"
    )]
    pub mode: StrategyType,

    /// Number of queue consumers (async mode only)
    #[arg(
        long = "workers",
        value_name = "COUNT",
        env = "WORKER_COUNT",
        help = "Number of queue consumers (default: 5)"
    )]
    pub workers: Option<usize>,

    /// Message time-to-live in seconds (async mode only)
    #[arg(
        long = "message-ttl",
        value_name = "SECS",
        env = "MESSAGE_TTL_SECS",
        help = "Seconds a queued message may wait before it is dead-lettered (default: 300)"
    )]
    pub message_ttl_secs: Option<u64>,

    /// Shutdown grace period in seconds (async mode only)
    #[arg(
        long = "shutdown-grace",
        value_name = "SECS",
        env = "SHUTDOWN_GRACE_SECS",
        help = "Seconds to wait for in-flight messages on shutdown (default: 30)"
    )]
    pub shutdown_grace_secs: Option<u64>,

    /// Number of rows per batch (async mode only)
    #[arg(
        long = "batch-size",
        value_name = "SIZE",
        help = "Number of rows read per batch (default: 1000)"
    )]
    pub batch_size: Option<usize>,

    /// Runtime worker threads (async mode only)
    #[arg(
        long = "max-concurrent",
        value_name = "COUNT",
        help = "Runtime worker threads (default: CPU cores)"
    )]
    pub max_concurrent_batches: Option<usize>,

    /// Log filter used when RUST_LOG is not set
    #[arg(
        long = "log-level",
        value_name = "LEVEL",
        env = "LOG_LEVEL",
        default_value = "info"
    )]
    pub log_level: String,

    /// Log line format
    #[arg(
        long = "log-format",
        value_name = "FORMAT",
        env = "LOG_FORMAT",
        default_value = "text"
    )]
    pub log_format: LogFormat,
}

/// Available processing strategies
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StrategyType {
    Sync,
    Async,
}

impl CliArgs {
    /// Create a BatchConfig from CLI arguments
    ///
    /// Missing values take the defaults; zero values fall back to the
    /// defaults with a warning.
    pub fn to_batch_config(&self) -> BatchConfig {
        if self.batch_size.is_some() || self.max_concurrent_batches.is_some() {
            let default = BatchConfig::default();
            BatchConfig::new(
                self.batch_size.unwrap_or(default.batch_size),
                self.max_concurrent_batches
                    .unwrap_or(default.max_concurrent_batches),
            )
        } else {
            BatchConfig::default()
        }
    }

    pub fn to_worker_config(&self) -> WorkerConfig {
        let default = WorkerConfig::default();
        WorkerConfig::new(
            self.workers.unwrap_or(default.worker_count),
            self.shutdown_grace_secs
                .map_or(default.shutdown_grace, Duration::from_secs),
        )
    }

    pub fn to_channel_config(&self) -> ChannelConfig {
        match self.message_ttl_secs {
            Some(secs) => ChannelConfig::new(Duration::from_secs(secs)),
            None => ChannelConfig::default(),
        }
    }

    /// Everything the async strategy needs, built from the arguments above
    pub fn to_async_config(&self) -> AsyncConfig {
        AsyncConfig {
            batch: self.to_batch_config(),
            workers: self.to_worker_config(),
            channel: self.to_channel_config(),
        }
    }

    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.log_level.clone(),
            format: self.log_format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::DEFAULT_MESSAGE_TTL;
    use crate::worker::{DEFAULT_SHUTDOWN_GRACE, DEFAULT_WORKER_COUNT};
    use rstest::rstest;

    // Mode parsing tests
    #[rstest]
    #[case::explicit_sync(&["program", "--mode", "sync", "input.csv"], StrategyType::Sync)]
    #[case::explicit_async(&["program", "--mode", "async", "input.csv"], StrategyType::Async)]
    fn test_mode_parsing(#[case] args: &[&str], #[case] expected: StrategyType) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.mode, expected);
    }

    // Individual config option tests
    #[rstest]
    #[case::batch_size(&["program", "--batch-size", "2000", "input.csv"], Some(2000), None)]
    #[case::max_concurrent(&["program", "--max-concurrent", "8", "input.csv"], None, Some(8))]
    #[case::all_options(
        &["program", "--mode", "async", "--batch-size", "2000", "--max-concurrent", "8", "input.csv"],
        Some(2000),
        Some(8)
    )]
    fn test_batch_options(
        #[case] args: &[&str],
        #[case] batch_size: Option<usize>,
        #[case] max_concurrent: Option<usize>,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.batch_size, batch_size);
        assert_eq!(parsed.max_concurrent_batches, max_concurrent);
    }

    // BatchConfig conversion tests with valid values
    #[rstest]
    #[case::custom_batch_size(&["program", "--batch-size", "2000", "--max-concurrent", "4", "input.csv"], 2000, 4)]
    #[case::custom_max_concurrent(&["program", "--batch-size", "1000", "--max-concurrent", "8", "input.csv"], 1000, 8)]
    #[case::zero_batch_size(&["program", "--batch-size", "0", "--max-concurrent", "2", "input.csv"], 1000, 2)]
    #[case::zero_max_concurrent(
        &["program", "--batch-size", "50", "--max-concurrent", "0", "input.csv"],
        50,
        num_cpus::get()
    )]
    fn test_batch_config_conversion(
        #[case] args: &[&str],
        #[case] expected_batch_size: usize,
        #[case] expected_max_concurrent: usize,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.to_batch_config();

        assert_eq!(config.batch_size, expected_batch_size);
        assert_eq!(config.max_concurrent_batches, expected_max_concurrent);
    }

    #[rstest]
    #[case::custom(&["program", "--workers", "8", "--shutdown-grace", "10", "input.csv"], 8, 10)]
    #[case::zero_workers(&["program", "--workers", "0", "--shutdown-grace", "10", "input.csv"], DEFAULT_WORKER_COUNT, 10)]
    #[case::zero_grace(
        &["program", "--workers", "2", "--shutdown-grace", "0", "input.csv"],
        2,
        DEFAULT_SHUTDOWN_GRACE.as_secs()
    )]
    fn test_worker_config_conversion(
        #[case] args: &[&str],
        #[case] expected_workers: usize,
        #[case] expected_grace_secs: u64,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_worker_config();

        assert_eq!(config.worker_count, expected_workers);
        assert_eq!(config.shutdown_grace, Duration::from_secs(expected_grace_secs));
    }

    #[rstest]
    #[case::custom(&["program", "--message-ttl", "60", "input.csv"], Duration::from_secs(60))]
    #[case::zero(&["program", "--message-ttl", "0", "input.csv"], DEFAULT_MESSAGE_TTL)]
    fn test_channel_config_conversion(#[case] args: &[&str], #[case] expected_ttl: Duration) {
        let config = CliArgs::try_parse_from(args).unwrap().to_channel_config();
        assert_eq!(config.message_ttl, expected_ttl);
    }

    #[test]
    fn test_async_config_combines_sections() {
        let parsed = CliArgs::try_parse_from([
            "program",
            "--workers",
            "3",
            "--message-ttl",
            "20",
            "--shutdown-grace",
            "7",
            "--batch-size",
            "10",
            "--max-concurrent",
            "2",
            "input.csv",
        ])
        .unwrap();

        let config = parsed.to_async_config();

        assert_eq!(config.batch, BatchConfig::new(10, 2));
        assert_eq!(config.workers, WorkerConfig::new(3, Duration::from_secs(7)));
        assert_eq!(config.channel, ChannelConfig::new(Duration::from_secs(20)));
    }

    #[rstest]
    #[case::json(&["program", "--log-level", "debug", "--log-format", "json", "input.csv"], "debug", LogFormat::Json)]
    #[case::text(&["program", "--log-level", "warn", "--log-format", "text", "input.csv"], "warn", LogFormat::Text)]
    fn test_log_config_conversion(
        #[case] args: &[&str],
        #[case] expected_level: &str,
        #[case] expected_format: LogFormat,
    ) {
        let config = CliArgs::try_parse_from(args).unwrap().to_log_config();
        assert_eq!(config.level, expected_level);
        assert_eq!(config.format, expected_format);
    }

    // Error handling tests
    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_mode(&["program", "--mode", "invalid", "input.csv"])]
    #[case::invalid_log_format(&["program", "--log-format", "xml", "input.csv"])]
    #[case::negative_workers(&["program", "--workers", "-1", "input.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
