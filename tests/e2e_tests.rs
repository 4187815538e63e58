//! End-to-end integration tests
//!
//! These tests validate the complete ledger pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Reads input.csv from a fixture directory
//! 2. Applies every row through the selected strategy
//! 3. Generates output CSV
//! 4. Compares actual output with expected.csv
//!
//! Test fixtures are located in tests/fixtures/ and cover:
//! - Happy path scenarios
//! - Insufficient funds
//! - Validation errors (bad amounts, unknown types and labels, duplicates)
//! - Several accounts processed concurrently
//! - Precision and input formatting
//! - Withdrawals funded by deposits earlier in the same batch
//!
//! Each fixture is run twice: once synchronously and once through the queue
//! and worker pool, and both modes must agree.

#[cfg(test)]
mod tests {
    use banking_ledger::cli::StrategyType;
    use banking_ledger::strategy::{
        create_strategy, AsyncConfig, AsyncProcessingStrategy, BatchConfig, ProcessingStrategy,
    };
    use banking_ledger::worker::WorkerConfig;
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn fixture_paths(fixture_name: &str) -> (String, String) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );
        (input_path, expected_path)
    }

    /// Process a fixture with `strategy` and compare with expected.csv
    ///
    /// # Panics
    ///
    /// Panics if:
    /// - Input or expected files cannot be read
    /// - Output doesn't match expected
    fn assert_fixture(fixture_name: &str, strategy: &dyn ProcessingStrategy, label: &str) {
        let (input_path, expected_path) = fixture_paths(fixture_name);

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");
        strategy
            .process(Path::new(&input_path), &mut temp_output)
            .unwrap_or_else(|e| panic!("Failed to process ledger rows: {}", e));
        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (strategy: {})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, label, actual_output, expected_output
        );
    }

    /// End-to-end test for all fixtures with both processing modes
    #[rstest]
    #[case("happy_path")]
    #[case("insufficient_funds")]
    #[case("validation_errors")]
    #[case("multiple_accounts")]
    #[case("precision")]
    #[case("whitespace_and_case")]
    #[case("empty_input")]
    #[case("queued_funding")]
    fn test_fixtures(
        #[case] fixture: &str,
        #[values(StrategyType::Sync, StrategyType::Async)] mode: StrategyType,
    ) {
        let strategy = create_strategy(mode, None);
        assert_fixture(fixture, strategy.as_ref(), &format!("{:?}", mode));
    }

    /// The queued pipeline gives the same result with tiny batches and a
    /// single consumer
    #[rstest]
    #[case("happy_path")]
    #[case("multiple_accounts")]
    #[case("validation_errors")]
    #[case("queued_funding")]
    fn test_fixtures_small_batches_single_worker(#[case] fixture: &str) {
        let strategy = AsyncProcessingStrategy::new(AsyncConfig {
            batch: BatchConfig::new(2, 2),
            workers: WorkerConfig::new(1, Duration::from_secs(5)),
            ..AsyncConfig::default()
        });
        assert_fixture(fixture, &strategy, "async, batch 2, 1 worker");
    }

    #[rstest]
    fn test_missing_input_is_fatal(
        #[values(StrategyType::Sync, StrategyType::Async)] mode: StrategyType,
    ) {
        let strategy = create_strategy(mode, None);
        let mut output = Vec::new();

        let err = strategy
            .process(Path::new("tests/fixtures/does_not_exist.csv"), &mut output)
            .unwrap_err();

        assert!(err.to_string().contains("Failed to open file"), "{}", err);
        assert!(output.is_empty());
    }
}
