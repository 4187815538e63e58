//! CSV format handling for ledger commands and account output
//!
//! This module centralizes all CSV format concerns, providing:
//! - CsvRecord structure for deserialization
//! - Conversion from CSV records to ledger commands
//! - Account summary serialization
//!
//! All functions are pure (no I/O beyond the supplied writer) for easy testing.
//!
//! # Input format
//!
//! ```text
//! type,account,amount,description
//! open,alice,500.00,Alice Smith
//! deposit,alice,250.00,salary
//! withdraw,alice,100.00,rent
//! ```
//!
//! `account` is a label local to the file; the ledger assigns the real
//! account IDs when `open` rows are processed.

use crate::types::{LedgerError, TransactionRequest};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// CSV record structure for deserialization
///
/// Matches the input CSV format with columns: type, account, amount,
/// description. `amount` is optional because `open` rows may omit an
/// opening balance; `description` is optional for every row.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CsvRecord {
    #[serde(rename = "type")]
    pub op: String,
    pub account: String,
    pub amount: Option<String>,
    pub description: Option<String>,
}

/// One row of input, ready to be applied to the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerCommand {
    /// Open an account under `label`
    Open {
        label: String,
        owner: String,
        initial_balance: Decimal,
    },
    /// Submit a deposit or withdrawal against the account opened as `label`
    Submit {
        label: String,
        request: TransactionRequest,
    },
}

impl LedgerCommand {
    pub fn label(&self) -> &str {
        match self {
            LedgerCommand::Open { label, .. } | LedgerCommand::Submit { label, .. } => label,
        }
    }
}

/// Final state of one account, as written to the output
#[derive(Debug, Clone, PartialEq)]
pub struct AccountSummary {
    pub label: String,
    pub owner: String,
    pub balance: Decimal,
    /// Ledger records held for the account
    pub transactions: usize,
}

/// Convert a CsvRecord to a LedgerCommand
///
/// This function:
/// - Parses the row type (`open`, `deposit`, `withdraw`, case-insensitive)
/// - Parses the amount string into a Decimal (if present)
/// - Requires an amount for deposits and withdrawals
///
/// Business validation (positive amounts, precision, owner present) is left
/// to the ledger so that the same rules apply to every entry point.
///
/// # Arguments
///
/// * `csv_record` - The deserialized CSV record
///
/// # Returns
///
/// Result containing either:
/// - Ok(LedgerCommand) - Successfully converted record
/// - Err(String) - Error message describing the conversion failure
pub fn convert_csv_record(csv_record: CsvRecord) -> Result<LedgerCommand, String> {
    let label = csv_record.account.trim().to_string();
    if label.is_empty() {
        return Err(format!("Missing account label for '{}' row", csv_record.op));
    }

    let amount = match csv_record.amount {
        Some(amount_str) if !amount_str.trim().is_empty() => {
            match Decimal::from_str(amount_str.trim()) {
                Ok(decimal) => Some(decimal),
                Err(_) => {
                    return Err(format!(
                        "Invalid amount '{}' for account {}",
                        amount_str, label
                    ))
                }
            }
        }
        _ => None,
    };

    let description = csv_record
        .description
        .map(|d| d.trim().to_string())
        .unwrap_or_default();

    match csv_record.op.trim().to_lowercase().as_str() {
        "open" => Ok(LedgerCommand::Open {
            label,
            owner: description,
            initial_balance: amount.unwrap_or(Decimal::ZERO),
        }),
        op @ ("deposit" | "withdraw") => {
            let amount = amount
                .ok_or_else(|| format!("{} for account {} requires an amount", op, label))?;
            Ok(LedgerCommand::Submit {
                label,
                request: TransactionRequest::new(op, amount, description),
            })
        }
        _ => Err(format!(
            "Invalid row type: '{}' for account {}",
            csv_record.op, label
        )),
    }
}

/// Write account summaries to CSV format
///
/// Writes accounts in CSV format with columns: account, owner, balance,
/// transactions. Accounts are sorted by label for deterministic output and
/// balances are rendered with two decimal places.
///
/// # Arguments
///
/// * `accounts` - Slice of account summaries to write
/// * `output` - Mutable reference to a writer for outputting CSV
pub fn write_accounts_csv(
    accounts: &[AccountSummary],
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record(["account", "owner", "balance", "transactions"])?;

    let mut sorted_accounts = accounts.to_vec();
    sorted_accounts.sort_by(|a, b| a.label.cmp(&b.label));

    for account in sorted_accounts {
        writer.write_record(&[
            account.label,
            account.owner,
            format!("{:.2}", account.balance),
            account.transactions.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn record(op: &str, account: &str, amount: Option<&str>, description: Option<&str>) -> CsvRecord {
        CsvRecord {
            op: op.to_string(),
            account: account.to_string(),
            amount: amount.map(|s| s.to_string()),
            description: description.map(|s| s.to_string()),
        }
    }

    #[rstest]
    #[case::deposit("deposit", "deposit")]
    #[case::withdraw("withdraw", "withdraw")]
    #[case::case_insensitive("DEPOSIT", "deposit")]
    fn test_convert_submit(#[case] op: &str, #[case] expected_kind: &str) {
        let command =
            convert_csv_record(record(op, "alice", Some("100.50"), Some(" salary "))).unwrap();

        assert_eq!(
            command,
            LedgerCommand::Submit {
                label: "alice".to_string(),
                request: TransactionRequest::new(expected_kind, dec!(100.50), "salary"),
            }
        );
    }

    #[rstest]
    #[case::with_balance(Some("500.00"), dec!(500.00))]
    #[case::without_balance(None, dec!(0))]
    #[case::blank_balance(Some("  "), dec!(0))]
    fn test_convert_open(#[case] amount: Option<&str>, #[case] expected: Decimal) {
        let command =
            convert_csv_record(record("open", "alice", amount, Some("Alice Smith"))).unwrap();

        assert_eq!(
            command,
            LedgerCommand::Open {
                label: "alice".to_string(),
                owner: "Alice Smith".to_string(),
                initial_balance: expected,
            }
        );
        assert_eq!(command.label(), "alice");
    }

    #[rstest]
    #[case::invalid_type("transfer", "alice", Some("1.00"), "Invalid row type")]
    #[case::deposit_missing_amount("deposit", "alice", None, "requires an amount")]
    #[case::withdraw_missing_amount("withdraw", "alice", Some(""), "requires an amount")]
    #[case::invalid_amount("deposit", "alice", Some("ten"), "Invalid amount")]
    #[case::missing_label("deposit", "  ", Some("1.00"), "Missing account label")]
    fn test_convert_errors(
        #[case] op: &str,
        #[case] account: &str,
        #[case] amount: Option<&str>,
        #[case] expected_error: &str,
    ) {
        let err = convert_csv_record(record(op, account, amount, None)).unwrap_err();
        assert!(err.contains(expected_error), "{}", err);
    }

    fn summary(label: &str, owner: &str, balance: Decimal, transactions: usize) -> AccountSummary {
        AccountSummary {
            label: label.to_string(),
            owner: owner.to_string(),
            balance,
            transactions,
        }
    }

    #[rstest]
    #[case::single_account(
        vec![summary("alice", "Alice", dec!(750), 2)],
        "account,owner,balance,transactions\nalice,Alice,750.00,2\n"
    )]
    #[case::sorted_by_label(
        vec![
            summary("carol", "Carol", dec!(0), 0),
            summary("alice", "Alice", dec!(1.5), 1),
            summary("bob", "Bob", dec!(20.25), 3),
        ],
        "account,owner,balance,transactions\nalice,Alice,1.50,1\nbob,Bob,20.25,3\ncarol,Carol,0.00,0\n"
    )]
    #[case::owner_with_comma(
        vec![summary("dave", "Smith, Dave", dec!(10), 1)],
        "account,owner,balance,transactions\ndave,\"Smith, Dave\",10.00,1\n"
    )]
    #[case::empty_accounts(vec![], "account,owner,balance,transactions\n")]
    fn test_write_accounts_csv(#[case] accounts: Vec<AccountSummary>, #[case] expected_output: &str) {
        let mut output = Vec::new();
        write_accounts_csv(&accounts, &mut output).unwrap();

        assert_eq!(String::from_utf8(output).unwrap(), expected_output);
    }
}
