//! Error types for the banking ledger
//!
//! This module defines every error the ledger can report. Storage backends,
//! the message channel and the engine all return `LedgerError`, so the
//! decision of whether a failure is terminal or worth retrying is made by
//! matching on variants rather than on message text.
//!
//! # Error Categories
//!
//! - **Validation**: malformed requests, IDs or queue messages. Never retried.
//! - **Business**: domain-rule violations such as insufficient funds.
//!   Terminal and recorded on the transaction.
//! - **System**: storage or channel faults. Retried by redelivery on the
//!   asynchronous path.
//! - **Compensation**: a ledger write failed and the balance could not be
//!   restored. Fatal, the two stores disagree until repaired by hand.

use rust_decimal::Decimal;
use thiserror::Error;

use super::account::AccountId;
use super::transaction::{TransactionId, TransactionStatus};

/// What exactly was wrong with a rejected request
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestViolation {
    #[error("transaction type must be either 'deposit' or 'withdraw', got '{0}'")]
    UnknownKind(String),

    #[error("amount must be greater than 0, got {0}")]
    NonPositiveAmount(Decimal),

    #[error("amount {0} has more than 2 decimal places")]
    TooManyDecimalPlaces(Decimal),

    #[error("amount {0} exceeds the maximum allowed limit")]
    AmountAboveLimit(Decimal),

    #[error("owner name is required")]
    EmptyOwner,

    #[error("initial balance cannot be negative, got {0}")]
    NegativeInitialBalance(Decimal),

    #[error("account ID is required")]
    MissingAccountId,

    #[error("invalid account ID format '{0}'")]
    MalformedAccountId(String),

    #[error("transaction ID is required")]
    MissingTransactionId,

    #[error("invalid transaction ID format '{0}'")]
    MalformedTransactionId(String),
}

/// Coarse classification of a [`LedgerError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Validation,
    Business,
    System,
    Compensation,
}

/// Main error type for the ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// The request failed validation before any storage was touched
    #[error("Invalid request: {violation}")]
    InvalidRequest { violation: RequestViolation },

    /// A withdrawal asked for more than the account holds
    ///
    /// The balance is left unchanged.
    #[error(
        "Insufficient funds for account {account_id}: current balance {available}, requested {requested}"
    )]
    InsufficientFunds {
        account_id: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Account {account_id} not found")]
    AccountNotFound { account_id: AccountId },

    #[error("Account {account_id} already exists")]
    DuplicateAccount { account_id: AccountId },

    #[error("Transaction {transaction_id} not found")]
    TransactionNotFound { transaction_id: TransactionId },

    #[error("Transaction {transaction_id} already exists")]
    DuplicateTransaction { transaction_id: TransactionId },

    /// The record already reached a terminal status
    ///
    /// Raised when a redelivered intent targets a record that was already
    /// processed. Nothing is mutated.
    #[error("Transaction {transaction_id} is not in pending state: {status}")]
    NotPending {
        transaction_id: TransactionId,
        status: TransactionStatus,
    },

    /// A balance computation would leave the representable range
    #[error("Arithmetic overflow updating balance of account {account_id}")]
    ArithmeticOverflow { account_id: AccountId },

    /// A queued transaction reached `failed` after it was accepted
    #[error("Transaction {transaction_id} failed: {message}")]
    TransactionFailed {
        transaction_id: TransactionId,
        message: String,
    },

    /// A queued transaction was still pending when its caller stopped waiting
    #[error("Transaction {transaction_id} did not settle in time")]
    SettleTimeout { transaction_id: TransactionId },

    /// The account row exists but its opening deposit was not applied
    ///
    /// The account is left in the store with a zero balance; `cause` is the
    /// error the opening deposit failed with.
    #[error("Account {account_id} was created but its opening deposit failed: {cause}")]
    AccountOpeningFailed {
        account_id: AccountId,
        cause: Box<LedgerError>,
    },

    /// A storage backend could not be reached or refused the operation
    #[error("{store} store error: {message}")]
    Storage {
        store: &'static str,
        message: String,
    },

    /// The ledger write following a balance mutation failed
    ///
    /// `compensated` tells whether the inverse balance mutation succeeded.
    /// When it did not, balance and ledger disagree.
    #[error(
        "Failed to write ledger record {transaction_id}: {message}{}",
        if *compensated { "" } else { " (balance compensation failed)" }
    )]
    LedgerWriteFailed {
        transaction_id: TransactionId,
        message: String,
        compensated: bool,
    },

    /// The message channel could not accept or deliver a message
    #[error("Queue system unavailable: {message}")]
    QueueUnavailable { message: String },

    /// A queue message body could not be decoded into an intent
    #[error("Malformed intent: {message}")]
    MalformedIntent { message: String },

    /// An input row refers to an account label that was never opened
    #[error("Account label '{label}' has not been opened")]
    UnknownLabel { label: String },

    /// An input row opens an account label a second time
    #[error("Account label '{label}' is already open")]
    DuplicateLabel { label: String },

    #[error("I/O error: {message}")]
    IoError { message: String },

    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    ParseError { line: Option<u64>, message: String },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::IoError {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::ParseError {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(error: serde_json::Error) -> Self {
        LedgerError::MalformedIntent {
            message: error.to_string(),
        }
    }
}

impl LedgerError {
    pub fn invalid_request(violation: RequestViolation) -> Self {
        LedgerError::InvalidRequest { violation }
    }

    pub fn insufficient_funds(account_id: &AccountId, available: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientFunds {
            account_id: account_id.clone(),
            available,
            requested,
        }
    }

    pub fn account_not_found(account_id: &AccountId) -> Self {
        LedgerError::AccountNotFound {
            account_id: account_id.clone(),
        }
    }

    pub fn transaction_not_found(transaction_id: &TransactionId) -> Self {
        LedgerError::TransactionNotFound {
            transaction_id: transaction_id.clone(),
        }
    }

    pub fn not_pending(transaction_id: &TransactionId, status: TransactionStatus) -> Self {
        LedgerError::NotPending {
            transaction_id: transaction_id.clone(),
            status,
        }
    }

    pub fn storage(store: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Storage {
            store,
            message: message.into(),
        }
    }

    pub fn queue_unavailable(message: impl Into<String>) -> Self {
        LedgerError::QueueUnavailable {
            message: message.into(),
        }
    }

    /// Taxonomy class of this error
    pub fn class(&self) -> ErrorClass {
        match self {
            LedgerError::InvalidRequest { .. }
            | LedgerError::MalformedIntent { .. }
            | LedgerError::ParseError { .. }
            | LedgerError::UnknownLabel { .. }
            | LedgerError::DuplicateLabel { .. } => ErrorClass::Validation,
            LedgerError::InsufficientFunds { .. }
            | LedgerError::AccountNotFound { .. }
            | LedgerError::DuplicateAccount { .. }
            | LedgerError::DuplicateTransaction { .. }
            | LedgerError::NotPending { .. }
            | LedgerError::TransactionFailed { .. }
            | LedgerError::ArithmeticOverflow { .. } => ErrorClass::Business,
            LedgerError::AccountOpeningFailed { cause, .. } => cause.class(),
            LedgerError::LedgerWriteFailed {
                compensated: false, ..
            } => ErrorClass::Compensation,
            LedgerError::Storage { .. }
            | LedgerError::LedgerWriteFailed { .. }
            // A pending record that cannot be read yet is redelivered by workers
            | LedgerError::TransactionNotFound { .. }
            | LedgerError::SettleTimeout { .. }
            | LedgerError::QueueUnavailable { .. }
            | LedgerError::IoError { .. } => ErrorClass::System,
        }
    }

    /// Whether a worker should acknowledge a message that failed with this error
    ///
    /// This is the fixed allow-list of outcomes that redelivery can never
    /// change: insufficient funds, an invalid transaction type, a missing
    /// account, a non-positive amount, a balance overflow, or a record that is
    /// no longer pending. The engine has already marked the record failed for
    /// each of these. Everything else is treated as a system fault and
    /// redelivered.
    pub fn is_business(&self) -> bool {
        matches!(
            self,
            LedgerError::InsufficientFunds { .. }
                | LedgerError::AccountNotFound { .. }
                | LedgerError::NotPending { .. }
                | LedgerError::ArithmeticOverflow { .. }
                | LedgerError::InvalidRequest {
                    violation: RequestViolation::UnknownKind(_)
                        | RequestViolation::NonPositiveAmount(_)
                }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    fn account() -> AccountId {
        AccountId::parse("acc_1").unwrap()
    }

    fn transaction() -> TransactionId {
        TransactionId::parse("txn_1").unwrap()
    }

    #[rstest]
    #[case::insufficient_funds(
        LedgerError::insufficient_funds(&account(), dec!(500.00), dec!(600.00)),
        "Insufficient funds for account acc_1: current balance 500.00, requested 600.00"
    )]
    #[case::account_not_found(LedgerError::account_not_found(&account()), "Account acc_1 not found")]
    #[case::not_pending(
        LedgerError::not_pending(&transaction(), TransactionStatus::Completed),
        "Transaction txn_1 is not in pending state: completed"
    )]
    #[case::invalid_kind(
        LedgerError::invalid_request(RequestViolation::UnknownKind("refund".to_string())),
        "Invalid request: transaction type must be either 'deposit' or 'withdraw', got 'refund'"
    )]
    #[case::ledger_write_compensated(
        LedgerError::LedgerWriteFailed { transaction_id: transaction(), message: "timeout".to_string(), compensated: true },
        "Failed to write ledger record txn_1: timeout"
    )]
    #[case::ledger_write_uncompensated(
        LedgerError::LedgerWriteFailed { transaction_id: transaction(), message: "timeout".to_string(), compensated: false },
        "Failed to write ledger record txn_1: timeout (balance compensation failed)"
    )]
    #[case::parse_error_with_line(
        LedgerError::ParseError { line: Some(42), message: "Invalid field".to_string() },
        "CSV parse error at line 42: Invalid field"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::insufficient_funds(LedgerError::insufficient_funds(&account(), dec!(1), dec!(2)), true)]
    #[case::unknown_kind(LedgerError::invalid_request(RequestViolation::UnknownKind("x".into())), true)]
    #[case::non_positive(LedgerError::invalid_request(RequestViolation::NonPositiveAmount(dec!(0))), true)]
    #[case::account_not_found(LedgerError::account_not_found(&account()), true)]
    #[case::not_pending(LedgerError::not_pending(&transaction(), TransactionStatus::Failed), true)]
    #[case::transaction_not_found(LedgerError::transaction_not_found(&transaction()), false)]
    #[case::storage(LedgerError::storage("ledger", "connection refused"), false)]
    #[case::queue(LedgerError::queue_unavailable("closed"), false)]
    #[case::ledger_write(
        LedgerError::LedgerWriteFailed { transaction_id: transaction(), message: "x".into(), compensated: true },
        false
    )]
    #[case::precision(LedgerError::invalid_request(RequestViolation::TooManyDecimalPlaces(dec!(0.001))), false)]
    #[case::overflow(LedgerError::ArithmeticOverflow { account_id: account() }, true)]
    fn test_redelivery_allow_list(#[case] error: LedgerError, #[case] business: bool) {
        assert_eq!(error.is_business(), business, "{}", error);
    }

    #[rstest]
    #[case(LedgerError::invalid_request(RequestViolation::EmptyOwner), ErrorClass::Validation)]
    #[case(LedgerError::account_not_found(&account()), ErrorClass::Business)]
    #[case(LedgerError::storage("balance", "down"), ErrorClass::System)]
    #[case(
        LedgerError::LedgerWriteFailed { transaction_id: transaction(), message: "x".into(), compensated: false },
        ErrorClass::Compensation
    )]
    #[case(LedgerError::transaction_not_found(&transaction()), ErrorClass::System)]
    #[case(
        LedgerError::AccountOpeningFailed {
            account_id: account(),
            cause: Box::new(LedgerError::storage("ledger", "down")),
        },
        ErrorClass::System
    )]
    fn test_error_class(#[case] error: LedgerError, #[case] expected: ErrorClass) {
        assert_eq!(error.class(), expected);
    }

    /// Errors a worker can see from `process_pending`: acknowledged exactly
    /// when they are terminal business outcomes
    #[rstest]
    #[case::insufficient_funds(LedgerError::insufficient_funds(&account(), dec!(1), dec!(2)))]
    #[case::account_not_found(LedgerError::account_not_found(&account()))]
    #[case::not_pending(LedgerError::not_pending(&transaction(), TransactionStatus::Completed))]
    #[case::overflow(LedgerError::ArithmeticOverflow { account_id: account() })]
    #[case::transaction_not_found(LedgerError::transaction_not_found(&transaction()))]
    #[case::storage(LedgerError::storage("balance", "down"))]
    #[case::ledger_write(
        LedgerError::LedgerWriteFailed { transaction_id: transaction(), message: "x".into(), compensated: true }
    )]
    fn test_worker_errors_acked_iff_business(#[case] error: LedgerError) {
        assert_eq!(
            error.is_business(),
            error.class() == ErrorClass::Business,
            "{}",
            error
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::IoError { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
