//! Types module
//!
//! Contains core data structures used throughout the application.
//! This module organizes types into logical submodules:
//! - `account`: Account state and identifiers
//! - `transaction`: Ledger records, kinds, statuses and raw requests
//! - `intent`: The message published for pending transactions
//! - `error`: Error types and their classification

pub mod account;
pub mod error;
pub mod intent;
pub mod transaction;

pub use account::{Account, AccountId};
pub use error::{ErrorClass, LedgerError, RequestViolation};
pub use intent::Intent;
pub use transaction::{
    check_money_precision, Transaction, TransactionId, TransactionKind, TransactionRequest,
    TransactionStatus, MAX_TRANSACTION_AMOUNT,
};
