//! Transaction-related types for the banking ledger
//!
//! This module defines transaction identifiers, the deposit/withdraw kinds,
//! the pending → completed/failed status lifecycle, the stored transaction
//! record and the raw request shape accepted by the engine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::account::AccountId;
use super::error::{LedgerError, RequestViolation};

/// Largest amount a single submission may carry (999,999,999.99)
pub const MAX_TRANSACTION_AMOUNT: Decimal = Decimal::from_parts(1_215_752_191, 23, 0, false, 2);

/// Number of decimal places money is tracked with
pub const MONEY_SCALE: u32 = 2;

/// Transaction identifier
///
/// Rendered as `txn_<uuid>`. The ledger store is keyed by this value and a
/// queue intent refers back to its record through it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    const PREFIX: &'static str = "txn_";

    /// Generate a fresh random transaction ID
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Parse a caller-supplied transaction ID, checking its shape
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LedgerError::invalid_request(RequestViolation::MissingTransactionId));
        }
        if !raw.starts_with(Self::PREFIX) {
            return Err(LedgerError::invalid_request(
                RequestViolation::MalformedTransactionId(raw.to_string()),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two balance-changing operations the ledger records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    /// Credit funds to an account
    Deposit,

    /// Debit funds from an account
    ///
    /// Rejected with `InsufficientFunds` when the balance does not cover it.
    Withdraw,
}

impl TransactionKind {
    /// The kind that undoes this one, used to compensate a balance mutation
    pub fn inverse(self) -> Self {
        match self {
            TransactionKind::Deposit => TransactionKind::Withdraw,
            TransactionKind::Withdraw => TransactionKind::Deposit,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdraw => "withdraw",
        }
    }
}

impl FromStr for TransactionKind {
    type Err = LedgerError;

    /// Parse a kind case-insensitively, ignoring surrounding whitespace
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdraw" => Ok(TransactionKind::Withdraw),
            _ => Err(LedgerError::invalid_request(RequestViolation::UnknownKind(
                raw.to_string(),
            ))),
        }
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a ledger record
///
/// `Pending` is the only non-terminal status. Once a record reaches
/// `Completed` or `Failed` it is never written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// A ledger record
///
/// For completed records `new_balance` equals `previous_balance` plus or
/// minus `amount` according to `kind`. Pending records carry a zero
/// `new_balance` until a worker computes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub previous_balance: Decimal,
    pub new_balance: Decimal,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Transaction {
    /// Build a completed record from the balances returned by an atomic update
    pub fn completed(
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        previous_balance: Decimal,
        new_balance: Decimal,
        description: String,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            kind,
            amount,
            previous_balance,
            new_balance,
            description,
            timestamp: Utc::now(),
            status: TransactionStatus::Completed,
            error_message: None,
        }
    }

    /// Build a pending record awaiting a worker
    ///
    /// `observed_balance` is the balance seen at submission time; the real
    /// previous balance is filled in when the worker applies the mutation.
    pub fn pending(
        account_id: AccountId,
        kind: TransactionKind,
        amount: Decimal,
        observed_balance: Decimal,
        description: String,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            kind,
            amount,
            previous_balance: observed_balance,
            new_balance: Decimal::ZERO,
            description,
            timestamp: Utc::now(),
            status: TransactionStatus::Pending,
            error_message: None,
        }
    }

    /// Signed balance change this record represents once completed
    pub fn delta(&self) -> Decimal {
        match self.kind {
            TransactionKind::Deposit => self.amount,
            TransactionKind::Withdraw => -self.amount,
        }
    }
}

/// Raw transaction request as received from a producer or a queue intent
///
/// The kind stays a string here so that an unrecognized kind is reported as
/// a validation failure by the engine rather than lost at decode time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub kind: String,
    pub amount: Decimal,
    #[serde(default)]
    pub description: String,
}

impl TransactionRequest {
    pub fn new(kind: impl Into<String>, amount: Decimal, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            amount,
            description: description.into(),
        }
    }

    /// Engine-level validation: a recognized kind and a positive amount
    ///
    /// Returns the parsed kind on success. No storage is touched.
    pub fn validate(&self) -> Result<TransactionKind, LedgerError> {
        let kind = self.kind.parse::<TransactionKind>()?;
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::invalid_request(
                RequestViolation::NonPositiveAmount(self.amount),
            ));
        }
        Ok(kind)
    }

    /// Submission-level validation on top of [`TransactionRequest::validate`]
    ///
    /// Also enforces the two-decimal precision and the per-transaction limit,
    /// and returns a request with a normalized kind and trimmed description.
    pub fn validate_submission(&self) -> Result<(TransactionKind, TransactionRequest), LedgerError> {
        let kind = self.validate()?;
        check_money_precision(self.amount)?;
        if self.amount > MAX_TRANSACTION_AMOUNT {
            return Err(LedgerError::invalid_request(RequestViolation::AmountAboveLimit(
                self.amount,
            )));
        }
        let normalized = TransactionRequest {
            kind: kind.as_str().to_string(),
            amount: self.amount,
            description: self.description.trim().to_string(),
        };
        Ok((kind, normalized))
    }
}

/// Reject amounts carrying more than two significant decimal places
pub fn check_money_precision(amount: Decimal) -> Result<(), LedgerError> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::invalid_request(
            RequestViolation::TooManyDecimalPlaces(amount),
        ));
    }
    Ok(())
}
