//! Account-related types for the banking ledger
//!
//! This module defines the account identifier and the Account structure
//! held by the balance store.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::error::{LedgerError, RequestViolation};

/// Account identifier
///
/// Rendered as `acc_<uuid>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    const PREFIX: &'static str = "acc_";

    /// Generate a fresh random account ID
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, Uuid::new_v4()))
    }

    /// Parse a caller-supplied account ID, checking its shape
    pub fn parse(raw: &str) -> Result<Self, LedgerError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(LedgerError::invalid_request(RequestViolation::MissingAccountId));
        }
        if !raw.starts_with(Self::PREFIX) {
            return Err(LedgerError::invalid_request(
                RequestViolation::MalformedAccountId(raw.to_string()),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Account state
///
/// The balance is only ever changed through the balance store's atomic
/// update primitive and is never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,

    /// Name of the account holder
    pub owner: String,

    /// Current balance, equal to the sum of completed transaction deltas
    pub balance: Decimal,

    pub created_at: DateTime<Utc>,

    /// Time of the last balance mutation
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with a freshly generated ID
    ///
    /// # Arguments
    ///
    /// * `owner` - Name of the account holder
    /// * `balance` - Opening balance
    pub fn new(owner: impl Into<String>, balance: Decimal) -> Self {
        let now = Utc::now();
        Account {
            id: AccountId::generate(),
            owner: owner.into(),
            balance,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_account() {
        let account = Account::new("Alice", dec!(500.00));

        assert!(account.id.as_str().starts_with("acc_"));
        assert_eq!(account.owner, "Alice");
        assert_eq!(account.balance, dec!(500.00));
        assert_eq!(account.created_at, account.updated_at);
    }

    #[test]
    fn test_account_ids_are_unique() {
        assert_ne!(AccountId::generate(), AccountId::generate());
    }

    #[test]
    fn test_account_id_parse() {
        assert!(AccountId::parse("acc_42").is_ok());
        assert!(matches!(
            AccountId::parse("txn_42"),
            Err(LedgerError::InvalidRequest {
                violation: RequestViolation::MalformedAccountId(_)
            })
        ));
        assert!(matches!(
            AccountId::parse(""),
            Err(LedgerError::InvalidRequest {
                violation: RequestViolation::MissingAccountId
            })
        ));
    }
}
