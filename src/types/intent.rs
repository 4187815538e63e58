//! Queue intent carried on the message channel
//!
//! An intent is a lightweight restatement of a pending ledger record whose
//! only job is to wake a worker. The ledger store stays the source of truth:
//! the worker reloads the record by ID before doing anything.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::error::LedgerError;
use super::transaction::{Transaction, TransactionId, TransactionRequest};

/// Serialized payload published for every pending transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub transaction_id: TransactionId,
    pub account_id: AccountId,
    pub kind: String,
    pub amount: Decimal,
    #[serde(default)]
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl Intent {
    /// Restate a pending record as an intent
    pub fn for_pending(transaction: &Transaction) -> Self {
        Self {
            transaction_id: transaction.id.clone(),
            account_id: transaction.account_id.clone(),
            kind: transaction.kind.as_str().to_string(),
            amount: transaction.amount,
            reference: transaction.description.clone(),
            created_at: Utc::now(),
        }
    }

    /// The request a worker hands to the engine for this intent
    pub fn to_request(&self) -> TransactionRequest {
        TransactionRequest::new(self.kind.clone(), self.amount, self.reference.clone())
    }

    /// Encode as a JSON message body
    pub fn encode(&self) -> Result<Vec<u8>, LedgerError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a JSON message body
    ///
    /// Any decode failure surfaces as `MalformedIntent`; such messages are
    /// never retried.
    pub fn decode(body: &[u8]) -> Result<Self, LedgerError> {
        Ok(serde_json::from_slice(body)?)
    }
}
