//! Core business logic module
//!
//! This module contains the ledger's consistency machinery:
//! - `traits` - Storage capability traits the engine is written against
//! - `balance_store` - In-memory balances with row-level exclusivity
//! - `ledger_store` - In-memory transaction records
//! - `fault` - Store wrappers that fail on demand
//! - `engine` - Balance/ledger orchestration with compensation
//! - `reconciliation` - Divergences compensation could not repair
//! - `service` - Producer-facing API choosing the sync or queued path

pub mod balance_store;
pub mod engine;
pub mod fault;
pub mod ledger_store;
pub mod reconciliation;
pub mod service;
pub mod traits;

pub use balance_store::InMemoryBalanceStore;
pub use engine::{TransactionEngine, RECORD_UPDATE_FAILED};
pub use fault::{FaultInjectingBalanceStore, FaultInjectingLedgerStore};
pub use ledger_store::InMemoryLedgerStore;
pub use reconciliation::{ReconciliationEntry, ReconciliationLog};
pub use service::{
    ComponentHealth, LedgerService, ProcessingMode, ProcessingModeReport, ReadinessReport,
    Submission, DEFAULT_HISTORY_LIMIT,
    INITIAL_DEPOSIT_DESCRIPTION, MAX_HISTORY_LIMIT, QUEUE_UNAVAILABLE_REASON,
};
pub use traits::{BalanceChange, BalanceStore, HistoryPage, LedgerStore};
