//! Banking Ledger Library
//! # Overview
//!
//! This library keeps account balances and an append-only transaction ledger
//! consistent. Deposits and withdrawals are applied either synchronously or
//! through a message queue consumed by a pool of workers.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Account, Transaction, Intent, errors)
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Atomic balance update, ledger write and compensation
//!   - [`core::service`] - Producer-facing operations and sync/async routing
//!   - [`core::balance_store`] / [`core::ledger_store`] - In-memory storage
//!   - [`core::fault`] - Fault-injecting store wrappers
//! - [`queue`] - Message channel trait and in-memory broker
//! - [`worker`] - Queue consumers and the worker pool
//! - [`io`] - CSV input and account summary output
//! - [`strategy`] - Sync and async processing pipelines
//! - [`cli`] - CLI arguments parsing
//! - [`logging`] - `tracing` subscriber setup
//!
//! # Transaction lifecycle
//!
//! - **Sync**: the balance is updated atomically, then a `completed` record is
//!   written. If the write fails, the balance change is reversed.
//! - **Async**: a `pending` record is written and its intent published. A
//!   worker later moves it to `completed` or `failed`; `completed` and `failed`
//!   are terminal.

// Module declarations
pub mod cli;
pub mod core;
pub mod io;
pub mod logging;
pub mod queue;
pub mod strategy;
pub mod types;
pub mod worker;

pub use core::{LedgerService, TransactionEngine};
pub use io::write_accounts_csv;
pub use types::{
    Account, AccountId, LedgerError, Transaction, TransactionId, TransactionKind,
    TransactionRequest, TransactionStatus,
};
