//! Worker pool integration tests
//!
//! Runs the pool against the in-memory broker: outcomes and statistics,
//! redelivery of transient failures, dead-lettering, and shutdown with and
//! without a stuck worker.

use async_trait::async_trait;
use banking_ledger::core::{
    BalanceChange, BalanceStore, FaultInjectingBalanceStore, InMemoryBalanceStore,
    InMemoryLedgerStore, LedgerService, LedgerStore, TransactionEngine,
};
use banking_ledger::queue::{
    ChannelConfig, DeadLetterReason, InMemoryBroker, MessageChannel,
};
use banking_ledger::types::{
    Account, AccountId, Intent, LedgerError, Transaction, TransactionKind, TransactionRequest,
    TransactionStatus,
};
use banking_ledger::worker::{WorkerConfig, WorkerPool};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

const GRACE: Duration = Duration::from_secs(5);

fn broker() -> (InMemoryBroker, Arc<dyn MessageChannel>) {
    let broker = InMemoryBroker::new(ChannelConfig::default());
    let channel: Arc<dyn MessageChannel> = Arc::new(broker.clone());
    (broker, channel)
}

/// Poll `condition` every few milliseconds for up to five seconds
async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Balance store whose atomic updates never finish
struct StalledBalanceStore {
    inner: InMemoryBalanceStore,
}

#[async_trait]
impl BalanceStore for StalledBalanceStore {
    async fn create_account(&self, account: Account) -> Result<(), LedgerError> {
        self.inner.create_account(account).await
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Account, LedgerError> {
        self.inner.get_account(account_id).await
    }

    async fn atomic_update(
        &self,
        _account_id: &AccountId,
        _kind: TransactionKind,
        _amount: Decimal,
    ) -> Result<BalanceChange, LedgerError> {
        std::future::pending().await
    }

    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_settles_successes_and_business_failures() {
    let engine = Arc::new(TransactionEngine::new(
        Arc::new(InMemoryBalanceStore::new()),
        Arc::new(InMemoryLedgerStore::new()),
    ));
    let (broker, channel) = broker();
    let service = LedgerService::new(Arc::clone(&engine), Some(Arc::clone(&channel)));
    let account = service.create_account("Alice", dec!(100.00)).await.unwrap();

    // Both pass the submission pre-check; only one can be covered
    let withdraw = TransactionRequest::new("withdraw", dec!(80.00), "");
    let first = service.submit_transaction(&account.id, &withdraw, true).await.unwrap();
    let second = service.submit_transaction(&account.id, &withdraw, true).await.unwrap();

    let pool = WorkerPool::start(&WorkerConfig::new(3, GRACE), engine, channel)
        .await
        .unwrap();
    assert_eq!(pool.len(), 3);

    broker.wait_idle().await;
    let report = pool.shutdown().await;

    assert_eq!(report.aborted, 0);
    assert_eq!(report.stats.completed, 1);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.stats.settled(), 2);
    assert_eq!(service.get_balance(&account.id).await.unwrap(), dec!(20.00));

    let mut statuses = Vec::new();
    for id in [&first.transaction.id, &second.transaction.id] {
        let record = service.get_transaction(id).await.unwrap();
        if record.status == TransactionStatus::Failed {
            let message = record.error_message.clone().unwrap();
            assert!(message.contains("Insufficient funds"), "{}", message);
        }
        statuses.push(record.status);
    }
    statuses.sort_by_key(|s| s.to_string());
    assert_eq!(statuses, vec![TransactionStatus::Completed, TransactionStatus::Failed]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_transient_failure_is_redelivered_until_it_succeeds() {
    let balances = Arc::new(FaultInjectingBalanceStore::new(InMemoryBalanceStore::new()));
    let engine = Arc::new(TransactionEngine::new(
        balances.clone(),
        Arc::new(InMemoryLedgerStore::new()),
    ));
    let (broker, channel) = broker();
    let service = LedgerService::new(Arc::clone(&engine), Some(Arc::clone(&channel)));
    let account = service.create_account("Bob", dec!(10.00)).await.unwrap();

    let submission = service
        .submit_transaction(
            &account.id,
            &TransactionRequest::new("deposit", dec!(5.00), ""),
            true,
        )
        .await
        .unwrap();

    balances.fail_next_updates(3);
    let pool = WorkerPool::start(&WorkerConfig::new(1, GRACE), engine, channel)
        .await
        .unwrap();

    broker.wait_idle().await;
    let report = pool.shutdown().await;

    assert_eq!(report.stats.requeued, 3);
    assert_eq!(report.stats.completed, 1);
    let record = service.get_transaction(&submission.transaction.id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Completed);
    assert_eq!(record.new_balance, dec!(15.00));
    assert_eq!(service.get_balance(&account.id).await.unwrap(), dec!(15.00));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_malformed_message_is_dead_lettered() {
    let engine = Arc::new(TransactionEngine::new(
        Arc::new(InMemoryBalanceStore::new()),
        Arc::new(InMemoryLedgerStore::new()),
    ));
    let (broker, channel) = broker();
    let pool = WorkerPool::start(&WorkerConfig::new(2, GRACE), engine, Arc::clone(&channel))
        .await
        .unwrap();

    channel
        .publish("bogus", b"{not an intent".to_vec())
        .await
        .unwrap();
    broker.wait_idle().await;
    let report = pool.shutdown().await;

    assert_eq!(report.stats.dead_lettered, 1);
    let dead_letters = broker.dead_letters();
    assert_eq!(dead_letters.len(), 1);
    assert_eq!(dead_letters[0].message_id, "bogus");
    assert_eq!(dead_letters[0].reason, DeadLetterReason::Rejected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_idle_pool_stops_within_grace() {
    let engine = Arc::new(TransactionEngine::new(
        Arc::new(InMemoryBalanceStore::new()),
        Arc::new(InMemoryLedgerStore::new()),
    ));
    let (_broker, channel) = broker();
    let pool = WorkerPool::start(&WorkerConfig::new(4, GRACE), engine, channel)
        .await
        .unwrap();

    let token = pool.shutdown_token();
    let report = pool.shutdown().await;

    assert!(token.is_cancelled());
    assert_eq!(report.aborted, 0);
    assert_eq!(report.stats.settled(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stuck_worker_is_aborted_and_message_requeued() {
    let balances = Arc::new(StalledBalanceStore {
        inner: InMemoryBalanceStore::new(),
    });
    let ledger = Arc::new(InMemoryLedgerStore::new());
    let engine = Arc::new(TransactionEngine::new(balances.clone(), ledger));
    let (broker, channel) = broker();

    let account = Account::new("Carol", dec!(50.00));
    let account_id = account.id.clone();
    balances.create_account(account).await.unwrap();
    let pending = engine
        .create_pending(Transaction::pending(
            account_id,
            TransactionKind::Deposit,
            dec!(1.00),
            dec!(50.00),
            String::new(),
        ))
        .await
        .unwrap();
    let body = Intent::for_pending(&pending).encode().unwrap();
    channel.publish(pending.id.as_str(), body).await.unwrap();

    let pool = WorkerPool::start(
        &WorkerConfig::new(1, Duration::from_millis(100)),
        Arc::clone(&engine),
        channel,
    )
    .await
    .unwrap();
    eventually(|| broker.in_flight() == 1).await;

    let report = pool.shutdown().await;

    assert_eq!(report.aborted, 1);
    // The unsettled delivery went back to the queue for the next consumer
    assert_eq!(broker.in_flight(), 0);
    assert_eq!(broker.ready_len(), 1);
    let record = engine.ledger().get(&pending.id).await.unwrap();
    assert_eq!(record.status, TransactionStatus::Pending);
}
