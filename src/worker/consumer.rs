//! Single queue consumer
//!
//! A `TransactionWorker` takes deliveries from one subscription and hands
//! each decoded intent to the engine. What happens to the message afterwards
//! depends only on the error the engine returns:
//!
//! ```text
//! decode failure           -> reject, no requeue (dead-lettered)
//! Ok                       -> ack
//! Err, is_business()       -> ack (the record is already failed)
//! Err, anything else       -> reject with requeue
//! ```

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::stats::WorkerStats;
use crate::core::TransactionEngine;
use crate::queue::{Delivery, Subscription};
use crate::types::{Intent, LedgerError, Transaction};

/// What a worker did with one delivery
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    /// Processed and acknowledged
    Completed(Transaction),
    /// Business failure, acknowledged
    Failed(LedgerError),
    /// System failure, returned to the queue
    Requeued(LedgerError),
    /// Undecodable, rejected without requeue
    DeadLettered(LedgerError),
}

/// Consumer bound to one subscription
#[derive(Clone)]
pub struct TransactionWorker {
    id: usize,
    engine: Arc<TransactionEngine>,
    stats: Arc<WorkerStats>,
}

impl TransactionWorker {
    pub fn new(id: usize, engine: Arc<TransactionEngine>, stats: Arc<WorkerStats>) -> Self {
        Self { id, engine, stats }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Consume until the subscription closes or `shutdown` is cancelled
    ///
    /// Cancellation is only observed between messages; a message already
    /// being processed is finished first.
    pub async fn run(self, mut subscription: Box<dyn Subscription>, shutdown: CancellationToken) {
        let span = info_span!("worker", worker_id = self.id);
        async move {
            info!("Worker started");
            loop {
                let delivery = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    delivery = subscription.next_delivery() => delivery,
                };

                let Some(delivery) = delivery else {
                    debug!("Subscription closed");
                    break;
                };

                self.handle(delivery).await;
            }
            info!("Worker stopped");
        }
        .instrument(span)
        .await
    }

    /// Process one delivery and settle it
    pub async fn handle(&self, delivery: Delivery) -> DeliveryOutcome {
        let message_id = delivery.message_id.clone();

        let intent = match Intent::decode(&delivery.body) {
            Ok(intent) => intent,
            Err(decode_error) => {
                warn!(%message_id, error = %decode_error, "Malformed intent, dead-lettering");
                settle(delivery.reject(false), &message_id);
                let outcome = DeliveryOutcome::DeadLettered(decode_error);
                self.stats.record(&outcome);
                return outcome;
            }
        };

        let request = intent.to_request();
        let outcome = match self
            .engine
            .process_pending(&intent.transaction_id, &request)
            .await
        {
            Ok(transaction) => {
                settle(delivery.ack(), &message_id);
                DeliveryOutcome::Completed(transaction)
            }
            Err(failure) if failure.is_business() => {
                info!(
                    transaction_id = %intent.transaction_id,
                    error = %failure,
                    "Transaction failed permanently, acknowledging"
                );
                settle(delivery.ack(), &message_id);
                DeliveryOutcome::Failed(failure)
            }
            Err(failure) => {
                error!(
                    transaction_id = %intent.transaction_id,
                    redelivered = delivery.redelivered,
                    error = %failure,
                    "Transaction processing failed, requeueing"
                );
                settle(delivery.reject(true), &message_id);
                DeliveryOutcome::Requeued(failure)
            }
        };

        self.stats.record(&outcome);
        outcome
    }
}

fn settle(result: Result<(), LedgerError>, message_id: &str) {
    if let Err(settle_error) = result {
        warn!(%message_id, error = %settle_error, "Failed to settle delivery");
    }
}
