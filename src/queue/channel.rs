//! Message channel abstraction
//!
//! A durable, at-least-once queue between producers and workers. The engine
//! never depends on a concrete broker; it sees only these traits.
//!
//! # Delivery contract
//!
//! - `publish` returns only once the message is durably stored
//! - every subscription has one outstanding delivery at most: the next
//!   `next_delivery` call waits until the previous one is settled
//! - a `Delivery` is settled exactly once, by `ack` or `reject`; dropping an
//!   unsettled delivery requeues it, so a worker that is abandoned mid-message
//!   never loses it

use async_trait::async_trait;
use std::fmt;

use crate::types::LedgerError;

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processing finished; remove the message
    Ack,
    /// Processing did not finish; redeliver or dead-letter the message
    Reject { requeue: bool },
}

/// Broker-side half of a delivery, consumed when the delivery is settled
pub trait Acknowledger: Send {
    fn settle(self: Box<Self>, settlement: Settlement) -> Result<(), LedgerError>;
}

/// A message handed to one consumer
pub struct Delivery {
    pub message_id: String,
    pub body: Vec<u8>,
    /// Whether this message was delivered before and not acknowledged
    pub redelivered: bool,
    acker: Option<Box<dyn Acknowledger>>,
}

impl Delivery {
    pub fn new(
        message_id: String,
        body: Vec<u8>,
        redelivered: bool,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            message_id,
            body,
            redelivered,
            acker: Some(acker),
        }
    }

    /// Remove the message from the channel
    pub fn ack(mut self) -> Result<(), LedgerError> {
        self.settle(Settlement::Ack)
    }

    /// Return the message to the channel (`requeue`) or dead-letter it
    pub fn reject(mut self, requeue: bool) -> Result<(), LedgerError> {
        self.settle(Settlement::Reject { requeue })
    }

    fn settle(&mut self, settlement: Settlement) -> Result<(), LedgerError> {
        match self.acker.take() {
            Some(acker) => acker.settle(settlement),
            None => Ok(()),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if self.acker.is_some() {
            // Unsettled: hand the message back for another consumer
            let _ = self.settle(Settlement::Reject { requeue: true });
        }
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message_id", &self.message_id)
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .field("settled", &self.acker.is_none())
            .finish()
    }
}

/// One consumer's stream of deliveries
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next message
    ///
    /// Returns `None` once the channel is closed.
    async fn next_delivery(&mut self) -> Option<Delivery>;
}

/// Producer and consumer handle on a durable queue
#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Store a message, returning once it is durable
    async fn publish(&self, message_id: &str, body: Vec<u8>) -> Result<(), LedgerError>;

    /// Open a new consumer with a prefetch of one
    async fn subscribe(&self) -> Result<Box<dyn Subscription>, LedgerError>;

    /// Whether the channel is currently reachable
    fn is_healthy(&self) -> bool;
}
