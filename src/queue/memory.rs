//! In-memory message broker
//!
//! This module provides `InMemoryBroker`, a single-queue broker with the
//! semantics the workers rely on from a production message broker:
//! - messages wait in FIFO order until a consumer takes them
//! - each consumer holds at most one unsettled message (prefetch 1)
//! - rejected-with-requeue and abandoned messages go back on the queue
//!   flagged as redelivered
//! - rejected-without-requeue and expired messages move to a dead-letter list
//!
//! It also exposes the administrative controls used by tests and the CLI
//! driver: disconnect/reconnect, close, purge, dead-letter inspection and
//! waiting until the queue is drained.
//!
//! # Thread Safety
//!
//! All queue state sits behind one `parking_lot::Mutex` that is never held
//! across an `.await`. Waiting consumers are woken through `tokio::sync::Notify`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::channel::{Acknowledger, Delivery, MessageChannel, Settlement, Subscription};
use crate::types::LedgerError;

/// Default time a message may wait before it is dead-lettered (5 minutes)
pub const DEFAULT_MESSAGE_TTL: Duration = Duration::from_secs(300);

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    /// How long a message may sit in the queue before it is dead-lettered
    pub message_ttl: Duration,
}

impl ChannelConfig {
    /// Create a configuration, falling back to the default TTL on zero
    pub fn new(message_ttl: Duration) -> Self {
        if message_ttl.is_zero() {
            warn!(
                "message TTL must be greater than 0, using default: {:?}",
                DEFAULT_MESSAGE_TTL
            );
            return Self::default();
        }
        Self { message_ttl }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            message_ttl: DEFAULT_MESSAGE_TTL,
        }
    }
}

/// Why a message ended up in the dead-letter list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadLetterReason {
    /// Waited longer than the message TTL
    Expired,
    /// Rejected by a consumer without requeue
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub message_id: String,
    pub body: Vec<u8>,
    pub reason: DeadLetterReason,
}

#[derive(Debug)]
struct Envelope {
    message_id: String,
    body: Vec<u8>,
    published_at: Instant,
    redelivered: bool,
}

impl Envelope {
    fn into_dead_letter(self, reason: DeadLetterReason) -> DeadLetter {
        DeadLetter {
            message_id: self.message_id,
            body: self.body,
            reason,
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    ready: VecDeque<Envelope>,
    in_flight: usize,
    dead_letters: Vec<DeadLetter>,
    closed: bool,
}

impl BrokerState {
    fn is_idle(&self) -> bool {
        self.ready.is_empty() && self.in_flight == 0
    }

    /// Move every message older than `ttl` to the dead-letter list
    fn expire(&mut self, ttl: Duration) {
        let now = Instant::now();
        let (expired, live): (VecDeque<Envelope>, VecDeque<Envelope>) = self
            .ready
            .drain(..)
            .partition(|envelope| now.duration_since(envelope.published_at) > ttl);
        self.ready = live;
        for envelope in expired {
            debug!(message_id = %envelope.message_id, "Message expired, dead-lettering");
            self.dead_letters
                .push(envelope.into_dead_letter(DeadLetterReason::Expired));
        }
    }
}

enum Next {
    Message(Envelope),
    Empty,
    Closed,
}

#[derive(Debug)]
struct BrokerInner {
    config: ChannelConfig,
    state: Mutex<BrokerState>,
    connected: AtomicBool,
    /// Signalled when a message becomes available or the broker changes state
    available: Notify,
    /// Signalled when the queue may have become idle
    idle: Notify,
}

impl BrokerInner {
    fn take_next(&self) -> Next {
        let mut state = self.state.lock();
        if state.closed {
            return Next::Closed;
        }
        if !self.connected.load(Ordering::SeqCst) {
            return Next::Empty;
        }

        state.expire(self.config.message_ttl);
        let next = match state.ready.pop_front() {
            Some(envelope) => {
                state.in_flight += 1;
                Next::Message(envelope)
            }
            None => Next::Empty,
        };
        if state.is_idle() {
            self.idle.notify_waiters();
        }
        next
    }

    fn settle(&self, mut envelope: Envelope, settlement: Settlement) {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);

        match settlement {
            Settlement::Ack => {}
            Settlement::Reject { requeue: true } => {
                envelope.redelivered = true;
                state.ready.push_back(envelope);
                self.available.notify_one();
            }
            Settlement::Reject { requeue: false } => {
                state
                    .dead_letters
                    .push(envelope.into_dead_letter(DeadLetterReason::Rejected));
            }
        }

        if state.is_idle() {
            self.idle.notify_waiters();
        }
    }
}

/// Shared handle on an in-memory queue
///
/// Cloning the broker clones the handle; all clones see the same queue.
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    inner: Arc<BrokerInner>,
}

impl InMemoryBroker {
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                config,
                state: Mutex::new(BrokerState::default()),
                connected: AtomicBool::new(true),
                available: Notify::new(),
                idle: Notify::new(),
            }),
        }
    }

    /// Simulate losing the connection: publishes fail and nothing is delivered
    pub fn disconnect(&self) {
        self.inner.connected.store(false, Ordering::SeqCst);
        warn!("Message broker disconnected");
    }

    pub fn reconnect(&self) {
        self.inner.connected.store(true, Ordering::SeqCst);
        self.inner.available.notify_waiters();
        debug!("Message broker reconnected");
    }

    /// Shut the broker down; every subscription drains to `None`
    pub fn close(&self) {
        self.inner.state.lock().closed = true;
        self.inner.available.notify_waiters();
        self.inner.idle.notify_waiters();
    }

    /// Drop every ready message, returning how many were removed
    pub fn purge(&self) -> usize {
        let mut state = self.inner.state.lock();
        let purged = state.ready.len();
        state.ready.clear();
        if state.is_idle() {
            self.inner.idle.notify_waiters();
        }
        purged
    }

    /// Messages that expired or were rejected without requeue
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.inner.state.lock().dead_letters.clone()
    }

    /// Remove and return the dead-letter list
    pub fn take_dead_letters(&self) -> Vec<DeadLetter> {
        std::mem::take(&mut self.inner.state.lock().dead_letters)
    }

    /// Messages waiting for a consumer
    pub fn ready_len(&self) -> usize {
        self.inner.state.lock().ready.len()
    }

    /// Messages delivered but not yet settled
    pub fn in_flight(&self) -> usize {
        self.inner.state.lock().in_flight
    }

    /// Wait until no message is ready or in flight
    ///
    /// Returns immediately on a closed broker.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.inner.state.lock();
                state.expire(self.inner.config.message_ttl);
                if state.closed || state.is_idle() {
                    return;
                }
            }

            notified.await;
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

#[async_trait]
impl MessageChannel for InMemoryBroker {
    async fn publish(&self, message_id: &str, body: Vec<u8>) -> Result<(), LedgerError> {
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(LedgerError::queue_unavailable("broker is disconnected"));
        }

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return Err(LedgerError::queue_unavailable("broker is closed"));
            }
            state.ready.push_back(Envelope {
                message_id: message_id.to_string(),
                body,
                published_at: Instant::now(),
                redelivered: false,
            });
        }

        self.inner.available.notify_one();
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn Subscription>, LedgerError> {
        if self.inner.state.lock().closed {
            return Err(LedgerError::queue_unavailable("broker is closed"));
        }
        Ok(Box::new(BrokerSubscription {
            inner: Arc::clone(&self.inner),
            credit: Arc::new(Semaphore::new(1)),
        }))
    }

    fn is_healthy(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst) && !self.inner.state.lock().closed
    }
}

struct BrokerSubscription {
    inner: Arc<BrokerInner>,
    /// One permit: held by the outstanding delivery until it is settled
    credit: Arc<Semaphore>,
}

#[async_trait]
impl Subscription for BrokerSubscription {
    async fn next_delivery(&mut self) -> Option<Delivery> {
        let permit = Arc::clone(&self.credit).acquire_owned().await.ok()?;

        loop {
            let notified = self.inner.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.inner.take_next() {
                Next::Closed => return None,
                Next::Message(envelope) => {
                    let message_id = envelope.message_id.clone();
                    let body = envelope.body.clone();
                    let redelivered = envelope.redelivered;
                    let acker = BrokerAck {
                        inner: Arc::clone(&self.inner),
                        envelope,
                        _permit: permit,
                    };
                    return Some(Delivery::new(message_id, body, redelivered, Box::new(acker)));
                }
                Next::Empty => notified.await,
            }
        }
    }
}

struct BrokerAck {
    inner: Arc<BrokerInner>,
    envelope: Envelope,
    _permit: OwnedSemaphorePermit,
}

impl Acknowledger for BrokerAck {
    fn settle(self: Box<Self>, settlement: Settlement) -> Result<(), LedgerError> {
        let BrokerAck {
            inner,
            envelope,
            _permit,
        } = *self;
        inner.settle(envelope, settlement);
        Ok(())
    }
}
