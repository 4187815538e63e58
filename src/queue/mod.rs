//! Message channel between producers and workers
//!
//! - `channel`: the `MessageChannel` / `Subscription` traits and `Delivery`
//! - `memory`: `InMemoryBroker`, an in-process implementation with TTL,
//!   dead-lettering and prefetch-one consumers

pub mod channel;
pub mod memory;

pub use channel::{Acknowledger, Delivery, MessageChannel, Settlement, Subscription};
pub use memory::{
    ChannelConfig, DeadLetter, DeadLetterReason, InMemoryBroker, DEFAULT_MESSAGE_TTL,
};
