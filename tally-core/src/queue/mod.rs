//! The durable messaging channel decoupling vote acceptance from
//! persistence.
//!
//! One topic exchange, one durable queue bound under a fixed routing key.
//! The pipeline talks to the transport through [`VoteTransport`] so tests
//! can swap the broker for an in-memory channel.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;

pub mod amqp;

#[cfg(any(test, feature = "test-fixtures"))]
pub mod memory;

pub use amqp::AmqpTransport;

/// Central distribution point for voting events.
pub const MAIN_EXCHANGE_NAME: &str = "bbb_voting_events";
/// Routing pattern for vote messages: `<entity>.<action>.<event>`.
pub const VOTES_CREATED_KEY: &str = "votes.submission.created";
/// The one durable queue the consumer drains.
pub const VOTES_QUEUE_NAME: &str = "votes_queue";

/// Raw message bodies as delivered by the transport.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Vec<u8>> + Send>>;

/// Durable point-to-point channel for vote facts.
#[async_trait]
pub trait VoteTransport: Send + Sync {
    /// Hands a serialized vote to the transport. Returns as soon as the
    /// transport accepts the publish; consumption is not awaited.
    async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<()>;

    /// Opens the delivery stream of the votes queue. Messages are
    /// acknowledged at delivery time, not after processing.
    async fn subscribe(&self) -> Result<DeliveryStream>;
}
