//! Broker-side operations the gateway needs.

use crate::types::{InboundMessage, Reply};
use futures::stream::BoxStream;
use relay_core::AppResult;

/// Publishing and acknowledgement on one broker channel.
///
/// Failures are reported as `BrokerConnection`.
#[async_trait::async_trait]
pub trait ReplyChannel: Send + Sync {
    /// Publish `reply` to its destination with its correlation id.
    async fn publish(&self, reply: &Reply) -> AppResult<()>;

    /// Acknowledge a delivery.
    async fn ack(&self, delivery_tag: u64) -> AppResult<()>;

    /// Reject a delivery, optionally asking the broker to requeue it.
    async fn reject(&self, delivery_tag: u64, requeue: bool) -> AppResult<()>;
}

/// Broker deliveries for one worker.
pub type Deliveries = BoxStream<'static, AppResult<InboundMessage>>;

/// Opens per-worker consumers on an established connection.
#[async_trait::async_trait]
pub trait ConsumerSource: Send + Sync {
    type Channel: ReplyChannel + 'static;

    /// Open a channel consuming the inbound queue under `consumer_tag`.
    async fn open_consumer(&self, consumer_tag: &str) -> AppResult<(Self::Channel, Deliveries)>;
}
