//! Request/reply handling over a message queue.
//!
//! One inbound message yields at most one reply. Failures of a single
//! message are logged and contained; only broker connection errors leave
//! the consume loop.

use crate::channel::ReplyChannel;
use crate::types::{InboundMessage, Query, Reply};
use futures::{Stream, StreamExt};
use relay_core::{AckMode, AppResult};
use relay_pipeline::Answerer;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Turns inbound queries into published replies.
pub struct RpcGateway {
    answerer: Arc<dyn Answerer>,
    ack_mode: AckMode,
}

impl RpcGateway {
    pub fn new(answerer: Arc<dyn Answerer>, ack_mode: AckMode) -> Self {
        Self { answerer, ack_mode }
    }

    pub fn ack_mode(&self) -> AckMode {
        self.ack_mode
    }

    /// Decode, answer and publish one message.
    ///
    /// Returns the published reply. Nothing is published on error.
    pub async fn handle(
        &self,
        message: &InboundMessage,
        channel: &dyn ReplyChannel,
    ) -> AppResult<Reply> {
        let query = Query::decode(message)?;
        tracing::debug!("Query: {}", query.text);

        let text = self.answerer.answer_text(&query.text).await?;

        let reply = query.reply(text);
        channel.publish(&reply).await?;

        Ok(reply)
    }

    /// Handle one message under the configured acknowledgement policy.
    ///
    /// Only `BrokerConnection` errors are returned.
    pub async fn process(
        &self,
        message: InboundMessage,
        channel: &dyn ReplyChannel,
    ) -> AppResult<()> {
        let tag = message.delivery_tag;

        if self.ack_mode == AckMode::BeforeProcessing {
            channel.ack(tag).await?;
        }

        let started = Instant::now();
        let result = self.handle(&message, channel).await;

        match &result {
            Ok(reply) => tracing::info!(
                "Replied to {} in {:.2?}",
                reply.destination,
                started.elapsed()
            ),
            Err(e) if e.is_drop() => tracing::warn!("Dropping message: {}", e),
            Err(e) if e.is_connection() => {}
            Err(e) => tracing::error!("No reply sent: {}", e),
        }

        match (self.ack_mode, result) {
            (_, Err(e)) if e.is_connection() => Err(e),
            (AckMode::BeforeProcessing, _) => Ok(()),
            (AckMode::AfterReply, Ok(_)) => channel.ack(tag).await,
            (AckMode::AfterReply, Err(e)) if e.is_drop() => channel.ack(tag).await,
            (AckMode::AfterReply, Err(_)) => {
                let requeue = !message.redelivered;
                if requeue {
                    tracing::info!("Requeueing delivery {} for one retry", tag);
                }
                channel.reject(tag, requeue).await
            }
        }
    }

    /// Process deliveries one at a time until shutdown or the stream ends.
    ///
    /// Shutdown is only observed between messages, so an in-flight message
    /// always finishes.
    pub async fn consume<S>(
        &self,
        mut deliveries: S,
        channel: &dyn ReplyChannel,
        shutdown: &CancellationToken,
    ) -> AppResult<()>
    where
        S: Stream<Item = AppResult<InboundMessage>> + Unpin + Send,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Shutdown requested, consume loop stopping");
                    return Ok(());
                }
                next = deliveries.next() => next,
            };

            let message = match next {
                Some(delivery) => delivery?,
                None => {
                    tracing::warn!("Delivery stream ended");
                    return Ok(());
                }
            };

            let span = tracing::info_span!(
                "message",
                delivery_tag = message.delivery_tag,
                correlation_id = message.correlation_id.as_deref().unwrap_or("-"),
            );

            self.process(message, channel).instrument(span).await?;
        }
    }
}
