//! AMQP 0.9.1 binding of the gateway.

use crate::channel::{ConsumerSource, Deliveries, ReplyChannel};
use crate::types::{InboundMessage, Reply};
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, QueueDeclareOptions,
};
use lapin::types::{FieldTable, ShortString};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use relay_core::config::BrokerConfig;
use relay_core::{AppError, AppResult};

/// Non-persistent delivery mode for replies.
const TRANSIENT: u8 = 1;

fn broker_error(context: &str, err: lapin::Error) -> AppError {
    AppError::BrokerConnection(format!("{}: {}", context, err))
}

/// An open broker connection with the inbound queue declared.
pub struct AmqpBroker {
    connection: Connection,
    queue: String,
}

impl AmqpBroker {
    /// Connect and declare the inbound queue.
    ///
    /// Declaring is idempotent, so every instance and every reconnect does it.
    pub async fn connect(config: &BrokerConfig) -> AppResult<Self> {
        tracing::info!("Connecting to broker at {}", config.redacted_uri());

        let connection = Connection::connect(&config.amqp_uri(), ConnectionProperties::default())
            .await
            .map_err(|e| broker_error("Failed to connect", e))?;

        let channel = connection
            .create_channel()
            .await
            .map_err(|e| broker_error("Failed to open channel", e))?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| broker_error("Failed to declare queue", e))?;

        // Declaration channel is no longer needed
        if let Err(e) = channel.close(200, "declared").await {
            tracing::debug!("Closing declaration channel failed: {}", e);
        }

        tracing::info!("Declared queue {}", config.queue);

        Ok(Self {
            connection,
            queue: config.queue.clone(),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Open a worker channel consuming the inbound queue, one message at a time.
    pub async fn consumer(
        &self,
        consumer_tag: &str,
    ) -> AppResult<(AmqpChannel, Deliveries)> {
        let channel = self
            .connection
            .create_channel()
            .await
            .map_err(|e| broker_error("Failed to open channel", e))?;

        // Competing consumers: no worker holds more than the message it is on
        channel
            .basic_qos(1, BasicQosOptions::default())
            .await
            .map_err(|e| broker_error("Failed to set prefetch", e))?;

        let consumer = channel
            .basic_consume(
                &self.queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| broker_error("Failed to start consumer", e))?;

        let deliveries = consumer
            .map(|delivery| {
                delivery
                    .map(InboundMessage::from)
                    .map_err(|e| broker_error("Delivery failed", e))
            })
            .boxed();

        Ok((AmqpChannel { channel }, deliveries))
    }

    /// Close the connection. Errors are logged, not returned.
    pub async fn close(&self) {
        if !self.is_connected() {
            return;
        }

        match self.connection.close(200, "shutdown").await {
            Ok(()) => tracing::info!("Broker connection closed"),
            Err(e) => tracing::warn!("Failed to close broker connection: {}", e),
        }
    }
}

#[async_trait::async_trait]
impl ConsumerSource for AmqpBroker {
    type Channel = AmqpChannel;

    async fn open_consumer(&self, consumer_tag: &str) -> AppResult<(AmqpChannel, Deliveries)> {
        self.consumer(consumer_tag).await
    }
}

impl From<Delivery> for InboundMessage {
    fn from(delivery: Delivery) -> Self {
        let properties = &delivery.properties;

        Self {
            reply_to: properties.reply_to().as_ref().map(|r| r.to_string()),
            correlation_id: properties.correlation_id().as_ref().map(|c| c.to_string()),
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            body: delivery.data,
        }
    }
}

/// A worker's channel, used for replies and acknowledgements.
#[derive(Clone)]
pub struct AmqpChannel {
    channel: Channel,
}

#[async_trait::async_trait]
impl ReplyChannel for AmqpChannel {
    async fn publish(&self, reply: &Reply) -> AppResult<()> {
        let mut properties = BasicProperties::default().with_delivery_mode(TRANSIENT);
        if let Some(correlation_id) = &reply.correlation_id {
            properties = properties.with_correlation_id(ShortString::from(correlation_id.clone()));
        }

        // Default exchange routes by queue name
        self.channel
            .basic_publish(
                "",
                &reply.destination,
                BasicPublishOptions::default(),
                reply.text.as_bytes(),
                properties,
            )
            .await
            .map_err(|e| broker_error("Failed to publish reply", e))?
            .await
            .map_err(|e| broker_error("Reply not confirmed", e))?;

        Ok(())
    }

    async fn ack(&self, delivery_tag: u64) -> AppResult<()> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await
            .map_err(|e| broker_error("Failed to ack", e))
    }

    async fn reject(&self, delivery_tag: u64, requeue: bool) -> AppResult<()> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await
            .map_err(|e| broker_error("Failed to reject", e))
    }
}
