//! AMQP 0.9.1 transport over lapin.

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::warn;

use crate::error::Result;
use crate::queue::{
    DeliveryStream, VoteTransport, MAIN_EXCHANGE_NAME, VOTES_CREATED_KEY, VOTES_QUEUE_NAME,
};

/// Connection plus channel with the voting topology declared: durable topic
/// exchange, durable votes queue, binding under the fixed routing key.
pub struct AmqpTransport {
    // Held so the channel outlives the declare phase; dropping the
    // connection closes every channel on it.
    _connection: Connection,
    channel: Channel,
}

impl std::fmt::Debug for AmqpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpTransport").finish()
    }
}

impl AmqpTransport {
    pub async fn connect(uri: &str) -> Result<Self> {
        let connection = Connection::connect(uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        channel
            .exchange_declare(
                MAIN_EXCHANGE_NAME,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                VOTES_QUEUE_NAME,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_bind(
                VOTES_QUEUE_NAME,
                MAIN_EXCHANGE_NAME,
                VOTES_CREATED_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(Self {
            _connection: connection,
            channel,
        })
    }
}

#[async_trait]
impl VoteTransport for AmqpTransport {
    async fn publish(&self, routing_key: &str, payload: Vec<u8>) -> Result<()> {
        // Fire-and-forget: no publisher confirms are enabled, so the
        // returned confirmation resolves as soon as the broker accepts the
        // frame.
        let _confirm = self
            .channel
            .basic_publish(
                MAIN_EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default().with_content_type("application/json".into()),
            )
            .await?;
        Ok(())
    }

    async fn subscribe(&self) -> Result<DeliveryStream> {
        let consumer = self
            .channel
            .basic_consume(
                VOTES_QUEUE_NAME,
                "",
                BasicConsumeOptions {
                    // Auto-ack at delivery time. A vote lost after this
                    // point is not redelivered.
                    no_ack: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let stream = consumer.filter_map(|delivery| async {
            match delivery {
                Ok(delivery) => Some(delivery.data),
                Err(error) => {
                    warn!(%error, "dropping failed delivery");
                    None
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
