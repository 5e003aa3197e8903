//! `lapin`-backed [`Producer`]/[`Consumer`] implementation.
//!
//! Connection setup follows spec.md §4.1 exactly: the request queue is
//! durable and shared across every server process consuming it
//! (`prefetch_count = 1` so one slow handler doesn't starve the others); a
//! client's reply queue is exclusive and auto-delete, scoped to that one
//! connection, the way a temporary RPC response queue is declared in
//! `other_examples/b68d8646_mzndr-hare__src-rpc_builder.rs.rs`.

use super::{Consumer, Delivery, InvalidMessageError, MessageMeta, Producer};
use crate::config::{ConnectionSettings, ServerConfig};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, BasicRejectOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use std::collections::BTreeMap;
use std::sync::Arc;

async fn connect(settings: &ConnectionSettings) -> Result<Connection, InvalidMessageError> {
    let options = ConnectionProperties::default()
        .with_executor(tokio_executor_trait::Tokio::current())
        .with_reactor(tokio_reactor_trait::Tokio);

    Connection::connect(&settings.to_uri(), options)
        .await
        .map_err(|e| InvalidMessageError(format!("broker connection failed: {e}")))
}

/// A `lapin` channel that publishes to a fixed default exchange.
pub struct AmqpProducer {
    channel: Channel,
    exchange: String,
}

impl AmqpProducer {
    /// Open a fresh channel on `connection` that publishes through
    /// `exchange` (empty string for the default exchange, as in
    /// spec.md §6).
    pub async fn new(connection: &Connection, exchange: impl Into<String>) -> Result<Self, InvalidMessageError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| InvalidMessageError(format!("channel open failed: {e}")))?;
        Ok(Self {
            channel,
            exchange: exchange.into(),
        })
    }
}

#[async_trait]
impl Producer for AmqpProducer {
    async fn publish(&self, queue: &str, body: Bytes, meta: MessageMeta) -> Result<(), InvalidMessageError> {
        let mut properties = BasicProperties::default().with_delivery_mode(2);
        if let Some(correlation_id) = meta.correlation_id {
            properties = properties.with_correlation_id(correlation_id.into());
        }
        if let Some(reply_to) = meta.reply_to {
            properties = properties.with_reply_to(reply_to.into());
        }

        self.channel
            .basic_publish(
                &self.exchange,
                queue,
                BasicPublishOptions::default(),
                &body,
                properties,
            )
            .await
            .map_err(|e| InvalidMessageError(format!("publish failed: {e}")))?
            .await
            .map_err(|e| InvalidMessageError(format!("publish confirm failed: {e}")))?;

        Ok(())
    }
}

/// A `lapin`-backed consumer over a single declared queue.
pub struct AmqpConsumer {
    channel: Channel,
    inner: lapin::Consumer,
}

impl AmqpConsumer {
    /// Declare the durable, shared request queue (spec.md §4.1 step 1) and
    /// start consuming it with `prefetch_count` in-flight messages per
    /// consumer.
    pub async fn request_queue(connection: &Connection, config: &ServerConfig) -> Result<Self, InvalidMessageError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| InvalidMessageError(format!("channel open failed: {e}")))?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await
            .map_err(|e| InvalidMessageError(format!("qos failed: {e}")))?;

        channel
            .queue_declare(
                &config.transport.queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| InvalidMessageError(format!("queue declare failed: {e}")))?;

        Self::consume(channel).await
    }

    /// Declare an exclusive, auto-delete reply queue scoped to this
    /// connection (spec.md §4.1 step 2) and start consuming it. Returns the
    /// consumer together with the queue's broker-assigned name, which the
    /// caller publishes as `reply_to` on every outgoing request.
    pub async fn exclusive_reply_queue(connection: &Connection) -> Result<(Self, String), InvalidMessageError> {
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| InvalidMessageError(format!("channel open failed: {e}")))?;

        let queue = channel
            .queue_declare(
                "",
                QueueDeclareOptions {
                    exclusive: true,
                    auto_delete: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| InvalidMessageError(format!("reply queue declare failed: {e}")))?;

        let name = queue.name().to_string();
        let consumer = Self::consume(channel).await?;
        Ok((consumer, name))
    }

    async fn consume(channel: Channel) -> Result<Self, InvalidMessageError> {
        let inner = channel
            .basic_consume(
                "",
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| InvalidMessageError(format!("consume failed: {e}")))?;
        Ok(Self { channel, inner })
    }
}

#[async_trait]
impl Consumer for AmqpConsumer {
    async fn next(&mut self) -> Option<Delivery> {
        let delivery = self.inner.next().await?.ok()?;

        let correlation_id = delivery
            .properties
            .correlation_id()
            .as_ref()
            .map(|id| id.to_string());
        let reply_to = delivery.properties.reply_to().as_ref().map(|q| q.to_string());

        Some(Delivery {
            body: Bytes::copy_from_slice(&delivery.data),
            meta: MessageMeta {
                correlation_id,
                reply_to,
                headers: BTreeMap::new(),
            },
            tag: delivery.delivery_tag,
        })
    }

    async fn ack(&self, tag: u64) -> Result<(), InvalidMessageError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| InvalidMessageError(format!("ack failed: {e}")))
    }

    async fn reject(&self, tag: u64) -> Result<(), InvalidMessageError> {
        self.channel
            .basic_reject(tag, BasicRejectOptions { requeue: false })
            .await
            .map_err(|e| InvalidMessageError(format!("reject failed: {e}")))
    }
}

/// Open a broker connection and, from it, both the transport halves a
/// server needs: a producer for replies and a consumer on the shared
/// request queue.
pub async fn connect_server(config: &ServerConfig) -> Result<(Arc<Connection>, AmqpProducer, AmqpConsumer), InvalidMessageError> {
    let connection = Arc::new(connect(&config.transport.connection).await?);
    let producer = AmqpProducer::new(&connection, config.transport.exchange.clone()).await?;
    let consumer = AmqpConsumer::request_queue(&connection, config).await?;
    Ok((connection, producer, consumer))
}

/// Open a broker connection and, from it, both the transport halves a
/// client needs: a producer for requests and a consumer on a freshly
/// declared exclusive reply queue. Returns the reply queue's name
/// alongside, for stamping as `reply_to` on outgoing requests.
pub async fn connect_client(
    connection_settings: &ConnectionSettings,
    exchange: &str,
) -> Result<(Arc<Connection>, AmqpProducer, AmqpConsumer, String), InvalidMessageError> {
    let connection = Arc::new(connect(connection_settings).await?);
    let producer = AmqpProducer::new(&connection, exchange.to_string()).await?;
    let (consumer, reply_queue) = AmqpConsumer::exclusive_reply_queue(&connection).await?;
    Ok((connection, producer, consumer, reply_queue))
}
