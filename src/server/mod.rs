//! The server half: registration-backed dispatch plus the run loop that
//! drives it off the request queue (spec.md §4.3/§4.4).

pub mod auth;
pub mod dispatcher;

use crate::codec::{Codec, JsonCodec};
use crate::config::ServerConfig;
use crate::error::InvalidMessageError;
use crate::transport::amqp::{self, AmqpConsumer, AmqpProducer};
use crate::transport::{Consumer, MessageMeta, Producer};
use dispatcher::Dispatcher;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Owns a [`Dispatcher`] and drives it off a [`Consumer`], replying through
/// a [`Producer`] to each delivery's `reply_to` queue.
///
/// Boot (spec.md §4.3): if [`Dispatcher::new`] was used instead of
/// [`Dispatcher::with_auth_plugin`], [`Server::run`] logs a warning once and
/// proceeds unauthenticated - this mirrors the originating framework's
/// behavior of continuing without an authentication provider rather than
/// refusing to start.
pub struct Server<P, C> {
    dispatcher: Dispatcher,
    producer: Arc<P>,
    consumer: C,
    codec: Arc<dyn Codec>,
    authenticated: bool,
    /// Keeps the broker connection alive for the server's lifetime when one
    /// was opened via [`Server::connect`]; `None` when the caller supplied
    /// its own already-connected transport halves to [`Server::new`].
    _connection: Option<Arc<lapin::Connection>>,
}

impl<P, C> Server<P, C>
where
    P: Producer,
    C: Consumer,
{
    /// Build a server from its dispatcher, transport halves, and codec.
    pub fn new(dispatcher: Dispatcher, producer: Arc<P>, consumer: C, codec: Arc<dyn Codec>, authenticated: bool) -> Self {
        if !authenticated {
            warn!("no authentication plugin installed; serving requests unauthenticated");
        }
        Self {
            dispatcher,
            producer,
            consumer,
            codec,
            authenticated,
            _connection: None,
        }
    }

    /// Run the consume loop until the consumer is canceled (spec.md §5:
    /// `handle(body)` runs to completion before the next delivery is
    /// accepted - `prefetch_count` governs how many deliveries the broker
    /// has outstanding, not how many this loop processes concurrently).
    pub async fn run(&mut self) {
        debug!(authenticated = self.authenticated, "server run loop starting");

        while let Some(delivery) = self.consumer.next().await {
            self.handle_delivery(delivery).await;
        }

        debug!("server run loop exiting: consumer canceled");
    }

    /// spec.md §4.1 Consumer contract, steps 2-5. Step 3 ("any other error
    /// and the delivery was already redelivered -> reject without requeue,
    /// otherwise reject with requeue") has no counterpart here: every error
    /// `Dispatcher::handle` can raise except a decode failure is already
    /// caught inside `dispatch` and folded into the reply envelope's `error`
    /// slot, so the only way this loop ever rejects a delivery is the
    /// `InvalidMessageError` case in step 2 - a permanently undecodable body
    /// that redelivery can never fix.
    async fn handle_delivery(&self, delivery: crate::transport::Delivery) {
        let reply_body = match self.dispatcher.handle(&delivery.body, self.codec.as_ref()).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!(error = %e, "dropping undecodable delivery");
                if let Err(reject_err) = self.consumer.reject(delivery.tag).await {
                    error!(error = %reject_err, "failed to reject undecodable delivery");
                }
                return;
            }
        };

        if let Some(reply_to) = delivery.meta.reply_to.clone() {
            let meta = MessageMeta {
                correlation_id: delivery.meta.correlation_id.clone(),
                reply_to: None,
                headers: Default::default(),
            };
            if let Err(e) = self.producer.publish(&reply_to, reply_body.into(), meta).await {
                error!(error = %e, "failed to publish reply");
            }
        }

        if let Err(e) = self.consumer.ack(delivery.tag).await {
            error!(error = %e, "failed to ack delivery");
        }
    }
}

impl Server<AmqpProducer, AmqpConsumer> {
    /// Connect to the broker described by `config`, declare the durable
    /// request queue, and build a server ready for [`Server::run`].
    pub async fn connect(config: &ServerConfig, dispatcher: Dispatcher, authenticated: bool) -> Result<Self, InvalidMessageError> {
        let (connection, producer, consumer) = amqp::connect_server(config).await?;
        let mut server = Self::new(dispatcher, Arc::new(producer), consumer, Arc::new(JsonCodec), authenticated);
        server._connection = Some(connection);
        Ok(server)
    }
}
