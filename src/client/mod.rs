//! The client half: connects to the broker, fetches the server's
//! definitions, and exposes them as a callable virtual module tree
//! (spec.md §4.5).

pub mod auth;
pub mod proxy;

use crate::codec::{Codec, JsonCodec};
use crate::config::ClientConfig;
use crate::error::RpcClientError;
use crate::transport::amqp::{self, AmqpProducer};
use crate::transport::correlation::CorrelationTracker;
use auth::ClientAuthPlugin;
use proxy::{ProcedureStub, ProxyEngine, VirtualModuleTree};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;

/// A connected client: owns the broker connection, the background reply
/// pump, and a [`ProxyEngine`] over the default JSON codec.
///
/// Dropping a `Client` drops its connection; the reply pump task is
/// aborted, matching spec.md §4.5 "Shutdown" (outstanding waiters observe
/// [`RpcClientError::ShuttingDown`] rather than hanging forever).
pub struct Client {
    engine: Arc<ProxyEngine<AmqpProducer>>,
    reply_pump: JoinHandle<()>,
    _connection: Arc<lapin::Connection>,
}

impl Client {
    /// Connect to the broker described by `config`, declare this client's
    /// exclusive reply queue, and fetch the server's definitions
    /// (spec.md §4.5 startup steps 1-2).
    pub async fn connect(config: &ClientConfig) -> Result<Self, RpcClientError> {
        Self::connect_with_auth(config, None).await
    }

    /// As [`Client::connect`], attaching a client authentication plugin
    /// whose credentials are sent with every call.
    pub async fn connect_with_auth(
        config: &ClientConfig,
        credentials: Option<Arc<dyn ClientAuthPlugin>>,
    ) -> Result<Self, RpcClientError> {
        let (connection, producer, consumer, reply_queue) =
            amqp::connect_client(&config.transport.connection, &config.transport.exchange)
                .await
                .map_err(|e| RpcClientError::ConnectionError(e.0))?;

        let codec: Arc<dyn Codec> = Arc::new(JsonCodec);
        let tracker = CorrelationTracker::new();
        let reply_pump = ProxyEngine::<AmqpProducer>::spawn_reply_pump(tracker.clone(), consumer, codec.clone());

        let engine = Arc::new(ProxyEngine::new(
            Arc::new(producer),
            config,
            reply_queue,
            codec,
            tracker,
            credentials,
        ));
        engine.refresh().await?;

        Ok(Self {
            engine,
            reply_pump,
            _connection: connection,
        })
    }

    /// The virtual module tree published by the server as of the last
    /// refresh.
    pub fn modules(&self) -> VirtualModuleTree {
        self.engine.modules()
    }

    /// Re-fetch the server's definitions, rebuilding the module tree. Call
    /// this if `definitions_hash` is expected to have changed (e.g. a
    /// deployment rolled out new procedures).
    pub async fn refresh(&self) -> Result<(), RpcClientError> {
        self.engine.refresh().await
    }

    /// The definitions hash as of the last refresh.
    pub fn definitions_hash(&self) -> String {
        self.engine.definitions_hash()
    }

    /// Look up a single procedure's advertised stub, if the module and call
    /// are both published.
    pub fn stub(&self, short_module: &str, call_name: &str) -> Option<ProcedureStub> {
        self.engine.modules().get(short_module)?.get(call_name).cloned()
    }

    /// Invoke `short_module.call_name(varargs, kwargs)` against the server.
    pub async fn call(
        &self,
        short_module: impl Into<String>,
        call_name: impl Into<String>,
        varargs: Option<Vec<Value>>,
        kwargs: Option<BTreeMap<String, Value>>,
    ) -> Result<Value, RpcClientError> {
        self.engine.call(short_module, call_name, varargs, kwargs).await
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reply_pump.abort();
    }
}
