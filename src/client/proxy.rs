//! Dynamic client proxy engine (spec.md §4.5).
//!
//! The originating framework builds one in-process module object per
//! server-side module at runtime (`imp.new_module` + `sys.modules`) and
//! attaches a generated method per registered call. Rust has no equivalent
//! to mutating the interpreter's module namespace at runtime, so the
//! "virtual module tree" is represented directly as a
//! `HashMap<short_module, HashMap<call_name, ProcedureStub>>` - callers look
//! up `engine.modules()["math_ops"]["add"]` instead of `client.math_ops.add(...)`,
//! and invoke through [`ProxyEngine::call`] rather than a generated closure.

use super::auth::ClientAuthPlugin;
use crate::codec::Codec;
use crate::config::ClientConfig;
use crate::envelope::{CallArguments, CallResult, RequestEnvelope};
use crate::error::RpcClientError;
use crate::registry::definitions::{DefinitionTable, DefinitionsBundle};
use crate::registry::descriptor::ProcedureDescriptor;
use crate::transport::correlation::{CallOutcome, CorrelationId, CorrelationTracker};
use crate::transport::{Consumer, MessageMeta, Producer};
use bytes::Bytes;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

/// A single callable procedure's advertised shape - argument descriptor and
/// docstring, as published by the server. Carries no implementation; every
/// invocation goes back through [`ProxyEngine::call`].
#[derive(Debug, Clone)]
pub struct ProcedureStub {
    /// The procedure's argument shape and docstring.
    pub descriptor: ProcedureDescriptor,
}

/// The virtual module tree: short module name -> call name -> stub.
pub type VirtualModuleTree = HashMap<String, HashMap<String, ProcedureStub>>;

fn build_module_tree(definitions: &DefinitionTable) -> VirtualModuleTree {
    definitions
        .iter()
        .map(|(short_module, table)| {
            let calls = table
                .iter()
                .map(|(call_name, descriptor)| {
                    (
                        call_name.clone(),
                        ProcedureStub {
                            descriptor: descriptor.clone(),
                        },
                    )
                })
                .collect();
            (short_module.clone(), calls)
        })
        .collect()
}

/// Drives request/reply traffic against a server's request queue and
/// exposes its published procedures as a [`VirtualModuleTree`].
pub struct ProxyEngine<P> {
    producer: Arc<P>,
    request_queue: String,
    reply_queue: String,
    codec: Arc<dyn Codec>,
    tracker: CorrelationTracker,
    reply_timeout: Duration,
    credentials: Option<Arc<dyn ClientAuthPlugin>>,
    modules: RwLock<VirtualModuleTree>,
    definitions_hash: RwLock<String>,
}

impl<P> ProxyEngine<P>
where
    P: Producer,
{
    /// Build a proxy engine over an already-connected producer and reply
    /// queue. Call [`ProxyEngine::refresh`] before issuing any module call.
    pub fn new(
        producer: Arc<P>,
        config: &ClientConfig,
        reply_queue: impl Into<String>,
        codec: Arc<dyn Codec>,
        tracker: CorrelationTracker,
        credentials: Option<Arc<dyn ClientAuthPlugin>>,
    ) -> Self {
        Self {
            producer,
            request_queue: config.transport.queue_name.clone(),
            reply_queue: reply_queue.into(),
            codec,
            tracker,
            reply_timeout: config.reply_timeout(),
            credentials,
            modules: RwLock::new(VirtualModuleTree::new()),
            definitions_hash: RwLock::new(String::new()),
        }
    }

    /// Spawn the background task that pumps deliveries off the reply
    /// consumer, decodes them, and resolves the matching pending call via
    /// `tracker` (spec.md §4.5 "Reply correlation"). Exactly one of these
    /// should run per client connection.
    pub fn spawn_reply_pump<C>(tracker: CorrelationTracker, mut consumer: C, codec: Arc<dyn Codec>) -> JoinHandle<()>
    where
        C: Consumer + 'static,
    {
        tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                let Some(raw_id) = &delivery.meta.correlation_id else {
                    warn!("reply delivery missing correlation_id; discarding");
                    let _ = consumer.ack(delivery.tag).await;
                    continue;
                };
                let Ok(correlation_id) = raw_id.parse::<CorrelationId>() else {
                    warn!(correlation_id = %raw_id, "reply delivery has a malformed correlation_id; discarding");
                    let _ = consumer.ack(delivery.tag).await;
                    continue;
                };

                match codec.decode(&delivery.body) {
                    Ok(reply) => tracker.resolve(correlation_id, reply),
                    Err(e) => warn!(error = %e, "failed to decode reply envelope; discarding"),
                }

                let _ = consumer.ack(delivery.tag).await;
            }
            trace!("reply pump exiting: consumer canceled");
        })
    }

    /// Fetch the server's definitions (an internal `provide_definitions`
    /// call) and rebuild the virtual module tree from them (spec.md §4.5
    /// startup step 2-3).
    pub async fn refresh(&self) -> Result<(), RpcClientError> {
        let mut request = RequestEnvelope::internal("provide_definitions");
        if let Some(plugin) = &self.credentials {
            request = request.with_credentials(plugin.provide_credentials().await);
        }
        let result = self.send(request).await?;
        let bundle: DefinitionsBundle = serde_json::from_value(result)
            .map_err(|e| RpcClientError::CodecError(format!("malformed provide_definitions result: {e}")))?;

        *self.modules.write().unwrap_or_else(std::sync::PoisonError::into_inner) =
            build_module_tree(&bundle.definitions);
        *self.definitions_hash.write().unwrap_or_else(std::sync::PoisonError::into_inner) = bundle.hash;

        Ok(())
    }

    /// A snapshot of the current virtual module tree.
    pub fn modules(&self) -> VirtualModuleTree {
        self.modules
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// The definitions hash as of the last [`ProxyEngine::refresh`].
    pub fn definitions_hash(&self) -> String {
        self.definitions_hash
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Invoke a registered procedure by short module and call name - the
    /// proxy handler every generated stub calls through (spec.md §4.5
    /// "Proxy handler").
    pub async fn call(
        &self,
        short_module: impl Into<String>,
        call_name: impl Into<String>,
        varargs: Option<Vec<Value>>,
        kwargs: Option<BTreeMap<String, Value>>,
    ) -> Result<Value, RpcClientError> {
        let args = CallArguments { varargs, kwargs };
        let mut request = RequestEnvelope::call(short_module, call_name).with_args(args);

        if let Some(plugin) = &self.credentials {
            request = request.with_credentials(plugin.provide_credentials().await);
        }

        self.send(request).await
    }

    async fn send(&self, request: RequestEnvelope) -> Result<Value, RpcClientError> {
        let body = self
            .codec
            .encode(&request)
            .map_err(|e| RpcClientError::CodecError(e.0))?;

        let correlation_id = CorrelationId::generate();
        let outcome_rx = self.tracker.register(correlation_id, self.reply_timeout);

        let meta = MessageMeta {
            correlation_id: Some(correlation_id.to_string()),
            reply_to: Some(self.reply_queue.clone()),
            headers: Default::default(),
        };

        self.producer
            .publish(&self.request_queue, Bytes::from(body), meta)
            .await
            .map_err(|e| RpcClientError::ConnectionError(e.to_string()))?;

        let outcome = outcome_rx.await.map_err(|_| RpcClientError::ShuttingDown)?;

        match outcome {
            CallOutcome::TimedOut => Err(RpcClientError::ReplyTimeoutError(self.reply_timeout)),
            CallOutcome::Replied(reply) => match reply.result {
                CallResult::Ok(value) => Ok(value),
                CallResult::Error(err) => Err(RpcClientError::RemoteError {
                    kind: err.kind,
                    message: err.message,
                    traceback: reply.error.map(|info| info.traceback),
                }),
            },
        }
    }
}
