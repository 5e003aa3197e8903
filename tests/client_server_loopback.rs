#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

//! Client-against-server scenarios driven entirely in-process: an in-memory
//! [`Producer`] feeds requests straight into a [`Dispatcher`] and resolves
//! the client's [`CorrelationTracker`] with the decoded reply, standing in
//! for a full broker round trip.

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;

// Layer 3: Internal module imports
use amqp_rpc_core::codec::{Codec, JsonCodec};
use amqp_rpc_core::client::proxy::ProxyEngine;
use amqp_rpc_core::config::ClientConfig;
use amqp_rpc_core::error::{InvalidMessageError, RpcClientError};
use amqp_rpc_core::registry::descriptor::ArgumentDescriptor;
use amqp_rpc_core::registry::Registry;
use amqp_rpc_core::server::dispatcher::Dispatcher;
use amqp_rpc_core::transport::correlation::{CorrelationId, CorrelationTracker};
use amqp_rpc_core::transport::{MessageMeta, Producer};
use std::sync::Arc;
use std::time::Duration;

fn registry_with_add() -> Registry {
    let registry = Registry::new();
    registry
        .register(
            "math_ops",
            "demo.math_ops",
            "add",
            ArgumentDescriptor::positional(["a", "b"]),
            "adds two numbers",
            Arc::new(|args| {
                let nums: Vec<i64> = args
                    .varargs
                    .unwrap_or_default()
                    .iter()
                    .filter_map(|v| v.as_i64())
                    .collect();
                Ok(json!(nums.iter().sum::<i64>()))
            }),
        )
        .expect("add is not reserved");
    registry
}

/// Feeds every published request straight into a [`Dispatcher`] and resolves
/// the originating call's tracker entry synchronously - no actual broker,
/// no actual reply consumer task.
struct DirectProducer {
    dispatcher: Dispatcher,
    codec: JsonCodec,
    tracker: CorrelationTracker,
}

#[async_trait]
impl Producer for DirectProducer {
    async fn publish(&self, _queue: &str, body: Bytes, meta: MessageMeta) -> Result<(), InvalidMessageError> {
        let reply_bytes = self.dispatcher.handle(&body, &self.codec).await?;
        let reply = self.codec.decode(&reply_bytes).map_err(|e| InvalidMessageError(e.0))?;

        let correlation_id: CorrelationId = meta
            .correlation_id
            .expect("request always carries a correlation id")
            .parse()
            .expect("correlation id is a valid uuid");
        self.tracker.resolve(correlation_id, reply);
        Ok(())
    }
}

/// Like [`DirectProducer`], but never resolves the tracker - models a
/// server that never replies, for the timeout scenario.
struct SilentProducer;

#[async_trait]
impl Producer for SilentProducer {
    async fn publish(&self, _queue: &str, _body: Bytes, _meta: MessageMeta) -> Result<(), InvalidMessageError> {
        Ok(())
    }
}

#[tokio::test]
async fn s2_proxy_call_roundtrips_through_the_dispatcher() {
    let registry = registry_with_add();
    let tracker = CorrelationTracker::new();
    let codec = JsonCodec;
    let producer = Arc::new(DirectProducer {
        dispatcher: Dispatcher::new(registry),
        codec,
        tracker: tracker.clone(),
    });

    let engine = ProxyEngine::new(
        producer,
        &ClientConfig::default(),
        "reply-queue",
        Arc::new(JsonCodec),
        tracker,
        None,
    );

    let result = engine
        .call("math_ops", "add", Some(vec![json!(2), json!(3)]), None)
        .await
        .expect("call succeeds");
    assert_eq!(result, json!(5));
}

#[tokio::test]
async fn s1_refresh_matches_the_registrys_current_hash() {
    let registry = registry_with_add();
    let expected_hash = registry.hash();
    let tracker = CorrelationTracker::new();
    let producer = Arc::new(DirectProducer {
        dispatcher: Dispatcher::new(registry),
        codec: JsonCodec,
        tracker: tracker.clone(),
    });

    let engine = ProxyEngine::new(
        producer,
        &ClientConfig::default(),
        "reply-queue",
        Arc::new(JsonCodec),
        tracker,
        None,
    );

    engine.refresh().await.expect("refresh succeeds");
    assert_eq!(engine.definitions_hash(), expected_hash);
    assert!(engine.modules()["math_ops"].contains_key("add"));
}

#[tokio::test(start_paused = true)]
async fn s6_timeout_surfaces_reply_timeout_error_and_clears_the_tracker() {
    let tracker = CorrelationTracker::new();
    let mut config = ClientConfig::default();
    config.reply_timeout_secs = 0.01;

    let engine = ProxyEngine::new(
        Arc::new(SilentProducer),
        &config,
        "reply-queue",
        Arc::new(JsonCodec),
        tracker.clone(),
        None,
    );

    let call = engine.call("t", "slow", None, None);
    tokio::pin!(call);

    tokio::time::advance(Duration::from_millis(20)).await;
    let result = call.await;

    assert!(matches!(result, Err(RpcClientError::ReplyTimeoutError(_))));
    assert_eq!(tracker.pending_count(), 0);
    assert_eq!(tracker.timeout_count(), 1);
}
