#![allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]

//! End-to-end dispatcher scenarios.
//!
//! Exercises the dispatcher directly against encoded request bytes, the way
//! a server run loop hands it each delivery body.

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde_json::{json, Value};

// Layer 3: Internal module imports
use amqp_rpc_core::codec::{Codec, JsonCodec};
use amqp_rpc_core::envelope::{CallArguments, CallResult, ReplyEnvelope, RequestEnvelope};
use amqp_rpc_core::registry::descriptor::ArgumentDescriptor;
use amqp_rpc_core::registry::Registry;
use amqp_rpc_core::server::auth::{AuthOutcome, ServerAuthPlugin};
use amqp_rpc_core::server::dispatcher::Dispatcher;
use std::collections::BTreeMap;
use std::sync::Arc;

fn registry_with_echo() -> Registry {
    let registry = Registry::new();
    registry
        .register(
            "t",
            "demo.t",
            "echo",
            ArgumentDescriptor::new(
                vec![],
                BTreeMap::from([("x".to_string(), json!("hi"))]),
                None,
                None,
            ),
            "",
            Arc::new(|args| {
                let value = args
                    .kwargs
                    .and_then(|kw| kw.get("x").cloned())
                    .unwrap_or_else(|| json!("hi"));
                Ok(value)
            }),
        )
        .expect("echo is not reserved");
    registry
}

async fn roundtrip(dispatcher: &Dispatcher, codec: &JsonCodec, request: RequestEnvelope) -> ReplyEnvelope {
    let body = codec.encode(&request).expect("encode request");
    let reply_bytes = dispatcher.handle(&body, codec).await.expect("handle");
    codec.decode(&reply_bytes).expect("decode reply")
}

#[tokio::test]
async fn s1_register_and_fetch() {
    let registry = registry_with_echo();
    let expected_hash = registry.hash();
    let dispatcher = Dispatcher::new(registry);
    let codec = JsonCodec;

    let reply = roundtrip(&dispatcher, &codec, RequestEnvelope::internal("provide_definitions")).await;
    assert!(reply.is_ok());

    let CallResult::Ok(bundle) = reply.result else {
        panic!("expected an Ok result");
    };
    let add = &bundle["definitions"]["t"]["echo"];
    assert_eq!(add["module"], "demo.t");
    assert_eq!(bundle["hash"], expected_hash);
}

#[tokio::test]
async fn s2_roundtrip_call() {
    let dispatcher = Dispatcher::new(registry_with_echo());
    let codec = JsonCodec;

    let request = RequestEnvelope::call("t", "echo").with_args(CallArguments {
        varargs: None,
        kwargs: Some(BTreeMap::from([("x".to_string(), json!("pong"))])),
    });

    let reply = roundtrip(&dispatcher, &codec, request).await;
    assert_eq!(reply.result, CallResult::Ok(json!("pong")));
}

#[tokio::test]
async fn s3_unknown_call_surfaces_call_error() {
    let dispatcher = Dispatcher::new(registry_with_echo());
    let codec = JsonCodec;

    let reply = roundtrip(&dispatcher, &codec, RequestEnvelope::call("t", "missing")).await;

    let CallResult::Error(err) = reply.result else {
        panic!("expected an error result");
    };
    assert_eq!(err.kind, "CallError");
    assert!(err.message.contains("missing"));
}

#[tokio::test]
async fn s4_malformed_module_surfaces_module_error() {
    let dispatcher = Dispatcher::new(registry_with_echo());
    let codec = JsonCodec;

    let reply = roundtrip(&dispatcher, &codec, RequestEnvelope::call("unknown_module", "echo")).await;

    let CallResult::Error(err) = reply.result else {
        panic!("expected an error result");
    };
    assert_eq!(err.kind, "ModuleError");
}

struct RejectingPlugin;

#[async_trait]
impl ServerAuthPlugin for RejectingPlugin {
    async fn start(&self) {}

    async fn authenticate(&self, credentials: &Value) -> AuthOutcome {
        if credentials.get("token").and_then(Value::as_str) == Some("valid") {
            AuthOutcome::accept()
        } else {
            AuthOutcome::reject("expired token")
        }
    }

    fn about(&self) -> Value {
        json!({"provider": "rejecting-plugin"})
    }
}

#[tokio::test]
async fn s5_missing_credentials_are_rejected() {
    let dispatcher = Dispatcher::with_auth_plugin(registry_with_echo(), Arc::new(RejectingPlugin));
    let codec = JsonCodec;

    let reply = roundtrip(&dispatcher, &codec, RequestEnvelope::call("t", "echo")).await;

    let CallResult::Error(err) = reply.result else {
        panic!("expected an error result");
    };
    assert_eq!(err.kind, "AuthenticationError");
    assert!(err.message.contains("no credentials") || err.message.contains("none were provided"));
}

#[tokio::test]
async fn s5_rejected_credentials_surface_the_plugins_reason() {
    let dispatcher = Dispatcher::with_auth_plugin(registry_with_echo(), Arc::new(RejectingPlugin));
    let codec = JsonCodec;

    let request = RequestEnvelope::call("t", "echo").with_credentials(json!({"token": "stale"}));
    let reply = roundtrip(&dispatcher, &codec, request).await;

    let CallResult::Error(err) = reply.result else {
        panic!("expected an error result");
    };
    assert_eq!(err.kind, "AuthenticationError");
    assert_eq!(err.message, "expired token");
}

#[tokio::test]
async fn s5_accepted_credentials_let_the_call_through() {
    let dispatcher = Dispatcher::with_auth_plugin(registry_with_echo(), Arc::new(RejectingPlugin));
    let codec = JsonCodec;

    let request = RequestEnvelope::call("t", "echo")
        .with_credentials(json!({"token": "valid"}))
        .with_args(CallArguments {
            varargs: None,
            kwargs: Some(BTreeMap::from([("x".to_string(), json!("pong"))])),
        });
    let reply = roundtrip(&dispatcher, &codec, request).await;

    assert_eq!(reply.result, CallResult::Ok(json!("pong")));
}
