//! Minimal end-to-end walkthrough: register a procedure, drive a request
//! through the [`Dispatcher`] directly, and read back the reply.
//!
//! This stands in for a full broker round trip - it wires the same
//! `Dispatcher`/`Codec` types a real [`amqp_rpc_core::server::Server`] and
//! [`amqp_rpc_core::client::Client`] use, just without an actual AMQP
//! connection, so it runs without a broker available.

#![allow(clippy::unwrap_used, clippy::expect_used)] // Allow in examples for clarity

use amqp_rpc_core::codec::{Codec, JsonCodec};
use amqp_rpc_core::envelope::{CallArguments, CallResult, RequestEnvelope};
use amqp_rpc_core::registry::descriptor::ArgumentDescriptor;
use amqp_rpc_core::registry::Registry;
use amqp_rpc_core::server::dispatcher::Dispatcher;
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

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
        .expect("add is not a reserved call name");

    println!("definitions hash: {}", registry.hash());

    let dispatcher = Dispatcher::new(registry);
    let codec = JsonCodec;

    let request = RequestEnvelope::call("math_ops", "add").with_args(CallArguments {
        varargs: Some(vec![json!(2), json!(3)]),
        kwargs: None,
    });
    let body = codec.encode(&request).expect("encode request");

    let reply_bytes = dispatcher.handle(&body, &codec).await.expect("dispatch");
    let reply: amqp_rpc_core::envelope::ReplyEnvelope = codec.decode(&reply_bytes).expect("decode reply");

    match reply.result {
        CallResult::Ok(value) => println!("math_ops.add(2, 3) = {value}"),
        CallResult::Error(err) => println!("call failed: {} ({})", err.message, err.kind),
    }

    // Calling an unregistered procedure surfaces a structured CallError
    // instead of panicking - the same error the client's RemoteError would
    // carry over a real broker connection.
    let missing = RequestEnvelope::call("math_ops", "multiply");
    let body = codec.encode(&missing).expect("encode request");
    let reply_bytes = dispatcher.handle(&body, &codec).await.expect("dispatch");
    let reply: amqp_rpc_core::envelope::ReplyEnvelope = codec.decode(&reply_bytes).expect("decode reply");
    if let CallResult::Error(err) = reply.result {
        println!("math_ops.multiply(..) failed as expected: {} - {}", err.kind, err.message);
    }
}
