//! # amqp-rpc-core - an AMQP-backed RPC framework
//!
//! Procedures registered on a server become callable from any client sharing
//! the same broker and request queue. A request is an AMQP message on a
//! durable, shared queue; the reply travels back to a per-client exclusive
//! reply queue, demultiplexed by correlation id.
//!
//! ## Architecture
//!
//! The crate is organized into five root modules, corresponding to the
//! five architectural components of the framework:
//!
//! - **envelope/** - Wire types: request/reply envelopes, call arguments.
//! - **registry/** - Server-side call registration, descriptors, definitions hash.
//! - **codec/** - Pluggable encode/decode of envelopes and the definition table.
//! - **transport/** - AMQP producer/consumer, request/reply correlation.
//! - **server/** - Validation, authentication, dispatch.
//! - **client/** - Connection, definitions fetch, dynamic call proxying.
//!
//! ```text
//! server/ ──► registry/ ──► envelope/
//!    │                           │
//! client/ ──► transport/ ────────┤
//!    │                           │
//!    └──────────► codec/ ────────┘
//! ```
//!
//! `envelope` and `codec` have no internal dependencies; `registry` and
//! `transport` build on `envelope`; `server` and `client` are the two
//! top-level entry points, each composing the layers below it.
//!
//! ## Getting started
//!
//! Register a procedure, then drive the dispatcher off a consumer:
//!
//! ```rust,no_run
//! use amqp_rpc_core::registry::Registry;
//! use amqp_rpc_core::registry::descriptor::ArgumentDescriptor;
//! use amqp_rpc_core::server::dispatcher::Dispatcher;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! let registry = Registry::new();
//! registry
//!     .register(
//!         "math_ops",
//!         "demo.math_ops",
//!         "add",
//!         ArgumentDescriptor::positional(["a", "b"]),
//!         "adds two numbers",
//!         Arc::new(|args| {
//!             let nums: Vec<i64> = args
//!                 .varargs
//!                 .unwrap_or_default()
//!                 .iter()
//!                 .filter_map(|v| v.as_i64())
//!                 .collect();
//!             Ok(json!(nums.iter().sum::<i64>()))
//!         }),
//!     )
//!     .expect("call name is not reserved");
//!
//! let _dispatcher = Dispatcher::new(registry);
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod envelope;
pub mod error;
pub mod registry;
pub mod server;
pub mod transport;
