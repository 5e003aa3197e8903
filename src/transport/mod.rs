//! Transport layer: publishing requests/replies and consuming them off an
//! AMQP broker (spec.md §4.1).
//!
//! [`Producer`] and [`Consumer`] are the seam between the wire-level AMQP
//! details and the rest of the crate; [`amqp`] provides the only production
//! implementation, over `lapin`, but the dispatcher and proxy engine are
//! written against the traits so an in-process fake can stand in for tests.

pub mod amqp;
pub mod correlation;

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeMap;

pub use crate::error::InvalidMessageError;

/// Headers carried alongside a message body: the AMQP properties the
/// dispatcher and proxy engine actually care about, abstracted away from
/// `lapin`'s richer `BasicProperties`.
#[derive(Debug, Clone, Default)]
pub struct MessageMeta {
    /// Correlates a reply back to its request (I3).
    pub correlation_id: Option<String>,
    /// The queue a reply should be published to.
    pub reply_to: Option<String>,
    /// Free-form headers, used by some authentication plugins to carry
    /// out-of-band metadata.
    pub headers: BTreeMap<String, String>,
}

/// A delivered message, paired with a handle used to ack or reject it.
pub struct Delivery {
    /// The raw message body, still codec-encoded.
    pub body: Bytes,
    /// This delivery's metadata.
    pub meta: MessageMeta,
    /// Opaque delivery tag, passed back to [`Consumer::ack`]/[`Consumer::reject`].
    pub tag: u64,
}

/// Publishes messages to a named queue (or, for replies, directly to a
/// `reply_to` queue).
#[async_trait]
pub trait Producer: Send + Sync {
    /// Publish `body` to `queue`, with the given metadata attached.
    async fn publish(&self, queue: &str, body: Bytes, meta: MessageMeta) -> Result<(), InvalidMessageError>;
}

/// Consumes messages from a queue, handing each one to the caller to
/// process and then ack or reject.
#[async_trait]
pub trait Consumer: Send + Sync {
    /// Receive the next delivery, or `None` if the consumer has been
    /// canceled (broker connection dropped, or an explicit shutdown).
    async fn next(&mut self) -> Option<Delivery>;

    /// Acknowledge a delivery: processing succeeded and a reply (if any)
    /// has been published.
    async fn ack(&self, tag: u64) -> Result<(), InvalidMessageError>;

    /// Reject a delivery without requeueing it (spec.md §4.1 step 5: a
    /// message that can't even be decoded into an envelope is permanently
    /// unprocessable, so requeueing would only spin it forever).
    async fn reject(&self, tag: u64) -> Result<(), InvalidMessageError>;
}
