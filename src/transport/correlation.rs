//! Client-side request/reply correlation.
//!
//! Every outstanding call is tracked in a lock-free concurrent map keyed by
//! a freshly generated [`CorrelationId`] (I3). Registering a call spawns a
//! background timeout task; whichever of "reply arrived" or "timeout
//! fired" runs first removes the pending entry and completes the call's
//! one-shot channel - removal from the `DashMap` is atomic, so the two
//! paths can't both complete the same call (P6).

use crate::envelope::ReplyEnvelope;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Opaque token correlating a request to its reply.
///
/// Generated fresh for every request (I3); never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new, globally-unique correlation id.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for CorrelationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Outcome of a tracked call: either the matching reply arrived, or the
/// deadline elapsed first.
pub enum CallOutcome {
    /// A reply matching this call's correlation id arrived in time.
    Replied(ReplyEnvelope),
    /// No reply arrived before the deadline (`RpcClientError::ReplyTimeoutError`).
    TimedOut,
}

/// A call awaiting its outcome.
struct PendingCall {
    outcome_tx: oneshot::Sender<CallOutcome>,
    /// When this call was registered - the outstanding-call record's
    /// bookkeeping timestamp (spec.md §3), surfaced to callers via
    /// [`CorrelationTracker::requested_at`] for latency diagnostics.
    requested_at: DateTime<Utc>,
}

/// Tracks in-flight requests and demuxes replies to them by correlation id.
///
/// Cheap to clone (`Arc` internally); every clone shares the same pending
/// map, so a single tracker can be shared between the task that publishes
/// requests and the task that consumes the reply queue.
#[derive(Clone)]
pub struct CorrelationTracker {
    pending: Arc<DashMap<CorrelationId, PendingCall>>,
    timeouts: Arc<DashMap<CorrelationId, JoinHandle<()>>>,
    completed: Arc<AtomicU64>,
    timed_out: Arc<AtomicU64>,
    /// Replies whose correlation id matched no pending call (spec.md §9:
    /// "merits an observability counter").
    discarded: Arc<AtomicU64>,
}

impl Default for CorrelationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            timeouts: Arc::new(DashMap::new()),
            completed: Arc::new(AtomicU64::new(0)),
            timed_out: Arc::new(AtomicU64::new(0)),
            discarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Register a new outstanding call and spawn its timeout task.
    ///
    /// Returns a receiver that resolves with [`CallOutcome::Replied`] if a
    /// matching reply arrives before `timeout` elapses, or
    /// [`CallOutcome::TimedOut`] if the deadline wins the race (P6).
    pub fn register(&self, correlation_id: CorrelationId, timeout: Duration) -> oneshot::Receiver<CallOutcome> {
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let requested_at = Utc::now();
        self.pending.insert(
            correlation_id,
            PendingCall {
                outcome_tx,
                requested_at,
            },
        );

        let tracker = self.clone();
        let timeout_handle = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, pending)) = tracker.pending.remove(&correlation_id) {
                tracker.timed_out.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    %correlation_id,
                    waited_ms = (Utc::now() - pending.requested_at).num_milliseconds(),
                    "call timed out waiting for a reply"
                );
                let _ = pending.outcome_tx.send(CallOutcome::TimedOut);
            }
            tracker.timeouts.remove(&correlation_id);
        });
        self.timeouts.insert(correlation_id, timeout_handle);

        outcome_rx
    }

    /// When the call under `correlation_id` was registered, if it is still
    /// pending. Bookkeeping only - never transmitted over the wire.
    pub fn requested_at(&self, correlation_id: CorrelationId) -> Option<DateTime<Utc>> {
        self.pending.get(&correlation_id).map(|p| p.requested_at)
    }

    /// Resolve a pending call with its reply (I3). No-op (after incrementing
    /// the discard counter) if no call is pending under this correlation id
    /// - either it never existed, it already timed out, or it was already
    /// resolved.
    pub fn resolve(&self, correlation_id: CorrelationId, reply: ReplyEnvelope) {
        match self.pending.remove(&correlation_id) {
            Some((_, pending)) => {
                if let Some((_, handle)) = self.timeouts.remove(&correlation_id) {
                    handle.abort();
                }
                self.completed.fetch_add(1, Ordering::Relaxed);
                let _ = pending.outcome_tx.send(CallOutcome::Replied(reply));
            }
            None => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Number of calls currently awaiting a reply.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Number of calls resolved by a matching reply.
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Number of calls resolved by timeout instead of a reply.
    pub fn timeout_count(&self) -> u64 {
        self.timed_out.load(Ordering::Relaxed)
    }

    /// Number of replies discarded for matching no pending call.
    pub fn discarded_count(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{CallResult, RequestEnvelope};
    use serde_json::json;

    fn reply() -> ReplyEnvelope {
        ReplyEnvelope::ok(RequestEnvelope::call("t", "echo"), json!("pong"))
    }

    #[tokio::test]
    async fn resolve_before_timeout_delivers_the_reply() {
        let tracker = CorrelationTracker::new();
        let id = CorrelationId::generate();
        let rx = tracker.register(id, Duration::from_secs(5));

        tracker.resolve(id, reply());

        match rx.await.unwrap() {
            CallOutcome::Replied(r) => assert!(matches!(r.result, CallResult::Ok(_))),
            CallOutcome::TimedOut => panic!("expected a reply"),
        }
        assert_eq!(tracker.completed_count(), 1);
        assert_eq!(tracker.timeout_count(), 0);
        assert_eq!(tracker.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_fires_when_no_reply_arrives_p6() {
        let tracker = CorrelationTracker::new();
        let id = CorrelationId::generate();
        let rx = tracker.register(id, Duration::from_millis(10));

        tokio::time::advance(Duration::from_millis(11)).await;

        match rx.await.unwrap() {
            CallOutcome::TimedOut => {}
            CallOutcome::Replied(_) => panic!("expected a timeout"),
        }
        assert_eq!(tracker.timeout_count(), 1);
        assert_eq!(tracker.completed_count(), 0);
    }

    #[tokio::test]
    async fn resolve_with_unknown_correlation_id_is_discarded() {
        let tracker = CorrelationTracker::new();
        tracker.resolve(CorrelationId::generate(), reply());
        assert_eq!(tracker.discarded_count(), 1);
    }

    #[tokio::test]
    async fn requested_at_is_tracked_while_pending_and_cleared_on_resolve() {
        let tracker = CorrelationTracker::new();
        let id = CorrelationId::generate();
        let before = Utc::now();
        tracker.register(id, Duration::from_secs(5));

        let requested_at = tracker.requested_at(id).expect("call is still pending");
        assert!(requested_at >= before);

        tracker.resolve(id, reply());
        assert!(tracker.requested_at(id).is_none());
    }
}
