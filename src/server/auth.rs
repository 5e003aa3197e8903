//! Server-side authentication plugin contract.
//!
//! Mirrors the originating framework's plugin validation, which checks a
//! registered object's surface (`{start, authenticate, about}`) before
//! accepting it. Rust expresses the same contract as a trait, checked at
//! compile time for implementers and at registration time for the
//! "is anything actually installed" question the dispatcher still needs to
//! answer at runtime.

use async_trait::async_trait;
use serde_json::Value;

/// Outcome of authenticating a request's credentials.
pub struct AuthOutcome {
    /// Whether the credentials were accepted.
    pub ok: bool,
    /// A human-readable reason, used in the rejection message when `ok` is
    /// false. `None` renders as "no reason provided" (spec.md §4.4).
    pub reason: Option<String>,
}

impl AuthOutcome {
    /// Accept the request.
    pub fn accept() -> Self {
        Self {
            ok: true,
            reason: None,
        }
    }

    /// Reject the request with a reason.
    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            reason: Some(reason.into()),
        }
    }
}

/// A server-installed authentication plugin.
///
/// Registering one makes `credentials` a required field on every incoming
/// request (spec.md §4.4 `validate_structure`); requests that omit it are
/// rejected before `authenticate` is ever called.
#[async_trait]
pub trait ServerAuthPlugin: Send + Sync {
    /// Called once at dispatcher boot, after construction.
    async fn start(&self);

    /// Authenticate a request's opaque credentials value.
    async fn authenticate(&self, credentials: &Value) -> AuthOutcome;

    /// A self-description returned verbatim by the internal
    /// `authentication_provider_info` call.
    fn about(&self) -> Value;
}
