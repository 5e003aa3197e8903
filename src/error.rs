//! Error hierarchy for the RPC core.
//!
//! Mirrors the exception tree of the originating RabbitMQ RPC framework:
//! a server-side tree (validation, resolution, authentication), a
//! client-side tree (connectivity, timeout), and two error kinds that sit
//! outside both hierarchies because they never produce a reply envelope
//! (`InvalidMessageError`) or only ever happen at plugin-registration time.

use thiserror::Error;

/// Errors raised while validating, resolving, authenticating, or invoking a
/// request on the server.
///
/// Every variant of `RpcServerError` is carried back to the client inside a
/// [`crate::envelope::ReplyEnvelope`]'s `error` slot; it is never allowed to
/// propagate out of [`crate::server::Dispatcher::handle`] as a Rust panic or
/// an unhandled `Result::Err`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RpcServerError {
    /// The call name is unknown, either globally (internal calls) or within
    /// the resolved module.
    #[error("{0}")]
    CallError(String),

    /// The request envelope is missing a required field or has a malformed
    /// `args` sub-structure.
    #[error("{0}")]
    CallFormatError(String),

    /// The short module name does not resolve, or resolves to a module that
    /// is not currently loaded on this server.
    #[error("{0}")]
    ModuleError(String),

    /// Credentials were missing (and required) or were rejected by the
    /// installed authentication plugin.
    #[error("{0}")]
    AuthenticationError(String),
}

/// Errors raised on the client while issuing or awaiting a call.
///
/// These never travel over the wire; they are purely local conditions
/// (the broker connection failed, or no reply arrived in time).
#[derive(Debug, Error)]
pub enum RpcClientError {
    /// The connection to the broker could not be established or was lost.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// No reply arrived before the call's deadline elapsed.
    #[error("reply timeout after {0:?}")]
    ReplyTimeoutError(std::time::Duration),

    /// The server returned an error; re-hydrated from the reply envelope's
    /// structured error payload.
    #[error("remote error ({kind}): {message}")]
    RemoteError {
        /// The server-side error kind, e.g. `"CallError"`.
        kind: String,
        /// The error message, as produced on the server.
        message: String,
        /// A formatted traceback string, when the server logged one.
        traceback: Option<String>,
    },

    /// The client is shutting down; any waiters are released with this
    /// error rather than being left to hang.
    #[error("client is shutting down")]
    ShuttingDown,

    /// The codec failed to encode a request or decode a reply.
    #[error("codec error: {0}")]
    CodecError(String),
}

/// A message arrived on a queue but could not be decoded into a request or
/// reply envelope.
///
/// This is transport-level, not server-level: it bypasses the normal
/// request/reply flow entirely. A message that fails to decode is rejected
/// without requeue (it can never become decodable by trying again) and no
/// reply envelope is ever produced for it.
#[derive(Debug, Error, Clone)]
#[error("invalid message: {0}")]
pub struct InvalidMessageError(pub String);

/// Raised when an object registered as the server's authentication plugin
/// does not implement the required `{start, authenticate, about}` surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("server authentication plugin error: {0}")]
pub struct ServerAuthPluginError(pub String);

/// Raised when an object registered as the client's authentication plugin
/// does not implement the required `{provide_credentials}` surface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("client authentication plugin error: {0}")]
pub struct ClientAuthPluginError(pub String);

/// Raised when registering a procedure under a reserved internal call name
/// (`provide_definitions`, `current_hash`, `authentication_provider_info`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("'{0}' is a reserved internal call name and cannot be registered")]
pub struct ReservedCallNameError(pub String);

impl RpcServerError {
    /// The error's kind, as transmitted over the wire (`ReplyError::kind`).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CallError(_) => "CallError",
            Self::CallFormatError(_) => "CallFormatError",
            Self::ModuleError(_) => "ModuleError",
            Self::AuthenticationError(_) => "AuthenticationError",
        }
    }
}
