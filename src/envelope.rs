//! Wire envelopes exchanged between client and server.
//!
//! Field names here are part of the wire contract (spec.md §6): renaming a
//! field is a breaking change to every deployed client.

use serde::de::Error as _;
use serde::ser::{Error as _, SerializeStruct};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// The positional/keyword argument payload of a request, when the call
/// takes any arguments at all.
///
/// A `null` `args` on the wire means "no arguments"; a present-but-empty
/// `CallArguments` (`varargs: Some(vec![])`, `kwargs: Some({})`) is distinct
/// and legal - it means the caller explicitly passed empty collections.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CallArguments {
    /// Positional arguments, in call order.
    pub varargs: Option<Vec<Value>>,
    /// Keyword arguments by parameter name.
    pub kwargs: Option<BTreeMap<String, Value>>,
}

impl CallArguments {
    /// True when both `varargs` and `kwargs` are absent-or-empty.
    pub fn is_empty(&self) -> bool {
        self.varargs.as_ref().is_none_or(Vec::is_empty)
            && self.kwargs.as_ref().is_none_or(BTreeMap::is_empty)
    }
}

/// A request from client to server, carried as the body of an AMQP message
/// with `reply_to` set to the client's exclusive reply queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestEnvelope {
    /// The name of the procedure to invoke.
    pub call_name: String,
    /// The short module name the call belongs to, or `None` for internal
    /// calls (which never consult the module map).
    pub module: Option<String>,
    /// True when this call targets the built-in administrative surface
    /// (`provide_definitions`, `current_hash`, `authentication_provider_info`).
    pub internal: bool,
    /// The call's arguments, or `None` for a no-argument call.
    pub args: Option<CallArguments>,
    /// Opaque credentials, required iff the server has an authentication
    /// plugin registered.
    pub credentials: Option<Value>,
}

impl RequestEnvelope {
    /// Build an internal (administrative) request with no arguments.
    pub fn internal(call_name: impl Into<String>) -> Self {
        Self {
            call_name: call_name.into(),
            module: None,
            internal: true,
            args: None,
            credentials: None,
        }
    }

    /// Build a normal module-scoped request.
    pub fn call(module: impl Into<String>, call_name: impl Into<String>) -> Self {
        Self {
            call_name: call_name.into(),
            module: Some(module.into()),
            internal: false,
            args: None,
            credentials: None,
        }
    }

    /// Attach arguments (builder style).
    pub fn with_args(mut self, args: CallArguments) -> Self {
        self.args = if args.is_empty() { None } else { Some(args) };
        self
    }

    /// Attach credentials (builder style).
    pub fn with_credentials(mut self, credentials: Value) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// The structured, transmissible error carried in a failed reply's `result`
/// slot (spec.md §4.2/§9: a tagged representation rather than a pickled
/// exception object).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReplyError {
    /// The error kind, e.g. `"CallError"`, `"AuthenticationError"`.
    pub kind: String,
    /// The human-readable error message.
    pub message: String,
}

/// Extra error detail accompanying a failed reply (spec.md §3: `{traceback}`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    /// A formatted traceback/backtrace string. Never empty when present.
    pub traceback: String,
}

/// The successful-or-failed result payload carried in a reply envelope.
///
/// Invariant (I5): a reply with a non-null `error` field always carries an
/// error-typed `result` here, i.e. `CallResult::Error`.
///
/// Not `#[serde(untagged)]`: a successful call can legitimately return a
/// value shaped exactly like a [`ReplyError`] (`{"kind": ..., "message":
/// ...}`), so the wire shape of `result` alone can never disambiguate the
/// variant. [`ReplyEnvelope`]'s own `Serialize`/`Deserialize` impls decide
/// which variant `result` holds by looking at the sibling `error` field
/// instead.
#[derive(Debug, Clone, PartialEq)]
pub enum CallResult {
    /// The procedure's return value.
    Ok(Value),
    /// The procedure raised, or dispatch failed before the procedure ran.
    Error(ReplyError),
}

/// A reply from server to client, published to the request's `reply_to`
/// queue with the same `correlation_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyEnvelope {
    /// Echo of the original request envelope.
    pub call: RequestEnvelope,
    /// The call's result: either the return value, or an error instance.
    pub result: CallResult,
    /// `None` on success; `Some` on failure, carrying the formatted
    /// traceback.
    pub error: Option<ErrorInfo>,
}

#[derive(Deserialize)]
struct ReplyEnvelopeWire {
    call: RequestEnvelope,
    result: Value,
    error: Option<ErrorInfo>,
}

impl Serialize for ReplyEnvelope {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let result = match &self.result {
            CallResult::Ok(value) => value.clone(),
            CallResult::Error(err) => serde_json::to_value(err).map_err(S::Error::custom)?,
        };
        let mut state = serializer.serialize_struct("ReplyEnvelope", 3)?;
        state.serialize_field("call", &self.call)?;
        state.serialize_field("result", &result)?;
        state.serialize_field("error", &self.error)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ReplyEnvelope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let wire = ReplyEnvelopeWire::deserialize(deserializer)?;
        let result = match &wire.error {
            Some(_) => {
                let err: ReplyError = serde_json::from_value(wire.result).map_err(D::Error::custom)?;
                CallResult::Error(err)
            }
            None => CallResult::Ok(wire.result),
        };
        Ok(ReplyEnvelope {
            call: wire.call,
            result,
            error: wire.error,
        })
    }
}

impl ReplyEnvelope {
    /// Build a successful reply.
    pub fn ok(call: RequestEnvelope, result: Value) -> Self {
        Self {
            call,
            result: CallResult::Ok(result),
            error: None,
        }
    }

    /// Build a failed reply, satisfying invariant I5 by construction.
    pub fn failed(call: RequestEnvelope, kind: impl Into<String>, message: impl Into<String>, traceback: String) -> Self {
        Self {
            call,
            result: CallResult::Error(ReplyError {
                kind: kind.into(),
                message: message.into(),
            }),
            error: Some(ErrorInfo { traceback }),
        }
    }

    /// True when the call completed without error.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}
