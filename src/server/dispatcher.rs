//! Request validation, resolution, authentication, and invocation
//! (spec.md §4.4).

use super::auth::ServerAuthPlugin;
use crate::codec::Codec;
use crate::envelope::{CallArguments, ReplyEnvelope, RequestEnvelope};
use crate::error::{InvalidMessageError, RpcServerError};
use crate::registry::definitions::DefinitionsBundle;
use crate::registry::Registry;
use serde_json::Value;
use std::sync::Arc;

const INTERNAL_PROVIDE_DEFINITIONS: &str = "provide_definitions";
const INTERNAL_CURRENT_HASH: &str = "current_hash";
const INTERNAL_AUTH_INFO: &str = "authentication_provider_info";
const INTERNAL_CALL_NAMES: &[&str] = &[
    INTERNAL_PROVIDE_DEFINITIONS,
    INTERNAL_CURRENT_HASH,
    INTERNAL_AUTH_INFO,
];

/// Validates, resolves, authenticates, and invokes incoming requests against
/// a [`Registry`].
///
/// Holds no transport state of its own - [`Dispatcher::handle`] takes a raw
/// message body and a codec, and always returns a codec-encoded reply body.
/// Decode failure is the one case that never produces a reply: a message
/// that isn't even a well-formed envelope is a transport-level
/// [`InvalidMessageError`], not a call-level failure.
pub struct Dispatcher {
    registry: Registry,
    auth: Option<Arc<dyn ServerAuthPlugin>>,
}

impl Dispatcher {
    /// Build a dispatcher with no authentication plugin installed.
    ///
    /// Every request must omit `credentials`; see spec.md §4.3's "logs a
    /// warning and continues without authentication" boot behavior -
    /// callers are expected to log this themselves at startup since the
    /// dispatcher has no logger of its own to emit through at construction
    /// time.
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            auth: None,
        }
    }

    /// Build a dispatcher with an authentication plugin installed. Every
    /// request must now carry `credentials`.
    pub fn with_auth_plugin(registry: Registry, plugin: Arc<dyn ServerAuthPlugin>) -> Self {
        Self {
            registry,
            auth: Some(plugin),
        }
    }

    /// Decode `body`, dispatch it, and encode the reply - the dispatcher's
    /// one entry point, invoked by the server run loop for every delivery
    /// on the request queue.
    pub async fn handle(&self, body: &[u8], codec: &dyn Codec) -> Result<Vec<u8>, InvalidMessageError> {
        let envelope: RequestEnvelope = codec
            .decode(body)
            .map_err(|e| InvalidMessageError(e.0))?;

        let reply = self.dispatch(envelope).await;

        codec.encode(&reply).map_err(|e| InvalidMessageError(e.0))
    }

    async fn dispatch(&self, envelope: RequestEnvelope) -> ReplyEnvelope {
        match self.try_dispatch(&envelope).await {
            Ok(value) => ReplyEnvelope::ok(envelope, value),
            Err(err) => {
                let kind = err.kind().to_string();
                let message = err.to_string();
                let traceback = format!("Traceback (most recent call last):\n{kind}: {message}");
                ReplyEnvelope::failed(envelope, kind, message, traceback)
            }
        }
    }

    async fn try_dispatch(&self, envelope: &RequestEnvelope) -> Result<Value, RpcServerError> {
        self.validate_structure(envelope)?;
        self.validate_call(envelope)?;
        self.authenticate(envelope).await?;
        self.run_call(envelope).await
    }

    /// spec.md §4.4 `validate_structure`.
    ///
    /// Most of the originating framework's structural checks (missing
    /// `call_name`/`module`/`internal` keys, a malformed `args`
    /// sub-structure) are enforced for free by [`RequestEnvelope`]'s typed
    /// `Deserialize` impl - a body missing those fields fails to decode at
    /// all, which [`Dispatcher::handle`] already turns into an
    /// [`InvalidMessageError`] before this method ever runs. What remains
    /// to check here is the one structural rule that depends on server
    /// configuration rather than the wire shape alone: credentials are
    /// required when an auth plugin is installed.
    fn validate_structure(&self, envelope: &RequestEnvelope) -> Result<(), RpcServerError> {
        if self.auth.is_some() && envelope.credentials.is_none() {
            return Err(RpcServerError::AuthenticationError(
                "server requires credentials and none were provided".to_string(),
            ));
        }
        Ok(())
    }

    /// spec.md §4.4 `validate_call`.
    fn validate_call(&self, envelope: &RequestEnvelope) -> Result<(), RpcServerError> {
        if envelope.internal {
            if !INTERNAL_CALL_NAMES.contains(&envelope.call_name.as_str()) {
                return Err(RpcServerError::CallError(format!(
                    "'{}' is not a recognized internal call",
                    envelope.call_name
                )));
            }
            return Ok(());
        }

        let short_module = envelope.module.as_deref().ok_or_else(|| {
            RpcServerError::CallFormatError("module is required for a non-internal call".to_string())
        })?;

        if !self.registry.has_module(short_module) {
            return Err(RpcServerError::ModuleError(format!(
                "module '{short_module}' is not registered"
            )));
        }
        if !self.registry.has_call(short_module, &envelope.call_name) {
            return Err(RpcServerError::CallError(format!(
                "'{}' is not defined on module '{short_module}'",
                envelope.call_name
            )));
        }
        if !self.registry.has_handler(short_module, &envelope.call_name) {
            return Err(RpcServerError::ModuleError(format!(
                "module '{short_module}' is not currently loaded"
            )));
        }

        Ok(())
    }

    /// spec.md §4.4 `authenticate`.
    async fn authenticate(&self, envelope: &RequestEnvelope) -> Result<(), RpcServerError> {
        let Some(plugin) = &self.auth else {
            return Ok(());
        };
        // `validate_structure` already guarantees `credentials` is present
        // whenever a plugin is installed.
        let credentials = envelope.credentials.as_ref().unwrap_or(&Value::Null);
        let outcome = plugin.authenticate(credentials).await;
        if outcome.ok {
            Ok(())
        } else {
            Err(RpcServerError::AuthenticationError(
                outcome.reason.unwrap_or_else(|| "no reason provided".to_string()),
            ))
        }
    }

    /// spec.md §4.4 `run_call`.
    async fn run_call(&self, envelope: &RequestEnvelope) -> Result<Value, RpcServerError> {
        if envelope.internal {
            return self.run_internal_call(envelope).await;
        }

        // `validate_call` already confirmed both the module and the call
        // resolve, so these lookups cannot fail here.
        let short_module = envelope.module.as_deref().unwrap_or_default();
        let handler = self
            .registry
            .handler(short_module, &envelope.call_name)
            .ok_or_else(|| RpcServerError::CallError("handler vanished between validation and invocation".to_string()))?;

        let args = merge_arguments(&envelope.args);
        handler(args)
    }

    async fn run_internal_call(&self, envelope: &RequestEnvelope) -> Result<Value, RpcServerError> {
        match envelope.call_name.as_str() {
            INTERNAL_PROVIDE_DEFINITIONS => {
                let bundle = DefinitionsBundle {
                    definitions: self.registry.definitions(),
                    hash: self.registry.hash(),
                };
                serde_json::to_value(bundle)
                    .map_err(|e| RpcServerError::CallError(format!("failed to encode definitions: {e}")))
            }
            INTERNAL_CURRENT_HASH => Ok(Value::from(self.registry.hash())),
            INTERNAL_AUTH_INFO => match &self.auth {
                Some(plugin) => Ok(plugin.about()),
                None => Ok(Value::Null),
            },
            other => Err(RpcServerError::CallError(format!(
                "'{other}' is not a recognized internal call"
            ))),
        }
    }
}

/// Overlay only the non-null entries of `args` onto an empty invocation
/// argument list (spec.md §4.4 `run_call`).
///
/// The originating framework drops any *falsy* value here (`if value`),
/// which also discards legitimate arguments like `0`, `""`, and `[]`. This
/// is a known bug in that implementation and is deliberately not
/// reproduced: only an explicit JSON `null` is treated as "not provided, let
/// the registered default apply".
fn merge_arguments(args: &Option<CallArguments>) -> CallArguments {
    let Some(args) = args else {
        return CallArguments::default();
    };

    CallArguments {
        varargs: args.varargs.clone(),
        kwargs: args.kwargs.as_ref().map(|kwargs| {
            kwargs
                .iter()
                .filter(|(_, value)| !value.is_null())
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect()
        }),
    }
}
