//! Server-side call registration (spec.md §4.3).
//!
//! Captures callable signatures into [`descriptor::ProcedureDescriptor`]s,
//! groups them by short module name, and maintains the definitions hash
//! (I1) alongside a parallel runtime procedure map the dispatcher invokes
//! through.

pub mod definitions;
pub mod descriptor;

use crate::envelope::CallArguments;
use crate::error::{ReservedCallNameError, RpcServerError};
use definitions::{definitions_hash, DefinitionTable, ModuleMap};
use descriptor::{ArgumentDescriptor, ProcedureDescriptor};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

/// Call names reserved for the built-in administrative surface
/// (spec.md §6). Registering a user procedure under one of these is an
/// error on both the client and server registration paths.
pub const RESERVED_CALL_NAMES: &[&str] = &[
    "provide_definitions",
    "current_hash",
    "authentication_provider_info",
];

/// A registered procedure's implementation.
///
/// Takes the reconstructed argument list (spec.md §4.4 `run_call`: defaults
/// already overlaid by the dispatcher) and returns either the procedure's
/// return value or a server error.
pub type Handler = Arc<dyn Fn(CallArguments) -> Result<Value, RpcServerError> + Send + Sync>;

struct RegistryState {
    definitions: DefinitionTable,
    module_map: ModuleMap,
    handlers: BTreeMap<String, BTreeMap<String, Handler>>,
    hash: String,
}

impl RegistryState {
    fn new() -> Self {
        let definitions = DefinitionTable::new();
        Self {
            hash: definitions_hash(&definitions),
            definitions,
            module_map: ModuleMap::new(),
            handlers: BTreeMap::new(),
        }
    }
}

/// Process-wide registry of callable procedures.
///
/// Cheap to clone: internally an `Arc<RwLock<_>>`, so every clone observes
/// the same registrations. Registration is a process-wide side effect and
/// is safe to call before the dispatcher's run loop starts (spec.md §4.3).
#[derive(Clone)]
pub struct Registry {
    state: Arc<RwLock<RegistryState>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::new())),
        }
    }

    /// Register a procedure under `(short_module, call_name)`.
    ///
    /// Replaces any procedure previously registered under the same pair
    /// (I2: last-writer-wins) and recomputes the definitions hash (I1)
    /// over the canonical encoding of the resulting table.
    ///
    /// # Errors
    ///
    /// Returns [`ReservedCallNameError`] if `call_name` is one of
    /// [`RESERVED_CALL_NAMES`] - those are served directly by the
    /// dispatcher's internal-call path and can never be shadowed.
    #[allow(clippy::too_many_arguments)]
    pub fn register(
        &self,
        short_module: impl Into<String>,
        full_module: impl Into<String>,
        call_name: impl Into<String>,
        args: ArgumentDescriptor,
        doc: impl Into<String>,
        handler: Handler,
    ) -> Result<(), ReservedCallNameError> {
        let short_module = short_module.into();
        let full_module = full_module.into();
        let call_name = call_name.into();

        if RESERVED_CALL_NAMES.contains(&call_name.as_str()) {
            return Err(ReservedCallNameError(call_name));
        }

        let descriptor = ProcedureDescriptor::new(args, doc, full_module.clone());

        let mut state = self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        state
            .definitions
            .entry(short_module.clone())
            .or_default()
            .insert(call_name.clone(), descriptor);
        state
            .module_map
            .insert(short_module.clone(), full_module);
        state
            .handlers
            .entry(short_module)
            .or_default()
            .insert(call_name, handler);

        state.hash = definitions_hash(&state.definitions);

        Ok(())
    }

    /// A snapshot of the current definition table.
    pub fn definitions(&self) -> DefinitionTable {
        self.read().definitions.clone()
    }

    /// A snapshot of the current module map.
    pub fn module_map(&self) -> ModuleMap {
        self.read().module_map.clone()
    }

    /// The current definitions hash.
    pub fn hash(&self) -> String {
        self.read().hash.clone()
    }

    /// Look up a registered procedure's full module path, if the module is
    /// known.
    pub fn full_module(&self, short_module: &str) -> Option<String> {
        self.read().module_map.get(short_module).cloned()
    }

    /// True when `short_module` appears in the definition table.
    pub fn has_module(&self, short_module: &str) -> bool {
        self.read().definitions.contains_key(short_module)
    }

    /// True when `(short_module, call_name)` is a registered descriptor.
    pub fn has_call(&self, short_module: &str, call_name: &str) -> bool {
        self.read()
            .definitions
            .get(short_module)
            .is_some_and(|table| table.contains_key(call_name))
    }

    /// True when `(short_module, call_name)` has a runtime handler
    /// installed - spec.md I4's second resolution leg ("the full module
    /// loaded in the process").
    pub fn has_handler(&self, short_module: &str, call_name: &str) -> bool {
        self.read()
            .handlers
            .get(short_module)
            .is_some_and(|table| table.contains_key(call_name))
    }

    /// Fetch the handler for `(short_module, call_name)`, if registered.
    pub fn handler(&self, short_module: &str, call_name: &str) -> Option<Handler> {
        self.read()
            .handlers
            .get(short_module)
            .and_then(|table| table.get(call_name))
            .cloned()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, RegistryState> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop_handler() -> Handler {
        Arc::new(|_args| Ok(Value::Null))
    }

    #[test]
    fn register_then_fetch_matches_s1() {
        let registry = Registry::new();
        registry
            .register(
                "math_ops",
                "demo.math_ops",
                "add",
                ArgumentDescriptor::positional(["a", "b"]),
                "",
                noop_handler(),
            )
            .unwrap();

        let defs = registry.definitions();
        let add = &defs["math_ops"]["add"];
        assert_eq!(add.args.as_ref().unwrap().positional, vec!["a", "b"]);
        assert_eq!(add.module, "demo.math_ops");
        assert_eq!(registry.hash(), definitions_hash(&defs));
    }

    #[test]
    fn re_registration_replaces_last_writer_wins_i2() {
        let registry = Registry::new();
        registry
            .register("t", "demo.t", "echo", ArgumentDescriptor::positional(["x"]), "v1", noop_handler())
            .unwrap();
        registry
            .register("t", "demo.t", "echo", ArgumentDescriptor::positional(["x", "y"]), "v2", noop_handler())
            .unwrap();

        let defs = registry.definitions();
        let echo = &defs["t"]["echo"];
        assert_eq!(echo.doc, "v2");
        assert_eq!(echo.args.as_ref().unwrap().positional.len(), 2);
    }

    #[test]
    fn reserved_call_name_is_rejected() {
        let registry = Registry::new();
        let result = registry.register(
            "t",
            "demo.t",
            "current_hash",
            ArgumentDescriptor::default(),
            "",
            noop_handler(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn handler_runs_and_resolution_checks_pass() {
        let registry = Registry::new();
        registry
            .register(
                "math_ops",
                "demo.math_ops",
                "add",
                ArgumentDescriptor::positional(["a", "b"]),
                "",
                Arc::new(|args| {
                    let nums: Vec<i64> = args
                        .varargs
                        .unwrap_or_default()
                        .iter()
                        .map(|v| v.as_i64().unwrap_or(0))
                        .collect();
                    Ok(json!(nums.iter().sum::<i64>()))
                }),
            )
            .unwrap();

        assert!(registry.has_module("math_ops"));
        assert!(registry.has_call("math_ops", "add"));
        assert!(registry.has_handler("math_ops", "add"));

        let handler = registry.handler("math_ops", "add").unwrap();
        let result = handler(CallArguments {
            varargs: Some(vec![json!(2), json!(3)]),
            kwargs: None,
        })
        .unwrap();
        assert_eq!(result, json!(5));
    }
}
