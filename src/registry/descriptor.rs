//! Procedure signature descriptors.
//!
//! Captures a procedure's calling convention - positional parameters,
//! keyword parameters with defaults, and catch-all `*args`/`**kwargs`
//! equivalents - into a transport-neutral shape a client can render a stub
//! from without ever seeing the procedure's implementation.
//!
//! # Rust has no runtime signature introspection
//!
//! The originating framework captures this by inspecting a live Python
//! function object (`inspect.getargspec`). Rust closures carry no such
//! metadata at runtime, so [`ArgumentDescriptor`] is built explicitly by
//! the caller of [`crate::registry::Registry::register`] rather than
//! derived from the handler. [`ArgumentDescriptor::positional`] is the
//! common case and reads close to a parameter list; [`ArgumentDescriptor::new`]
//! exposes every slot for the rarer keyword/varargs/kwargs-catch-all shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A procedure's argument-taking shape.
///
/// The four slots mirror spec.md §3 exactly: `positional` names have no
/// default, `kw` names carry a default value, and the two catch-all slots
/// are optional identifiers for a `*varargs`/`**kwargs`-style parameter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ArgumentDescriptor {
    /// Ordered positional-only parameter names (no default).
    pub positional: Vec<String>,
    /// Keyword parameters with their default value, in declaration order.
    pub kw: BTreeMap<String, Value>,
    /// Identifier of a catch-all positional parameter, if any.
    pub varargs_name: Option<String>,
    /// Identifier of a catch-all keyword parameter, if any.
    pub kwargs_name: Option<String>,
}

impl ArgumentDescriptor {
    /// Build a descriptor from every slot.
    pub fn new(
        positional: Vec<String>,
        kw: BTreeMap<String, Value>,
        varargs_name: Option<String>,
        kwargs_name: Option<String>,
    ) -> Self {
        Self {
            positional,
            kw,
            varargs_name,
            kwargs_name,
        }
    }

    /// Build a descriptor for a procedure taking only positional parameters
    /// with no defaults, no catch-alls - the common case.
    pub fn positional(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            positional: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// True when every slot is empty - the "no args" sentinel of spec.md §3.
    pub fn is_empty(&self) -> bool {
        self.positional.is_empty()
            && self.kw.is_empty()
            && self.varargs_name.is_none()
            && self.kwargs_name.is_none()
    }
}

/// A procedure's descriptor as exposed over the wire: its argument shape,
/// cleaned docstring, and the full module path it lives under on the
/// server.
///
/// `args` is `None` for the "no args" sentinel (spec.md §3); callers that
/// want the positive form should check [`ArgumentDescriptor::is_empty`]
/// before constructing one, which [`ProcedureDescriptor::new`] does for you.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcedureDescriptor {
    /// The argument descriptor, or `None` when the procedure takes no
    /// arguments at all.
    pub args: Option<ArgumentDescriptor>,
    /// The procedure's cleaned-up docstring (leading/trailing whitespace
    /// trimmed, common indentation stripped). Empty string if undocumented.
    pub doc: String,
    /// The full, dotted module path the procedure is registered under on
    /// the server (for diagnostics; clients resolve calls by short module
    /// name + call name, never by this field).
    pub module: String,
}

impl ProcedureDescriptor {
    /// Build a descriptor, collapsing an empty [`ArgumentDescriptor`] to the
    /// `None` sentinel per spec.md §3.
    pub fn new(args: ArgumentDescriptor, doc: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            args: if args.is_empty() { None } else { Some(args) },
            doc: clean_doc(doc.into()),
            module: module.into(),
        }
    }
}

/// Clean a docstring the way `inspect.cleandoc` does: strip leading and
/// trailing blank lines, and remove the common leading whitespace from all
/// but the first line.
fn clean_doc(raw: String) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();

    while lines.first().is_some_and(|l| l.trim().is_empty()) {
        lines.remove(0);
    }
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    if lines.is_empty() {
        return String::new();
    }

    let common_indent = lines
        .iter()
        .skip(1)
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);

    let mut cleaned = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            cleaned.push(line.trim_start().to_string());
        } else if line.len() >= common_indent {
            cleaned.push(line[common_indent..].to_string());
        } else {
            cleaned.push(line.trim_start().to_string());
        }
    }

    cleaned.join("\n")
}
