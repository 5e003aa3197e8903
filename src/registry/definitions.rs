//! The definition table, module map, and definitions hash.

use super::descriptor::ProcedureDescriptor;
use crate::codec::canonical::canonical_hash;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Server-side map: short module name -> (call name -> procedure descriptor).
///
/// A `BTreeMap` rather than a `HashMap` so that serialization order is
/// deterministic, which matters for [`canonical_hash`] (I1/P2): although the
/// canonical encoder sorts keys independently, using an already-ordered map
/// keeps the type's `Debug` output and ordinary JSON encoding stable too,
/// which is friendlier for client-side diffing and logging.
pub type DefinitionTable = BTreeMap<String, BTreeMap<String, ProcedureDescriptor>>;

/// Short module name -> full, dotted module path.
pub type ModuleMap = BTreeMap<String, String>;

/// The server-supplied bundle a client fetches via `provide_definitions`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DefinitionsBundle {
    /// The full definition table.
    pub definitions: DefinitionTable,
    /// The content hash over the table's canonical encoding.
    pub hash: String,
}

/// Compute the definitions hash (I1): a SHA-256 content hash over the
/// canonical (sorted-key) encoding of the definition table.
///
/// Two registration sequences that produce the same final table contents
/// yield the same hash regardless of order (P2), because the canonical
/// encoder sorts map keys independently of insertion order and a
/// `BTreeMap`'s JSON encoding is already key-sorted.
pub fn definitions_hash(table: &DefinitionTable) -> String {
    canonical_hash(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::descriptor::ArgumentDescriptor;

    fn descriptor(doc: &str) -> ProcedureDescriptor {
        ProcedureDescriptor::new(ArgumentDescriptor::positional(["a", "b"]), doc, "demo.math_ops")
    }

    #[test]
    fn hash_is_order_independent_p2() {
        let mut a: DefinitionTable = BTreeMap::new();
        a.entry("math_ops".to_string())
            .or_default()
            .insert("add".to_string(), descriptor("adds"));
        a.entry("math_ops".to_string())
            .or_default()
            .insert("sub".to_string(), descriptor("subtracts"));

        let mut b: DefinitionTable = BTreeMap::new();
        b.entry("math_ops".to_string())
            .or_default()
            .insert("sub".to_string(), descriptor("subtracts"));
        b.entry("math_ops".to_string())
            .or_default()
            .insert("add".to_string(), descriptor("adds"));

        assert_eq!(definitions_hash(&a), definitions_hash(&b));
    }

    #[test]
    fn hash_changes_when_contents_change_i1() {
        let mut a: DefinitionTable = BTreeMap::new();
        a.entry("math_ops".to_string())
            .or_default()
            .insert("add".to_string(), descriptor("adds"));

        let mut b = a.clone();
        b.entry("math_ops".to_string())
            .or_default()
            .insert("mul".to_string(), descriptor("multiplies"));

        assert_ne!(definitions_hash(&a), definitions_hash(&b));
    }
}
