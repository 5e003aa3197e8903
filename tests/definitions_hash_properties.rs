#![allow(clippy::expect_used, clippy::unwrap_used)]

//! Property tests for the definitions hash (P2): any two registration
//! orders that converge on the same final table contents must hash equal.

// Layer 2: Third-party crate imports
use proptest::prelude::*;

// Layer 3: Internal module imports
use amqp_rpc_core::registry::descriptor::ArgumentDescriptor;
use amqp_rpc_core::registry::Registry;
use std::sync::Arc;

fn call_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{3,8}", 1..6).prop_map(|mut names| {
        names.sort();
        names.dedup();
        names
    })
}

proptest! {
    #[test]
    fn hash_is_independent_of_registration_order(mut names in call_names()) {
        let forward = Registry::new();
        for name in &names {
            forward
                .register("t", "demo.t", name.clone(), ArgumentDescriptor::positional(["x"]), "", Arc::new(|_| Ok(serde_json::Value::Null)))
                .expect("call name is not reserved");
        }

        names.reverse();
        let reversed = Registry::new();
        for name in &names {
            reversed
                .register("t", "demo.t", name.clone(), ArgumentDescriptor::positional(["x"]), "", Arc::new(|_| Ok(serde_json::Value::Null)))
                .expect("call name is not reserved");
        }

        prop_assert_eq!(forward.hash(), reversed.hash());
        prop_assert_eq!(forward.definitions(), reversed.definitions());
    }
}
