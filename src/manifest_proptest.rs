//! Property-based tests for manifest normalization.
//!
//! These tests use proptest to generate random rule mappings and verify that
//! the invariants of `ValidatedManifest` hold for all of them.

#[cfg(test)]
mod proptest_tests {
    use crate::manifest::{
        IntegerRule, ManifestValidator, ParamRule, ResourceCategory, ResourceRule,
        ValidatedManifest,
    };
    use proptest::prelude::*;
    use serde_json::{json, Value};

    const ADDRESS: &str = "https://github.com/org/repo.git";

    fn normalize(document: &Value) -> ValidatedManifest {
        ManifestValidator::default()
            .normalize(&document.to_string(), ADDRESS)
            .unwrap()
    }

    fn assert_integer_invariants(rule: &IntegerRule) -> Result<(), TestCaseError> {
        prop_assert!(rule.min <= rule.default_value);
        prop_assert!(rule.default_value <= rule.max);
        prop_assert!(rule.step > 0);
        Ok(())
    }

    /// Optional integer field, sometimes absent.
    fn maybe_int() -> impl Strategy<Value = Option<i64>> {
        prop::option::of(-1000i64..1000)
    }

    fn integer_rule_value() -> impl Strategy<Value = Value> {
        (maybe_int(), maybe_int(), maybe_int(), maybe_int()).prop_map(|(default, min, max, step)| {
            let mut rule = serde_json::Map::new();
            for (key, value) in [("default_value", default), ("min", min), ("max", max), ("step", step)] {
                if let Some(v) = value {
                    rule.insert(key.to_string(), json!(v));
                }
            }
            Value::Object(rule)
        })
    }

    // ============================================================================
    // Catalog properties
    // ============================================================================

    proptest! {
        /// Property: names outside the resource catalog never survive
        #[test]
        fn unknown_resource_names_are_dropped(name in "[a-z_]{1,16}", default in 1i64..100) {
            prop_assume!(ResourceCategory::of(&name).is_none());
            let manifest = normalize(&json!({
                "slurm_input_rules": { name.clone(): { "default_value": default } }
            }));
            prop_assert!(!manifest.slurm_input_rules.contains_key(&name));
        }

        /// Property: a missing max is exactly twice the default
        #[test]
        fn missing_max_is_twice_default(default in 0i64..1_000_000) {
            let manifest = normalize(&json!({
                "slurm_input_rules": { "cpu_per_task": { "default_value": default } },
                "param_rules": { "n": { "type": "integer", "default_value": default } }
            }));
            // A zero default is still a default
            match manifest.slurm_input_rules.get("cpu_per_task") {
                Some(ResourceRule::Integer(rule)) => prop_assert_eq!(rule.max, default * 2),
                other => prop_assert!(false, "unexpected rule {:?}", other),
            }
            match manifest.param_rules.get("n") {
                Some(ParamRule::Integer(rule)) => prop_assert_eq!(rule.max, default * 2),
                other => prop_assert!(false, "unexpected rule {:?}", other),
            }
        }

        /// Property: a default missing from options is appended exactly once
        #[test]
        fn default_appended_to_options_once(
            options in prop::collection::vec("[a-z]{1,6}", 0..6),
            default in "[A-Z]{1,6}",
        ) {
            let manifest = normalize(&json!({
                "param_rules": {
                    "p": { "type": "string_option", "default_value": default, "options": options }
                }
            }));
            match manifest.param_rules.get("p") {
                Some(ParamRule::StringOption(rule)) => {
                    let mut expected = options.clone();
                    expected.push(default.clone());
                    prop_assert_eq!(&rule.options, &expected);
                    prop_assert_eq!(rule.options.iter().filter(|o| **o == default).count(), 1);
                }
                other => prop_assert!(false, "unexpected rule {:?}", other),
            }
        }
    }

    // ============================================================================
    // Invariant properties
    // ============================================================================

    proptest! {
        /// Property: every surviving integer rule is internally consistent
        #[test]
        fn surviving_integer_rules_are_consistent(
            time in integer_rule_value(),
            gpus in integer_rule_value(),
            param in integer_rule_value(),
        ) {
            let mut param = param;
            if let Value::Object(fields) = &mut param {
                fields.insert("type".to_string(), json!("integer"));
            }
            let manifest = normalize(&json!({
                "slurm_input_rules": { "time": time, "gpus": gpus },
                "param_rules": { "p": param }
            }));

            for rule in manifest.slurm_input_rules.values() {
                if let ResourceRule::Integer(rule) = rule {
                    assert_integer_invariants(rule)?;
                }
            }
            for rule in manifest.param_rules.values() {
                if let ParamRule::Integer(rule) = rule {
                    assert_integer_invariants(rule)?;
                }
            }
        }

        /// Property: the default cluster is always supported
        #[test]
        fn default_hpc_is_supported(
            supported in prop::option::of(prop::collection::vec("[a-z]{1,8}", 0..4)),
            default in prop::option::of("[a-z]{0,8}"),
        ) {
            let mut document = serde_json::Map::new();
            if let Some(supported) = supported {
                document.insert("supported_hpc".to_string(), json!(supported));
            }
            if let Some(default) = default {
                document.insert("default_hpc".to_string(), json!(default));
            }
            let manifest = normalize(&Value::Object(document));
            prop_assert!(manifest.supported_hpc.contains(&manifest.default_hpc));
        }

        /// Property: normalizing a normalized manifest changes nothing
        #[test]
        fn normalization_is_idempotent(
            time in integer_rule_value(),
            memory in integer_rule_value(),
            param in integer_rule_value(),
            options in prop::collection::vec("[a-z]{1,4}", 0..4),
        ) {
            let mut param = param;
            if let Value::Object(fields) = &mut param {
                fields.insert("type".to_string(), json!("integer"));
            }
            let mut memory = memory;
            if let Value::Object(fields) = &mut memory {
                fields.insert("unit".to_string(), json!("GB"));
            }
            let first = normalize(&json!({
                "name": "prop",
                "slurm_input_rules": {
                    "time": time,
                    "memory": memory,
                    "partition": { "default_value": "cpu", "options": options }
                },
                "param_rules": { "p": param }
            }));
            let reparsed: Value = serde_json::to_value(&first).unwrap();
            let second = normalize(&reparsed);
            prop_assert_eq!(&first, &second);
        }
    }
}
