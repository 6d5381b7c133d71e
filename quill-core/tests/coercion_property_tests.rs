//! Property-Based Tests for Value Coercions
//!
//! Properties:
//! - ToString then ToNumber gives back every finite number
//! - Surrounding whitespace never changes ToNumber
//! - Integers print and parse the way their decimal form reads
//! - A number loosely equals its own string form
//! - ToInt32 wraps like a two's complement cast
//! - JSON without floats survives a trip through `Value`

use proptest::prelude::*;
use quill_core::{number_to_string, string_to_number, to_int32, Value};

// ============================================================================
// ARBITRATORS
// ============================================================================

fn arb_finite() -> impl Strategy<Value = f64> {
    any::<f64>().prop_filter("finite", |n| n.is_finite())
}

/// Integers that f64 holds exactly.
fn arb_safe_integer() -> impl Strategy<Value = i64> {
    -(1i64 << 53)..(1i64 << 53)
}

fn arb_json() -> impl Strategy<Value = serde_json::Value> {
    let leaf = prop_oneof![
        Just(serde_json::Value::Null),
        any::<bool>().prop_map(serde_json::Value::Bool),
        any::<i32>().prop_map(serde_json::Value::from),
        "[a-zA-Z0-9 ]{0,8}".prop_map(serde_json::Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(serde_json::Value::Array),
            prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                .prop_map(|map| serde_json::Value::Object(map.into_iter().collect())),
        ]
    })
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #[test]
    fn prop_number_string_round_trip(n in arb_finite()) {
        let printed = number_to_string(n);
        let parsed = string_to_number(&printed);
        // -0 prints as "0"; the two compare equal.
        prop_assert_eq!(parsed, n, "printed {}", printed);
    }

    #[test]
    fn prop_whitespace_is_ignored(n in arb_finite(), pad in "[ \t\n\r]{0,3}") {
        let printed = number_to_string(n);
        let padded = format!("{}{}{}", pad, printed, pad);
        prop_assert_eq!(string_to_number(&padded), string_to_number(&printed));
    }

    #[test]
    fn prop_integers_read_as_written(i in arb_safe_integer()) {
        prop_assert_eq!(Value::Number(i as f64).to_js_string(), i.to_string());
        prop_assert_eq!(Value::string(i.to_string()).to_number(), i as f64);
    }

    #[test]
    fn prop_number_loosely_equals_its_string(n in arb_finite()) {
        let number = Value::Number(n);
        let string = Value::string(number_to_string(n));
        prop_assert!(number.loose_equals(&string));
        prop_assert!(!number.strict_equals(&string));
    }

    #[test]
    fn prop_to_int32_wraps(i in arb_safe_integer()) {
        prop_assert_eq!(to_int32(i as f64), i as i32);
    }

    #[test]
    fn prop_json_round_trip(json in arb_json()) {
        let value = Value::from(json.clone());
        prop_assert_eq!(value.to_json(), json);
    }
}
