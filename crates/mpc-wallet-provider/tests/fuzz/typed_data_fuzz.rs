//! Fuzz tests for typed-data validation
//!
//! Property-based testing to find edge cases in payload parsing and
//! structural checks. Uses proptest for generating random test inputs.

use mpc_wallet_provider::typed_data::{self, TypedData, TypedDataError};
use proptest::prelude::*;
use serde_json::{Map, Value, json};

// ============================================================================
// Strategies for generating test data
// ============================================================================

/// Generate an arbitrary JSON value
fn json_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(4, 32, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..6)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>())),
        ]
    })
}

/// Generate a type name, primitive or struct
fn field_type_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("uint256".to_string()),
        Just("address".to_string()),
        Just("string".to_string()),
        Just("bytes32".to_string()),
        Just("bool".to_string()),
        Just("Inner".to_string()),
        Just("Inner[]".to_string()),
        Just("uint8[2]".to_string()),
        "[A-Z][a-z]{0,5}",
    ]
}

/// Generate a random Ethereum-like address
fn address_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("0x[a-fA-F0-9]{40}").unwrap()
}

/// Generate a payload with random declared fields and a random message
fn payload_strategy() -> impl Strategy<Value = Value> {
    (
        prop::collection::vec(("[a-z]{1,6}", field_type_strategy()), 1..5),
        json_strategy(),
    )
        .prop_map(|(fields, message)| {
            let fields: Vec<Value> = fields
                .into_iter()
                .map(|(name, kind)| json!({ "name": name, "type": kind }))
                .collect();
            json!({
                "types": {
                    "Outer": fields,
                    "Inner": [{ "name": "x", "type": "uint256" }]
                },
                "domain": {},
                "message": message
            })
        })
}

// ============================================================================
// Parsing Fuzzing
// ============================================================================

proptest! {
    /// Validation never panics, whatever the input
    #[test]
    fn validate_never_panics(value in json_strategy()) {
        let result = typed_data::validate(&value);
        prop_assert!(result.is_ok() || result.is_err());
    }

    /// Arbitrary text never panics either
    #[test]
    fn parse_text_never_panics(text in ".{0,64}") {
        let _ = TypedData::parse(&text);
    }

    /// Non-object payloads are always refused
    #[test]
    fn non_objects_rejected(value in json_strategy()) {
        prop_assume!(!value.is_object() && !value.is_string());
        prop_assert_eq!(typed_data::validate(&value), Err(TypedDataError::NotAnObject));
    }

    /// Random structures never panic and name a declared root on success
    #[test]
    fn random_structures_are_handled(payload in payload_strategy()) {
        if let Ok(root) = typed_data::validate(&payload) {
            prop_assert!(root == "Outer" || root == "Inner");
        }
    }
}

// ============================================================================
// Address Fuzzing
// ============================================================================

proptest! {
    /// Canonical addresses always pass
    #[test]
    fn canonical_addresses_pass(address in address_strategy()) {
        prop_assert!(typed_data::is_valid_address(&address));

        let payload = json!({
            "types": { "Holder": [{ "name": "wallet", "type": "address" }] },
            "domain": {},
            "message": { "wallet": address }
        });
        prop_assert_eq!(typed_data::validate(&payload), Ok("Holder".to_string()));
    }

    /// Anything of the wrong length fails
    #[test]
    fn short_addresses_fail(digits in "[a-f0-9]{0,39}") {
        let address = format!("0x{}", digits);
        prop_assert!(!typed_data::is_valid_address(&address));
    }

    /// Missing required fields are always named
    #[test]
    fn missing_field_is_named(name in "[a-z]{1,8}") {
        let payload = json!({
            "types": { "Record": [{ "name": name, "type": "uint256" }] },
            "domain": {},
            "message": {}
        });
        prop_assert_eq!(
            typed_data::validate(&payload),
            Err(TypedDataError::MissingField(name.clone()))
        );
    }
}
