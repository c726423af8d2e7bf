//! # Validation Engine
//!
//! Validates a JSON-like value against a [`SchemaNode`] and, when the value
//! is invalid, computes a *best approximation*: a coerced value that the UI
//! may offer as an auto-correction.
//!
//! ```text
//! value ──► dispatch on value kind ──► match schema.type ──► Valid
//!                                                        └─► Invalid { best_approximation }
//! ```
//!
//! ## Rules
//!
//! - A failed validation is a [`ValidationResult::Invalid`], never an error.
//! - Every approximation is re-validated against the *same* schema before it
//!   is offered. If the re-check fails, no approximation is offered; there is
//!   no chaining beyond a single coercion step.
//! - Strings are never coerced into containers.
//! - Containers are validated element-wise. A single element without an
//!   approximation invalidates the whole container without approximation.
//! - Object keys missing from `schema.properties` are passed through
//!   untouched and do not affect validity.
//!
//! ## Example
//!
//! ```rust
//! use onyxia_core::schema::SchemaNode;
//! use onyxia_core::validation::{validate, ValidationResult};
//! use serde_json::json;
//!
//! let result = validate(&SchemaNode::boolean(), &json!("YES"));
//! assert_eq!(result, ValidationResult::invalid(Some(json!(true))));
//! ```

mod container;
pub mod number;
mod scalar;

use serde_json::Value;

use crate::schema::{SchemaNode, SchemaType};

/// Outcome of validating a value against a schema.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationResult {
    /// The value satisfies the schema as-is.
    Valid,
    /// The value does not satisfy the schema.
    Invalid {
        /// A coerced value satisfying the schema, when one exists
        best_approximation: Option<Value>,
    },
}

impl ValidationResult {
    /// Create an invalid result with an optional approximation.
    pub fn invalid(best_approximation: Option<Value>) -> Self {
        Self::Invalid { best_approximation }
    }

    /// Create an invalid result with no possible approximation.
    pub fn rejected() -> Self {
        Self::Invalid {
            best_approximation: None,
        }
    }

    /// Whether the value satisfied the schema.
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }

    /// The offered approximation, if any.
    pub fn best_approximation(&self) -> Option<&Value> {
        match self {
            Self::Valid => None,
            Self::Invalid { best_approximation } => best_approximation.as_ref(),
        }
    }

    /// Resolve to a usable value: the original when valid, the approximation
    /// when one exists, `None` otherwise.
    pub fn resolve(self, original: &Value) -> Option<Value> {
        match self {
            Self::Valid => Some(original.clone()),
            Self::Invalid { best_approximation } => best_approximation,
        }
    }
}

/// Validate `value` against `schema`.
///
/// Pure function; see the module documentation for the coercion rules.
pub fn validate(schema: &SchemaNode, value: &Value) -> ValidationResult {
    match value {
        Value::String(s) => scalar::validate_string(schema, s),
        Value::Number(n) => match n.as_f64() {
            Some(n) => scalar::validate_number(schema, n),
            None => ValidationResult::rejected(),
        },
        Value::Bool(b) => scalar::validate_bool(schema, *b),
        Value::Null => scalar::validate_null(schema),
        Value::Array(items) => container::validate_array(schema, items),
        Value::Object(entries) => container::validate_object(schema, entries),
    }
}

/// Whether `value` has the JSON shape of `kind`, ignoring every other
/// constraint.
pub fn matches_type(kind: SchemaType, value: &Value) -> bool {
    match kind {
        SchemaType::Object => value.is_object(),
        SchemaType::Array => value.is_array(),
        SchemaType::String => value.is_string(),
        SchemaType::Boolean => value.is_boolean(),
        SchemaType::Integer => value.as_f64().is_some_and(number::is_integral),
        SchemaType::Number => value.is_number(),
    }
}

/// Offer `candidate` as an approximation only if it fully validates against
/// `schema`.
pub(crate) fn offer(schema: &SchemaNode, candidate: Option<Value>) -> ValidationResult {
    match candidate {
        Some(candidate) if validate(schema, &candidate).is_valid() => {
            ValidationResult::invalid(Some(candidate))
        }
        _ => ValidationResult::rejected(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn bounded_integer() -> SchemaNode {
        SchemaNode::integer()
            .with_minimum(0.0)
            .with_slider(None, Some(10.0))
    }

    // ─── Boolean coercion table ─────────────────────────────

    #[test]
    fn string_to_boolean_uses_pair_table() {
        let schema = SchemaNode::boolean();
        assert_eq!(
            validate(&schema, &json!("YES")),
            ValidationResult::invalid(Some(json!(true)))
        );
        assert_eq!(
            validate(&schema, &json!("0")),
            ValidationResult::invalid(Some(json!(false)))
        );
        assert_eq!(
            validate(&schema, &json!("Off")),
            ValidationResult::invalid(Some(json!(false)))
        );
        assert_eq!(
            validate(&schema, &json!("maybe")),
            ValidationResult::rejected()
        );
    }

    #[test]
    fn boolean_string_is_never_valid_as_is() {
        assert!(!validate(&SchemaNode::boolean(), &json!("true")).is_valid());
    }

    // ─── Numeric bounds ─────────────────────────────────────

    #[test]
    fn numeric_string_within_bounds_is_valid() {
        assert!(validate(&bounded_integer(), &json!("7")).is_valid());
        assert!(validate(&SchemaNode::number(), &json!(" 2.5 ")).is_valid());
    }

    #[test]
    fn numeric_prefix_approximates_to_number() {
        assert_eq!(
            validate(&bounded_integer(), &json!("7 cores")),
            ValidationResult::invalid(Some(json!(7)))
        );
    }

    #[test]
    fn numeric_string_above_slider_max_has_no_approximation() {
        assert_eq!(
            validate(&bounded_integer(), &json!("15")),
            ValidationResult::rejected()
        );
    }

    #[test]
    fn fractional_string_fails_integer_rounding_check() {
        assert_eq!(
            validate(&bounded_integer(), &json!("7.5")),
            ValidationResult::rejected()
        );
    }

    #[test]
    fn number_within_bounds_is_valid() {
        assert!(validate(&bounded_integer(), &json!(7)).is_valid());
        assert!(!validate(&bounded_integer(), &json!(-1)).is_valid());
        assert!(validate(&SchemaNode::number(), &json!(7.5)).is_valid());
    }

    #[test]
    fn fractional_number_rounds_for_integer_target() {
        assert_eq!(
            validate(&bounded_integer(), &json!(6.5)),
            ValidationResult::invalid(Some(json!(7)))
        );
        // 10.5 rounds to 11, which breaks sliderMax: no fallback
        assert_eq!(
            validate(&bounded_integer(), &json!(10.5)),
            ValidationResult::rejected()
        );
    }

    #[test]
    fn non_numeric_string_has_no_approximation() {
        assert_eq!(
            validate(&SchemaNode::number(), &json!("x")),
            ValidationResult::rejected()
        );
    }

    // ─── Strings ────────────────────────────────────────────

    #[test]
    fn string_pattern_is_enforced() {
        let schema = SchemaNode::string().with_pattern("^[a-z]+$");
        assert!(validate(&schema, &json!("abc")).is_valid());
        assert_eq!(validate(&schema, &json!("ABC")), ValidationResult::rejected());
    }

    #[test]
    fn slider_unit_string_is_bounded() {
        let schema = SchemaNode::string()
            .with_slider(Some(1.0), Some(50.0))
            .with_slider_unit("Gi");
        assert!(validate(&schema, &json!("10Gi")).is_valid());
        assert!(!validate(&schema, &json!("10Mi")).is_valid());
        assert!(!validate(&schema, &json!("60Gi")).is_valid());
        assert!(!validate(&schema, &json!("Gi")).is_valid());
    }

    #[test]
    fn strings_are_never_coerced_into_containers() {
        let array = SchemaNode::array_of(SchemaNode::string());
        let object = SchemaNode::object_with([]);
        assert_eq!(validate(&array, &json!("[1]")), ValidationResult::rejected());
        assert_eq!(validate(&object, &json!("{}")), ValidationResult::rejected());
    }

    // ─── Number / boolean / null sources ────────────────────

    #[test]
    fn number_to_string_and_boolean() {
        assert_eq!(
            validate(&SchemaNode::string(), &json!(7)),
            ValidationResult::invalid(Some(json!("7")))
        );
        assert_eq!(
            validate(&SchemaNode::boolean(), &json!(0)),
            ValidationResult::invalid(Some(json!(false)))
        );
        assert_eq!(
            validate(&SchemaNode::boolean(), &json!(3)),
            ValidationResult::invalid(Some(json!(true)))
        );
    }

    #[test]
    fn number_to_string_rechecks_pattern() {
        let schema = SchemaNode::string().with_pattern("^[a-z]+$");
        assert_eq!(validate(&schema, &json!(7)), ValidationResult::rejected());
    }

    #[test]
    fn boolean_coercions() {
        assert!(validate(&SchemaNode::boolean(), &json!(true)).is_valid());
        assert_eq!(
            validate(&SchemaNode::string(), &json!(false)),
            ValidationResult::invalid(Some(json!("false")))
        );
        assert_eq!(
            validate(&SchemaNode::integer(), &json!(true)),
            ValidationResult::invalid(Some(json!(1)))
        );
    }

    #[test]
    fn null_coercions() {
        assert_eq!(
            validate(&SchemaNode::string(), &Value::Null),
            ValidationResult::invalid(Some(json!("")))
        );
        assert_eq!(
            validate(&SchemaNode::number(), &Value::Null),
            ValidationResult::invalid(Some(json!(0)))
        );
        // 0 violates the minimum: single coercion step, no fallback
        assert_eq!(
            validate(&SchemaNode::integer().with_minimum(1.0), &Value::Null),
            ValidationResult::rejected()
        );
    }

    // ─── Containers ─────────────────────────────────────────

    #[test]
    fn array_elements_approximate_together() {
        let schema = SchemaNode::array_of(SchemaNode::integer());
        assert_eq!(
            validate(&schema, &json!(["1", 2.5])),
            ValidationResult::invalid(Some(json!(["1", 3])))
        );
        assert!(validate(&schema, &json!(["1", 2])).is_valid());
    }

    #[test]
    fn array_with_unapproximable_element_is_rejected() {
        let schema = SchemaNode::array_of(SchemaNode::integer());
        assert_eq!(
            validate(&schema, &json!(["1", "x"])),
            ValidationResult::rejected()
        );
    }

    #[test]
    fn array_length_bounds() {
        let schema = SchemaNode::array_of(SchemaNode::string()).with_items_len(Some(1), Some(2));
        assert!(!validate(&schema, &json!([])).is_valid());
        assert!(validate(&schema, &json!(["a"])).is_valid());
        assert!(!validate(&schema, &json!(["a", "b", "c"])).is_valid());
    }

    #[test]
    fn object_properties_are_validated_recursively() {
        let schema = SchemaNode::object_with([
            ("replicas".to_string(), SchemaNode::integer().with_minimum(1.0)),
            ("debug".to_string(), SchemaNode::boolean()),
        ]);
        assert!(validate(&schema, &json!({"replicas": 2, "debug": false})).is_valid());
        assert_eq!(
            validate(&schema, &json!({"replicas": "3 pods", "debug": "yes"})),
            ValidationResult::invalid(Some(json!({"replicas": 3, "debug": true})))
        );
        assert_eq!(
            validate(&schema, &json!({"replicas": 0})),
            ValidationResult::rejected()
        );
    }

    #[test]
    fn object_keys_without_schema_pass_through() {
        let schema = SchemaNode::object_with([("replicas".to_string(), SchemaNode::integer())]);
        assert!(validate(&schema, &json!({"replicas": 1, "extra": "kept"})).is_valid());
        assert_eq!(
            validate(&schema, &json!({"replicas": 1.4, "extra": [1]})),
            ValidationResult::invalid(Some(json!({"replicas": 1, "extra": [1]})))
        );
    }

    #[test]
    fn containers_against_scalar_schema_are_rejected() {
        assert_eq!(
            validate(&SchemaNode::string(), &json!([1])),
            ValidationResult::rejected()
        );
        assert_eq!(
            validate(&SchemaNode::integer(), &json!({"a": 1})),
            ValidationResult::rejected()
        );
    }

    #[test]
    fn resolve_prefers_original_then_approximation() {
        let schema = SchemaNode::integer();
        assert_eq!(validate(&schema, &json!(3)).resolve(&json!(3)), Some(json!(3)));
        assert_eq!(
            validate(&schema, &json!("3")).resolve(&json!("3")),
            Some(json!("3"))
        );
        assert_eq!(
            validate(&schema, &json!("3px")).resolve(&json!("3px")),
            Some(json!(3))
        );
        assert_eq!(validate(&schema, &json!("x")).resolve(&json!("x")), None);
    }

    // ─── Properties ─────────────────────────────────────────

    fn scalar_schema() -> impl Strategy<Value = SchemaNode> {
        prop_oneof![
            Just(SchemaNode::string()),
            Just(SchemaNode::boolean()),
            Just(SchemaNode::integer()),
            Just(SchemaNode::number()),
            Just(bounded_integer()),
            Just(SchemaNode::string().with_pattern("^[0-9]+$")),
        ]
    }

    fn scalar_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            (-1_000i64..1_000).prop_map(Value::from),
            (-1_000.0f64..1_000.0).prop_map(Value::from),
            "[a-zA-Z0-9.]{0,6}".prop_map(Value::String),
            Just(Value::Null),
        ]
    }

    proptest! {
        #[test]
        fn valid_values_stay_valid_without_approximation(n in 0i64..=10, b in any::<bool>()) {
            prop_assert_eq!(validate(&bounded_integer(), &json!(n)), ValidationResult::Valid);
            prop_assert_eq!(validate(&SchemaNode::boolean(), &json!(b)), ValidationResult::Valid);
            let strings = SchemaNode::array_of(SchemaNode::string());
            prop_assert_eq!(
                validate(&strings, &json!([n.to_string()])),
                ValidationResult::Valid
            );
        }

        #[test]
        fn approximations_match_schema_type(schema in scalar_schema(), value in scalar_value()) {
            if let Some(approx) = validate(&schema, &value).best_approximation() {
                prop_assert!(matches_type(schema.kind, approx));
                prop_assert!(validate(&schema, approx).is_valid());
            }
        }

        #[test]
        fn approximations_are_fixed_points(schema in scalar_schema(), value in scalar_value()) {
            let first = validate(&schema, &value);
            if let Some(approx) = first.best_approximation() {
                prop_assert_eq!(validate(&schema, approx), ValidationResult::Valid);
            }
        }
    }
}
