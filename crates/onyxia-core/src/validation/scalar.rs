//! Rules for string, number, boolean and null source values.
//!
//! Every rule enumerates all schema types; there is no catch-all arm.

use serde_json::Value;

use super::number::{
    format_number, number_value, parse_float_prefix, round_half_up, satisfies_numeric,
    within_slider,
};
use super::{offer, ValidationResult};
use crate::schema::{SchemaNode, SchemaType};

/// Case-insensitive string spellings of booleans, highest priority first.
const BOOLEAN_SPELLINGS: [(&str, &str); 4] =
    [("true", "false"), ("yes", "no"), ("1", "0"), ("on", "off")];

pub(super) fn validate_string(schema: &SchemaNode, value: &str) -> ValidationResult {
    match schema.kind {
        SchemaType::String => {
            if string_satisfies(schema, value) {
                ValidationResult::Valid
            } else {
                ValidationResult::rejected()
            }
        }
        SchemaType::Boolean => ValidationResult::invalid(boolean_from_str(value).map(Value::Bool)),
        SchemaType::Integer | SchemaType::Number => {
            let parsed = parse_float_prefix(value);
            match parsed {
                // A field holding exactly a number in range is already valid
                Some(n) if is_whole_number(value, n) && satisfies_numeric(schema, n) => {
                    ValidationResult::Valid
                }
                _ => offer(schema, parsed.and_then(number_value)),
            }
        }
        SchemaType::Array | SchemaType::Object => ValidationResult::rejected(),
    }
}

/// Whether the whole of `value`, not just a prefix, reads as `n`.
fn is_whole_number(value: &str, n: f64) -> bool {
    value.trim().parse::<f64>().is_ok_and(|whole| whole == n)
}

pub(super) fn validate_number(schema: &SchemaNode, value: f64) -> ValidationResult {
    match schema.kind {
        SchemaType::Number => {
            if satisfies_numeric(schema, value) {
                ValidationResult::Valid
            } else {
                ValidationResult::rejected()
            }
        }
        SchemaType::Integer => {
            if satisfies_numeric(schema, value) {
                ValidationResult::Valid
            } else if value.is_finite() && value.fract() != 0.0 {
                offer(schema, number_value(round_half_up(value)))
            } else {
                ValidationResult::rejected()
            }
        }
        SchemaType::String => offer(schema, Some(Value::String(format_number(value)))),
        SchemaType::Boolean => ValidationResult::invalid(Some(Value::Bool(value != 0.0))),
        SchemaType::Array | SchemaType::Object => ValidationResult::rejected(),
    }
}

pub(super) fn validate_bool(schema: &SchemaNode, value: bool) -> ValidationResult {
    match schema.kind {
        SchemaType::Boolean => ValidationResult::Valid,
        SchemaType::String => offer(schema, Some(Value::String(value.to_string()))),
        SchemaType::Integer | SchemaType::Number => {
            offer(schema, Some(Value::from(u8::from(value))))
        }
        SchemaType::Array | SchemaType::Object => ValidationResult::rejected(),
    }
}

pub(super) fn validate_null(schema: &SchemaNode) -> ValidationResult {
    match schema.kind {
        SchemaType::String => offer(schema, Some(Value::String(String::new()))),
        SchemaType::Integer | SchemaType::Number => offer(schema, Some(Value::from(0))),
        SchemaType::Boolean => ValidationResult::invalid(Some(Value::Bool(false))),
        SchemaType::Array | SchemaType::Object => ValidationResult::rejected(),
    }
}

/// Pattern and slider-unit checks for a string target.
fn string_satisfies(schema: &SchemaNode, value: &str) -> bool {
    if schema.pattern.as_ref().is_some_and(|pattern| !pattern.is_match(value)) {
        return false;
    }

    if let Some(unit) = &schema.slider_unit {
        if !value.ends_with(unit.as_str()) {
            return false;
        }
        return parse_float_prefix(value).is_some_and(|n| within_slider(schema, n));
    }

    true
}

fn boolean_from_str(value: &str) -> Option<bool> {
    let lowered = value.to_lowercase();
    BOOLEAN_SPELLINGS.iter().find_map(|(yes, no)| {
        if lowered == *yes {
            Some(true)
        } else if lowered == *no {
            Some(false)
        } else {
            None
        }
    })
}
