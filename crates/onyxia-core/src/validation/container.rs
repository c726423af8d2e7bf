//! Rules for array and object source values.

use serde_json::{Map, Value};

use super::{validate, ValidationResult};
use crate::schema::{SchemaNode, SchemaType};

/// Per-element outcome folded into a container result.
enum Fold {
    AllValid,
    Approximated,
    Unapproximable,
}

pub(super) fn validate_array(schema: &SchemaNode, items: &[Value]) -> ValidationResult {
    match schema.kind {
        SchemaType::Array => {}
        SchemaType::Object
        | SchemaType::String
        | SchemaType::Boolean
        | SchemaType::Integer
        | SchemaType::Number => return ValidationResult::rejected(),
    }

    let min_items = schema.min_items.unwrap_or(0);
    let max_items = schema.max_items.unwrap_or(usize::MAX);
    if items.len() < min_items || items.len() > max_items {
        return ValidationResult::rejected();
    }

    let Some(item_schema) = schema.items.as_deref() else {
        return ValidationResult::Valid;
    };

    let mut fold = Fold::AllValid;
    let mut approximated = Vec::with_capacity(items.len());
    for item in items {
        match validate(item_schema, item) {
            ValidationResult::Valid => approximated.push(item.clone()),
            ValidationResult::Invalid {
                best_approximation: Some(approx),
            } => {
                fold = Fold::Approximated;
                approximated.push(approx);
            }
            ValidationResult::Invalid {
                best_approximation: None,
            } => {
                fold = Fold::Unapproximable;
                break;
            }
        }
    }

    match fold {
        Fold::AllValid => ValidationResult::Valid,
        Fold::Approximated => ValidationResult::invalid(Some(Value::Array(approximated))),
        Fold::Unapproximable => ValidationResult::rejected(),
    }
}

pub(super) fn validate_object(schema: &SchemaNode, entries: &Map<String, Value>) -> ValidationResult {
    match schema.kind {
        SchemaType::Object => {}
        SchemaType::Array
        | SchemaType::String
        | SchemaType::Boolean
        | SchemaType::Integer
        | SchemaType::Number => return ValidationResult::rejected(),
    }

    let Some(properties) = schema.properties.as_ref() else {
        return ValidationResult::Valid;
    };

    let mut fold = Fold::AllValid;
    let mut approximated = Map::with_capacity(entries.len());
    for (key, value) in entries {
        // Keys unknown to the schema are carried over untouched.
        let Some(property_schema) = properties.get(key) else {
            approximated.insert(key.clone(), value.clone());
            continue;
        };
        match validate(property_schema, value) {
            ValidationResult::Valid => {
                approximated.insert(key.clone(), value.clone());
            }
            ValidationResult::Invalid {
                best_approximation: Some(approx),
            } => {
                fold = Fold::Approximated;
                approximated.insert(key.clone(), approx);
            }
            ValidationResult::Invalid {
                best_approximation: None,
            } => {
                fold = Fold::Unapproximable;
                break;
            }
        }
    }

    match fold {
        Fold::AllValid => ValidationResult::Valid,
        Fold::Approximated => ValidationResult::invalid(Some(Value::Object(approximated))),
        Fold::Unapproximable => ValidationResult::rejected(),
    }
}
