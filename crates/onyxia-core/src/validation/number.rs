//! Numeric helpers shared by the scalar and container rules.
//!
//! Form fields arrive as free text, so numbers are read the lenient way a
//! browser's `parseFloat` reads them: the longest numeric prefix wins and
//! trailing units (`"2Gi"`, `"500m"`) are ignored.

use serde_json::{Number, Value};

use crate::schema::{SchemaNode, SchemaType};

/// Largest integer magnitude an `f64` represents exactly (2^53).
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Parse the longest leading float literal of `input`.
///
/// Leading whitespace is skipped. Accepts an optional sign, `Infinity`,
/// digits with an optional fractional part, and an exponent only when it is
/// followed by at least one digit. Returns `None` when no digit is found.
pub fn parse_float_prefix(input: &str) -> Option<f64> {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    if s[end..].starts_with("Infinity") {
        let negative = bytes.first() == Some(&b'-');
        return Some(if negative {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        });
    }

    let mut mantissa_digits = 0;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
        mantissa_digits += 1;
    }
    if bytes.get(end) == Some(&b'.') {
        let mut frac_end = end + 1;
        let mut frac_digits = 0;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
            frac_digits += 1;
        }
        if mantissa_digits + frac_digits > 0 {
            end = frac_end;
            mantissa_digits += frac_digits;
        }
    }
    if mantissa_digits == 0 {
        return None;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    s[..end].parse::<f64>().ok()
}

/// Round half up, the way form widgets round (`-2.5` rounds to `-2`).
pub fn round_half_up(n: f64) -> f64 {
    (n + 0.5).floor()
}

/// Whether `n` is equal to its own rounding.
pub fn is_integral(n: f64) -> bool {
    n.is_finite() && n.fract() == 0.0
}

/// Check `n` against `minimum`, `sliderMin` and `sliderMax`.
///
/// An absent bound leaves that side unbounded. `NaN` never satisfies a bound.
pub fn within_bounds(schema: &SchemaNode, n: f64) -> bool {
    if n.is_nan() {
        return false;
    }
    if schema.minimum.is_some_and(|min| n < min) {
        return false;
    }
    within_slider(schema, n)
}

/// Check `n` against `sliderMin` and `sliderMax` only, as for unit-suffixed
/// strings.
pub fn within_slider(schema: &SchemaNode, n: f64) -> bool {
    if n.is_nan() {
        return false;
    }
    !(schema.slider_min.is_some_and(|min| n < min) || schema.slider_max.is_some_and(|max| n > max))
}

/// Full numeric check for `integer`/`number` targets.
pub fn satisfies_numeric(schema: &SchemaNode, n: f64) -> bool {
    if !n.is_finite() || !within_bounds(schema, n) {
        return false;
    }
    match schema.kind {
        SchemaType::Integer => is_integral(n),
        SchemaType::Number => true,
        SchemaType::Object | SchemaType::Array | SchemaType::String | SchemaType::Boolean => false,
    }
}

/// Convert a float into a JSON number, using an integer representation when
/// the value is integral and exactly representable.
///
/// Returns `None` for non-finite values, which JSON cannot carry.
pub fn number_value(n: f64) -> Option<Value> {
    if is_integral(n) && n.abs() <= MAX_SAFE_INTEGER {
        return Some(Value::from(n as i64));
    }
    Number::from_f64(n).map(Value::Number)
}

/// Render a number the way it would appear in a text field (`7`, not `7.0`).
pub fn format_number(n: f64) -> String {
    if is_integral(n) && n.abs() <= MAX_SAFE_INTEGER {
        let as_int = n as i64;
        as_int.to_string()
    } else {
        n.to_string()
    }
}
