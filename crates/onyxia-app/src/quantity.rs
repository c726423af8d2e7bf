//! Kubernetes resource quantities (`500m`, `2Gi`, `1.5k`, `3e2`).

use onyxia_core::OnyxiaError;

const BINARY_SUFFIXES: [(&str, f64); 6] = [
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
];

const DECIMAL_SUFFIXES: [(&str, f64); 9] = [
    ("n", 1e-9),
    ("u", 1e-6),
    ("m", 1e-3),
    ("k", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// Parse a quantity into its value in base units.
pub fn parse_quantity(raw: &str) -> Result<f64, OnyxiaError> {
    let trimmed = raw.trim();
    let (number, multiplier) = split_suffix(trimmed);
    if number.is_empty() {
        return Err(OnyxiaError::invalid(format!("Malformed quantity '{raw}'")));
    }
    let value: f64 = number
        .parse()
        .map_err(|_| OnyxiaError::invalid(format!("Malformed quantity '{raw}'")))?;
    if !value.is_finite() || value < 0.0 {
        return Err(OnyxiaError::invalid(format!("Malformed quantity '{raw}'")));
    }
    Ok(value * multiplier)
}

fn split_suffix(raw: &str) -> (&str, f64) {
    for (suffix, multiplier) in BINARY_SUFFIXES {
        if let Some(number) = raw.strip_suffix(suffix) {
            return (number, multiplier);
        }
    }
    for (suffix, multiplier) in DECIMAL_SUFFIXES {
        if let Some(number) = raw.strip_suffix(suffix) {
            return (number, multiplier);
        }
    }
    (raw, 1.0)
}
