//! # Schema Nodes
//!
//! The declarative, JSON-schema-like description of a dynamic form field.
//! Schemas are supplied by the caller on every validation call and never
//! mutated by the engine.
//!
//! The serde representation follows the chart `values.schema.json` layout,
//! so schemas can be deserialized straight from catalog data:
//!
//! ```json
//! { "type": "string", "sliderMin": 1, "sliderMax": 50, "sliderUnit": "Gi" }
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

/// The target type of a schema node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// A keyed record, described by `properties`
    Object,
    /// A homogeneous list, described by `items`
    Array,
    /// A string, optionally constrained by `pattern` and slider bounds
    String,
    /// `true` or `false`
    Boolean,
    /// A number equal to its own rounding
    Integer,
    /// Any finite number
    Number,
}

impl SchemaType {
    /// Lowercase name as it appears in schema documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Object => "object",
            Self::Array => "array",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Number => "number",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `pattern` as written in the schema, compiled on first use.
///
/// Clones share nothing; each node compiles its own copy once. A pattern
/// that does not compile matches nothing.
#[derive(Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Pattern {
    source: String,
    compiled: OnceLock<Option<Regex>>,
}

impl Pattern {
    /// Pattern text.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// The compiled expression, `None` if the source is not a valid regex.
    pub fn regex(&self) -> Option<&Regex> {
        self.compiled
            .get_or_init(|| match Regex::new(&self.source) {
                Ok(re) => Some(re),
                Err(err) => {
                    tracing::warn!(pattern = %self.source, error = %err, "Unusable schema pattern");
                    None
                }
            })
            .as_ref()
    }

    /// Whether `value` matches. Always `false` for an unusable pattern.
    pub fn is_match(&self, value: &str) -> bool {
        self.regex().is_some_and(|re| re.is_match(value))
    }
}

impl From<String> for Pattern {
    fn from(source: String) -> Self {
        Self {
            source,
            compiled: OnceLock::new(),
        }
    }
}

impl From<Pattern> for String {
    fn from(pattern: Pattern) -> Self {
        pattern.source
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.source, f)
    }
}

/// A single node of a form-field schema.
///
/// `properties` is only meaningful for [`SchemaType::Object`] and `items` only
/// for [`SchemaType::Array`]; the engine ignores them on other types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaNode {
    /// Target type, always set
    #[serde(rename = "type")]
    pub kind: SchemaType,
    /// Per-key sub-schemas of an object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, SchemaNode>>,
    /// Element schema of an array
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<SchemaNode>>,
    /// Regular expression a string must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    /// Inclusive lower bound for numbers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Minimum array length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    /// Maximum array length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
    /// Inclusive lower slider bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slider_min: Option<f64>,
    /// Inclusive upper slider bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slider_max: Option<f64>,
    /// Unit suffix a slider-backed string must carry (e.g. `"Gi"`, `"m"`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slider_unit: Option<String>,
}

impl SchemaNode {
    /// Create an unconstrained node of the given type.
    pub fn new(kind: SchemaType) -> Self {
        Self {
            kind,
            properties: None,
            items: None,
            pattern: None,
            minimum: None,
            min_items: None,
            max_items: None,
            slider_min: None,
            slider_max: None,
            slider_unit: None,
        }
    }

    /// Shorthand for `SchemaNode::new(SchemaType::String)`.
    pub fn string() -> Self {
        Self::new(SchemaType::String)
    }

    /// Shorthand for `SchemaNode::new(SchemaType::Boolean)`.
    pub fn boolean() -> Self {
        Self::new(SchemaType::Boolean)
    }

    /// Shorthand for `SchemaNode::new(SchemaType::Integer)`.
    pub fn integer() -> Self {
        Self::new(SchemaType::Integer)
    }

    /// Shorthand for `SchemaNode::new(SchemaType::Number)`.
    pub fn number() -> Self {
        Self::new(SchemaType::Number)
    }

    /// An array node whose elements must satisfy `items`.
    pub fn array_of(items: SchemaNode) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::new(SchemaType::Array)
        }
    }

    /// An object node with the given per-key schemas.
    pub fn object_with(properties: impl IntoIterator<Item = (String, SchemaNode)>) -> Self {
        Self {
            properties: Some(properties.into_iter().collect()),
            ..Self::new(SchemaType::Object)
        }
    }

    /// Set the string pattern.
    #[must_use]
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(Pattern::from(pattern.into()));
        self
    }

    /// Set the numeric minimum.
    #[must_use]
    pub fn with_minimum(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    /// Set the array length bounds.
    #[must_use]
    pub fn with_items_len(mut self, min_items: Option<usize>, max_items: Option<usize>) -> Self {
        self.min_items = min_items;
        self.max_items = max_items;
        self
    }

    /// Set the slider bounds.
    #[must_use]
    pub fn with_slider(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.slider_min = min;
        self.slider_max = max;
        self
    }

    /// Set the slider unit suffix.
    #[must_use]
    pub fn with_slider_unit(mut self, unit: impl Into<String>) -> Self {
        self.slider_unit = Some(unit.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_chart_layout() {
        let node: SchemaNode = serde_json::from_str(
            r#"{"type":"string","sliderMin":1,"sliderMax":50,"sliderUnit":"Gi"}"#,
        )
        .unwrap();
        assert_eq!(node.kind, SchemaType::String);
        assert_eq!(node.slider_min, Some(1.0));
        assert_eq!(node.slider_max, Some(50.0));
        assert_eq!(node.slider_unit.as_deref(), Some("Gi"));
    }

    #[test]
    fn deserializes_nested_object() {
        let node: SchemaNode = serde_json::from_str(
            r#"{"type":"object","properties":{"replicas":{"type":"integer","minimum":1},"tags":{"type":"array","items":{"type":"string"},"maxItems":3}}}"#,
        )
        .unwrap();
        let properties = node.properties.unwrap();
        assert_eq!(properties["replicas"].minimum, Some(1.0));
        assert_eq!(properties["tags"].max_items, Some(3));
        assert_eq!(
            properties["tags"].items.as_deref().map(|i| i.kind),
            Some(SchemaType::String)
        );
    }

    #[test]
    fn pattern_round_trips_as_plain_string() {
        let node: SchemaNode =
            serde_json::from_str(r#"{"type":"string","pattern":"^[a-z]+$"}"#).unwrap();
        let pattern = node.pattern.as_ref().unwrap();
        assert_eq!(pattern.as_str(), "^[a-z]+$");
        assert!(pattern.is_match("abc"));
        assert!(!pattern.is_match("ABC"));
        assert!(std::ptr::eq(pattern.regex().unwrap(), pattern.regex().unwrap()));

        let json = serde_json::to_value(&node).unwrap();
        assert_eq!(json["pattern"], "^[a-z]+$");
    }

    #[test]
    fn builder_matches_deserialized_form() {
        let built = SchemaNode::integer().with_minimum(0.0).with_slider(None, Some(10.0));
        let parsed: SchemaNode =
            serde_json::from_str(r#"{"type":"integer","minimum":0,"sliderMax":10}"#).unwrap();
        assert_eq!(built, parsed);
    }
}
