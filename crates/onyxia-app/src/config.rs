//! # Application Configuration
//!
//! `AppConfig` is loaded from TOML (or JSON), overridden by `ONYXIA_*`
//! environment variables and validated before the core starts.
//!
//! Environment variables map onto dotted keys: a double underscore separates
//! sections, so `ONYXIA_POLLING__QUOTAS__INTERVAL_MS=30000` sets
//! `polling.quotas.interval_ms`.
//!
//! Polling delays are per-slice policy and live here rather than in code.

use onyxia_core::OnyxiaError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "ONYXIA_";

// =============================================================================
// Sections
// =============================================================================

/// Quota polling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotaPollingConfig {
    /// Whether quotas exist on this deployment
    pub enabled: bool,
    /// Steady-state delay between polls
    pub interval_ms: u64,
    /// Delay while a service deletion is in progress
    pub ongoing_deletion_interval_ms: u64,
}

impl Default for QuotaPollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60_000,
            ongoing_deletion_interval_ms: 5_000,
        }
    }
}

impl QuotaPollingConfig {
    /// Delay to wait given whether a deletion is ongoing.
    pub fn delay(&self, ongoing_deletion: bool) -> Duration {
        if ongoing_deletion {
            Duration::from_millis(self.ongoing_deletion_interval_ms)
        } else {
            Duration::from_millis(self.interval_ms)
        }
    }
}

/// Fixed-interval polling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntervalConfig {
    /// Delay between polls
    pub interval_ms: u64,
}

impl IntervalConfig {
    /// Interval as a duration.
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

fn services_interval() -> IntervalConfig {
    IntervalConfig { interval_ms: 10_000 }
}

fn service_details_interval() -> IntervalConfig {
    IntervalConfig { interval_ms: 5_000 }
}

/// Per-slice polling policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingConfig {
    /// Quota refresh
    #[serde(default)]
    pub quotas: QuotaPollingConfig,
    /// Service list refresh
    #[serde(default = "services_interval")]
    pub services: IntervalConfig,
    /// Single service refresh
    #[serde(default = "service_details_interval")]
    pub service_details: IntervalConfig,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            quotas: QuotaPollingConfig::default(),
            services: services_interval(),
            service_details: service_details_interval(),
        }
    }
}

/// Event bus sizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusConfig {
    /// Broadcast buffer for async subscribers
    pub capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            capacity: crate::events::DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Object storage defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Profile selected when the URL names none
    pub default_profile: Option<String>,
}

/// Logging defaults for hosts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Polling policies
    pub polling: PollingConfig,
    /// Event bus sizing
    pub event_bus: EventBusConfig,
    /// Object storage defaults
    pub s3: S3Config,
    /// Logging defaults
    pub logging: LoggingConfig,
}

// =============================================================================
// Loading
// =============================================================================

impl AppConfig {
    /// Load from a `.toml` or `.json` file.
    pub fn load_from_file(path: &Path) -> Result<Self, OnyxiaError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OnyxiaError::internal(format!("Failed to read config file: {e}")))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .map_err(|e| OnyxiaError::invalid(format!("Invalid TOML: {e}"))),
            Some("json") => serde_json::from_str(&content)
                .map_err(|e| OnyxiaError::invalid(format!("Invalid JSON: {e}"))),
            _ => Err(OnyxiaError::invalid("Unsupported config file format")),
        }
    }

    /// Apply `ONYXIA_*` overrides from the process environment.
    pub fn merge_with_env(&mut self) -> Result<(), OnyxiaError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Apply `ONYXIA_*` overrides from `vars`. Other variables are ignored,
    /// and so are `ONYXIA_*` names that match no configuration key.
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<(), OnyxiaError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut tree = serde_json::to_value(&*self)?;
        let mut applied = 0usize;
        for (name, value) in vars {
            let Some(key) = env_key(name.as_ref()) else {
                continue;
            };
            if let Err(err) = set_from_string(&mut tree, &key, value.as_ref()) {
                tracing::warn!(variable = name.as_ref(), error = %err, "Ignoring environment variable");
                continue;
            }
            applied += 1;
        }
        if applied > 0 {
            *self = serde_json::from_value(tree)
                .map_err(|e| OnyxiaError::invalid(format!("Invalid environment override: {e}")))?;
            tracing::debug!(applied, "Environment overrides applied");
        }
        Ok(())
    }

    /// Set one dotted key (`polling.quotas.enabled`) from its string form.
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), OnyxiaError> {
        let mut tree = serde_json::to_value(&*self)?;
        set_from_string(&mut tree, key, value)?;
        *self = serde_json::from_value(tree)
            .map_err(|e| OnyxiaError::invalid(format!("Invalid value for '{key}': {e}")))?;
        Ok(())
    }

    /// Check every rule, reporting all violations at once.
    pub fn validate(&self) -> Result<(), OnyxiaError> {
        let mut validator = ConfigValidator::new();

        let mut quotas = validator.for_field("polling.quotas");
        quotas
            .positive("interval_ms", self.polling.quotas.interval_ms)
            .positive(
                "ongoing_deletion_interval_ms",
                self.polling.quotas.ongoing_deletion_interval_ms,
            )
            .custom(
                "ongoing_deletion_interval_ms",
                &self.polling.quotas,
                |q| q.ongoing_deletion_interval_ms <= q.interval_ms,
                "must not exceed interval_ms",
            );
        validator.merge(quotas);

        validator
            .positive("polling.services.interval_ms", self.polling.services.interval_ms)
            .positive(
                "polling.service_details.interval_ms",
                self.polling.service_details.interval_ms,
            )
            .positive("event_bus.capacity", self.event_bus.capacity as u64)
            .custom(
                "s3.default_profile",
                &self.s3.default_profile,
                |profile| profile.as_deref().map_or(true, |p| !p.is_empty()),
                "must not be empty when set",
            );

        let errors = validator.all_errors();
        if errors.is_empty() {
            return Ok(());
        }
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(OnyxiaError::invalid(message))
    }
}

/// `ONYXIA_POLLING__QUOTAS__INTERVAL_MS` → `polling.quotas.interval_ms`
fn env_key(name: &str) -> Option<String> {
    let rest = name.strip_prefix(ENV_PREFIX)?;
    if rest.is_empty() {
        return None;
    }
    Some(rest.to_lowercase().replace("__", "."))
}

/// Set a dotted key in a JSON tree, parsing `raw` as JSON when possible so
/// that numbers and booleans keep their type.
fn set_from_string(tree: &mut serde_json::Value, key: &str, raw: &str) -> Result<(), OnyxiaError> {
    let value = serde_json::from_str::<serde_json::Value>(raw)
        .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
    set_nested_value(tree, key, value)
}

fn set_nested_value(
    tree: &mut serde_json::Value,
    key: &str,
    value: serde_json::Value,
) -> Result<(), OnyxiaError> {
    let parts: Vec<&str> = key.split('.').collect();
    let Some((last, parents)) = parts.split_last() else {
        return Err(OnyxiaError::invalid("Empty key"));
    };
    if last.is_empty() {
        return Err(OnyxiaError::invalid(format!("Malformed key '{key}'")));
    }

    let mut current = tree;
    for part in parents {
        current = current
            .as_object_mut()
            .ok_or_else(|| OnyxiaError::invalid(format!("'{key}' does not name a section")))?
            .get_mut(*part)
            .ok_or_else(|| OnyxiaError::invalid(format!("Unknown configuration key: {key}")))?;
    }

    let section = current
        .as_object_mut()
        .ok_or_else(|| OnyxiaError::invalid(format!("'{key}' does not name a section")))?;
    if !section.contains_key(*last) {
        return Err(OnyxiaError::invalid(format!("Unknown configuration key: {key}")));
    }
    section.insert((*last).to_string(), value);
    Ok(())
}

// =============================================================================
// Validation
// =============================================================================

/// A single configuration rule violation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Value is out of acceptable range
    #[error("Field '{field}' must be at least {min} (got {actual})")]
    OutOfRange {
        /// Dotted field name
        field: String,
        /// Smallest accepted value
        min: u64,
        /// Offending value
        actual: u64,
    },
    /// Custom validation failed
    #[error("Field '{field}': {message}")]
    Custom {
        /// Dotted field name
        field: String,
        /// What is wrong
        message: String,
    },
}

impl From<ValidationError> for OnyxiaError {
    fn from(err: ValidationError) -> Self {
        OnyxiaError::invalid(err.to_string())
    }
}

/// Accumulates rule violations instead of stopping at the first one.
#[derive(Debug, Default)]
pub struct ConfigValidator {
    errors: Vec<ValidationError>,
    field_prefix: String,
}

impl ConfigValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a validator for a nested field
    pub fn for_field(&self, field_name: &str) -> Self {
        Self {
            errors: Vec::new(),
            field_prefix: self.full_field_name(field_name),
        }
    }

    /// Require a strictly positive value
    pub fn positive(&mut self, field_name: &str, value: u64) -> &mut Self {
        if value == 0 {
            self.errors.push(ValidationError::OutOfRange {
                field: self.full_field_name(field_name),
                min: 1,
                actual: value,
            });
        }
        self
    }

    /// Validate using a custom predicate
    pub fn custom<T, F>(&mut self, field_name: &str, value: &T, predicate: F, message: &str) -> &mut Self
    where
        F: FnOnce(&T) -> bool,
    {
        if !predicate(value) {
            self.errors.push(ValidationError::Custom {
                field: self.full_field_name(field_name),
                message: message.to_string(),
            });
        }
        self
    }

    /// Merge errors from another validator
    pub fn merge(&mut self, other: ConfigValidator) {
        self.errors.extend(other.errors);
    }

    /// Get all validation errors
    pub fn all_errors(self) -> Vec<ValidationError> {
        self.errors
    }

    fn full_field_name(&self, field_name: &str) -> String {
        if self.field_prefix.is_empty() {
            field_name.to_string()
        } else {
            format!("{}.{}", self.field_prefix, field_name)
        }
    }
}

impl fmt::Display for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match toml::to_string_pretty(self) {
            Ok(rendered) => f.write_str(&rendered),
            Err(_) => write!(f, "{self:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.polling.quotas.delay(true), Duration::from_secs(5));
        assert_eq!(config.polling.quotas.delay(false), Duration::from_secs(60));
    }

    #[test]
    fn loads_partial_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[polling.quotas]\nenabled = false\n\n[s3]\ndefault_profile = \"team\"\n"
        )
        .unwrap();

        let config = AppConfig::load_from_file(file.path()).unwrap();
        assert!(!config.polling.quotas.enabled);
        assert_eq!(config.polling.quotas.interval_ms, 60_000);
        assert_eq!(config.polling.services.interval_ms, 10_000);
        assert_eq!(config.s3.default_profile.as_deref(), Some("team"));
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        assert!(AppConfig::load_from_file(file.path()).is_err());
    }

    #[test]
    fn env_overrides_nested_keys() {
        let mut config = AppConfig::default();
        config
            .merge_with_vars([
                ("ONYXIA_POLLING__QUOTAS__INTERVAL_MS", "30000"),
                ("ONYXIA_POLLING__QUOTAS__ENABLED", "false"),
                ("ONYXIA_LOGGING__LEVEL", "debug"),
                ("HOME", "/root"),
            ])
            .unwrap();
        assert_eq!(config.polling.quotas.interval_ms, 30_000);
        assert!(!config.polling.quotas.enabled);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn unrelated_env_names_are_skipped() {
        let mut config = AppConfig::default();
        config
            .merge_with_vars([
                ("ONYXIA_VERSION", "1.2.3"),
                ("ONYXIA_POLLING__QUOTAS__NOPE", "1"),
                ("ONYXIA_LOGGING__LEVEL__DEEP", "x"),
                ("ONYXIA_POLLING__SERVICES__INTERVAL_MS", "2000"),
            ])
            .unwrap();
        assert_eq!(config.polling.services.interval_ms, 2_000);
        assert_eq!(config.polling.quotas, AppConfig::default().polling.quotas);
    }

    #[test]
    fn unknown_explicit_key_is_an_error() {
        let mut config = AppConfig::default();
        let err = config.set_from_string("polling.quotas.nope", "1").unwrap_err();
        assert!(err.to_string().contains("polling.quotas.nope"));
    }

    #[test]
    fn mistyped_env_value_is_an_error() {
        let mut config = AppConfig::default();
        assert!(config
            .merge_with_vars([("ONYXIA_POLLING__SERVICES__INTERVAL_MS", "soon")])
            .is_err());
    }

    #[test]
    fn mistyped_override_is_an_error() {
        let mut config = AppConfig::default();
        assert!(config.set_from_string("polling.services.interval_ms", "soon").is_err());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn validation_reports_every_violation() {
        let mut config = AppConfig::default();
        config.polling.quotas.ongoing_deletion_interval_ms = 120_000;
        config.polling.services.interval_ms = 0;
        config.event_bus.capacity = 0;

        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("polling.quotas.ongoing_deletion_interval_ms"));
        assert!(message.contains("polling.services.interval_ms"));
        assert!(message.contains("event_bus.capacity"));
    }
}
