//! Saved launch configurations ("restorable configs").
//!
//! Configs are persisted remotely as one JSON blob. Several browser tabs may
//! edit it, so every write re-fetches the blob first and aborts with
//! [`OnyxiaError::Conflict`] if it no longer matches local state. Writes are
//! serialized per instance with an async mutex and dispatch only after the
//! backend accepted the new blob.

use onyxia_core::reactive::Memo;
use onyxia_core::schema::{SchemaNode, SchemaType};
use onyxia_core::validation::{validate, ValidationResult};
use onyxia_core::OnyxiaError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::app::ThunkContext;
use crate::store::{Slice, SliceAction, SliceState};

/// Key of the remote blob.
pub const RESTORABLE_CONFIGS_KEY: &str = "restorableConfigs";

/// A saved launch configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorableConfig {
    /// Catalog of the chart
    pub catalog_id: String,
    /// Chart to launch
    pub chart_name: String,
    /// Name shown to the user; unique per chart
    pub friendly_name: String,
    /// Visible to the whole project
    #[serde(default)]
    pub is_shared: bool,
    /// Launch form values, nested by schema property
    pub form_values: Value,
}

impl RestorableConfig {
    /// Same chart and same values, ignoring name and sharing.
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.catalog_id == other.catalog_id
            && self.chart_name == other.chart_name
            && self.form_values == other.form_values
    }

    fn same_slot(&self, other: &Self) -> bool {
        self.catalog_id == other.catalog_id
            && self.chart_name == other.chart_name
            && self.friendly_name == other.friendly_name
    }
}

/// Slice marker.
#[derive(Debug)]
pub struct RestorableConfigManagementSlice;

/// Live state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorableConfigState {
    /// Saved configs, in save order
    pub configs: Vec<RestorableConfig>,
}

/// Actions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RestorableConfigAction {
    /// Configs loaded (or reloaded) from the backend
    Initialized {
        /// Every config
        configs: Vec<RestorableConfig>,
    },
    /// A config was written
    #[serde(rename_all = "camelCase")]
    ConfigSaved {
        /// Config written
        config: RestorableConfig,
        /// Slot overwritten, if any
        replaced_index: Option<usize>,
    },
    /// A config was removed
    ConfigDeleted {
        /// Position removed
        index: usize,
    },
    /// A config was renamed
    #[serde(rename_all = "camelCase")]
    ConfigRenamed {
        /// Position renamed
        index: usize,
        /// New name
        friendly_name: String,
    },
}

impl SliceAction for RestorableConfigAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::ConfigSaved { .. } => "configSaved",
            Self::ConfigDeleted { .. } => "configDeleted",
            Self::ConfigRenamed { .. } => "configRenamed",
        }
    }
}

impl Slice for RestorableConfigManagementSlice {
    const NAME: &'static str = "restorableConfigManagement";
    type State = RestorableConfigState;
    type Action = RestorableConfigAction;

    fn reduce(
        state: &mut SliceState<RestorableConfigState>,
        action: &RestorableConfigAction,
    ) -> Result<(), OnyxiaError> {
        if let RestorableConfigAction::Initialized { configs } = action {
            *state = SliceState::Ready(RestorableConfigState {
                configs: configs.clone(),
            });
            return Ok(());
        }

        let configs = &mut state.ready_mut(Self::NAME)?.configs;
        apply_to_list(configs, action)
    }
}

/// Apply a write action to a config list. Shared by the reducer and by the
/// thunks that compute the blob to persist.
fn apply_to_list(configs: &mut Vec<RestorableConfig>, action: &RestorableConfigAction) -> Result<(), OnyxiaError> {
    match action {
        RestorableConfigAction::Initialized { configs: all } => {
            *configs = all.clone();
        }
        RestorableConfigAction::ConfigSaved {
            config,
            replaced_index,
        } => match replaced_index {
            Some(index) => {
                let slot = configs.get_mut(*index).ok_or_else(|| missing(*index))?;
                *slot = config.clone();
            }
            None => configs.push(config.clone()),
        },
        RestorableConfigAction::ConfigDeleted { index } => {
            if *index >= configs.len() {
                return Err(missing(*index));
            }
            configs.remove(*index);
        }
        RestorableConfigAction::ConfigRenamed {
            index,
            friendly_name,
        } => {
            let slot = configs.get(*index).ok_or_else(|| missing(*index))?;
            let clashes = configs.iter().enumerate().any(|(i, other)| {
                i != *index
                    && other.catalog_id == slot.catalog_id
                    && other.chart_name == slot.chart_name
                    && &other.friendly_name == friendly_name
            });
            if clashes {
                return Err(OnyxiaError::invalid(format!(
                    "A configuration named '{friendly_name}' already exists for this chart"
                )));
            }
            if let Some(slot) = configs.get_mut(*index) {
                slot.friendly_name = friendly_name.clone();
            }
        }
    }
    Ok(())
}

fn missing(index: usize) -> OnyxiaError {
    OnyxiaError::not_found(format!("Restorable config #{index}"))
}

// ─────────────────────────────────────────────────────────────────────────────
// View model and restore
// ─────────────────────────────────────────────────────────────────────────────

/// One saved config as listed to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestorableConfigView {
    /// Position, used by the write thunks
    pub index: usize,
    /// Name shown
    pub friendly_name: String,
    /// Catalog of the chart
    pub catalog_id: String,
    /// Chart
    pub chart_name: String,
    /// Shared with the project
    pub is_shared: bool,
    /// Number of leaf values saved
    pub value_count: usize,
}

#[allow(clippy::ptr_arg)]
fn derive_views(configs: &Vec<RestorableConfig>) -> Vec<RestorableConfigView> {
    configs
        .iter()
        .enumerate()
        .map(|(index, config)| RestorableConfigView {
            index,
            friendly_name: config.friendly_name.clone(),
            catalog_id: config.catalog_id.clone(),
            chart_name: config.chart_name.clone(),
            is_shared: config.is_shared,
            value_count: count_leaves(&config.form_values),
        })
        .collect()
}

fn count_leaves(value: &Value) -> usize {
    match value {
        Value::Object(entries) => entries.values().map(count_leaves).sum(),
        _ => 1,
    }
}

/// Form values of a saved config, sanitized against the chart's current
/// schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoredConfig {
    /// Catalog to launch from
    pub catalog_id: String,
    /// Chart to launch
    pub chart_name: String,
    /// Values to pre-fill
    pub values: Value,
    /// Dotted paths replaced by their best approximation
    pub adjusted: Vec<String>,
    /// Dotted paths removed because nothing valid approximates them
    pub dropped: Vec<String>,
}

#[derive(Default)]
struct Sanitized {
    adjusted: Vec<String>,
    dropped: Vec<String>,
}

/// Walk `values` along `schema`. Nested objects are descended into while the
/// schema declares their properties; leaves go through the validation engine.
fn sanitize_object(
    schema: &SchemaNode,
    values: &Map<String, Value>,
    prefix: &str,
    report: &mut Sanitized,
) -> Map<String, Value> {
    let Some(properties) = schema.properties.as_ref() else {
        return values.clone();
    };
    let mut out = Map::with_capacity(values.len());
    for (key, value) in values {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let Some(property) = properties.get(key) else {
            out.insert(key.clone(), value.clone());
            continue;
        };
        if let (SchemaType::Object, Value::Object(nested)) = (property.kind, value) {
            out.insert(key.clone(), Value::Object(sanitize_object(property, nested, &path, report)));
            continue;
        }
        match validate(property, value) {
            ValidationResult::Valid => {
                out.insert(key.clone(), value.clone());
            }
            ValidationResult::Invalid {
                best_approximation: Some(approximation),
            } => {
                report.adjusted.push(path);
                out.insert(key.clone(), approximation);
            }
            ValidationResult::Invalid {
                best_approximation: None,
            } => report.dropped.push(path),
        }
    }
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Usecase
// ─────────────────────────────────────────────────────────────────────────────

/// Result of [`RestorableConfigManagement::save_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SaveOutcome {
    /// Appended as a new config
    Saved,
    /// Overwrote the config with the same chart and name
    Replaced,
    /// An equivalent config exists; nothing written
    AlreadySaved,
}

/// Restorable config usecase.
#[derive(Clone)]
pub struct RestorableConfigManagement {
    ctx: ThunkContext,
    write_lock: Arc<async_lock::Mutex<()>>,
    configs_view: Arc<Memo<Vec<RestorableConfig>, Vec<RestorableConfigView>>>,
}

impl RestorableConfigManagement {
    pub(crate) fn new(ctx: ThunkContext) -> Self {
        Self {
            ctx,
            write_lock: Arc::new(async_lock::Mutex::new(())),
            configs_view: Arc::new(Memo::new(derive_views)),
        }
    }

    // ─── Thunks ───────────────────────────────────────────────────────────

    /// Load configs from the backend, replacing local state.
    pub async fn initialize(&self) -> Result<(), OnyxiaError> {
        let _write = self.write_lock.lock().await;
        let configs = self.fetch_remote().await?;
        tracing::debug!(count = configs.len(), "Restorable configs loaded");
        self.ctx
            .store
            .dispatch::<RestorableConfigManagementSlice>(RestorableConfigAction::Initialized { configs })
    }

    /// Save `config`.
    ///
    /// A config with the same chart and values is not saved twice; one with
    /// the same chart and name is overwritten.
    pub async fn save_config(&self, config: RestorableConfig) -> Result<SaveOutcome, OnyxiaError> {
        let _write = self.write_lock.lock().await;
        let local = self.checked_local().await?;

        if local.iter().any(|existing| existing.is_equivalent(&config)) {
            return Ok(SaveOutcome::AlreadySaved);
        }
        let replaced_index = local.iter().position(|existing| existing.same_slot(&config));
        let outcome = if replaced_index.is_some() {
            SaveOutcome::Replaced
        } else {
            SaveOutcome::Saved
        };

        self.commit(
            local,
            RestorableConfigAction::ConfigSaved {
                config,
                replaced_index,
            },
        )
        .await?;
        Ok(outcome)
    }

    /// Delete the config at `index`.
    pub async fn delete_config(&self, index: usize) -> Result<(), OnyxiaError> {
        let _write = self.write_lock.lock().await;
        let local = self.checked_local().await?;
        self.commit(local, RestorableConfigAction::ConfigDeleted { index })
            .await
    }

    /// Rename the config at `index`. Names are unique per chart.
    pub async fn rename_config(&self, index: usize, friendly_name: &str) -> Result<(), OnyxiaError> {
        let friendly_name = friendly_name.trim();
        if friendly_name.is_empty() {
            return Err(OnyxiaError::invalid("Configuration name cannot be empty"));
        }
        let _write = self.write_lock.lock().await;
        let local = self.checked_local().await?;
        self.commit(
            local,
            RestorableConfigAction::ConfigRenamed {
                index,
                friendly_name: friendly_name.to_string(),
            },
        )
        .await
    }

    /// Form values of the config at `index`, sanitized against the chart's
    /// current values schema.
    pub async fn restore_config(&self, index: usize) -> Result<RestoredConfig, OnyxiaError> {
        let config = self
            .ctx
            .store
            .read::<RestorableConfigManagementSlice, _>(|state| state.configs.get(index).cloned())?
            .ok_or_else(|| missing(index))?;

        let catalogs = self.ctx.api.get_catalogs_and_charts().await?;
        let chart = catalogs
            .iter()
            .find(|catalog| catalog.id == config.catalog_id)
            .and_then(|catalog| catalog.chart(&config.chart_name))
            .ok_or_else(|| {
                OnyxiaError::not_found(format!(
                    "Chart '{}' in catalog '{}'",
                    config.chart_name, config.catalog_id
                ))
            })?;

        let Value::Object(values) = &config.form_values else {
            return Err(OnyxiaError::invalid("Saved form values are not an object"));
        };
        let mut report = Sanitized::default();
        let values = sanitize_object(&chart.values_schema, values, "", &mut report);
        if !report.adjusted.is_empty() || !report.dropped.is_empty() {
            tracing::info!(
                config = %config.friendly_name,
                adjusted = report.adjusted.len(),
                dropped = report.dropped.len(),
                "Restored config adjusted to current chart schema"
            );
        }

        Ok(RestoredConfig {
            catalog_id: config.catalog_id,
            chart_name: config.chart_name,
            values: Value::Object(values),
            adjusted: report.adjusted,
            dropped: report.dropped,
        })
    }

    async fn fetch_remote(&self) -> Result<Vec<RestorableConfig>, OnyxiaError> {
        match self.ctx.api.get_user_config_blob(RESTORABLE_CONFIGS_KEY).await? {
            Some(blob) => Ok(serde_json::from_str(&blob)?),
            None => Ok(Vec::new()),
        }
    }

    /// Local configs, provided the remote blob still matches them.
    async fn checked_local(&self) -> Result<Vec<RestorableConfig>, OnyxiaError> {
        let local = self
            .ctx
            .store
            .read::<RestorableConfigManagementSlice, _>(|state| state.configs.clone())?;
        let remote = self.fetch_remote().await?;
        if remote != local {
            tracing::warn!(
                local = local.len(),
                remote = remote.len(),
                "Restorable configs changed elsewhere; write aborted"
            );
            return Err(OnyxiaError::conflict(
                "Saved configurations were modified in another session; reload and retry",
            ));
        }
        Ok(local)
    }

    /// Persist the list `action` produces, then dispatch it.
    async fn commit(
        &self,
        mut configs: Vec<RestorableConfig>,
        action: RestorableConfigAction,
    ) -> Result<(), OnyxiaError> {
        apply_to_list(&mut configs, &action)?;
        let blob = serde_json::to_string(&configs)?;
        self.ctx
            .api
            .put_user_config_blob(RESTORABLE_CONFIGS_KEY, &blob)
            .await?;
        tracing::debug!(action = action.name(), count = configs.len(), "Restorable configs persisted");
        self.ctx
            .store
            .dispatch::<RestorableConfigManagementSlice>(action)
    }

    // ─── Selectors ────────────────────────────────────────────────────────

    /// Saved configs, in save order.
    pub fn configs(&self) -> Result<Arc<Vec<RestorableConfigView>>, OnyxiaError> {
        let configs = self
            .ctx
            .store
            .read::<RestorableConfigManagementSlice, _>(|state| state.configs.clone())?;
        Ok(self.configs_view.get(configs))
    }

    /// Whether an equivalent config is already saved.
    pub fn is_saved(&self, config: &RestorableConfig) -> Result<bool, OnyxiaError> {
        self.ctx
            .store
            .read::<RestorableConfigManagementSlice, _>(|state| {
                state.configs.iter().any(|existing| existing.is_equivalent(config))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(name: &str, values: Value) -> RestorableConfig {
        RestorableConfig {
            catalog_id: "ide".to_string(),
            chart_name: "jupyter-python".to_string(),
            friendly_name: name.to_string(),
            is_shared: false,
            form_values: values,
        }
    }

    #[test]
    fn rename_to_taken_name_is_rejected() {
        let mut configs = vec![config("a", json!({})), config("b", json!({"x": 1}))];
        let err = apply_to_list(
            &mut configs,
            &RestorableConfigAction::ConfigRenamed {
                index: 0,
                friendly_name: "b".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, OnyxiaError::Invalid { .. }));
    }

    #[test]
    fn out_of_range_index_is_not_found() {
        let mut configs = vec![config("a", json!({}))];
        let err = apply_to_list(&mut configs, &RestorableConfigAction::ConfigDeleted { index: 3 }).unwrap_err();
        assert!(matches!(err, OnyxiaError::NotFound { .. }));
    }

    #[test]
    fn sanitize_adjusts_and_drops_leaves() {
        let schema = SchemaNode::object_with([
            (
                "resources".to_string(),
                SchemaNode::object_with([
                    ("cpu".to_string(), SchemaNode::integer().with_minimum(1.0)),
                    ("gpu".to_string(), SchemaNode::boolean()),
                ]),
            ),
            ("tag".to_string(), SchemaNode::string().with_pattern("^v[0-9]+$")),
        ]);
        let values = json!({
            "resources": {"cpu": "4 cores", "gpu": "maybe"},
            "tag": "v2",
            "legacy": 1
        });
        let Value::Object(values) = values else { unreachable!() };

        let mut report = Sanitized::default();
        let out = sanitize_object(&schema, &values, "", &mut report);
        assert_eq!(Value::Object(out), json!({"resources": {"cpu": 4}, "tag": "v2", "legacy": 1}));
        assert_eq!(report.adjusted, vec!["resources.cpu"]);
        assert_eq!(report.dropped, vec!["resources.gpu"]);
    }

    #[test]
    fn views_count_leaves() {
        let views = derive_views(&vec![config("a", json!({"a": {"b": 1, "c": 2}, "d": true}))]);
        assert_eq!(views[0].value_count, 3);
        assert_eq!(views[0].index, 0);
    }
}
