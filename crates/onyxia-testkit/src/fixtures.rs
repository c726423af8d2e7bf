//! Test fixtures.
//!
//! Small constructors for backend data with sensible defaults, so tests only
//! spell out what they assert on.

use chrono::{TimeZone, Utc};
use onyxia_app::api::{Catalog, Chart, HelmRelease, PodStatus, Project, Quotas, ReleaseStatus, S3Profile};
use onyxia_app::usecases::restorable_config_management::RestorableConfig;
use onyxia_core::SchemaNode;
use serde_json::{json, Value};

/// Catalog holding [`jupyter_chart`].
pub const IDE_CATALOG: &str = "ide";

/// Chart served by [`demo_catalogs`].
pub const JUPYTER_CHART: &str = "jupyter-python";

/// A group project `id`, or the personal project when `id` starts with `user-`.
pub fn project(id: &str) -> Project {
    let group = (!id.starts_with("user-")).then(|| id.to_string());
    Project {
        id: id.to_string(),
        name: id.replace('-', " "),
        group,
        namespace: id.to_string(),
    }
}

/// A deployed release with one ready pod.
///
/// `minutes` is the launch time, in minutes after a fixed epoch; larger means
/// more recent.
pub fn release(name: &str, minutes: i64) -> HelmRelease {
    let epoch = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default();
    HelmRelease {
        name: name.to_string(),
        catalog_id: IDE_CATALOG.to_string(),
        chart: JUPYTER_CHART.to_string(),
        friendly_name: format!("{name} service"),
        started_at: epoch + chrono::Duration::minutes(minutes),
        status: ReleaseStatus::Deployed,
        urls: vec![format!("https://{name}.lab.example.org")],
        pods: vec![pod(&format!("{name}-0"), true)],
    }
}

/// A pod in phase `Running`.
pub fn pod(name: &str, ready: bool) -> PodStatus {
    PodStatus {
        name: name.to_string(),
        phase: if ready { "Running" } else { "Pending" }.to_string(),
        ready,
        restart_count: 0,
    }
}

/// Quotas from `(resource, limit, usage)` triples.
pub fn quotas(entries: &[(&str, &str, &str)]) -> Quotas {
    let mut out = Quotas::default();
    for (name, limit, used) in entries {
        out.spec.insert((*name).to_string(), (*limit).to_string());
        out.usage.insert((*name).to_string(), (*used).to_string());
    }
    out
}

/// An S3 profile browsing `bucket`.
pub fn s3_profile(name: &str, bucket: &str) -> S3Profile {
    S3Profile {
        name: name.to_string(),
        bucket: bucket.to_string(),
    }
}

/// Values schema of the Jupyter chart.
pub fn jupyter_chart() -> Chart {
    let resources = SchemaNode::object_with([
        (
            "cpu".to_string(),
            SchemaNode::string()
                .with_slider(Some(100.0), Some(8000.0))
                .with_slider_unit("m"),
        ),
        (
            "memory".to_string(),
            SchemaNode::string()
                .with_slider(Some(1.0), Some(64.0))
                .with_slider_unit("Gi"),
        ),
    ]);
    let service = SchemaNode::object_with([
        ("image".to_string(), SchemaNode::string().with_pattern("^[a-z0-9./:-]+$")),
        ("replicas".to_string(), SchemaNode::integer().with_minimum(1.0)),
        ("gpu".to_string(), SchemaNode::boolean()),
    ]);
    let values_schema = SchemaNode::object_with([
        ("resources".to_string(), resources),
        ("service".to_string(), service),
        (
            "tags".to_string(),
            SchemaNode::array_of(SchemaNode::string()).with_items_len(None, Some(3)),
        ),
    ]);
    Chart {
        name: JUPYTER_CHART.to_string(),
        version: "2.1.0".to_string(),
        values_schema,
    }
}

/// Form values accepted by [`jupyter_chart`] as-is.
pub fn jupyter_values() -> Value {
    json!({
        "resources": { "cpu": "2000m", "memory": "8Gi" },
        "service": { "image": "inseefrlab/jupyter:py3.12", "replicas": 1, "gpu": false },
        "tags": ["python"]
    })
}

/// One `ide` catalog holding the Jupyter chart.
pub fn demo_catalogs() -> Vec<Catalog> {
    vec![Catalog {
        id: IDE_CATALOG.to_string(),
        charts: vec![jupyter_chart()],
    }]
}

/// A private Jupyter config with `values`.
pub fn restorable_config(friendly_name: &str, values: Value) -> RestorableConfig {
    RestorableConfig {
        catalog_id: IDE_CATALOG.to_string(),
        chart_name: JUPYTER_CHART.to_string(),
        friendly_name: friendly_name.to_string(),
        is_shared: false,
        form_values: values,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use onyxia_core::validation::{validate, ValidationResult};

    #[test]
    fn jupyter_values_match_schema() {
        let schema = jupyter_chart().values_schema;
        let values = jupyter_values();
        for (section, props) in values.as_object().unwrap() {
            let node = &schema.properties.as_ref().unwrap()[section];
            assert_eq!(validate(node, props), ValidationResult::Valid, "{section}");
        }
    }

    #[test]
    fn personal_project_has_no_group() {
        assert!(project("user-alice").group.is_none());
        assert_eq!(project("team-a").group.as_deref(), Some("team-a"));
    }
}
