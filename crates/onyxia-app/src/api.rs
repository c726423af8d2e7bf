//! # OnyxiaApi: Abstract Backend Operations
//!
//! This module defines the `OnyxiaApi` trait, the port through which thunks
//! reach the backend. Keeping it a trait lets `onyxia-app` stay a pure
//! application core: the HTTP client lives in the frontend, and tests use an
//! in-memory implementation.
//!
//! ```text
//! onyxia-app (pure)           frontend / testkit
//! ┌─────────────────┐        ┌──────────────────┐
//! │ usecase thunks  │        │ HTTP client      │
//! │   ┌──────────┐  │        │   implements     │
//! │   │OnyxiaApi │◄─┼────────│   OnyxiaApi      │
//! │   └──────────┘  │        │                  │
//! └─────────────────┘        └──────────────────┘
//! ```
//!
//! ## Contract
//!
//! Every method may fail with an [`OnyxiaError`] (network or server error)
//! but never returns partially-typed data: deserialization happens on the
//! implementation side of the port.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use onyxia_core::{OnyxiaError, SchemaNode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// Projects
// =============================================================================

/// A project (personal or group) the user can work in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Stable project identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Owning group, `None` for the personal project
    pub group: Option<String>,
    /// Kubernetes namespace services are launched into
    pub namespace: String,
}

// =============================================================================
// Quotas
// =============================================================================

/// Resource quotas of a namespace, as Kubernetes quantity strings.
///
/// Keys are resource names such as `requests.cpu` or `requests.memory`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quotas {
    /// Hard limits
    pub spec: BTreeMap<String, String>,
    /// Current consumption
    pub usage: BTreeMap<String, String>,
}

// =============================================================================
// Helm releases (services)
// =============================================================================

/// Deployment status reported by Helm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    /// Release installed and running
    Deployed,
    /// Install or upgrade in progress
    Pending,
    /// Install or upgrade failed
    Failed,
}

/// Status of a single pod of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodStatus {
    /// Pod name
    pub name: String,
    /// Kubernetes phase (`Running`, `Pending`, ...)
    pub phase: String,
    /// Whether every container of the pod is ready
    pub ready: bool,
    /// Sum of container restarts
    pub restart_count: u32,
}

/// A launched service, i.e. an installed Helm release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelmRelease {
    /// Release name, unique within a project
    pub name: String,
    /// Catalog the chart comes from
    pub catalog_id: String,
    /// Chart name (`jupyter-python`, `vscode-python`, ...)
    pub chart: String,
    /// Name chosen by the user at launch
    pub friendly_name: String,
    /// Launch time
    pub started_at: DateTime<Utc>,
    /// Helm status
    pub status: ReleaseStatus,
    /// Public URLs exposed by the service
    pub urls: Vec<String>,
    /// Pods backing the service
    pub pods: Vec<PodStatus>,
}

// =============================================================================
// Catalogs
// =============================================================================

/// A chart available for launch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    /// Chart name
    pub name: String,
    /// Latest version
    pub version: String,
    /// Schema of the launch form values
    pub values_schema: SchemaNode,
}

/// A catalog of charts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    /// Catalog identifier (`ide`, `databases`, ...)
    pub id: String,
    /// Charts offered by this catalog
    pub charts: Vec<Chart>,
}

impl Catalog {
    /// Look up a chart by name.
    pub fn chart(&self, name: &str) -> Option<&Chart> {
        self.charts.iter().find(|chart| chart.name == name)
    }
}

// =============================================================================
// Object storage
// =============================================================================

/// An S3 connection profile available in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3Profile {
    /// Profile name, used in URLs
    pub name: String,
    /// Bucket browsed at the root of this profile
    pub bucket: String,
}

// =============================================================================
// Port
// =============================================================================

/// Backend operations consumed by usecase thunks.
#[async_trait]
pub trait OnyxiaApi: Send + Sync {
    /// Projects the user belongs to. The first one is the personal project.
    async fn get_user_projects(&self) -> Result<Vec<Project>, OnyxiaError>;

    /// Quotas of a project's namespace.
    async fn get_quotas(&self, project_id: &str) -> Result<Quotas, OnyxiaError>;

    /// Services currently installed in a project.
    async fn list_helm_releases(&self, project_id: &str) -> Result<Vec<HelmRelease>, OnyxiaError>;

    /// A single service, `None` when it no longer exists.
    async fn get_helm_release(
        &self,
        project_id: &str,
        release_name: &str,
    ) -> Result<Option<HelmRelease>, OnyxiaError>;

    /// Request uninstallation of a service. Completion is observed by polling.
    async fn delete_helm_release(
        &self,
        project_id: &str,
        release_name: &str,
    ) -> Result<(), OnyxiaError>;

    /// All catalogs with their charts.
    async fn get_catalogs_and_charts(&self) -> Result<Vec<Catalog>, OnyxiaError>;

    /// Read a user-scoped configuration blob. `None` when never written.
    async fn get_user_config_blob(&self, key: &str) -> Result<Option<String>, OnyxiaError>;

    /// Overwrite a user-scoped configuration blob.
    async fn put_user_config_blob(&self, key: &str, value: &str) -> Result<(), OnyxiaError>;

    /// S3 profiles available in a project.
    async fn list_s3_profiles(&self, project_id: &str) -> Result<Vec<S3Profile>, OnyxiaError>;
}
