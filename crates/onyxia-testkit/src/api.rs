//! In-memory backend.
//!
//! [`MockOnyxiaApi`] keeps backend data in memory, counts calls per method
//! and can be told to fail the next call of a method. Deletions complete
//! after a configurable number of listings, like a namespace draining its
//! pods.

use async_trait::async_trait;
use onyxia_app::api::{Catalog, HelmRelease, OnyxiaApi, Project, Quotas, S3Profile};
use onyxia_app::OnyxiaError;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::fixtures;

/// Methods of the backend port, for counters and injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ApiMethod {
    /// `get_user_projects`
    GetUserProjects,
    /// `get_quotas`
    GetQuotas,
    /// `list_helm_releases`
    ListHelmReleases,
    /// `get_helm_release`
    GetHelmRelease,
    /// `delete_helm_release`
    DeleteHelmRelease,
    /// `get_catalogs_and_charts`
    GetCatalogsAndCharts,
    /// `get_user_config_blob`
    GetUserConfigBlob,
    /// `put_user_config_blob`
    PutUserConfigBlob,
    /// `list_s3_profiles`
    ListS3Profiles,
}

#[derive(Debug, Default)]
struct MockState {
    projects: Vec<Project>,
    quotas: HashMap<String, Quotas>,
    releases: HashMap<String, Vec<HelmRelease>>,
    /// Listings left before a pending deletion completes, per (project, release)
    pending_deletions: BTreeMap<(String, String), u32>,
    deletion_lag: u32,
    catalogs: Vec<Catalog>,
    blobs: HashMap<String, String>,
    s3_profiles: HashMap<String, Vec<S3Profile>>,
    failures: HashMap<ApiMethod, OnyxiaError>,
    /// Delay between applying a call and answering it
    ack_delays: HashMap<ApiMethod, Duration>,
    calls: HashMap<ApiMethod, usize>,
}

/// Backend double.
#[derive(Debug, Default)]
pub struct MockOnyxiaApi {
    state: Mutex<MockState>,
    latency: Mutex<Option<Duration>>,
}

impl MockOnyxiaApi {
    /// Empty backend: no projects, no data.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A personal and a group project, each with quotas, a couple of
    /// services and S3 profiles, plus the demo catalogs.
    pub fn demo() -> Arc<Self> {
        let api = Self::new();
        api.set_projects(vec![fixtures::project("user-alice"), fixtures::project("team-a")]);
        api.set_quotas(
            "user-alice",
            fixtures::quotas(&[
                ("requests.cpu", "10", "2500m"),
                ("requests.memory", "32Gi", "20Gi"),
                ("count/pods", "20", "17"),
            ]),
        );
        api.set_quotas(
            "team-a",
            fixtures::quotas(&[("requests.cpu", "40", "4"), ("requests.memory", "128Gi", "8Gi")]),
        );
        api.set_releases(
            "user-alice",
            vec![fixtures::release("jupyter-1", 10), fixtures::release("vscode-1", 20)],
        );
        api.set_releases("team-a", vec![fixtures::release("postgres-1", 5)]);
        api.set_s3_profiles(
            "user-alice",
            vec![
                fixtures::s3_profile("default", "user-alice"),
                fixtures::s3_profile("archive", "alice-archive"),
            ],
        );
        api.set_s3_profiles("team-a", vec![fixtures::s3_profile("default", "projet-team-a")]);
        api.set_catalogs(fixtures::demo_catalogs());
        api
    }

    // ─── Setup ────────────────────────────────────────────────────────────

    /// Replace the user's projects.
    pub fn set_projects(&self, projects: Vec<Project>) {
        self.state.lock().projects = projects;
    }

    /// Replace a project's quotas.
    pub fn set_quotas(&self, project_id: &str, quotas: Quotas) {
        self.state.lock().quotas.insert(project_id.to_string(), quotas);
    }

    /// Replace a project's releases.
    pub fn set_releases(&self, project_id: &str, releases: Vec<HelmRelease>) {
        self.state.lock().releases.insert(project_id.to_string(), releases);
    }

    /// Replace the catalogs.
    pub fn set_catalogs(&self, catalogs: Vec<Catalog>) {
        self.state.lock().catalogs = catalogs;
    }

    /// Replace a project's S3 profiles.
    pub fn set_s3_profiles(&self, project_id: &str, profiles: Vec<S3Profile>) {
        self.state.lock().s3_profiles.insert(project_id.to_string(), profiles);
    }

    /// Overwrite a config blob behind the app's back, as another session would.
    pub fn set_blob(&self, key: &str, value: &str) {
        self.state.lock().blobs.insert(key.to_string(), value.to_string());
    }

    /// Current content of a config blob.
    pub fn blob(&self, key: &str) -> Option<String> {
        self.state.lock().blobs.get(key).cloned()
    }

    /// Fail the next call of `method` with `error`.
    pub fn fail_next(&self, method: ApiMethod, error: OnyxiaError) {
        self.state.lock().failures.insert(method, error);
    }

    /// Number of release listings a deletion stays visible for. Zero (the
    /// default) removes the release on the next listing.
    pub fn set_deletion_lag(&self, listings: u32) {
        self.state.lock().deletion_lag = listings;
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = Some(latency);
    }

    /// Apply calls of `method` right away but answer them `delay` later,
    /// like a backend whose response is slow to come back.
    pub fn set_ack_delay(&self, method: ApiMethod, delay: Duration) {
        self.state.lock().ack_delays.insert(method, delay);
    }

    // ─── Inspection ───────────────────────────────────────────────────────

    /// Calls of `method` so far.
    pub fn calls(&self, method: ApiMethod) -> usize {
        self.state.lock().calls.get(&method).copied().unwrap_or(0)
    }

    /// Calls of any method so far.
    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Releases the backend currently holds for a project, pending
    /// deletions included.
    pub fn releases(&self, project_id: &str) -> Vec<HelmRelease> {
        self.state.lock().releases.get(project_id).cloned().unwrap_or_default()
    }

    async fn enter(&self, method: ApiMethod) -> Result<parking_lot::MutexGuard<'_, MockState>, OnyxiaError> {
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        let mut state = self.state.lock();
        *state.calls.entry(method).or_insert(0) += 1;
        if let Some(error) = state.failures.remove(&method) {
            tracing::debug!(?method, %error, "Injected failure");
            return Err(error);
        }
        Ok(state)
    }

    async fn acknowledge(&self, method: ApiMethod) {
        let delay = self.state.lock().ack_delays.get(&method).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn no_project(project_id: &str) -> OnyxiaError {
    OnyxiaError::not_found(format!("Project '{project_id}'"))
}

impl MockState {
    fn check_project(&self, project_id: &str) -> Result<(), OnyxiaError> {
        if self.projects.iter().any(|p| p.id == project_id) {
            Ok(())
        } else {
            Err(no_project(project_id))
        }
    }

    /// Advance pending deletions by one listing of `project_id`.
    fn drain_deletions(&mut self, project_id: &str) {
        let mut finished = Vec::new();
        for ((project, release), left) in self.pending_deletions.iter_mut() {
            if project != project_id {
                continue;
            }
            if *left == 0 {
                finished.push(release.clone());
            } else {
                *left -= 1;
            }
        }
        for release in finished {
            self.pending_deletions
                .remove(&(project_id.to_string(), release.clone()));
            if let Some(releases) = self.releases.get_mut(project_id) {
                releases.retain(|r| r.name != release);
            }
        }
    }
}

#[async_trait]
impl OnyxiaApi for MockOnyxiaApi {
    async fn get_user_projects(&self) -> Result<Vec<Project>, OnyxiaError> {
        let state = self.enter(ApiMethod::GetUserProjects).await?;
        Ok(state.projects.clone())
    }

    async fn get_quotas(&self, project_id: &str) -> Result<Quotas, OnyxiaError> {
        let state = self.enter(ApiMethod::GetQuotas).await?;
        state.check_project(project_id)?;
        Ok(state.quotas.get(project_id).cloned().unwrap_or_default())
    }

    async fn list_helm_releases(&self, project_id: &str) -> Result<Vec<HelmRelease>, OnyxiaError> {
        let mut state = self.enter(ApiMethod::ListHelmReleases).await?;
        state.check_project(project_id)?;
        state.drain_deletions(project_id);
        Ok(state.releases.get(project_id).cloned().unwrap_or_default())
    }

    async fn get_helm_release(
        &self,
        project_id: &str,
        release_name: &str,
    ) -> Result<Option<HelmRelease>, OnyxiaError> {
        let state = self.enter(ApiMethod::GetHelmRelease).await?;
        state.check_project(project_id)?;
        Ok(state
            .releases
            .get(project_id)
            .and_then(|releases| releases.iter().find(|r| r.name == release_name))
            .cloned())
    }

    async fn delete_helm_release(&self, project_id: &str, release_name: &str) -> Result<(), OnyxiaError> {
        {
            let mut state = self.enter(ApiMethod::DeleteHelmRelease).await?;
            state.check_project(project_id)?;
            let exists = state
                .releases
                .get(project_id)
                .is_some_and(|releases| releases.iter().any(|r| r.name == release_name));
            if !exists {
                return Err(OnyxiaError::not_found(format!("Service '{release_name}'")));
            }
            let lag = state.deletion_lag;
            state
                .pending_deletions
                .entry((project_id.to_string(), release_name.to_string()))
                .or_insert(lag);
        }
        self.acknowledge(ApiMethod::DeleteHelmRelease).await;
        Ok(())
    }

    async fn get_catalogs_and_charts(&self) -> Result<Vec<Catalog>, OnyxiaError> {
        let state = self.enter(ApiMethod::GetCatalogsAndCharts).await?;
        Ok(state.catalogs.clone())
    }

    async fn get_user_config_blob(&self, key: &str) -> Result<Option<String>, OnyxiaError> {
        let state = self.enter(ApiMethod::GetUserConfigBlob).await?;
        Ok(state.blobs.get(key).cloned())
    }

    async fn put_user_config_blob(&self, key: &str, value: &str) -> Result<(), OnyxiaError> {
        let mut state = self.enter(ApiMethod::PutUserConfigBlob).await?;
        state.blobs.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn list_s3_profiles(&self, project_id: &str) -> Result<Vec<S3Profile>, OnyxiaError> {
        let state = self.enter(ApiMethod::ListS3Profiles).await?;
        state.check_project(project_id)?;
        Ok(state.s3_profiles.get(project_id).cloned().unwrap_or_default())
    }
}
