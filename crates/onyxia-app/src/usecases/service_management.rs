//! Launched services of the current project.
//!
//! The list is refreshed by a polling loop. Deletion is asynchronous on the
//! backend: a deleted release keeps being listed for a while, so the slice
//! tracks "deletion in progress" until a poll no longer returns it, then
//! publishes `serviceDeleted`.

use chrono::{DateTime, Utc};
use onyxia_core::reactive::Memo;
use onyxia_core::OnyxiaError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::api::{HelmRelease, ReleaseStatus};
use crate::app::ThunkContext;
use crate::events::EventFilter;
use crate::polling::{Cancellation, InFlight, PollingHandle, PollingSignals};
use crate::store::{Slice, SliceAction, SliceState};
use crate::usecases::project_management::{ProjectManagement, ProjectManagementSlice, PROJECT_CHANGED};

/// Name of the action marking the start of a deletion.
pub const DELETION_STARTED: &str = "deletionStarted";
/// Name of the action published once a deleted release is gone.
pub const SERVICE_DELETED: &str = "serviceDeleted";

/// Slice marker.
#[derive(Debug)]
pub struct ServiceManagementSlice;

/// Live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceManagementState {
    /// Project the list belongs to
    pub project_id: String,
    /// Releases as last polled
    pub releases: Vec<HelmRelease>,
    /// Releases whose deletion was requested but are still listed
    pub deleting: BTreeSet<String>,
}

/// Actions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServiceManagementAction {
    /// A poll returned
    #[serde(rename_all = "camelCase")]
    UpdateCompleted {
        /// Project polled
        project_id: String,
        /// Releases returned
        releases: Vec<HelmRelease>,
    },
    /// The backend accepted a deletion request
    #[serde(rename_all = "camelCase")]
    DeletionStarted {
        /// Release being deleted
        release_name: String,
    },
    /// A release whose deletion was requested is no longer listed
    #[serde(rename_all = "camelCase")]
    ServiceDeleted {
        /// Release gone
        release_name: String,
    },
}

impl SliceAction for ServiceManagementAction {
    fn name(&self) -> &'static str {
        match self {
            Self::UpdateCompleted { .. } => "updateCompleted",
            Self::DeletionStarted { .. } => DELETION_STARTED,
            Self::ServiceDeleted { .. } => SERVICE_DELETED,
        }
    }
}

impl Slice for ServiceManagementSlice {
    const NAME: &'static str = "serviceManagement";
    type State = ServiceManagementState;
    type Action = ServiceManagementAction;

    fn reduce(
        state: &mut SliceState<ServiceManagementState>,
        action: &ServiceManagementAction,
    ) -> Result<(), OnyxiaError> {
        match action {
            ServiceManagementAction::UpdateCompleted {
                project_id,
                releases,
            } => match state {
                SliceState::Ready(current) if &current.project_id == project_id => {
                    current.releases = releases.clone();
                }
                _ => {
                    *state = SliceState::Ready(ServiceManagementState {
                        project_id: project_id.clone(),
                        releases: releases.clone(),
                        deleting: BTreeSet::new(),
                    });
                }
            },
            ServiceManagementAction::DeletionStarted { release_name } => {
                let current = state.ready_mut(Self::NAME)?;
                if !current.releases.iter().any(|r| &r.name == release_name) {
                    return Err(OnyxiaError::not_found(format!("Service '{release_name}'")));
                }
                current.deleting.insert(release_name.clone());
            }
            ServiceManagementAction::ServiceDeleted { release_name } => {
                let current = state.ready_mut(Self::NAME)?;
                current.deleting.remove(release_name);
                current.releases.retain(|r| &r.name != release_name);
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View model
// ─────────────────────────────────────────────────────────────────────────────

/// One row of the service list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceView {
    /// Release name
    pub name: String,
    /// User-chosen name
    pub friendly_name: String,
    /// Chart launched
    pub chart: String,
    /// Catalog of the chart
    pub catalog_id: String,
    /// Launch time
    pub started_at: DateTime<Utc>,
    /// Helm status
    pub status: ReleaseStatus,
    /// First public URL
    pub url: Option<String>,
    /// Every pod ready and the release deployed
    pub is_ready: bool,
    /// Deletion requested, not yet complete
    pub is_deleting: bool,
}

type ServicesInput = (Vec<HelmRelease>, BTreeSet<String>);

fn derive_services((releases, deleting): &ServicesInput) -> Vec<ServiceView> {
    let mut services: Vec<ServiceView> = releases
        .iter()
        .map(|release| ServiceView {
            name: release.name.clone(),
            friendly_name: release.friendly_name.clone(),
            chart: release.chart.clone(),
            catalog_id: release.catalog_id.clone(),
            started_at: release.started_at,
            status: release.status,
            url: release.urls.first().cloned(),
            is_ready: release.status == ReleaseStatus::Deployed
                && !release.pods.is_empty()
                && release.pods.iter().all(|pod| pod.ready),
            is_deleting: deleting.contains(&release.name),
        })
        .collect();
    services.sort_by(|a, b| b.started_at.cmp(&a.started_at).then_with(|| a.name.cmp(&b.name)));
    services
}

// ─────────────────────────────────────────────────────────────────────────────
// Usecase
// ─────────────────────────────────────────────────────────────────────────────

/// Service list usecase.
#[derive(Clone)]
pub struct ServiceManagement {
    ctx: ThunkContext,
    projects: ProjectManagement,
    in_flight: Arc<InFlight>,
    services_view: Arc<Memo<ServicesInput, Vec<ServiceView>>>,
}

impl ServiceManagement {
    pub(crate) fn new(ctx: ThunkContext, projects: ProjectManagement) -> Self {
        Self {
            ctx,
            projects,
            in_flight: Arc::new(InFlight::default()),
            services_view: Arc::new(Memo::new(derive_services)),
        }
    }

    // ─── Thunks ───────────────────────────────────────────────────────────

    /// Start polling the service list. Project changes trigger an
    /// immediate refresh.
    pub fn set_active(&self) -> PollingHandle {
        let bus = self.ctx.store.bus();
        let signals = PollingSignals::none()
            .wake_on(bus.subscribe(EventFilter::action(ProjectManagementSlice::NAME, PROJECT_CHANGED)));
        let interval = self.ctx.config.polling.services.delay();

        let this = self.clone();
        self.ctx.polling.start(
            "services",
            signals,
            move |cancel| {
                let this = this.clone();
                async move { this.update(&cancel).await }
            },
            move || interval,
        )
    }

    /// Refresh the service list once, outside any polling loop.
    pub async fn refresh(&self) -> Result<(), OnyxiaError> {
        let project_id = self.projects.current_project_id()?;
        let releases = self.ctx.api.list_helm_releases(&project_id).await?;
        self.apply(project_id, releases)
    }

    /// Request deletion of a service.
    ///
    /// The backend call comes first; nothing is dispatched when it fails.
    /// Deleting a service whose deletion is already under way is a no-op.
    /// When a poll already stopped listing the release by the time the
    /// backend answers, `serviceDeleted` is published right away.
    pub async fn delete_service(&self, release_name: &str) -> Result<(), OnyxiaError> {
        let project_id = self.projects.current_project_id()?;
        let (exists, already_deleting) = self.ctx.store.read::<ServiceManagementSlice, _>(|state| {
            (
                state.releases.iter().any(|r| r.name == release_name),
                state.deleting.contains(release_name),
            )
        })?;
        if !exists {
            return Err(OnyxiaError::not_found(format!("Service '{release_name}'")));
        }
        if already_deleting {
            return Ok(());
        }

        self.ctx
            .api
            .delete_helm_release(&project_id, release_name)
            .await?;
        tracing::info!(project_id = %project_id, release = %release_name, "Service deletion requested");

        // A poll may have landed while the request was being acknowledged.
        let listed = self.ctx.store.read::<ServiceManagementSlice, _>(|state| {
            (state.project_id == project_id).then(|| state.releases.iter().any(|r| r.name == release_name))
        })?;
        let action = match listed {
            Some(true) => ServiceManagementAction::DeletionStarted {
                release_name: release_name.to_string(),
            },
            Some(false) => {
                tracing::info!(release = %release_name, "Service deleted");
                ServiceManagementAction::ServiceDeleted {
                    release_name: release_name.to_string(),
                }
            }
            None => {
                tracing::debug!(project_id = %project_id, "Project changed during deletion");
                return Ok(());
            }
        };
        self.ctx.store.dispatch::<ServiceManagementSlice>(action)
    }

    async fn update(&self, cancel: &Cancellation) -> Result<(), OnyxiaError> {
        let Some(_guard) = self.in_flight.try_begin() else {
            tracing::trace!("Service list update already in flight");
            return Ok(());
        };
        let project_id = self.projects.current_project_id()?;
        let releases = self.ctx.api.list_helm_releases(&project_id).await?;
        if cancel.is_cancelled() {
            return Ok(());
        }
        self.apply(project_id, releases)
    }

    fn apply(&self, project_id: String, releases: Vec<HelmRelease>) -> Result<(), OnyxiaError> {
        if self.projects.current_project_id()? != project_id {
            tracing::debug!(project_id = %project_id, "Discarding service list of a previous project");
            return Ok(());
        }

        let vanished: Vec<String> = match self.ctx.store.snapshot::<ServiceManagementSlice>()? {
            SliceState::Ready(state) if state.project_id == project_id => state
                .deleting
                .iter()
                .filter(|name| !releases.iter().any(|r| &r.name == *name))
                .cloned()
                .collect(),
            _ => Vec::new(),
        };

        self.ctx
            .store
            .dispatch::<ServiceManagementSlice>(ServiceManagementAction::UpdateCompleted {
                project_id,
                releases,
            })?;

        for release_name in vanished {
            tracing::info!(release = %release_name, "Service deleted");
            self.ctx
                .store
                .dispatch::<ServiceManagementSlice>(ServiceManagementAction::ServiceDeleted { release_name })?;
        }
        Ok(())
    }

    // ─── Selectors ────────────────────────────────────────────────────────

    /// Services, newest first.
    pub fn services(&self) -> Result<Arc<Vec<ServiceView>>, OnyxiaError> {
        let input = self
            .ctx
            .store
            .read::<ServiceManagementSlice, _>(|state| (state.releases.clone(), state.deleting.clone()))?;
        Ok(self.services_view.get(input))
    }

    // ─── Protected (other slices only) ────────────────────────────────────

    /// Whether any deletion is in progress. `false` before the first poll.
    pub(crate) fn has_ongoing_deletion(&self) -> bool {
        self.ctx
            .store
            .read::<ServiceManagementSlice, _>(|state| !state.deleting.is_empty())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn release(name: &str, hour: u32) -> HelmRelease {
        HelmRelease {
            name: name.to_string(),
            catalog_id: "ide".to_string(),
            chart: "jupyter-python".to_string(),
            friendly_name: name.to_string(),
            started_at: Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap(),
            status: ReleaseStatus::Deployed,
            urls: vec![format!("https://{name}.example.org")],
            pods: Vec::new(),
        }
    }

    fn ready(releases: Vec<HelmRelease>) -> SliceState<ServiceManagementState> {
        SliceState::Ready(ServiceManagementState {
            project_id: "p".to_string(),
            releases,
            deleting: BTreeSet::new(),
        })
    }

    #[test]
    fn project_switch_resets_deleting() {
        let mut state = ready(vec![release("a", 1)]);
        ServiceManagementSlice::reduce(
            &mut state,
            &ServiceManagementAction::DeletionStarted {
                release_name: "a".to_string(),
            },
        )
        .unwrap();
        ServiceManagementSlice::reduce(
            &mut state,
            &ServiceManagementAction::UpdateCompleted {
                project_id: "other".to_string(),
                releases: Vec::new(),
            },
        )
        .unwrap();
        let SliceState::Ready(state) = state else {
            panic!("state should be ready");
        };
        assert!(state.deleting.is_empty());
        assert_eq!(state.project_id, "other");
    }

    #[test]
    fn deleting_unknown_release_is_rejected() {
        let mut state = ready(vec![release("a", 1)]);
        let result = ServiceManagementSlice::reduce(
            &mut state,
            &ServiceManagementAction::DeletionStarted {
                release_name: "b".to_string(),
            },
        );
        assert!(matches!(result, Err(OnyxiaError::NotFound { .. })));
    }

    #[test]
    fn services_view_sorted_newest_first() {
        let mut deleting = BTreeSet::new();
        deleting.insert("old".to_string());
        let view = derive_services(&(vec![release("old", 1), release("new", 5)], deleting));
        assert_eq!(view[0].name, "new");
        assert!(view[1].is_deleting);
        assert!(!view[0].is_ready, "no pods means not ready");
    }
}
