//! Details page of a single service.
//!
//! `set_active(release)` polls the release until the caller sets the loop
//! inactive, the release is deleted (`serviceDeleted`) or the project
//! changes. A result is applied only if its loop is still live and the
//! release is still the one on display. Activating a release clears what
//! was shown for the previous one.

use onyxia_core::reactive::Memo;
use onyxia_core::OnyxiaError;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use crate::api::{HelmRelease, ReleaseStatus};
use crate::app::ThunkContext;
use crate::events::{AppEvent, EventFilter};
use crate::polling::{Cancellation, InFlight, PollingHandle, PollingSignals};
use crate::store::{Slice, SliceAction, SliceState};
use crate::usecases::project_management::{ProjectManagement, ProjectManagementSlice, PROJECT_CHANGED};
use crate::usecases::service_management::{ServiceManagementAction, ServiceManagementSlice, SERVICE_DELETED};

/// Slice marker.
#[derive(Debug)]
pub struct ServiceDetailsSlice;

/// Live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetailsState {
    /// Project of the release
    pub project_id: String,
    /// Release as last polled
    pub release: HelmRelease,
}

/// Actions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServiceDetailsAction {
    /// A release was put on display; nothing is known about it yet
    #[serde(rename_all = "camelCase")]
    Activated {
        /// Project of the release
        project_id: String,
        /// Release to poll
        release_name: String,
    },
    /// A poll returned
    #[serde(rename_all = "camelCase")]
    UpdateCompleted {
        /// Project polled
        project_id: String,
        /// Release returned
        release: HelmRelease,
    },
}

impl SliceAction for ServiceDetailsAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Activated { .. } => "activated",
            Self::UpdateCompleted { .. } => "updateCompleted",
        }
    }
}

impl Slice for ServiceDetailsSlice {
    const NAME: &'static str = "serviceDetails";
    type State = ServiceDetailsState;
    type Action = ServiceDetailsAction;

    fn reduce(
        state: &mut SliceState<ServiceDetailsState>,
        action: &ServiceDetailsAction,
    ) -> Result<(), OnyxiaError> {
        match action {
            ServiceDetailsAction::Activated { .. } => *state = SliceState::Uninitialized,
            ServiceDetailsAction::UpdateCompleted { project_id, release } => {
                *state = SliceState::Ready(ServiceDetailsState {
                    project_id: project_id.clone(),
                    release: release.clone(),
                });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View model
// ─────────────────────────────────────────────────────────────────────────────

/// One pod row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PodView {
    /// Pod name
    pub name: String,
    /// Kubernetes phase
    pub phase: String,
    /// All containers ready
    pub ready: bool,
    /// Restarts so far
    pub restart_count: u32,
}

/// The details page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDetailsView {
    /// Release name
    pub name: String,
    /// User-chosen name
    pub friendly_name: String,
    /// Helm status
    pub status: ReleaseStatus,
    /// Public URLs
    pub urls: Vec<String>,
    /// Pods, by name
    pub pods: Vec<PodView>,
    /// Ready pods
    pub ready_pods: usize,
    /// Deployed with every pod ready
    pub is_ready: bool,
}

fn derive_details(release: &HelmRelease) -> ServiceDetailsView {
    let mut pods: Vec<PodView> = release
        .pods
        .iter()
        .map(|pod| PodView {
            name: pod.name.clone(),
            phase: pod.phase.clone(),
            ready: pod.ready,
            restart_count: pod.restart_count,
        })
        .collect();
    pods.sort_by(|a, b| a.name.cmp(&b.name));
    let ready_pods = pods.iter().filter(|pod| pod.ready).count();
    ServiceDetailsView {
        name: release.name.clone(),
        friendly_name: release.friendly_name.clone(),
        status: release.status,
        urls: release.urls.clone(),
        is_ready: release.status == ReleaseStatus::Deployed && !pods.is_empty() && ready_pods == pods.len(),
        ready_pods,
        pods,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usecase
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveRelease {
    project_id: String,
    release_name: String,
}

/// Service details usecase.
#[derive(Clone)]
pub struct ServiceDetails {
    ctx: ThunkContext,
    projects: ProjectManagement,
    active: Arc<Mutex<Option<ActiveRelease>>>,
    details_view: Arc<Memo<HelmRelease, ServiceDetailsView>>,
}

impl ServiceDetails {
    pub(crate) fn new(ctx: ThunkContext, projects: ProjectManagement) -> Self {
        Self {
            ctx,
            projects,
            active: Arc::new(Mutex::new(None)),
            details_view: Arc::new(Memo::new(derive_details)),
        }
    }

    // ─── Thunks ───────────────────────────────────────────────────────────

    /// Start polling `release_name` in the current project.
    ///
    /// Details fail with `NotInitialized` until the first poll of this
    /// release lands. Each loop has its own in-flight guard, so an update of
    /// a previous loop never delays the first fetch.
    pub fn set_active(&self, release_name: &str) -> Result<PollingHandle, OnyxiaError> {
        let target = ActiveRelease {
            project_id: self.projects.current_project_id()?,
            release_name: release_name.to_string(),
        };
        *self.active.lock() = Some(target.clone());
        self.ctx
            .store
            .dispatch::<ServiceDetailsSlice>(ServiceDetailsAction::Activated {
                project_id: target.project_id.clone(),
                release_name: target.release_name.clone(),
            })?;

        let watched = target.release_name.clone();
        let stop = EventFilter::action(ServiceManagementSlice::NAME, SERVICE_DELETED)
            .or_action(ProjectManagementSlice::NAME, PROJECT_CHANGED)
            .where_event(move |event| ends_watch(event, &watched));
        let signals = PollingSignals::none().stop_on(self.ctx.store.bus().subscribe(stop));
        let interval = self.ctx.config.polling.service_details.delay();

        tracing::debug!(release = %release_name, "Watching service");
        let this = self.clone();
        let in_flight = Arc::new(InFlight::default());
        Ok(self.ctx.polling.start(
            "service_details",
            signals,
            move |cancel| {
                let this = this.clone();
                let target = target.clone();
                let in_flight = in_flight.clone();
                async move { this.update(&target, &cancel, &in_flight).await }
            },
            move || interval,
        ))
    }

    async fn update(
        &self,
        target: &ActiveRelease,
        cancel: &Cancellation,
        in_flight: &InFlight,
    ) -> Result<(), OnyxiaError> {
        let Some(_guard) = in_flight.try_begin() else {
            return Ok(());
        };
        let fetched = self
            .ctx
            .api
            .get_helm_release(&target.project_id, &target.release_name)
            .await?;

        if cancel.is_cancelled() || self.active.lock().as_ref() != Some(target) {
            tracing::trace!(release = %target.release_name, "Discarding stale service details");
            return Ok(());
        }
        let Some(release) = fetched else {
            tracing::debug!(release = %target.release_name, "Service no longer exists");
            return Ok(());
        };
        self.ctx
            .store
            .dispatch::<ServiceDetailsSlice>(ServiceDetailsAction::UpdateCompleted {
                project_id: target.project_id.clone(),
                release,
            })
    }

    // ─── Selectors ────────────────────────────────────────────────────────

    /// The details page. Fails until the first poll completed.
    pub fn details(&self) -> Result<Arc<ServiceDetailsView>, OnyxiaError> {
        let release = self
            .ctx
            .store
            .read::<ServiceDetailsSlice, _>(|state| state.release.clone())?;
        Ok(self.details_view.get(release))
    }

    /// Whether the service is up.
    pub fn is_ready(&self) -> Result<bool, OnyxiaError> {
        Ok(self.details()?.is_ready)
    }

    /// Release currently on display.
    pub fn active_release(&self) -> Option<String> {
        self.active.lock().as_ref().map(|a| a.release_name.clone())
    }
}

fn ends_watch(event: &AppEvent, release_name: &str) -> bool {
    if event.is(ProjectManagementSlice::NAME, PROJECT_CHANGED) {
        return true;
    }
    matches!(
        event.action::<ServiceManagementSlice>(),
        Some(ServiceManagementAction::ServiceDeleted { release_name: deleted }) if deleted == release_name
    )
}
