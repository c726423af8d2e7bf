//! Route controller of the S3 explorer page.
//!
//! The page state (profile, directory, view mode) is mirrored in the URL.
//! State changes are republished as route updates on the derived
//! `routeParamsChanged` channel; URL changes come back through
//! [`RouteController::load`].

use async_trait::async_trait;
use onyxia_core::reactive::Memo;
use onyxia_core::OnyxiaError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::S3Profile;
use crate::app::ThunkContext;
use crate::events::ListenerHandle;
use crate::routing::{derive_route_updates, Route, RouteController, RouteMethod, RouteParams, RouteTracker};
use crate::store::{Slice, SliceAction, SliceState};
use crate::usecases::project_management::ProjectManagement;

/// Listing layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    /// One row per object
    #[default]
    List,
    /// Thumbnail grid
    Grid,
}

impl ViewMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Grid => "grid",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "list" => Some(Self::List),
            "grid" => Some(Self::Grid),
            _ => None,
        }
    }
}

/// URL params of the explorer page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ExplorerParams {
    /// Selected profile; `None` lets the page pick one
    pub profile: Option<String>,
    /// Directory, without leading or trailing `/`
    pub path: String,
    /// Listing layout
    pub mode: ViewMode,
}

impl RouteParams for S3ExplorerParams {
    const ROUTE_NAME: &'static str = "s3Explorer";

    fn to_route(&self) -> Route {
        let mut route = Route::new(Self::ROUTE_NAME).with_param("mode", self.mode.as_str());
        if let Some(profile) = &self.profile {
            route = route.with_param("profile", profile.clone());
        }
        if !self.path.is_empty() {
            route = route.with_param("path", self.path.clone());
        }
        route
    }

    fn from_route(route: &Route) -> Result<Self, OnyxiaError> {
        Ok(Self {
            profile: route.param("profile").filter(|p| !p.is_empty()).map(str::to_string),
            path: normalize_path(route.param("path").unwrap_or_default()),
            mode: route.param("mode").and_then(ViewMode::parse).unwrap_or_default(),
        })
    }
}

fn normalize_path(raw: &str) -> String {
    raw.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Slice marker.
#[derive(Debug)]
pub struct S3ExplorerRootSlice;

/// Live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct S3ExplorerRootState {
    /// Profiles of the current project
    pub profiles: Vec<S3Profile>,
    /// Selected profile, `None` when the project has none
    pub selected_profile: Option<String>,
    /// Current directory
    pub path: String,
    /// Listing layout
    pub view_mode: ViewMode,
}

impl S3ExplorerRootState {
    fn route_params(&self) -> S3ExplorerParams {
        S3ExplorerParams {
            profile: self.selected_profile.clone(),
            path: self.path.clone(),
            mode: self.view_mode,
        }
    }

    fn has_profile(&self, name: &str) -> bool {
        self.profiles.iter().any(|p| p.name == name)
    }
}

/// Actions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum S3ExplorerRootAction {
    /// Page initialized from route params
    #[serde(rename_all = "camelCase")]
    Initialized {
        /// Profiles of the project
        profiles: Vec<S3Profile>,
        /// Profile picked
        selected_profile: Option<String>,
        /// Directory opened
        path: String,
        /// Layout
        view_mode: ViewMode,
    },
    /// User picked another profile; the directory resets to the root
    SelectedProfileChanged {
        /// Profile picked
        profile: String,
    },
    /// User navigated to another directory
    DirectoryPathChanged {
        /// New directory
        path: String,
    },
    /// User switched layout
    #[serde(rename_all = "camelCase")]
    ViewModeChanged {
        /// New layout
        view_mode: ViewMode,
    },
}

impl SliceAction for S3ExplorerRootAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::SelectedProfileChanged { .. } => "selectedProfileChanged",
            Self::DirectoryPathChanged { .. } => "directoryPathChanged",
            Self::ViewModeChanged { .. } => "viewModeChanged",
        }
    }
}

impl Slice for S3ExplorerRootSlice {
    const NAME: &'static str = "s3ExplorerRoot";
    type State = S3ExplorerRootState;
    type Action = S3ExplorerRootAction;

    fn reduce(
        state: &mut SliceState<S3ExplorerRootState>,
        action: &S3ExplorerRootAction,
    ) -> Result<(), OnyxiaError> {
        match action {
            S3ExplorerRootAction::Initialized {
                profiles,
                selected_profile,
                path,
                view_mode,
            } => {
                *state = SliceState::Ready(S3ExplorerRootState {
                    profiles: profiles.clone(),
                    selected_profile: selected_profile.clone(),
                    path: path.clone(),
                    view_mode: *view_mode,
                });
            }
            S3ExplorerRootAction::SelectedProfileChanged { profile } => {
                let state = state.ready_mut(Self::NAME)?;
                if !state.has_profile(profile) {
                    return Err(OnyxiaError::not_found(format!("S3 profile '{profile}'")));
                }
                state.selected_profile = Some(profile.clone());
                state.path.clear();
            }
            S3ExplorerRootAction::DirectoryPathChanged { path } => {
                state.ready_mut(Self::NAME)?.path = path.clone();
            }
            S3ExplorerRootAction::ViewModeChanged { view_mode } => {
                state.ready_mut(Self::NAME)?.view_mode = *view_mode;
            }
        }
        Ok(())
    }
}

/// Initial load and lateral moves replace the URL; user navigation pushes.
fn route_method(action: &S3ExplorerRootAction) -> RouteMethod {
    match action {
        S3ExplorerRootAction::Initialized { .. } | S3ExplorerRootAction::ViewModeChanged { .. } => {
            RouteMethod::Replace
        }
        S3ExplorerRootAction::SelectedProfileChanged { .. }
        | S3ExplorerRootAction::DirectoryPathChanged { .. } => RouteMethod::Push,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// View model
// ─────────────────────────────────────────────────────────────────────────────

/// One breadcrumb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Crumb {
    /// Text shown
    pub label: String,
    /// Directory the crumb opens
    pub path: String,
}

/// Explorer header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerView {
    /// Selected profile
    pub profile: Option<String>,
    /// Bucket of the selected profile
    pub bucket: Option<String>,
    /// Root crumb (the bucket), then one per directory level
    pub breadcrumbs: Vec<Crumb>,
    /// Layout
    pub view_mode: ViewMode,
}

fn derive_explorer(state: &S3ExplorerRootState) -> ExplorerView {
    let bucket = state
        .selected_profile
        .as_ref()
        .and_then(|name| state.profiles.iter().find(|p| &p.name == name))
        .map(|p| p.bucket.clone());

    let mut breadcrumbs = vec![Crumb {
        label: bucket.clone().unwrap_or_default(),
        path: String::new(),
    }];
    let mut current = String::new();
    for segment in state.path.split('/').filter(|s| !s.is_empty()) {
        if !current.is_empty() {
            current.push('/');
        }
        current.push_str(segment);
        breadcrumbs.push(Crumb {
            label: segment.to_string(),
            path: current.clone(),
        });
    }

    ExplorerView {
        profile: state.selected_profile.clone(),
        bucket,
        breadcrumbs,
        view_mode: state.view_mode,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Usecase
// ─────────────────────────────────────────────────────────────────────────────

/// S3 explorer route controller.
#[derive(Clone)]
pub struct S3ExplorerRoot {
    ctx: ThunkContext,
    projects: ProjectManagement,
    tracker: Arc<RouteTracker<S3ExplorerParams>>,
    explorer_view: Arc<Memo<S3ExplorerRootState, ExplorerView>>,
    _route_updates: Arc<ListenerHandle>,
}

impl S3ExplorerRoot {
    pub(crate) fn new(ctx: ThunkContext, projects: ProjectManagement) -> Result<Self, OnyxiaError> {
        let tracker = Arc::new(RouteTracker::new());
        let route_updates = derive_route_updates::<S3ExplorerRootSlice, _>(
            Arc::downgrade(&ctx.store),
            tracker.clone(),
            S3ExplorerRootState::route_params,
            route_method,
        )?;
        Ok(Self {
            ctx,
            projects,
            tracker,
            explorer_view: Arc::new(Memo::new(derive_explorer)),
            _route_updates: Arc::new(route_updates),
        })
    }

    // ─── Thunks ───────────────────────────────────────────────────────────

    /// Switch profile; opens its root directory.
    pub fn change_profile(&self, profile: &str) -> Result<(), OnyxiaError> {
        let current = self
            .ctx
            .store
            .read::<S3ExplorerRootSlice, _>(|state| state.selected_profile.clone())?;
        if current.as_deref() == Some(profile) {
            return Ok(());
        }
        self.ctx
            .store
            .dispatch::<S3ExplorerRootSlice>(S3ExplorerRootAction::SelectedProfileChanged {
                profile: profile.to_string(),
            })
    }

    /// Open `path`. Leading, trailing and doubled `/` are ignored.
    pub fn change_directory(&self, path: &str) -> Result<(), OnyxiaError> {
        let path = normalize_path(path);
        let current = self
            .ctx
            .store
            .read::<S3ExplorerRootSlice, _>(|state| state.path.clone())?;
        if current == path {
            return Ok(());
        }
        self.ctx
            .store
            .dispatch::<S3ExplorerRootSlice>(S3ExplorerRootAction::DirectoryPathChanged { path })
    }

    /// Switch listing layout.
    pub fn change_view_mode(&self, view_mode: ViewMode) -> Result<(), OnyxiaError> {
        let current = self
            .ctx
            .store
            .read::<S3ExplorerRootSlice, _>(|state| state.view_mode)?;
        if current == view_mode {
            return Ok(());
        }
        self.ctx
            .store
            .dispatch::<S3ExplorerRootSlice>(S3ExplorerRootAction::ViewModeChanged { view_mode })
    }

    async fn initialize(&self, params: &S3ExplorerParams) -> Result<bool, OnyxiaError> {
        let project_id = self.projects.current_project_id()?;
        let profiles = self.ctx.api.list_s3_profiles(&project_id).await?;

        if let Some(requested) = &params.profile {
            if !profiles.iter().any(|p| &p.name == requested) {
                return Ok(false);
            }
        }

        let selected_profile = params
            .profile
            .clone()
            .or_else(|| {
                self.ctx
                    .config
                    .s3
                    .default_profile
                    .clone()
                    .filter(|name| profiles.iter().any(|p| &p.name == name))
            })
            .or_else(|| profiles.first().map(|p| p.name.clone()));
        let path = if params.profile.is_some() {
            params.path.clone()
        } else {
            String::new()
        };

        tracing::debug!(project_id = %project_id, profile = ?selected_profile, "S3 explorer initialized");
        self.ctx
            .store
            .dispatch::<S3ExplorerRootSlice>(S3ExplorerRootAction::Initialized {
                profiles,
                selected_profile,
                path,
                view_mode: params.mode,
            })?;
        Ok(true)
    }

    // ─── Selectors ────────────────────────────────────────────────────────

    /// Header view model.
    pub fn explorer(&self) -> Result<Arc<ExplorerView>, OnyxiaError> {
        let state = self
            .ctx
            .store
            .read::<S3ExplorerRootSlice, _>(Clone::clone)?;
        Ok(self.explorer_view.get(state))
    }

    /// Params the URL should show.
    pub fn route_params(&self) -> Result<S3ExplorerParams, OnyxiaError> {
        self.ctx
            .store
            .read::<S3ExplorerRootSlice, _>(S3ExplorerRootState::route_params)
    }
}

#[async_trait]
impl RouteController for S3ExplorerRoot {
    type Params = S3ExplorerParams;

    const USECASE_NAME: &'static str = S3ExplorerRootSlice::NAME;

    fn route_tracker(&self) -> &Arc<RouteTracker<S3ExplorerParams>> {
        &self.tracker
    }

    /// Reconcile the page with route params coming from the URL.
    ///
    /// - an unknown profile falls back to the default route
    /// - once initialized, the current params are surfaced unless they
    ///   already equal the requested ones
    /// - otherwise profiles are fetched, state initialized, and the
    ///   canonical params returned when they differ from the request
    async fn load(&self, params: S3ExplorerParams) -> Result<Option<S3ExplorerParams>, OnyxiaError> {
        let mut requested = params.clone();
        loop {
            if let SliceState::Ready(state) = self.ctx.store.snapshot::<S3ExplorerRootSlice>()? {
                if let Some(profile) = &requested.profile {
                    if !state.has_profile(profile) {
                        tracing::debug!(profile = %profile, "Unknown S3 profile in URL; using default route");
                        requested = S3ExplorerParams {
                            mode: requested.mode,
                            ..S3ExplorerParams::default()
                        };
                        continue;
                    }
                }
                let current = state.route_params();
                return Ok((current != params).then_some(current));
            }

            if self.initialize(&requested).await? {
                let current = self.route_params()?;
                return Ok((current != params).then_some(current));
            }
            tracing::debug!(profile = ?requested.profile, "Unknown S3 profile in URL; using default route");
            requested = S3ExplorerParams {
                mode: requested.mode,
                ..S3ExplorerParams::default()
            };
        }
    }
}
