//! Project selection.
//!
//! Every other slice scopes its backend calls to the current project and
//! listens for `projectChanged` to refetch.

use onyxia_core::OnyxiaError;
use serde::Serialize;

use crate::api::Project;
use crate::app::ThunkContext;
use crate::store::{Slice, SliceAction, SliceState};

/// Slice marker.
#[derive(Debug)]
pub struct ProjectManagementSlice;

/// Live state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManagementState {
    /// Projects the user belongs to
    pub projects: Vec<Project>,
    /// Currently selected project
    pub selected_project_id: String,
}

/// Actions.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ProjectManagementAction {
    /// Projects fetched, first selection made
    #[serde(rename_all = "camelCase")]
    Initialized {
        /// All projects
        projects: Vec<Project>,
        /// Selected project
        selected_project_id: String,
    },
    /// The user switched project
    #[serde(rename_all = "camelCase")]
    ProjectChanged {
        /// Newly selected project
        project_id: String,
    },
}

impl SliceAction for ProjectManagementAction {
    fn name(&self) -> &'static str {
        match self {
            Self::Initialized { .. } => "initialized",
            Self::ProjectChanged { .. } => PROJECT_CHANGED,
        }
    }
}

/// Name of the project switch action.
pub const PROJECT_CHANGED: &str = "projectChanged";

impl Slice for ProjectManagementSlice {
    const NAME: &'static str = "projectManagement";
    type State = ProjectManagementState;
    type Action = ProjectManagementAction;

    fn reduce(
        state: &mut SliceState<ProjectManagementState>,
        action: &ProjectManagementAction,
    ) -> Result<(), OnyxiaError> {
        match action {
            ProjectManagementAction::Initialized {
                projects,
                selected_project_id,
            } => {
                *state = SliceState::Ready(ProjectManagementState {
                    projects: projects.clone(),
                    selected_project_id: selected_project_id.clone(),
                });
            }
            ProjectManagementAction::ProjectChanged { project_id } => {
                let state = state.ready_mut(Self::NAME)?;
                if !state.projects.iter().any(|p| &p.id == project_id) {
                    return Err(OnyxiaError::not_found(format!("Project '{project_id}'")));
                }
                state.selected_project_id = project_id.clone();
            }
        }
        Ok(())
    }
}

/// Project selection usecase.
#[derive(Clone)]
pub struct ProjectManagement {
    ctx: ThunkContext,
}

impl ProjectManagement {
    pub(crate) fn new(ctx: ThunkContext) -> Self {
        Self { ctx }
    }

    // ─── Thunks ───────────────────────────────────────────────────────────

    /// Fetch the user's projects and select the first (personal) one.
    pub async fn initialize(&self) -> Result<(), OnyxiaError> {
        let projects = self.ctx.api.get_user_projects().await?;
        let selected_project_id = projects
            .first()
            .map(|p| p.id.clone())
            .ok_or_else(|| OnyxiaError::invalid("User belongs to no project"))?;

        tracing::info!(project_id = %selected_project_id, count = projects.len(), "Projects loaded");
        self.ctx
            .store
            .dispatch::<ProjectManagementSlice>(ProjectManagementAction::Initialized {
                projects,
                selected_project_id,
            })
    }

    /// Switch to another project. Selecting the current project is a no-op.
    pub fn change_project(&self, project_id: &str) -> Result<(), OnyxiaError> {
        let current = self.current_project_id()?;
        if current == project_id {
            return Ok(());
        }
        tracing::info!(from = %current, to = %project_id, "Changing project");
        self.ctx
            .store
            .dispatch::<ProjectManagementSlice>(ProjectManagementAction::ProjectChanged {
                project_id: project_id.to_string(),
            })
    }

    // ─── Selectors ────────────────────────────────────────────────────────

    /// The selected project.
    pub fn current_project(&self) -> Result<Project, OnyxiaError> {
        self.ctx
            .store
            .read::<ProjectManagementSlice, _>(|state| {
                state
                    .projects
                    .iter()
                    .find(|p| p.id == state.selected_project_id)
                    .cloned()
            })?
            .ok_or_else(|| OnyxiaError::internal("Selected project missing from project list"))
    }

    /// Every project the user can switch to.
    pub fn available_projects(&self) -> Result<Vec<Project>, OnyxiaError> {
        self.ctx
            .store
            .read::<ProjectManagementSlice, _>(|state| state.projects.clone())
    }

    // ─── Protected (other slices only) ────────────────────────────────────

    pub(crate) fn current_project_id(&self) -> Result<String, OnyxiaError> {
        self.ctx
            .store
            .read::<ProjectManagementSlice, _>(|state| state.selected_project_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            name: id.to_uppercase(),
            group: None,
            namespace: format!("user-{id}"),
        }
    }

    #[test]
    fn change_to_unknown_project_is_rejected() {
        let mut state = SliceState::Ready(ProjectManagementState {
            projects: vec![project("a")],
            selected_project_id: "a".to_string(),
        });
        let err = ProjectManagementSlice::reduce(
            &mut state,
            &ProjectManagementAction::ProjectChanged {
                project_id: "zz".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, OnyxiaError::NotFound { .. }));
    }

    #[test]
    fn change_before_initialization_is_rejected() {
        let mut state = SliceState::Uninitialized;
        let result = ProjectManagementSlice::reduce(
            &mut state,
            &ProjectManagementAction::ProjectChanged {
                project_id: "a".to_string(),
            },
        );
        assert!(matches!(result, Err(OnyxiaError::NotInitialized { .. })));
    }

    #[test]
    fn action_payload_serializes_with_type_tag() {
        let action = ProjectManagementAction::ProjectChanged {
            project_id: "a".to_string(),
        };
        assert_eq!(action.name(), "projectChanged");
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            serde_json::json!({"type": "projectChanged", "projectId": "a"})
        );
    }
}
