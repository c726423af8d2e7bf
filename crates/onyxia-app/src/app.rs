//! # Application Core
//!
//! `AppCore` composes the store, the event bus, the polling controller and
//! every usecase around one backend port.
//!
//! ```text
//!                    ┌──────────────────────── AppCore ───────────────────────┐
//! frontend ──────►   │ usecases (thunks/selectors) ──► Store ──► EventBus     │
//!                    │        │                                   │           │
//!                    │        └──► OnyxiaApi        PollingController (tasks) │
//!                    └────────────────────────────────────────────────────────┘
//! ```
//!
//! Usecases are cheap to clone: they share one [`ThunkContext`].

use onyxia_core::OnyxiaError;
use std::fmt;
use std::sync::Arc;

use crate::api::OnyxiaApi;
use crate::config::AppConfig;
use crate::events::EventBus;
use crate::polling::PollingController;
use crate::routing::{RouteSyncBridge, Router};
use crate::store::Store;
use crate::tasks::TaskRegistry;
use crate::usecases::project_management::{ProjectManagement, ProjectManagementSlice};
use crate::usecases::restorable_config_management::{
    RestorableConfigManagement, RestorableConfigManagementSlice,
};
use crate::usecases::s3_explorer_root::{S3ExplorerRoot, S3ExplorerRootSlice};
use crate::usecases::service_details::{ServiceDetails, ServiceDetailsSlice};
use crate::usecases::service_management::{ServiceManagement, ServiceManagementSlice};
use crate::usecases::view_quotas::{ViewQuotas, ViewQuotasSlice};

/// What every thunk is given: store access, the backend port, the polling
/// controller and configuration.
#[derive(Clone)]
pub struct ThunkContext {
    /// Application store
    pub store: Arc<Store>,
    /// Backend port
    pub api: Arc<dyn OnyxiaApi>,
    /// Spawner for polling loops
    pub polling: PollingController,
    /// Validated configuration
    pub config: Arc<AppConfig>,
}

impl fmt::Debug for ThunkContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThunkContext")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// The headless application.
pub struct AppCore {
    ctx: ThunkContext,
    tasks: Arc<TaskRegistry>,
    project_management: ProjectManagement,
    service_management: ServiceManagement,
    view_quotas: ViewQuotas,
    service_details: ServiceDetails,
    restorable_configs: RestorableConfigManagement,
    s3_explorer: S3ExplorerRoot,
}

impl AppCore {
    /// Validate `config`, register every slice and wire the usecases.
    ///
    /// No task is spawned until a polling usecase is activated.
    pub fn new(config: AppConfig, api: Arc<dyn OnyxiaApi>) -> Result<Self, OnyxiaError> {
        config.validate()?;

        let store = Arc::new(Store::new(EventBus::new(config.event_bus.capacity)));
        store.register::<ProjectManagementSlice>()?;
        store.register::<ServiceManagementSlice>()?;
        store.register::<ViewQuotasSlice>()?;
        store.register::<ServiceDetailsSlice>()?;
        store.register::<RestorableConfigManagementSlice>()?;
        store.register::<S3ExplorerRootSlice>()?;

        let tasks = Arc::new(TaskRegistry::new());
        let ctx = ThunkContext {
            store,
            api,
            polling: PollingController::new(tasks.clone()),
            config: Arc::new(config),
        };

        let project_management = ProjectManagement::new(ctx.clone());
        let service_management = ServiceManagement::new(ctx.clone(), project_management.clone());
        let view_quotas = ViewQuotas::new(
            ctx.clone(),
            project_management.clone(),
            service_management.clone(),
        );
        let service_details = ServiceDetails::new(ctx.clone(), project_management.clone());
        let restorable_configs = RestorableConfigManagement::new(ctx.clone());
        let s3_explorer = S3ExplorerRoot::new(ctx.clone(), project_management.clone())?;

        tracing::debug!(slices = ?ctx.store.slice_names(), "Application core assembled");

        Ok(Self {
            ctx,
            tasks,
            project_management,
            service_management,
            view_quotas,
            service_details,
            restorable_configs,
            s3_explorer,
        })
    }

    /// Run the bootstrap thunks every page depends on.
    pub async fn bootstrap(&self) -> Result<(), OnyxiaError> {
        self.project_management.initialize().await?;
        self.restorable_configs.initialize().await?;
        tracing::info!("Application core bootstrapped");
        Ok(())
    }

    /// Connect the S3 explorer to a URL router.
    pub fn attach_router(&self, router: Arc<dyn Router>) -> RouteSyncBridge<S3ExplorerRoot> {
        RouteSyncBridge::attach(self.ctx.store.bus(), self.s3_explorer.clone(), router)
    }

    /// Stop every polling loop.
    pub fn shutdown(&self) {
        self.tasks.shutdown();
        tracing::info!("Application core shut down");
    }

    /// The store.
    pub fn store(&self) -> &Arc<Store> {
        &self.ctx.store
    }

    /// The event bus.
    pub fn bus(&self) -> &EventBus {
        self.ctx.store.bus()
    }

    /// Effective configuration.
    pub fn config(&self) -> &AppConfig {
        &self.ctx.config
    }

    /// Number of polling loops still running.
    pub fn active_tasks(&self) -> usize {
        self.tasks.active_count()
    }

    /// Project selection.
    pub fn project_management(&self) -> &ProjectManagement {
        &self.project_management
    }

    /// Launched services.
    pub fn service_management(&self) -> &ServiceManagement {
        &self.service_management
    }

    /// Namespace quotas.
    pub fn view_quotas(&self) -> &ViewQuotas {
        &self.view_quotas
    }

    /// Single service page.
    pub fn service_details(&self) -> &ServiceDetails {
        &self.service_details
    }

    /// Saved launch configurations.
    pub fn restorable_configs(&self) -> &RestorableConfigManagement {
        &self.restorable_configs
    }

    /// S3 explorer route controller.
    pub fn s3_explorer(&self) -> &S3ExplorerRoot {
        &self.s3_explorer
    }
}

impl fmt::Debug for AppCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppCore")
            .field("store", &self.ctx.store)
            .field("tasks", &self.tasks)
            .finish_non_exhaustive()
    }
}
