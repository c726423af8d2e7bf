//! # Onyxia App
//!
//! Headless application core of the Onyxia data-science platform frontend:
//! per-feature state slices, a cross-slice event bus, polling loops and URL
//! synchronization, all behind two ports implemented by the host:
//!
//! - [`OnyxiaApi`]: backend operations
//! - [`Router`]: URL navigation
//!
//! ## Quick start
//!
//! ```rust,ignore
//! let core = AppCore::new(AppConfig::default(), api)?;
//! core.bootstrap().await?;
//!
//! let quotas = core.view_quotas().set_active();
//! // ... later
//! let view = core.view_quotas().quotas()?;
//! quotas.set_inactive();
//! ```
//!
//! ## Modules
//!
//! - [`store`]: slice registration, dispatch and reads
//! - [`events`]: the event bus
//! - [`polling`]: cancellable refresh loops
//! - [`routing`]: route params and the sync bridge
//! - [`usecases`]: the feature slices
//! - [`config`]: configuration loading and validation

pub mod api;
pub mod app;
pub mod config;
pub mod events;
pub mod polling;
pub mod quantity;
pub mod routing;
pub mod store;
pub mod tasks;
pub mod usecases;

pub use api::OnyxiaApi;
pub use app::{AppCore, ThunkContext};
pub use config::AppConfig;
pub use events::{AppEvent, EventBus, EventFilter, EventStream, ListenerHandle};
pub use onyxia_core::{OnyxiaError, SchemaNode, ValidationResult};
pub use polling::{Cancellation, PollingController, PollingHandle, PollingSignals};
pub use routing::{Route, RouteMethod, RouteParams, RouteSyncBridge, Router};
pub use store::{Slice, SliceAction, SliceState, Store};
