//! # Usecases
//!
//! One module per feature slice. Each module exposes:
//!
//! - a slice marker implementing [`Slice`](crate::store::Slice), with its
//!   state and action types
//! - a usecase object holding the shared [`ThunkContext`](crate::app::ThunkContext):
//!   public methods are thunks and selectors for frontends, `pub(crate)`
//!   methods are protected helpers for other slices
//!
//! Slice dependencies only point downwards:
//!
//! ```text
//! project_management ◄── service_management ◄── view_quotas
//!         ▲    ▲    ▲
//!         │    │    └── s3_explorer_root
//!         │    └─────── service_details
//!         └──────────── (restorable_config_management is project-independent)
//! ```

pub mod project_management;
pub mod restorable_config_management;
pub mod s3_explorer_root;
pub mod service_details;
pub mod service_management;
pub mod view_quotas;
