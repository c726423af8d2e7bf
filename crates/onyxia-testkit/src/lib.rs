//! Onyxia Testing Infrastructure
//!
//! In-memory doubles for the two ports of the application core, plus
//! fixtures shared by integration tests and the demo host.

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! onyxia-testkit = { path = "../onyxia-testkit" }
//! ```
//!
//! ```rust,ignore
//! use onyxia_testkit::*;
//!
//! #[tokio::test]
//! async fn boots() {
//!     let api = MockOnyxiaApi::demo();
//!     let core = AppCore::new(AppConfig::default(), api.clone()).unwrap();
//!     core.bootstrap().await.unwrap();
//! }
//! ```

pub mod api;
pub mod fixtures;
pub mod router;

pub use api::{ApiMethod, MockOnyxiaApi};
pub use fixtures::*;
pub use router::RecordingRouter;

// Re-export commonly used types for convenience
pub use onyxia_app::{AppConfig, AppCore, OnyxiaError};
