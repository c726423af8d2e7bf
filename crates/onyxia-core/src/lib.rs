//! # Onyxia Core
//!
//! Runtime-free building blocks shared by the application layer:
//!
//! - [`OnyxiaError`]: the unified error type
//! - [`schema`]: declarative form-field schemas
//! - [`validation`]: value validation with best-approximation coercion
//! - [`reactive`]: memoized selector derivations
//!
//! Nothing in this crate spawns tasks or performs I/O.

pub mod errors;
pub mod reactive;
pub mod schema;
pub mod validation;

pub use errors::{ErrorCategory, OnyxiaError};
pub use schema::{SchemaNode, SchemaType};
pub use validation::{validate, ValidationResult};
