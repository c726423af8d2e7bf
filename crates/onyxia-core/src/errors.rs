//! Unified error type for the Onyxia application layer
//!
//! A single flat error enum shared by every usecase. Validation failures are
//! *not* represented here: the validation engine returns typed results, and
//! callers decide whether a failed validation is an error.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error type for all Onyxia operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum OnyxiaError {
    /// Invalid input or configuration
    #[error("Invalid: {message}")]
    Invalid {
        /// Error message describing the invalid input
        message: String,
    },

    /// Resource not found
    #[error("Not found: {message}")]
    NotFound {
        /// Error message describing what was not found
        message: String,
    },

    /// Backend call failed (transport or server error)
    #[error("Network error: {message}")]
    Network {
        /// Error message describing the network issue
        message: String,
    },

    /// Remote state was modified concurrently (e.g. by another browser tab)
    #[error("Conflict: {message}")]
    Conflict {
        /// Error message describing the conflicting modification
        message: String,
    },

    /// A slice was read before its initializing action was dispatched.
    ///
    /// This is a programming error: the bootstrap thunk for `usecase` has not run.
    #[error("Usecase '{usecase}' state read before initialization")]
    NotInitialized {
        /// Name of the slice that was read too early
        usecase: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message describing the serialization failure
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Error message describing the internal error
        message: String,
    },
}

impl OnyxiaError {
    /// Create an invalid input error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a concurrent-modification conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create an uninitialized-state access error
    pub fn not_initialized(usecase: impl Into<String>) -> Self {
        Self::NotInitialized {
            usecase: usecase.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error for frontend handling.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Invalid { .. } => ErrorCategory::Input,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Network { .. } => ErrorCategory::Network,
            Self::Conflict { .. } => ErrorCategory::Conflict,
            Self::NotInitialized { .. } | Self::Serialization { .. } | Self::Internal { .. } => {
                ErrorCategory::Operation
            }
        }
    }
}

impl From<serde_json::Error> for OnyxiaError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

// ============================================================================
// Error Categories
// ============================================================================

/// High-level error categories for frontend error handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// User input validation errors (correctable by user)
    Input,
    /// Resource not found errors (transient or permanent)
    NotFound,
    /// Network connectivity errors (often transient)
    Network,
    /// Remote state changed underneath the caller
    Conflict,
    /// General operation failures (catch-all)
    Operation,
}

impl ErrorCategory {
    /// Check if this error category is user-correctable.
    #[must_use]
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::Input | Self::Conflict)
    }

    /// Check if this error category is likely transient.
    ///
    /// Transient errors may resolve on the next poll tick.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network | Self::NotFound)
    }

    /// Get a short label for this category.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Input => "Input",
            Self::NotFound => "Not Found",
            Self::Network => "Network",
            Self::Conflict => "Conflict",
            Self::Operation => "Operation",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_display() {
        let err = OnyxiaError::not_initialized("viewQuotas");
        assert_eq!(
            err.to_string(),
            "Usecase 'viewQuotas' state read before initialization"
        );
        assert_eq!(err.category(), ErrorCategory::Operation);
    }

    #[test]
    fn test_conflict_is_user_correctable() {
        let err = OnyxiaError::conflict("configs changed in another tab");
        assert_eq!(err.to_string(), "Conflict: configs changed in another tab");
        assert!(err.category().is_user_correctable());
        assert!(!err.category().is_transient());
    }

    #[test]
    fn test_network_is_transient() {
        let err = OnyxiaError::network("503 Service Unavailable");
        assert!(err.category().is_transient());
        assert_eq!(format!("{}", err.category()), "Network");
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: OnyxiaError = parse_err.into();
        assert!(matches!(err, OnyxiaError::Serialization { .. }));
    }
}
