//! Slice definitions: the per-feature unit of state.

use onyxia_core::OnyxiaError;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

/// State of one slice.
///
/// A slice starts [`Uninitialized`](SliceState::Uninitialized) and becomes
/// [`Ready`](SliceState::Ready) on its first initializing action. Reading an
/// uninitialized slice is an error, never a silent default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "state", rename_all = "camelCase")]
pub enum SliceState<T> {
    /// Bootstrap has not run yet
    Uninitialized,
    /// Live state
    Ready(T),
}

impl<T> SliceState<T> {
    /// Borrow the live state, failing loudly before initialization.
    pub fn ready(&self, usecase: &str) -> Result<&T, OnyxiaError> {
        match self {
            Self::Ready(state) => Ok(state),
            Self::Uninitialized => Err(OnyxiaError::not_initialized(usecase)),
        }
    }

    /// Mutably borrow the live state, failing loudly before initialization.
    pub fn ready_mut(&mut self, usecase: &str) -> Result<&mut T, OnyxiaError> {
        match self {
            Self::Ready(state) => Ok(state),
            Self::Uninitialized => Err(OnyxiaError::not_initialized(usecase)),
        }
    }

    /// Whether the initializing action has been applied.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl<T> Default for SliceState<T> {
    fn default() -> Self {
        Self::Uninitialized
    }
}

/// An action of a slice. Names are unique within the slice.
pub trait SliceAction: Clone + Debug + Serialize + Send + Sync + 'static {
    /// Action name as it appears on the event bus.
    fn name(&self) -> &'static str;
}

/// A feature slice: name, state shape and reducer.
///
/// The reducer is the only code allowed to mutate the slice state. It works
/// on a copy; when it returns an error the store keeps the previous state.
pub trait Slice: Send + Sync + 'static {
    /// Unique slice name, also the key in the root state.
    const NAME: &'static str;

    /// Live state shape.
    type State: Clone + Debug + Serialize + Send + Sync + 'static;

    /// Actions accepted by the reducer.
    type Action: SliceAction;

    /// Apply `action` to `state`.
    fn reduce(state: &mut SliceState<Self::State>, action: &Self::Action) -> Result<(), OnyxiaError>;
}
