//! # Store
//!
//! Holds the state of every registered slice, keyed by slice name.
//!
//! ## Single-writer discipline
//!
//! All mutation goes through [`Store::dispatch`]. A dispatch:
//!
//! 1. clones the slice state and runs the reducer on the clone
//! 2. on success, swaps the clone in and enqueues the matching [`AppEvent`]
//!    while still holding the write lock, so bus order equals apply order
//! 3. releases the lock and flushes the bus
//!
//! A failing reducer leaves the slice untouched and publishes nothing.
//!
//! [`AppEvent`]: crate::events::AppEvent

mod slice;

pub use slice::{Slice, SliceAction, SliceState};

use onyxia_core::OnyxiaError;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::events::EventBus;

type DebugSerializer = fn(&(dyn Any + Send + Sync)) -> Result<Value, OnyxiaError>;

struct SliceEntry {
    state: Box<dyn Any + Send + Sync>,
    serialize: DebugSerializer,
}

fn serialize_slice<S: Slice>(state: &(dyn Any + Send + Sync)) -> Result<Value, OnyxiaError> {
    let state = state
        .downcast_ref::<SliceState<S::State>>()
        .ok_or_else(|| OnyxiaError::internal(format!("Slice '{}' has a foreign state type", S::NAME)))?;
    Ok(serde_json::to_value(state)?)
}

/// Application store: slice states plus the event bus they publish to.
pub struct Store {
    slices: RwLock<BTreeMap<&'static str, SliceEntry>>,
    bus: EventBus,
}

impl Store {
    /// Create an empty store publishing to `bus`.
    pub fn new(bus: EventBus) -> Self {
        Self {
            slices: RwLock::new(BTreeMap::new()),
            bus,
        }
    }

    /// The bus every dispatched action is mirrored to.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Register slice `S` with an uninitialized state.
    pub fn register<S: Slice>(&self) -> Result<(), OnyxiaError> {
        let mut slices = self.slices.write();
        if slices.contains_key(S::NAME) {
            return Err(OnyxiaError::invalid(format!(
                "Slice '{}' is already registered",
                S::NAME
            )));
        }
        slices.insert(
            S::NAME,
            SliceEntry {
                state: Box::new(SliceState::<S::State>::Uninitialized),
                serialize: serialize_slice::<S>,
            },
        );
        tracing::debug!(usecase = S::NAME, "Slice registered");
        Ok(())
    }

    /// Apply `action` to slice `S` and publish it.
    pub fn dispatch<S: Slice>(&self, action: S::Action) -> Result<(), OnyxiaError> {
        let action_name = action.name();
        {
            let mut slices = self.slices.write();
            let current = slices
                .get_mut(S::NAME)
                .and_then(|entry| entry.state.downcast_mut::<SliceState<S::State>>())
                .ok_or_else(unregistered::<S>)?;

            let mut next = current.clone();
            if let Err(err) = S::reduce(&mut next, &action) {
                tracing::warn!(usecase = S::NAME, action = action_name, error = %err, "Reducer rejected action");
                return Err(err);
            }
            *current = next;
            self.bus.enqueue(S::NAME, action_name, Arc::new(action));
        }
        tracing::trace!(usecase = S::NAME, action = action_name, "Action applied");
        self.bus.flush();
        Ok(())
    }

    /// Run `f` against the live state of `S`.
    ///
    /// Fails with [`OnyxiaError::NotInitialized`] before the slice's
    /// initializing action.
    pub fn read<S, R>(&self, f: impl FnOnce(&S::State) -> R) -> Result<R, OnyxiaError>
    where
        S: Slice,
    {
        let slices = self.slices.read();
        let state = slices
            .get(S::NAME)
            .and_then(|entry| entry.state.downcast_ref::<SliceState<S::State>>())
            .ok_or_else(unregistered::<S>)?;
        Ok(f(state.ready(S::NAME)?))
    }

    /// Clone the state of `S`, initialized or not.
    pub fn snapshot<S: Slice>(&self) -> Result<SliceState<S::State>, OnyxiaError> {
        let slices = self.slices.read();
        slices
            .get(S::NAME)
            .and_then(|entry| entry.state.downcast_ref::<SliceState<S::State>>())
            .cloned()
            .ok_or_else(unregistered::<S>)
    }

    /// Whether `S` has received its initializing action.
    pub fn is_initialized<S: Slice>(&self) -> bool {
        self.snapshot::<S>().is_ok_and(|state| state.is_ready())
    }

    /// Every slice state as JSON, keyed by slice name.
    pub fn root_state(&self) -> Result<Value, OnyxiaError> {
        let slices = self.slices.read();
        let mut root = Map::with_capacity(slices.len());
        for (name, entry) in slices.iter() {
            root.insert((*name).to_string(), (entry.serialize)(entry.state.as_ref())?);
        }
        Ok(Value::Object(root))
    }

    /// Names of registered slices, sorted.
    pub fn slice_names(&self) -> Vec<&'static str> {
        self.slices.read().keys().copied().collect()
    }
}

fn unregistered<S: Slice>() -> OnyxiaError {
    OnyxiaError::internal(format!("Slice '{}' is not registered", S::NAME))
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("slices", &self.slice_names())
            .field("bus", &self.bus)
            .finish()
    }
}
