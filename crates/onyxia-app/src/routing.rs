//! # Route Sync Bridge
//!
//! Keeps URL route params and slice state consistent in both directions.
//!
//! ```text
//!            State → URL                              URL → State
//! dispatch ─► derived listener ─► routeParamsChanged ─► Router::push/replace
//! Router notification ─► RouteSyncBridge::on_route_changed ─► load() ─► Router::replace
//! ```
//!
//! Route params are compared by value. A [`RouteTracker`] remembers what the
//! URL currently shows; nothing is sent to the router unless the new params
//! differ from it, which rules out redundant history entries and
//! update loops between the two directions.

use async_trait::async_trait;
use onyxia_core::OnyxiaError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::{Arc, Weak};

use crate::events::{EventBus, EventFilter, ListenerHandle};
use crate::store::{Slice, Store};

/// Derived channel carrying [`RouteUpdate`] payloads.
pub const ROUTE_PARAMS_CHANGED: &str = "routeParamsChanged";

/// How the router should apply a new URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteMethod {
    /// New history entry (user-initiated navigation)
    Push,
    /// Overwrite the current entry (initial load, lateral moves)
    Replace,
}

/// A named route with string params, as the URL router sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Route {
    /// Route name
    pub name: String,
    /// Path and query params
    pub params: BTreeMap<String, String>,
}

impl Route {
    /// Route `name` with no params.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add a param.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Look up a param.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// External URL router.
///
/// `push`/`replace` change the browser URL; the frontend reports resulting
/// navigations back through [`RouteSyncBridge::on_route_changed`].
pub trait Router: Send + Sync {
    /// Navigate with a new history entry.
    fn push(&self, route: Route);

    /// Navigate in place.
    fn replace(&self, route: Route);

    /// Navigate with `method`.
    fn navigate(&self, route: Route, method: RouteMethod) {
        match method {
            RouteMethod::Push => self.push(route),
            RouteMethod::Replace => self.replace(route),
        }
    }
}

/// Typed route params of one page.
pub trait RouteParams: Clone + PartialEq + Debug + Send + Sync + 'static {
    /// Router name of the page.
    const ROUTE_NAME: &'static str;

    /// Encode for the router.
    fn to_route(&self) -> Route;

    /// Decode from the router. Unknown or missing params take defaults.
    fn from_route(route: &Route) -> Result<Self, OnyxiaError>;
}

/// Payload of the [`ROUTE_PARAMS_CHANGED`] channel.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteUpdate<P> {
    /// New canonical params
    pub params: P,
    /// How to apply them
    pub method: RouteMethod,
}

/// Last params the URL is known to show.
#[derive(Debug)]
pub struct RouteTracker<P> {
    last: Mutex<Option<P>>,
}

impl<P: RouteParams> RouteTracker<P> {
    /// A tracker that has seen nothing yet.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(None),
        }
    }

    /// Record `params`; returns `true` when they differ from the last value.
    pub fn note(&self, params: &P) -> bool {
        let mut last = self.last.lock();
        if last.as_ref() == Some(params) {
            return false;
        }
        *last = Some(params.clone());
        true
    }

    /// Last recorded params.
    pub fn last(&self) -> Option<P> {
        self.last.lock().clone()
    }
}

impl<P: RouteParams> Default for RouteTracker<P> {
    fn default() -> Self {
        Self::new()
    }
}

/// Republish route params derived from slice `S` on [`ROUTE_PARAMS_CHANGED`].
///
/// After every action of `S`, `select` computes the params from the live
/// state; an update is published only when they differ from what `tracker`
/// last saw. `method_for` picks push or replace from the triggering action.
pub fn derive_route_updates<S, P>(
    store: Weak<Store>,
    tracker: Arc<RouteTracker<P>>,
    select: fn(&S::State) -> P,
    method_for: fn(&S::Action) -> RouteMethod,
) -> Result<ListenerHandle, OnyxiaError>
where
    S: Slice,
    P: RouteParams,
{
    let bus = store
        .upgrade()
        .map(|store| store.bus().clone())
        .ok_or_else(|| OnyxiaError::internal("Store dropped before route derivation"))?;

    let publisher = bus.clone();
    Ok(bus.listen(EventFilter::usecase(S::NAME), move |event| {
        // Our own derived events share the usecase name; they carry no action.
        let Some(action) = event.action::<S>() else {
            return;
        };
        let Some(store) = store.upgrade() else {
            return;
        };
        let params = match store.read::<S, _>(select) {
            Ok(params) => params,
            Err(err) => {
                tracing::debug!(usecase = S::NAME, error = %err, "Route params not derivable yet");
                return;
            }
        };
        if tracker.note(&params) {
            let method = method_for(action);
            tracing::debug!(usecase = S::NAME, action = event.action_name, ?method, ?params, "Route params changed");
            publisher.publish(S::NAME, ROUTE_PARAMS_CHANGED, RouteUpdate { params, method });
        }
    }))
}

/// A slice that can rehydrate itself from route params.
#[async_trait]
pub trait RouteController: Send + Sync + 'static {
    /// Params of the controlled page.
    type Params: RouteParams;

    /// Usecase publishing the derived route channel.
    const USECASE_NAME: &'static str;

    /// Tracker shared with the state → URL derivation.
    fn route_tracker(&self) -> &Arc<RouteTracker<Self::Params>>;

    /// Reconcile state with externally changed params.
    ///
    /// Returns the canonical params when the URL must be corrected, `None`
    /// when it already matches state.
    async fn load(&self, params: Self::Params) -> Result<Option<Self::Params>, OnyxiaError>;
}

/// Connects one [`RouteController`] to a [`Router`].
pub struct RouteSyncBridge<C: RouteController> {
    controller: C,
    router: Arc<dyn Router>,
    _forward: ListenerHandle,
}

impl<C: RouteController> RouteSyncBridge<C> {
    /// Forward the controller's derived route updates to `router`.
    pub fn attach(bus: &EventBus, controller: C, router: Arc<dyn Router>) -> Self {
        let forward_router = router.clone();
        let forward = bus.listen(
            EventFilter::action(C::USECASE_NAME, ROUTE_PARAMS_CHANGED),
            move |event| {
                if let Some(update) = event.payload::<RouteUpdate<C::Params>>() {
                    forward_router.navigate(update.params.to_route(), update.method);
                }
            },
        );
        Self {
            controller,
            router,
            _forward: forward,
        }
    }

    /// Handle a navigation reported by the router.
    ///
    /// Routes for other pages are ignored.
    pub async fn on_route_changed(&self, route: &Route) -> Result<(), OnyxiaError> {
        if route.name != <C::Params as RouteParams>::ROUTE_NAME {
            return Ok(());
        }
        let params = C::Params::from_route(route)?;
        let tracker = self.controller.route_tracker();
        tracker.note(&params);

        if let Some(canonical) = self.controller.load(params).await? {
            // Initialization inside `load` may already have sent these.
            if tracker.note(&canonical) {
                self.router.replace(canonical.to_route());
            }
        }
        Ok(())
    }

    /// The wrapped controller.
    pub fn controller(&self) -> &C {
        &self.controller
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Page(u32);

    impl RouteParams for Page {
        const ROUTE_NAME: &'static str = "page";

        fn to_route(&self) -> Route {
            Route::new(Self::ROUTE_NAME).with_param("n", self.0.to_string())
        }

        fn from_route(route: &Route) -> Result<Self, OnyxiaError> {
            route
                .param("n")
                .unwrap_or("0")
                .parse()
                .map(Page)
                .map_err(|_| OnyxiaError::invalid("page number"))
        }
    }

    #[test]
    fn tracker_compares_by_value() {
        let tracker = RouteTracker::new();
        assert!(tracker.note(&Page(1)));
        assert!(!tracker.note(&Page(1)));
        assert!(tracker.note(&Page(2)));
        assert_eq!(tracker.last(), Some(Page(2)));
    }

    #[test]
    fn route_encoding() {
        let route = Page(4).to_route();
        assert_eq!(route.param("n"), Some("4"));
        assert_eq!(Page::from_route(&route).unwrap(), Page(4));
        assert_eq!(Page::from_route(&Route::new("page")).unwrap(), Page(0));
        assert!(Page::from_route(&Route::new("page").with_param("n", "x")).is_err());
    }
}
