//! Router double that records every navigation.

use onyxia_app::routing::{Route, RouteMethod, Router};
use parking_lot::Mutex;

/// Records navigations instead of touching a URL bar.
#[derive(Debug, Default)]
pub struct RecordingRouter {
    navigations: Mutex<Vec<(RouteMethod, Route)>>,
}

impl RecordingRouter {
    /// Empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every navigation so far, oldest first.
    pub fn navigations(&self) -> Vec<(RouteMethod, Route)> {
        self.navigations.lock().clone()
    }

    /// Most recent navigation.
    pub fn last(&self) -> Option<(RouteMethod, Route)> {
        self.navigations.lock().last().cloned()
    }

    /// Number of navigations.
    pub fn count(&self) -> usize {
        self.navigations.lock().len()
    }

    /// Navigations with the given method.
    pub fn count_of(&self, method: RouteMethod) -> usize {
        self.navigations
            .lock()
            .iter()
            .filter(|(m, _)| *m == method)
            .count()
    }

    /// Forget recorded navigations.
    pub fn clear(&self) {
        self.navigations.lock().clear();
    }
}

impl Router for RecordingRouter {
    fn push(&self, route: Route) {
        self.navigations.lock().push((RouteMethod::Push, route));
    }

    fn replace(&self, route: Route) {
        self.navigations.lock().push((RouteMethod::Replace, route));
    }
}
