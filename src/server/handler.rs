use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use super::action::{ActionParams, Actions};
use super::registry::ViewRoute;
use super::view::View;
use crate::error::RouteError;
use crate::route::RouteMatcher;

/// A view registration: route template, view function and actions.
///
/// ```ignore
/// let count = Handler::new("/count", view_fn(|_| COUNTER.load(SeqCst)))
///     .action("inc", |_| Ok::<_, String>(COUNTER.fetch_add(1, SeqCst) + 1));
/// server.handler(count)?;
/// ```
pub struct Handler {
    route: String,
    view: Arc<dyn View>,
    actions: Actions,
}

impl Handler {
    pub fn new(route: &str, view: impl View) -> Self {
        Self {
            route: route.to_string(),
            view: Arc::new(view),
            actions: Actions::new(),
        }
    }

    pub fn action<F, T, E>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(ActionParams) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: Display,
    {
        self.actions = self.actions.sync(name, handler);
        self
    }

    pub fn async_action<F, Fut, T, E>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(ActionParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize,
        E: Display,
    {
        self.actions = self.actions.asynchronous(name, handler);
        self
    }

    /// Replace the whole action table.
    pub fn actions(mut self, actions: Actions) -> Self {
        self.actions = actions;
        self
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    pub(crate) fn compile(self) -> Result<ViewRoute, RouteError> {
        Ok(ViewRoute {
            matcher: RouteMatcher::compile(&self.route)?,
            view: self.view,
            actions: Arc::new(self.actions),
        })
    }
}

impl<V: View> From<(&str, V)> for Handler {
    fn from((route, view): (&str, V)) -> Self {
        Handler::new(route, view)
    }
}

impl<V: View> From<(&str, V, Actions)> for Handler {
    fn from((route, view, actions): (&str, V, Actions)) -> Self {
        Handler::new(route, view).actions(actions)
    }
}
