//! Remote actions.
//!
//! A handler receives the caller's params merged with the channel's route
//! params. Route params win on a name collision, so `/:room` bound to `lobby`
//! always reaches the handler as `room = "lobby"` whatever the caller sends.
//!
//! Handlers for one channel are not serialized against each other. Two
//! actions racing on the same underlying state resolve however the view
//! observes them on the next pass; callers that need atomicity must provide it.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use super::invoke::guarded;
use super::sync_loop::ChangeTracker;
use crate::error::ActionError;
use crate::protocol::AckResult;
use crate::route::Params;

/// Parameters delivered to an action handler.
pub type ActionParams = Map<String, Value>;

/// A named mutation callable by subscribers.
pub trait Action: Send + Sync + 'static {
    fn call(&self, params: ActionParams) -> BoxFuture<'static, Result<Value, ActionError>>;
}

struct SyncAction<F>(F);
struct AsyncAction<F>(F);

impl<F, T, E> Action for SyncAction<F>
where
    F: Fn(ActionParams) -> Result<T, E> + Send + Sync + 'static,
    T: Serialize,
    E: Display,
{
    fn call(&self, params: ActionParams) -> BoxFuture<'static, Result<Value, ActionError>> {
        let result = (self.0)(params)
            .map_err(|e| ActionError::new(e.to_string()))
            .and_then(to_json);
        Box::pin(futures_util::future::ready(result))
    }
}

impl<F, Fut, T, E> Action for AsyncAction<F>
where
    F: Fn(ActionParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize,
    E: Display,
{
    fn call(&self, params: ActionParams) -> BoxFuture<'static, Result<Value, ActionError>> {
        let future = (self.0)(params);
        Box::pin(async move {
            let value = future.await.map_err(|e| ActionError::new(e.to_string()))?;
            to_json(value)
        })
    }
}

fn to_json<T: Serialize>(value: T) -> Result<Value, ActionError> {
    serde_json::to_value(value).map_err(|e| ActionError::new(e.to_string()))
}

/// The action table of one view, in registration order.
#[derive(Clone, Default)]
pub struct Actions {
    table: IndexMap<String, Arc<dyn Action>>,
}

impl Actions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a synchronous handler.
    pub fn sync<F, T, E>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(ActionParams) -> Result<T, E> + Send + Sync + 'static,
        T: Serialize,
        E: Display,
    {
        self.table.insert(name.to_string(), Arc::new(SyncAction(handler)));
        self
    }

    /// Register a handler that completes asynchronously.
    pub fn asynchronous<F, Fut, T, E>(mut self, name: &str, handler: F) -> Self
    where
        F: Fn(ActionParams) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Serialize,
        E: Display,
    {
        self.table.insert(name.to_string(), Arc::new(AsyncAction(handler)));
        self
    }

    /// Register a custom [`Action`] implementation.
    pub fn insert(mut self, name: &str, action: Arc<dyn Action>) -> Self {
        self.table.insert(name.to_string(), action);
        self
    }

    pub fn names(&self) -> Vec<String> {
        self.table.keys().cloned().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Action>> {
        self.table.get(name)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Per-channel entry point for action requests.
pub struct ActionDispatcher {
    actions: Arc<Actions>,
    route_params: Params,
    changes: Arc<ChangeTracker>,
}

impl ActionDispatcher {
    pub fn new(actions: Arc<Actions>, route_params: Params, changes: Arc<ChangeTracker>) -> Self {
        Self {
            actions,
            route_params,
            changes,
        }
    }

    pub fn action_names(&self) -> Vec<String> {
        self.actions.names()
    }

    /// Caller params overlaid with route params. Non-object caller params
    /// are treated as empty.
    pub fn merge_params(&self, caller: Value) -> ActionParams {
        let mut merged = match caller {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                tracing::debug!(target: "woolly::action", params = %other, "ignoring non-object action params");
                Map::new()
            }
        };
        for (name, value) in &self.route_params {
            merged.insert(name.clone(), Value::String(value.clone()));
        }
        merged
    }

    /// Run `name` and produce the acknowledgement for the caller. Success
    /// marks the channel changed; failure never does.
    pub async fn dispatch(&self, name: &str, caller_params: Value) -> AckResult {
        let Some(action) = self.actions.get(name).cloned() else {
            tracing::debug!(target: "woolly::action", action = %name, "unknown action");
            return AckResult::Failure(ActionError::unknown(name).message);
        };

        let params = self.merge_params(caller_params);
        tracing::debug!(target: "woolly::action", action = %name, params = ?params, "invoking action");

        let outcome = guarded(|| async move { action.call(params).await.map_err(|e| e.message) }).await;

        match outcome {
            Ok(value) => {
                tracing::debug!(target: "woolly::action", action = %name, result = %value, "action succeeded");
                self.changes.mark_changed();
                AckResult::Success(value)
            }
            Err(message) => {
                tracing::debug!(target: "woolly::action", action = %name, error = %message, "action failed");
                AckResult::Failure(message)
            }
        }
    }
}
