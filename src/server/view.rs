//! View functions: compute the current snapshot for a matched route.

use std::fmt::Display;
use std::future::Future;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use super::invoke::guarded;
use crate::error::ViewError;
use crate::route::Params;

/// Produces the current state for one channel.
pub trait View: Send + Sync + 'static {
    fn snapshot(&self, params: &Params) -> BoxFuture<'static, Result<Value, ViewError>>;
}

/// A view backed by a synchronous closure.
pub struct FnView<F>(F);

/// A view backed by a closure returning a future.
pub struct AsyncView<F>(F);

/// Wrap a synchronous view closure.
pub fn view_fn<F, T>(f: F) -> FnView<F>
where
    F: Fn(&Params) -> T + Send + Sync + 'static,
    T: Serialize,
{
    FnView(f)
}

/// Wrap a view closure that resolves asynchronously and may fail.
pub fn async_view<F, Fut, T, E>(f: F) -> AsyncView<F>
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize,
    E: Display,
{
    AsyncView(f)
}

impl<F, T> View for FnView<F>
where
    F: Fn(&Params) -> T + Send + Sync + 'static,
    T: Serialize,
{
    fn snapshot(&self, params: &Params) -> BoxFuture<'static, Result<Value, ViewError>> {
        let result = serde_json::to_value((self.0)(params)).map_err(|e| ViewError::new(e.to_string()));
        Box::pin(futures_util::future::ready(result))
    }
}

impl<F, Fut, T, E> View for AsyncView<F>
where
    F: Fn(Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Serialize,
    E: Display,
{
    fn snapshot(&self, params: &Params) -> BoxFuture<'static, Result<Value, ViewError>> {
        let future = (self.0)(params.clone());
        Box::pin(async move {
            let value = future.await.map_err(|e| ViewError::new(e.to_string()))?;
            serde_json::to_value(value).map_err(|e| ViewError::new(e.to_string()))
        })
    }
}

/// Fetch a snapshot, folding panics into [`ViewError`].
pub async fn fetch(view: &dyn View, params: &Params) -> Result<Value, ViewError> {
    guarded(|| async move { view.snapshot(params).await.map_err(|e| e.message) })
        .await
        .map_err(ViewError::new)
}
