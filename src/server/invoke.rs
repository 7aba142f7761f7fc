//! Normalizes user callbacks into one success/failure contract.
//!
//! Views and actions may return synchronously, return a future, fail with an
//! error, or panic in either phase. All of those end up as
//! `Result<T, String>` here.

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};

use futures_util::FutureExt;

/// Call `start` and await the future it returns, turning panics raised while
/// starting or while polling into `Err(message)`.
pub(crate) async fn guarded<T, F, Fut>(start: F) -> Result<T, String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, String>>,
{
    let future = match panic::catch_unwind(AssertUnwindSafe(start)) {
        Ok(future) => future,
        Err(payload) => return Err(panic_message(payload.as_ref())),
    };

    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panic_message(payload.as_ref())),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
