//! Woolly: route-addressed live views.
//!
//! A server registers views, functions that compute the current state for a
//! matched route such as `/rooms/:room`. Every subscriber of a concrete path
//! receives the full state once and then a JSON patch whenever a sync pass
//! observes a change. Subscribers mutate state through named actions; the
//! resulting change reaches everyone through the next pass, not through the
//! action's reply.
//!
//! - [`server::WoollyServer`] registers views and accepts connections.
//! - [`client::WoollyClient`] keeps a replica of one channel and calls its actions.
//! - [`diff`] is the patch format shared by both sides.

pub mod client;
pub mod config;
pub mod diff;
pub mod error;
mod lock;
pub mod protocol;
pub mod route;
pub mod server;
pub mod telemetry;
pub mod transport;


pub use client::{ActionProxy, ClientEvent, WoollyClient};
pub use error::{ActionError, ClientError, PatchError, RouteError, ViewError};
pub use server::{async_view, view_fn, Handler, WoollyServer};
