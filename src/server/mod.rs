//! Server side of the sync engine.
//!
//! [`WoollyServer`] owns the route table and the channel registry. Views are
//! registered with [`WoollyServer::handler`]; connections arrive either as an
//! in-process [`Link`] through [`WoollyServer::accept`] or over WebSocket
//! through [`WoollyServer::listen`].

pub mod action;
pub mod channel;
pub mod handler;
mod invoke;
pub mod registry;
pub mod session;
pub mod sync_loop;
pub mod view;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::task::JoinHandle;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;

pub use action::{Action, ActionParams, Actions};
pub use handler::Handler;
pub use registry::ChannelRegistry;
pub use view::{async_view, view_fn, View};

use crate::config::SyncConfig;
use crate::error::{RouteError, TransportError};
use crate::lock::lock;
use crate::transport::{memory, ws, Link};

pub struct WoollyServer {
    config: SyncConfig,
    registry: Arc<ChannelRegistry>,
    listeners: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for WoollyServer {
    fn default() -> Self {
        Self::new()
    }
}

impl WoollyServer {
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default())
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self {
            registry: ChannelRegistry::new(config.clone()),
            config,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ChannelRegistry> {
        &self.registry
    }

    /// Register a view. Accepts a [`Handler`], `(route, view)` or
    /// `(route, view, actions)`. Templates are matched in registration order.
    pub fn handler(&self, handler: impl Into<Handler>) -> Result<&Self, RouteError> {
        let route = handler.into().compile()?;
        self.registry.register(route);
        Ok(self)
    }

    /// Serve a connection subscribed to `path` over an existing link.
    pub fn accept(&self, path: &str, link: Link) -> JoinHandle<()> {
        tokio::spawn(session::run(self.registry.clone(), path.to_string(), link))
    }

    /// Subscribe to `path` in-process, returning the client end of the link.
    pub fn connect_local(&self, path: &str) -> Link {
        let (server_end, client_end) = memory::pair();
        self.accept(path, server_end);
        client_end
    }

    /// Accept WebSocket connections on `addr`. The request path, minus the
    /// configured socket path, selects the channel.
    pub async fn listen(&self, addr: impl ToSocketAddrs) -> Result<SocketAddr, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        let registry = self.registry.clone();
        let socket_path = self.config.socket_path.clone();
        tracing::info!(target: "woolly::server", addr = %local, %socket_path, "listening");

        let task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        tokio::spawn(serve_socket(
                            stream,
                            peer,
                            registry.clone(),
                            socket_path.clone(),
                        ));
                    }
                    Err(e) => {
                        tracing::warn!(target: "woolly::server", error = %e, "accept failed");
                    }
                }
            }
        });
        lock(&self.listeners).push(task);
        Ok(local)
    }

    /// Stop listening and destroy every channel. Connected clients are
    /// disconnected.
    pub async fn close(&self) {
        for task in lock(&self.listeners).drain(..) {
            task.abort();
        }
        self.registry.close_all().await;
        tracing::info!(target: "woolly::server", "server closed");
    }
}

async fn serve_socket(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ChannelRegistry>,
    socket_path: String,
) {
    let mut path = None;
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match concrete_path(&socket_path, request.uri().path()) {
            Some(concrete) => {
                path = Some(concrete);
                Ok(response)
            }
            None => {
                let mut refusal = ErrorResponse::new(Some("unknown socket path".to_string()));
                *refusal.status_mut() = StatusCode::NOT_FOUND;
                Err(refusal)
            }
        }
    };

    let stream = match tokio_tungstenite::accept_hdr_async(stream, callback).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::debug!(target: "woolly::server", %peer, error = %e, "handshake failed");
            return;
        }
    };
    let Some(path) = path else {
        return;
    };

    tracing::debug!(target: "woolly::server", %peer, %path, "websocket upgraded");
    session::run(registry, path, ws::spawn_pump(stream)).await;
}

/// Strip the socket path prefix from a request path. `None` when the request
/// is not under the socket path.
fn concrete_path(socket_path: &str, request_path: &str) -> Option<String> {
    let rest = request_path.strip_prefix(socket_path)?;
    if rest.is_empty() {
        Some("/".to_string())
    } else if rest.starts_with('/') {
        Some(rest.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ServerMessage, ERROR_EVENT, INIT_EVENT};
    use crate::route::Params;
    use serde_json::json;

    #[test]
    fn test_concrete_path() {
        assert_eq!(concrete_path("/woolly", "/woolly/count"), Some("/count".to_string()));
        assert_eq!(concrete_path("/woolly", "/woolly"), Some("/".to_string()));
        assert_eq!(concrete_path("/woolly", "/woollyx/count"), None);
        assert_eq!(concrete_path("/woolly", "/other"), None);
        assert_eq!(concrete_path("", "/a/b"), Some("/a/b".to_string()));
    }

    #[test]
    fn test_invalid_template_is_rejected_at_registration() {
        let server = WoollyServer::new();
        let err = server
            .handler(("/:a/:a", view_fn(|_: &Params| 0)))
            .err();
        assert!(matches!(err, Some(RouteError::DuplicateParam { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_chained_registration_and_local_connect() {
        let server = WoollyServer::new();
        server
            .handler(("/count", view_fn(|_: &Params| 7)))
            .unwrap()
            .handler(Handler::new("/:a/:b", view_fn(|p: &Params| p.clone())).action("check", |_| Ok::<_, String>(true)))
            .unwrap();

        let link = server.connect_local("/foo/bar");
        let frame = link.inbound.recv().await.unwrap();
        assert_eq!(frame.event, INIT_EVENT);
        assert_eq!(
            frame.data,
            json!({"state": {"a": "foo", "b": "bar"}, "actions": ["check"]})
        );

        let missing = server.connect_local("/a/b/c");
        let frame = missing.inbound.recv().await.unwrap();
        assert_eq!(frame.event, ERROR_EVENT);
        assert_eq!(
            ServerMessage::from_frame(frame).unwrap(),
            ServerMessage::Error {
                message: "No route matches '/a/b/c'".to_string()
            }
        );
        assert!(missing.inbound.recv().await.is_err());

        server.close().await;
        assert!(link.inbound.recv().await.is_err());
    }
}
