//! Client side: one connection to one channel.
//!
//! A [`WoollyClient`] keeps a [`ClientReplica`] in step with the server and
//! reports what happens through [`ClientEvent`]s. Actions are invoked through
//! [`WoollyClient::invoke`] or the [`ActionProxy`] values handed out once the
//! handshake completes. Every (re)connection starts a new session; proxies and
//! pending calls from an older session fail with [`ClientError::Disconnected`].

pub mod replica;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use serde_json::Value;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;

pub use replica::ClientReplica;

use crate::config::{ClientConfig, CLIENT_EVENT_CAPACITY};
use crate::error::{ClientError, TransportError};
use crate::lock::lock;
use crate::protocol::{AckResult, ClientMessage, Frame, ServerMessage};
use crate::transport::{ws, Link};

/// Notifications about the replica and the connection.
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Connected,
    /// Handshake finished. Sent once per session, right after the first
    /// `Changed`.
    Ready {
        state: Value,
        actions: Vec<ActionProxy>,
    },
    Changed(Value),
    Error(String),
    Disconnected,
}

struct Session {
    epoch: u64,
    link: Link,
    reader: JoinHandle<()>,
}

struct Shared {
    config: ClientConfig,
    session: Mutex<Option<Session>>,
    replica: Mutex<ClientReplica>,
    pending: Mutex<HashMap<u64, oneshot::Sender<AckResult>>>,
    next_request: AtomicU64,
    next_epoch: AtomicU64,
    events: broadcast::Sender<ClientEvent>,
}

#[derive(Clone)]
pub struct WoollyClient {
    shared: Arc<Shared>,
}

impl Default for WoollyClient {
    fn default() -> Self {
        Self::new()
    }
}

impl WoollyClient {
    pub fn new() -> Self {
        Self::with_config(ClientConfig::default())
    }

    pub fn with_config(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(CLIENT_EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                session: Mutex::new(None),
                replica: Mutex::new(ClientReplica::new()),
                pending: Mutex::new(HashMap::new()),
                next_request: AtomicU64::new(1),
                next_epoch: AtomicU64::new(1),
                events,
            }),
        }
    }

    /// Receive future notifications. Subscribe before connecting to see the
    /// handshake.
    ///
    /// The receiver buffers [`CLIENT_EVENT_CAPACITY`] events. A receiver that
    /// falls further behind gets `RecvError::Lagged` and may have missed a
    /// one-off event such as `Ready` or `Disconnected`; on lag, read
    /// [`state`](Self::state), [`actions`](Self::actions) and
    /// [`is_connected`](Self::is_connected), which always reflect the current
    /// session.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    /// Open a WebSocket to `<base_url><socket_path><path>` and start a session.
    pub async fn connect(&self, base_url: &str, path: &str) -> Result<(), ClientError> {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }

        let url = format!(
            "{}{}{}",
            base_url.trim_end_matches('/'),
            self.shared.config.socket_path,
            path
        );
        tracing::debug!(target: "woolly::client", %url, "connecting");

        let stream = match tokio_tungstenite::connect_async(url.as_str()).await {
            Ok((stream, _response)) => stream,
            Err(e) => {
                let err = TransportError::from(e);
                self.shared.emit(ClientEvent::Error(err.to_string()));
                return Err(err.into());
            }
        };
        self.attach(ws::spawn_pump(stream))
    }

    /// Start a session over an already established link.
    pub fn attach(&self, link: Link) -> Result<(), ClientError> {
        let mut session = self.shared.session();
        if session.is_some() {
            return Err(ClientError::AlreadyConnected);
        }

        let epoch = self.shared.next_epoch.fetch_add(1, Ordering::Relaxed);
        self.shared.emit(ClientEvent::Connected);
        let reader = tokio::spawn(read_loop(
            Arc::downgrade(&self.shared),
            epoch,
            link.inbound.clone(),
        ));
        *session = Some(Session {
            epoch,
            link,
            reader,
        });
        tracing::debug!(target: "woolly::client", epoch, "session started");
        Ok(())
    }

    /// Call action `name`. Resolves with the handler's value or fails with
    /// its message. There is no timeout.
    pub async fn invoke(&self, name: &str, params: Value) -> Result<Value, ClientError> {
        let (epoch, outbound) = self.shared.current()?;
        self.shared.call(epoch, outbound, name, params).await
    }

    /// Close the connection, failing pending calls and clearing the replica.
    pub fn disconnect(&self) {
        let session = self.shared.session().take();
        if let Some(session) = session {
            session.reader.abort();
            self.shared.end_session(session);
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.session().is_some()
    }

    /// The current snapshot, if the handshake has completed.
    pub fn state(&self) -> Option<Value> {
        lock(&self.shared.replica).state().cloned()
    }

    pub fn action_names(&self) -> Vec<String> {
        lock(&self.shared.replica).actions().to_vec()
    }

    /// Proxies for every action announced in the current session.
    pub fn actions(&self) -> Vec<ActionProxy> {
        let Ok((epoch, _)) = self.shared.current() else {
            return Vec::new();
        };
        self.shared.proxies(epoch, &self.action_names())
    }

    pub fn action(&self, name: &str) -> Option<ActionProxy> {
        self.actions().into_iter().find(|proxy| proxy.name == name)
    }
}

impl Shared {
    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        lock(&self.session)
    }

    fn emit(&self, event: ClientEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn current(&self) -> Result<(u64, async_channel::Sender<Frame>), ClientError> {
        self.session()
            .as_ref()
            .map(|s| (s.epoch, s.link.outbound.clone()))
            .ok_or(ClientError::Disconnected)
    }

    fn outbound_for(&self, epoch: u64) -> Result<async_channel::Sender<Frame>, ClientError> {
        match self.current()? {
            (current, outbound) if current == epoch => Ok(outbound),
            _ => Err(ClientError::Disconnected),
        }
    }

    fn proxies(self: &Arc<Self>, epoch: u64, names: &[String]) -> Vec<ActionProxy> {
        names
            .iter()
            .map(|name| ActionProxy {
                name: name.clone(),
                epoch,
                shared: Arc::downgrade(self),
            })
            .collect()
    }

    async fn call(
        &self,
        epoch: u64,
        outbound: async_channel::Sender<Frame>,
        name: &str,
        params: Value,
    ) -> Result<Value, ClientError> {
        let id = self.next_request.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(id, tx);

        let frame = ClientMessage::Action {
            id,
            name: name.to_string(),
            params,
        }
        .into_frame();
        tracing::debug!(target: "woolly::client", epoch, id, action = %name, "invoking");

        if outbound.send(frame).await.is_err() {
            lock(&self.pending).remove(&id);
            return Err(ClientError::Disconnected);
        }

        match rx.await {
            Ok(result) => result.into_result().map_err(ClientError::from),
            Err(_) => Err(ClientError::Disconnected),
        }
    }

    fn handle(self: &Arc<Self>, epoch: u64, message: ServerMessage) {
        let session = self.session();
        if !session.as_ref().is_some_and(|s| s.epoch == epoch) {
            return;
        }

        match message {
            ServerMessage::Init(init) => {
                let mut replica = lock(&self.replica);
                let state = replica.apply_init(init).clone();
                let actions = self.proxies(epoch, replica.actions());
                drop(replica);
                tracing::debug!(target: "woolly::client", epoch, actions = actions.len(), "ready");
                self.emit(ClientEvent::Changed(state.clone()));
                self.emit(ClientEvent::Ready { state, actions });
            }
            ServerMessage::Change(change) => {
                let applied = lock(&self.replica).apply_change(change).map(Value::clone);
                match applied {
                    Ok(state) => self.emit(ClientEvent::Changed(state)),
                    Err(e) => {
                        tracing::warn!(target: "woolly::client", error = %e, "could not apply change");
                        self.emit(ClientEvent::Error(format!("could not apply change: {}", e)));
                    }
                }
            }
            ServerMessage::Ack { id, result } => match lock(&self.pending).remove(&id) {
                Some(waiter) => {
                    let _ = waiter.send(result);
                }
                None => {
                    tracing::debug!(target: "woolly::client", id, "ack for unknown request");
                }
            },
            ServerMessage::Error { message } => {
                tracing::warn!(target: "woolly::client", %message, "server error");
                self.emit(ClientEvent::Error(message));
            }
        }
    }

    /// Tear down a session that has already been taken out of `self.session`.
    fn end_session(&self, session: Session) {
        session.link.close();
        lock(&self.replica).reset();
        // Dropping the senders fails every pending call.
        lock(&self.pending).clear();
        tracing::debug!(target: "woolly::client", epoch = session.epoch, "session ended");
        self.emit(ClientEvent::Disconnected);
    }
}

async fn read_loop(shared: Weak<Shared>, epoch: u64, inbound: async_channel::Receiver<Frame>) {
    while let Ok(frame) = inbound.recv().await {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        match ServerMessage::from_frame(frame) {
            Ok(message) => shared.handle(epoch, message),
            Err(e) => {
                tracing::warn!(target: "woolly::client", error = %e, "ignoring frame");
                shared.emit(ClientEvent::Error(e.to_string()));
            }
        }
    }

    let Some(shared) = shared.upgrade() else {
        return;
    };
    let ended = {
        let mut session = shared.session();
        if session.as_ref().is_some_and(|s| s.epoch == epoch) {
            session.take()
        } else {
            None
        }
    };
    if let Some(session) = ended {
        shared.end_session(session);
    }
}

/// A callable handle for one server action, bound to the session that
/// announced it.
#[derive(Debug, Clone)]
pub struct ActionProxy {
    name: String,
    epoch: u64,
    shared: Weak<Shared>,
}

impl ActionProxy {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn call(&self, params: Value) -> Result<Value, ClientError> {
        let shared = self.shared.upgrade().ok_or(ClientError::Disconnected)?;
        let outbound = shared.outbound_for(self.epoch)?;
        shared.call(self.epoch, outbound, &self.name, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ChangePayload, InitPayload};
    use crate::transport::memory;
    use serde_json::json;

    async fn next(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
        events.recv().await.unwrap()
    }

    fn server_frame(message: ServerMessage) -> Frame {
        message.into_frame().unwrap()
    }

    #[tokio::test]
    async fn test_handshake_and_changes() {
        let client = WoollyClient::new();
        let mut events = client.subscribe();
        let (client_end, server_end) = memory::pair();
        client.attach(client_end).unwrap();
        assert!(matches!(next(&mut events).await, ClientEvent::Connected));

        server_end
            .outbound
            .send(server_frame(ServerMessage::Init(InitPayload {
                state: json!({"n": 0}),
                actions: vec!["inc".to_string()],
            })))
            .await
            .unwrap();
        assert!(matches!(next(&mut events).await, ClientEvent::Changed(s) if s == json!({"n": 0})));
        match next(&mut events).await {
            ClientEvent::Ready { state, actions } => {
                assert_eq!(state, json!({"n": 0}));
                assert_eq!(actions.len(), 1);
                assert_eq!(actions[0].name(), "inc");
            }
            other => panic!("unexpected event {:?}", other),
        }

        server_end
            .outbound
            .send(server_frame(ServerMessage::Change(ChangePayload::Value(json!({"n": 1})))))
            .await
            .unwrap();
        assert!(matches!(next(&mut events).await, ClientEvent::Changed(s) if s == json!({"n": 1})));
        assert_eq!(client.state(), Some(json!({"n": 1})));
    }

    #[tokio::test]
    async fn test_lagging_subscriber_can_resync_from_the_client() {
        let client = WoollyClient::new();
        let mut events = client.subscribe();
        let (client_end, server_end) = memory::pair();
        client.attach(client_end).unwrap();

        server_end
            .outbound
            .send(server_frame(ServerMessage::Init(InitPayload {
                state: json!(0),
                actions: vec!["inc".to_string()],
            })))
            .await
            .unwrap();
        let last = CLIENT_EVENT_CAPACITY as i64 + 10;
        for n in 1..=last {
            server_end
                .outbound
                .send(server_frame(ServerMessage::Change(ChangePayload::Value(json!(n)))))
                .await
                .unwrap();
        }
        while client.state() != Some(json!(last)) {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            events.recv().await,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
        assert!(client.is_connected());
        assert_eq!(client.action_names(), vec!["inc".to_string()]);
        assert_eq!(client.actions().len(), 1);
    }

    #[tokio::test]
    async fn test_invoke_resolves_with_ack() {
        let client = WoollyClient::new();
        let (client_end, server_end) = memory::pair();
        client.attach(client_end).unwrap();

        let server = tokio::spawn(async move {
            let request = server_end.inbound.recv().await.unwrap();
            assert_eq!(request.event, "a-check");
            let id = request.id.unwrap();
            server_end
                .outbound
                .send(server_frame(ServerMessage::Ack {
                    id,
                    result: AckResult::Failure("what!?".to_string()),
                }))
                .await
                .unwrap();
            server_end
        });

        let err = client.invoke("check", json!({})).await.unwrap_err();
        assert_eq!(err.action_message(), Some("what!?"));
        drop(server.await.unwrap());
    }

    #[tokio::test]
    async fn test_disconnect_fails_pending_and_old_proxies() {
        let client = WoollyClient::new();
        let mut events = client.subscribe();
        let (client_end, server_end) = memory::pair();
        client.attach(client_end).unwrap();
        server_end
            .outbound
            .send(server_frame(ServerMessage::Init(InitPayload {
                state: json!(0),
                actions: vec!["inc".to_string()],
            })))
            .await
            .unwrap();
        while !matches!(next(&mut events).await, ClientEvent::Ready { .. }) {}

        let proxy = client.action("inc").unwrap();
        let pending = {
            let client = client.clone();
            tokio::spawn(async move { client.invoke("inc", Value::Null).await })
        };
        // Wait until the request reached the server before dropping the link.
        server_end.inbound.recv().await.unwrap();

        client.disconnect();
        assert!(matches!(pending.await.unwrap(), Err(ClientError::Disconnected)));
        assert!(matches!(proxy.call(Value::Null).await, Err(ClientError::Disconnected)));
        assert_eq!(client.state(), None);
        assert!(client.actions().is_empty());

        // A new session does not revive the old proxy.
        let (client_end, _server_end) = memory::pair();
        client.attach(client_end).unwrap();
        assert!(matches!(proxy.call(Value::Null).await, Err(ClientError::Disconnected)));
    }

    #[tokio::test]
    async fn test_server_close_emits_disconnected() {
        let client = WoollyClient::new();
        let mut events = client.subscribe();
        let (client_end, server_end) = memory::pair();
        client.attach(client_end).unwrap();
        assert!(matches!(next(&mut events).await, ClientEvent::Connected));

        server_end.close();
        assert!(matches!(next(&mut events).await, ClientEvent::Disconnected));
        assert!(!client.is_connected());
        assert!(matches!(
            client.invoke("inc", Value::Null).await,
            Err(ClientError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_unappliable_patch_reports_error() {
        let client = WoollyClient::new();
        let mut events = client.subscribe();
        let (client_end, server_end) = memory::pair();
        client.attach(client_end).unwrap();

        for message in [
            ServerMessage::Init(InitPayload {
                state: json!({"a": 1}),
                actions: vec![],
            }),
            ServerMessage::Change(ChangePayload::from_value(json!([{"op": "remove", "path": "/zzz"}])).unwrap()),
        ] {
            server_end.outbound.send(server_frame(message)).await.unwrap();
        }

        loop {
            if let ClientEvent::Error(message) = next(&mut events).await {
                assert!(message.starts_with("could not apply change"));
                break;
            }
        }
        assert_eq!(client.state(), Some(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_attach_twice_is_rejected() {
        let client = WoollyClient::new();
        let (a, _a_peer) = memory::pair();
        let (b, _b_peer) = memory::pair();
        client.attach(a).unwrap();
        assert!(matches!(client.attach(b), Err(ClientError::AlreadyConnected)));
    }
}
