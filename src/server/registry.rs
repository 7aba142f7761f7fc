//! Route table and live channel map.
//!
//! Channels are created lazily on the first subscription to a concrete path
//! and removed after their idle grace period. At most one live channel exists
//! per channel key: a channel that has started draining refuses new
//! reservations, and the next subscriber gets a brand new channel in its place.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use super::action::Actions;
use super::channel::Channel;
use super::view::View;
use crate::config::SyncConfig;
use crate::error::SubscribeError;
use crate::protocol::Frame;
use crate::route::{channel_key, Params, RouteMatcher};
use crate::transport::ConnectionId;

/// A registered view: its template, view function and action table.
pub struct ViewRoute {
    pub matcher: RouteMatcher,
    pub view: Arc<dyn View>,
    pub actions: Arc<Actions>,
}

pub struct ChannelRegistry {
    config: SyncConfig,
    this: Weak<ChannelRegistry>,
    routes: RwLock<Vec<Arc<ViewRoute>>>,
    channels: tokio::sync::Mutex<HashMap<String, Arc<Channel>>>,
    closed: AtomicBool,
}

impl ChannelRegistry {
    pub fn new(config: SyncConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            this: this.clone(),
            routes: RwLock::new(Vec::new()),
            channels: tokio::sync::Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn register(&self, route: ViewRoute) {
        tracing::debug!(target: "woolly::registry", template = %route.matcher.template(), actions = ?route.actions.names(), "registered view");
        self.routes
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(Arc::new(route));
    }

    /// The first registered route matching `path`, with its params.
    pub fn resolve(&self, path: &str) -> Option<(Arc<ViewRoute>, Params)> {
        let routes = self
            .routes
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        routes.iter().find_map(|route| {
            route
                .matcher
                .extract(path)
                .map(|params| (route.clone(), params))
        })
    }

    /// Find or create the channel for `path` and reserve a join slot on it.
    pub(crate) async fn open(&self, path: &str) -> Result<Arc<Channel>, SubscribeError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubscribeError::Closed);
        }

        let key = channel_key(path);
        let mut channels = self.channels.lock().await;
        if let Some(existing) = channels.get(&key) {
            if existing.reserve() {
                return Ok(existing.clone());
            }
        }

        let Some((route, params)) = self.resolve(path) else {
            tracing::debug!(target: "woolly::registry", %path, "no route matches");
            return Err(SubscribeError::NoRoute(path.to_string()));
        };

        let channel = Channel::new(
            key.clone(),
            params,
            route.view.clone(),
            route.actions.clone(),
            &self.config,
            self.this.clone(),
        );
        channel.reserve();
        tracing::debug!(target: "woolly::registry", channel = %key, template = %route.matcher.template(), "channel created");
        channels.insert(key, channel.clone());
        Ok(channel)
    }

    /// Open the channel for `path` and join it as `id`.
    pub async fn subscribe(
        &self,
        path: &str,
        id: ConnectionId,
        outbound: async_channel::Sender<Frame>,
    ) -> Result<Arc<Channel>, SubscribeError> {
        let channel = self.open(path).await?;
        match channel.join(id, outbound).await {
            Ok(()) => Ok(channel),
            Err(e) => {
                self.discard(&channel).await;
                Err(e)
            }
        }
    }

    /// Tear down a channel that never gained a subscriber.
    async fn discard(&self, channel: &Arc<Channel>) {
        let mut channels = self.channels.lock().await;
        if !channel.begin_retire(None) {
            return;
        }
        remove_entry(&mut channels, channel);
        drop(channels);
        channel.shutdown();
    }

    /// Drop `channel` from the map if it is still the live one for its key.
    pub(crate) async fn remove(&self, channel: &Arc<Channel>) {
        let mut channels = self.channels.lock().await;
        remove_entry(&mut channels, channel);
    }

    pub async fn get(&self, path: &str) -> Option<Arc<Channel>> {
        self.channels.lock().await.get(&channel_key(path)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.channels.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.channels.lock().await.is_empty()
    }

    /// Refuse new subscriptions and destroy every channel.
    pub async fn close_all(&self) {
        self.closed.store(true, Ordering::Release);
        let drained: Vec<Arc<Channel>> = {
            let mut channels = self.channels.lock().await;
            channels.drain().map(|(_, channel)| channel).collect()
        };
        for channel in drained {
            channel.shutdown();
        }
    }
}

fn remove_entry(channels: &mut HashMap<String, Arc<Channel>>, channel: &Arc<Channel>) {
    let live = channels
        .get(channel.key())
        .is_some_and(|current| Arc::ptr_eq(current, channel));
    if live {
        channels.remove(channel.key());
        tracing::debug!(target: "woolly::registry", channel = %channel.key(), "channel removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ViewError;
    use crate::server::channel::ChannelPhase;
    use crate::server::view::{async_view, view_fn};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    fn route(template: &str, view: impl View) -> ViewRoute {
        ViewRoute {
            matcher: RouteMatcher::compile(template).unwrap(),
            view: Arc::new(view),
            actions: Arc::new(Actions::new()),
        }
    }

    fn registry() -> Arc<ChannelRegistry> {
        let registry = ChannelRegistry::new(SyncConfig::default());
        registry.register(route("/count", view_fn(|_: &Params| 0)));
        registry
    }

    async fn subscribe(
        registry: &ChannelRegistry,
        path: &str,
    ) -> (ConnectionId, Arc<Channel>, async_channel::Receiver<Frame>) {
        let id = Uuid::new_v4();
        let (tx, rx) = async_channel::bounded(16);
        let channel = registry.subscribe(path, id, tx).await.unwrap();
        (id, channel, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_channel_per_path() {
        let registry = registry();
        let (_, a, _rx_a) = subscribe(&registry, "/count").await;
        let (_, b, _rx_b) = subscribe(&registry, "/count/").await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.subscriber_count(), 2);
        assert_eq!(registry.len().await, 1);
        registry.close_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_route() {
        let registry = registry();
        let (tx, _rx) = async_channel::bounded(1);
        let err = registry.subscribe("/nope", Uuid::new_v4(), tx).await.unwrap_err();
        assert_eq!(err, SubscribeError::NoRoute("/nope".to_string()));
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_initial_fetch_creates_no_channel() {
        let registry = ChannelRegistry::new(SyncConfig::default());
        registry.register(route(
            "/broken",
            async_view(|_| async { Err::<i32, _>("db down") }),
        ));
        let (tx, _rx) = async_channel::bounded(1);

        let err = registry.subscribe("/broken", Uuid::new_v4(), tx).await.unwrap_err();
        assert_eq!(err, SubscribeError::View(ViewError::new("db down")));
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_registered_route_wins() {
        let registry = ChannelRegistry::new(SyncConfig::default());
        registry.register(route("/:a", view_fn(|p: &Params| p.clone())));
        registry.register(route("/count", view_fn(|_: &Params| 0)));

        let (resolved, params) = registry.resolve("/count").unwrap();
        assert_eq!(resolved.matcher.template(), "/:a");
        assert_eq!(params.get("a").map(String::as_str), Some("count"));

        let (_, _, rx) = subscribe(&registry, "/count").await;
        let init = rx.try_recv().unwrap();
        assert_eq!(init.data["state"], json!({"a": "count"}));
        registry.close_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_channel_is_torn_down_after_grace() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let registry = ChannelRegistry::new(SyncConfig::default());
        registry.register(route(
            "/count",
            view_fn(move |_: &Params| {
                counted.fetch_add(1, Ordering::SeqCst);
                0
            }),
        ));
        let (id, channel, _rx) = subscribe(&registry, "/count").await;

        channel.leave(id);
        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert_eq!(registry.len().await, 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert!(registry.is_empty().await);
        assert_eq!(channel.phase(), ChannelPhase::Destroyed);

        // No sync loop or watchdog outlives the channel.
        let at_teardown = calls.load(Ordering::SeqCst);
        assert!(at_teardown > 1);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), at_teardown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejoin_cancels_retirement() {
        let registry = registry();
        let (id, channel, _rx) = subscribe(&registry, "/count").await;

        channel.leave(id);
        tokio::time::sleep(Duration::from_millis(2000)).await;
        let (_, again, _rx2) = subscribe(&registry, "/count").await;
        assert!(Arc::ptr_eq(&channel, &again));

        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(registry.len().await, 1);
        assert_eq!(channel.phase(), ChannelPhase::Active);
        registry.close_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_registry_refuses_subscriptions() {
        let registry = registry();
        let (_, channel, rx) = subscribe(&registry, "/count").await;
        rx.try_recv().unwrap();

        registry.close_all().await;
        assert_eq!(channel.phase(), ChannelPhase::Destroyed);
        assert!(rx.recv().await.is_err());

        let (tx, _rx) = async_channel::bounded(1);
        assert_eq!(
            registry.subscribe("/count", Uuid::new_v4(), tx).await.unwrap_err(),
            SubscribeError::Closed
        );
    }
}
