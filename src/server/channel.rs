//! One live channel per concrete path.
//!
//! A channel owns the baseline snapshot, the subscriber set, and the timers
//! that drive it. Its lifecycle is `Uninitialized -> Active -> Draining ->
//! Destroyed`; a draining channel never comes back, the registry builds a new
//! one instead.
//!
//! `sync` is async and held for the whole of a diff pass or a join, which is
//! what keeps passes serialized. `baseline` and `members` are plain mutexes
//! never held across an await; `baseline` is always taken first.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{watch, OwnedMutexGuard};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::Instant;

use super::action::{ActionDispatcher, Actions};
use super::registry::ChannelRegistry;
use super::sync_loop::{self, ChangeTracker, PassTrigger, SyncSchedule};
use super::view::{self, View};
use crate::config::SyncConfig;
use crate::diff::{diff, Patch};
use crate::error::{SubscribeError, ViewError};
use crate::lock::lock;
use crate::protocol::{AckResult, ChangePayload, Frame, InitPayload, ServerMessage};
use crate::route::Params;
use crate::transport::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    Uninitialized,
    Active,
    Draining,
    Destroyed,
}

struct Members {
    phase: ChannelPhase,
    subscribers: HashMap<ConnectionId, async_channel::Sender<Frame>>,
    /// Joins admitted by the registry but not finished yet.
    reserved: usize,
    sync_loop: Option<JoinHandle<()>>,
    pass: Option<AbortHandle>,
    idle_timer: Option<JoinHandle<()>>,
    idle_epoch: u64,
}

impl Members {
    fn retiring(&self) -> bool {
        matches!(self.phase, ChannelPhase::Draining | ChannelPhase::Destroyed)
    }
}

pub struct Channel {
    key: String,
    params: Params,
    view: Arc<dyn View>,
    dispatcher: ActionDispatcher,
    changes: Arc<ChangeTracker>,
    tick_interval: Duration,
    idle_grace: Duration,
    registry: Weak<ChannelRegistry>,
    this: Weak<Channel>,
    sync: Arc<tokio::sync::Mutex<SyncSchedule>>,
    baseline: Mutex<Option<Value>>,
    members: Mutex<Members>,
    closed: watch::Sender<bool>,
}

impl Channel {
    pub fn new(
        key: String,
        params: Params,
        view: Arc<dyn View>,
        actions: Arc<Actions>,
        config: &SyncConfig,
        registry: Weak<ChannelRegistry>,
    ) -> Arc<Self> {
        let changes = Arc::new(ChangeTracker::new());
        let dispatcher = ActionDispatcher::new(actions, params.clone(), changes.clone());
        let schedule = SyncSchedule::new(config.watchdog_interval, Instant::now(), 0);

        Arc::new_cyclic(|this| Self {
            key,
            params,
            view,
            dispatcher,
            changes,
            tick_interval: config.tick_interval,
            idle_grace: config.idle_grace,
            registry,
            this: this.clone(),
            sync: Arc::new(tokio::sync::Mutex::new(schedule)),
            baseline: Mutex::new(None),
            members: Mutex::new(Members {
                phase: ChannelPhase::Uninitialized,
                subscribers: HashMap::new(),
                reserved: 0,
                sync_loop: None,
                pass: None,
                idle_timer: None,
                idle_epoch: 0,
            }),
            closed: watch::channel(false).0,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn phase(&self) -> ChannelPhase {
        lock(&self.members).phase
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.members).subscribers.len()
    }

    pub fn action_names(&self) -> Vec<String> {
        self.dispatcher.action_names()
    }

    pub fn changes(&self) -> &ChangeTracker {
        &self.changes
    }

    /// Resolves once the channel has been shut down.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }

    /// The snapshot the next pass diffs against.
    pub fn baseline(&self) -> Option<Value> {
        lock(&self.baseline).clone()
    }

    /// Hold a place for a joining connection, cancelling any pending idle
    /// retirement. Fails once the channel has started draining.
    pub(crate) fn reserve(&self) -> bool {
        let mut members = lock(&self.members);
        if members.retiring() {
            return false;
        }
        members.reserved += 1;
        cancel_idle_timer(&mut members);
        true
    }

    fn release(&self) {
        let mut members = lock(&self.members);
        members.reserved = members.reserved.saturating_sub(1);
        self.schedule_idle(&mut members);
    }

    /// Complete a reserved join: fetch a fresh snapshot, bring existing
    /// subscribers up to it, send `init` to the joiner and admit it.
    pub(crate) async fn join(
        &self,
        id: ConnectionId,
        outbound: async_channel::Sender<Frame>,
    ) -> Result<(), SubscribeError> {
        let mut schedule = self.sync.lock().await;
        schedule.mark_started(Instant::now(), self.changes.generation());

        let fresh = match view::fetch(self.view.as_ref(), &self.params).await {
            Ok(value) => value,
            Err(e) => {
                drop(schedule);
                self.release();
                tracing::warn!(target: "woolly::channel", channel = %self.key, error = %e, "initial view fetch failed");
                return Err(e.into());
            }
        };

        if let Some(patch) = self.advance_baseline(fresh.clone()) {
            if !patch.is_empty() {
                tracing::debug!(target: "woolly::channel", channel = %self.key, ops = patch.len(), "catching up subscribers on join");
                self.broadcast(ServerMessage::Change(ChangePayload::from_patch(patch)));
            }
        }

        let init = ServerMessage::Init(InitPayload {
            state: fresh,
            actions: self.dispatcher.action_names(),
        })
        .into_frame();
        let sent = match init {
            Ok(frame) => outbound.send(frame).await.is_ok(),
            Err(e) => {
                drop(schedule);
                self.release();
                return Err(ViewError::new(e.to_string()).into());
            }
        };

        let mut members = lock(&self.members);
        members.reserved = members.reserved.saturating_sub(1);
        if !sent || members.retiring() {
            self.schedule_idle(&mut members);
            return Err(SubscribeError::Closed);
        }

        members.phase = ChannelPhase::Active;
        members.subscribers.insert(id, outbound);
        if members.sync_loop.is_none() {
            members.sync_loop = Some(sync_loop::spawn(self.this.clone(), self.tick_interval));
        }
        tracing::debug!(target: "woolly::channel", channel = %self.key, connection = %id, subscribers = members.subscribers.len(), "subscriber joined");
        drop(members);
        drop(schedule);
        Ok(())
    }

    pub(crate) fn leave(&self, id: ConnectionId) {
        let mut members = lock(&self.members);
        if members.subscribers.remove(&id).is_some() {
            tracing::debug!(target: "woolly::channel", channel = %self.key, connection = %id, subscribers = members.subscribers.len(), "subscriber left");
            self.schedule_idle(&mut members);
        }
    }

    pub async fn dispatch(&self, name: &str, params: Value) -> AckResult {
        self.dispatcher.dispatch(name, params).await
    }

    /// One sync loop tick. Skipped when a pass or a join holds the sync lock.
    pub(crate) fn on_tick(&self) {
        if self.phase() != ChannelPhase::Active {
            return;
        }
        let Ok(mut guard) = self.sync.clone().try_lock_owned() else {
            tracing::trace!(target: "woolly::channel", channel = %self.key, "pass in flight, skipping tick");
            return;
        };
        if let Some(trigger) = guard.poll(Instant::now(), self.changes.generation()) {
            self.start_pass(guard, trigger);
        }
    }

    /// Start a diff pass now unless one is already in flight or the channel
    /// is not active. Returns whether a pass was started.
    pub fn request_pass(&self) -> bool {
        if self.phase() != ChannelPhase::Active {
            return false;
        }
        let Ok(mut guard) = self.sync.clone().try_lock_owned() else {
            return false;
        };
        guard.mark_started(Instant::now(), self.changes.generation());
        self.start_pass(guard, PassTrigger::Requested);
        true
    }

    fn start_pass(&self, guard: OwnedMutexGuard<SyncSchedule>, trigger: PassTrigger) {
        let Some(channel) = self.this.upgrade() else {
            return;
        };
        let task = tokio::spawn(async move { channel.run_pass(guard, trigger).await });
        lock(&self.members).pass = Some(task.abort_handle());
    }

    /// Runs with the schedule guard held, so passes never overlap.
    async fn run_pass(&self, _pass: OwnedMutexGuard<SyncSchedule>, trigger: PassTrigger) {
        let fresh = match view::fetch(self.view.as_ref(), &self.params).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(target: "woolly::channel", channel = %self.key, ?trigger, error = %e, "view failed, skipping broadcast");
                return;
            }
        };

        let Some(patch) = self.advance_baseline(fresh) else {
            return;
        };
        if patch.is_empty() {
            tracing::trace!(target: "woolly::channel", channel = %self.key, ?trigger, "no change");
            return;
        }

        tracing::debug!(target: "woolly::channel", channel = %self.key, ?trigger, ops = patch.len(), "broadcasting change");
        self.broadcast(ServerMessage::Change(ChangePayload::from_patch(patch)));
    }

    /// Install `fresh` as the baseline and return the patch from the previous
    /// one. `None` when there was no previous baseline, or when the channel is
    /// retiring, which keeps no snapshot at all.
    fn advance_baseline(&self, fresh: Value) -> Option<Patch> {
        let mut baseline = lock(&self.baseline);
        if lock(&self.members).retiring() {
            *baseline = None;
            return None;
        }
        let patch = baseline.as_ref().map(|old| diff(old, &fresh));
        *baseline = Some(fresh);
        patch
    }

    /// Queue `message` for every subscriber. A subscriber whose queue is full
    /// or closed is dropped, since a replica that misses a patch cannot
    /// recover on its own.
    fn broadcast(&self, message: ServerMessage) {
        let frame = match message.into_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(target: "woolly::channel", channel = %self.key, error = %e, "failed to encode broadcast");
                return;
            }
        };

        let mut members = lock(&self.members);
        let dropped: Vec<ConnectionId> = members
            .subscribers
            .iter()
            .filter(|(_, tx)| tx.try_send(frame.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();

        if dropped.is_empty() {
            return;
        }
        for id in dropped {
            if let Some(tx) = members.subscribers.remove(&id) {
                tracing::warn!(target: "woolly::channel", channel = %self.key, connection = %id, "dropping subscriber that cannot keep up");
                tx.close();
            }
        }
        self.schedule_idle(&mut members);
    }

    fn schedule_idle(&self, members: &mut Members) {
        if !members.subscribers.is_empty()
            || members.reserved > 0
            || members.idle_timer.is_some()
            || members.retiring()
        {
            return;
        }

        members.idle_epoch += 1;
        let epoch = members.idle_epoch;
        let channel = self.this.clone();
        let grace = self.idle_grace;
        tracing::debug!(target: "woolly::channel", channel = %self.key, ?grace, "channel idle");

        members.idle_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let Some(channel) = channel.upgrade() else {
                return;
            };
            if !channel.begin_retire(Some(epoch)) {
                return;
            }
            if let Some(registry) = channel.registry.upgrade() {
                registry.remove(&channel).await;
            }
            channel.shutdown();
        }));
    }

    /// Move an idle channel to `Draining`. With an epoch, only the idle timer
    /// of that epoch may do so.
    pub(crate) fn begin_retire(&self, epoch: Option<u64>) -> bool {
        let mut members = lock(&self.members);
        let idle = members.subscribers.is_empty()
            && members.reserved == 0
            && matches!(members.phase, ChannelPhase::Uninitialized | ChannelPhase::Active);
        if !idle || epoch.is_some_and(|e| e != members.idle_epoch) {
            return false;
        }

        members.phase = ChannelPhase::Draining;
        match (epoch, members.idle_timer.take()) {
            // Called from the timer itself.
            (Some(_), _) => {}
            (None, Some(timer)) => timer.abort(),
            (None, None) => {}
        }
        true
    }

    /// Stop every timer and task, disconnect remaining subscribers and release
    /// the baseline.
    pub(crate) fn shutdown(&self) {
        let subscribers = {
            let mut members = lock(&self.members);
            if members.phase == ChannelPhase::Destroyed {
                return;
            }
            members.phase = ChannelPhase::Draining;
            if let Some(task) = members.sync_loop.take() {
                task.abort();
            }
            if let Some(pass) = members.pass.take() {
                pass.abort();
            }
            if let Some(timer) = members.idle_timer.take() {
                timer.abort();
            }
            std::mem::take(&mut members.subscribers)
        };

        for tx in subscribers.into_values() {
            tx.close();
        }
        // A pass still finishing sees the draining phase and stores nothing.
        *lock(&self.baseline) = None;

        lock(&self.members).phase = ChannelPhase::Destroyed;
        self.closed.send_replace(true);
        tracing::debug!(target: "woolly::channel", channel = %self.key, "channel destroyed");
    }
}

fn cancel_idle_timer(members: &mut Members) {
    if let Some(timer) = members.idle_timer.take() {
        timer.abort();
    }
    members.idle_epoch += 1;
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let members = lock(&self.members);
        f.debug_struct("Channel")
            .field("key", &self.key)
            .field("phase", &members.phase)
            .field("subscribers", &members.subscribers.len())
            .finish()
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        let members = self
            .members
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        for task in [members.sync_loop.take(), members.idle_timer.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::view::{async_view, view_fn};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
    use tokio::sync::Notify;
    use uuid::Uuid;

    fn config() -> SyncConfig {
        SyncConfig::default()
    }

    fn counter_channel(counter: Arc<AtomicI64>) -> Arc<Channel> {
        let view_counter = counter.clone();
        let actions = Actions::new().sync("inc", move |_| {
            Ok::<_, String>(counter.fetch_add(1, Ordering::SeqCst) + 1)
        });
        Channel::new(
            "/count".to_string(),
            Params::new(),
            Arc::new(view_fn(move |_: &Params| view_counter.load(Ordering::SeqCst))),
            Arc::new(actions),
            &config(),
            Weak::new(),
        )
    }

    /// A channel whose view parks on `gate` while `blocked` is set.
    fn gated_channel(blocked: Arc<AtomicBool>, gate: Arc<Notify>) -> Arc<Channel> {
        let view = async_view(move |_| {
            let (blocked, gate) = (blocked.clone(), gate.clone());
            async move {
                if blocked.load(Ordering::SeqCst) {
                    gate.notified().await;
                }
                Ok::<_, String>(json!({"ok": true}))
            }
        });
        Channel::new(
            "/slow".to_string(),
            Params::new(),
            Arc::new(view),
            Arc::new(Actions::new()),
            &config(),
            Weak::new(),
        )
    }

    async fn join(channel: &Channel) -> async_channel::Receiver<Frame> {
        let (tx, rx) = async_channel::bounded(16);
        assert!(channel.reserve());
        channel.join(Uuid::new_v4(), tx).await.unwrap();
        rx
    }

    fn decode(frame: Frame) -> ServerMessage {
        ServerMessage::from_frame(frame).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_sends_init() {
        let channel = counter_channel(Arc::new(AtomicI64::new(5)));
        let rx = join(&channel).await;

        assert_eq!(
            decode(rx.try_recv().unwrap()),
            ServerMessage::Init(InitPayload {
                state: json!(5),
                actions: vec!["inc".to_string()],
            })
        );
        assert_eq!(channel.phase(), ChannelPhase::Active);
        assert_eq!(channel.subscriber_count(), 1);
        channel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_catches_up_existing_subscribers() {
        let counter = Arc::new(AtomicI64::new(0));
        let channel = counter_channel(counter.clone());
        let first = join(&channel).await;
        first.try_recv().unwrap();

        counter.store(3, Ordering::SeqCst);
        let second = join(&channel).await;

        assert_eq!(
            decode(first.try_recv().unwrap()),
            ServerMessage::Change(ChangePayload::Value(json!(3)))
        );
        assert!(matches!(
            decode(second.try_recv().unwrap()),
            ServerMessage::Init(InitPayload { state, .. }) if state == json!(3)
        ));
        assert!(second.try_recv().is_err());
        channel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_action_change_is_broadcast_on_next_tick() {
        let channel = counter_channel(Arc::new(AtomicI64::new(0)));
        let rx = join(&channel).await;
        rx.try_recv().unwrap();

        assert_eq!(channel.dispatch("inc", Value::Null).await, AckResult::Success(json!(1)));
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(
            decode(rx.try_recv().unwrap()),
            ServerMessage::Change(ChangePayload::Value(json!(1)))
        );
        assert_eq!(channel.baseline(), Some(json!(1)));
        channel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_watchdog_catches_untracked_changes() {
        let counter = Arc::new(AtomicI64::new(0));
        let channel = counter_channel(counter.clone());
        let rx = join(&channel).await;
        rx.try_recv().unwrap();

        counter.store(9, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(
            decode(rx.try_recv().unwrap()),
            ServerMessage::Change(ChangePayload::Value(json!(9)))
        );
        channel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_join_restarts_the_watchdog() {
        let counter = Arc::new(AtomicI64::new(0));
        let channel = counter_channel(counter.clone());
        let first = join(&channel).await;
        first.try_recv().unwrap();

        tokio::time::sleep(Duration::from_millis(800)).await;
        let second = join(&channel).await;
        second.try_recv().unwrap();
        counter.store(4, Ordering::SeqCst);

        // The join at 800ms counts as a pass, so nothing fires at 1000ms.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(first.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(
            decode(first.try_recv().unwrap()),
            ServerMessage::Change(ChangePayload::Value(json!(4)))
        );
        channel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_patch_is_not_broadcast() {
        let channel = counter_channel(Arc::new(AtomicI64::new(1)));
        let rx = join(&channel).await;
        rx.try_recv().unwrap();

        assert!(channel.request_pass());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());
        channel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_pass_is_a_noop_while_one_is_in_flight() {
        let blocked = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(Notify::new());
        let channel = gated_channel(blocked.clone(), gate.clone());
        let _rx = join(&channel).await;

        blocked.store(true, Ordering::SeqCst);
        assert!(channel.request_pass());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!channel.request_pass());

        blocked.store(false, Ordering::SeqCst);
        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(channel.request_pass());
        channel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_view_error_skips_broadcast() {
        let failing = Arc::new(AtomicBool::new(false));
        let value = Arc::new(AtomicI64::new(0));
        let (view_failing, view_value) = (failing.clone(), value.clone());
        let view = async_view(move |_| {
            let result = if view_failing.load(Ordering::SeqCst) {
                Err("db down".to_string())
            } else {
                Ok(view_value.load(Ordering::SeqCst))
            };
            async move { result }
        });
        let channel = Channel::new(
            "/flaky".to_string(),
            Params::new(),
            Arc::new(view),
            Arc::new(Actions::new()),
            &config(),
            Weak::new(),
        );
        let rx = join(&channel).await;
        rx.try_recv().unwrap();

        failing.store(true, Ordering::SeqCst);
        value.store(2, Ordering::SeqCst);
        assert!(channel.request_pass());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(channel.baseline(), Some(json!(0)));

        failing.store(false, Ordering::SeqCst);
        assert!(channel.request_pass());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            decode(rx.try_recv().unwrap()),
            ServerMessage::Change(ChangePayload::Value(json!(2)))
        );
        channel.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disconnects_and_stops_timers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let channel = Channel::new(
            "/count".to_string(),
            Params::new(),
            Arc::new(view_fn(move |_: &Params| counted.fetch_add(1, Ordering::SeqCst))),
            Arc::new(Actions::new()),
            &config(),
            Weak::new(),
        );
        let rx = join(&channel).await;
        rx.try_recv().unwrap();

        // Watchdog passes keep fetching while the channel is live.
        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(calls.load(Ordering::SeqCst) > 1);

        channel.shutdown();
        assert_eq!(channel.phase(), ChannelPhase::Destroyed);
        assert!(rx.is_closed());
        assert!(!channel.reserve());
        assert_eq!(channel.baseline(), None);

        let at_shutdown = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), at_shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_pass_releases_baseline() {
        let blocked = Arc::new(AtomicBool::new(false));
        let gate = Arc::new(Notify::new());
        let channel = gated_channel(blocked.clone(), gate.clone());
        let _rx = join(&channel).await;
        assert_eq!(channel.baseline(), Some(json!({"ok": true})));

        blocked.store(true, Ordering::SeqCst);
        assert!(channel.request_pass());
        tokio::time::sleep(Duration::from_millis(10)).await;

        channel.shutdown();
        assert_eq!(channel.phase(), ChannelPhase::Destroyed);
        assert_eq!(channel.baseline(), None);

        gate.notify_one();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(channel.baseline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_pass_needs_an_active_channel() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let channel = Channel::new(
            "/count".to_string(),
            Params::new(),
            Arc::new(view_fn(move |_: &Params| counted.fetch_add(1, Ordering::SeqCst))),
            Arc::new(Actions::new()),
            &config(),
            Weak::new(),
        );
        assert!(!channel.request_pass());

        let _rx = join(&channel).await;
        assert!(channel.request_pass());
        tokio::time::sleep(Duration::from_millis(10)).await;

        channel.shutdown();
        let at_shutdown = calls.load(Ordering::SeqCst);
        assert!(!channel.request_pass());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), at_shutdown);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debug_shows_key_and_phase() {
        let channel = counter_channel(Arc::new(AtomicI64::new(0)));
        assert_eq!(
            format!("{:?}", channel),
            r#"Channel { key: "/count", phase: Uninitialized, subscribers: 0 }"#
        );
    }
}
