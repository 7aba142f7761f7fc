//! Change detection scheduling.
//!
//! Two triggers feed one scheduler: a change recorded by an action, and the
//! watchdog deadline. [`SyncSchedule::poll`] decides whether a tick starts a
//! diff pass; the in-flight guard itself is the channel's sync lock, so a tick
//! that cannot take it is skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::channel::Channel;
use crate::lock::lock;

/// Records successful actions on a channel.
///
/// A generation counter rather than a timestamp comparison, so two changes in
/// the same instant are never collapsed into "nothing new".
#[derive(Debug, Default)]
pub struct ChangeTracker {
    generation: AtomicU64,
    last_changed: Mutex<Option<Instant>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_changed(&self) {
        *lock(&self.last_changed) = Some(Instant::now());
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn last_changed_at(&self) -> Option<Instant> {
        *lock(&self.last_changed)
    }
}

/// Why a diff pass was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassTrigger {
    Changed,
    Watchdog,
    /// Explicit request from outside the tick loop.
    Requested,
}

/// Per-channel scheduling state.
#[derive(Debug, Clone)]
pub struct SyncSchedule {
    watchdog: Duration,
    last_pass: Instant,
    seen_generation: u64,
}

impl SyncSchedule {
    pub fn new(watchdog: Duration, now: Instant, generation: u64) -> Self {
        Self {
            watchdog,
            last_pass: now,
            seen_generation: generation,
        }
    }

    /// Decide whether a pass should start at `now`. A returned trigger means
    /// the pass is considered started: the watchdog restarts and the current
    /// generation counts as seen.
    pub fn poll(&mut self, now: Instant, generation: u64) -> Option<PassTrigger> {
        let trigger = if generation != self.seen_generation {
            PassTrigger::Changed
        } else if now.saturating_duration_since(self.last_pass) >= self.watchdog {
            PassTrigger::Watchdog
        } else {
            return None;
        };
        self.mark_started(now, generation);
        Some(trigger)
    }

    pub fn mark_started(&mut self, now: Instant, generation: u64) {
        self.last_pass = now;
        self.seen_generation = generation;
    }

    pub fn last_pass(&self) -> Instant {
        self.last_pass
    }
}

/// Drive `channel` every `tick` until the channel is dropped or the task is
/// aborted.
pub(crate) fn spawn(channel: Weak<Channel>, tick: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + tick, tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            let Some(channel) = channel.upgrade() else {
                break;
            };
            channel.on_tick();
        }
    })
}
