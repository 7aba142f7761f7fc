//! Sync engine configuration and defaults.

use std::time::Duration;

/// Interval between sync loop ticks in milliseconds.
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 100;

/// Maximum time without a diff pass, whether or not an action reported a change.
pub const DEFAULT_WATCHDOG_INTERVAL_MS: u64 = 1000;

/// How long a channel may sit with zero subscribers before it is torn down.
pub const DEFAULT_IDLE_GRACE_MS: u64 = 3000;

/// Path prefix under which channels are exposed on the socket listener.
pub const DEFAULT_SOCKET_PATH: &str = "/woolly";

/// Default port for the `woolly serve` command.
pub const DEFAULT_PORT: u16 = 3000;

/// Capacity of each connection's outbound frame queue.
pub const FRAME_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the client notification broadcast.
pub const CLIENT_EVENT_CAPACITY: usize = 64;

/// Timing and addressing knobs for the server side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub tick_interval: Duration,
    pub watchdog_interval: Duration,
    pub idle_grace: Duration,
    pub socket_path: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            watchdog_interval: Duration::from_millis(DEFAULT_WATCHDOG_INTERVAL_MS),
            idle_grace: Duration::from_millis(DEFAULT_IDLE_GRACE_MS),
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `WOOLLY_TICK_MS`, `WOOLLY_WATCHDOG_MS`,
    /// `WOOLLY_IDLE_GRACE_MS` and `WOOLLY_SOCKET_PATH`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`SyncConfig::from_env`] with an injectable variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(ms) = millis(&lookup, "WOOLLY_TICK_MS") {
            config.tick_interval = ms;
        }
        if let Some(ms) = millis(&lookup, "WOOLLY_WATCHDOG_MS") {
            config.watchdog_interval = ms;
        }
        if let Some(ms) = millis(&lookup, "WOOLLY_IDLE_GRACE_MS") {
            config.idle_grace = ms;
        }
        if let Some(path) = lookup("WOOLLY_SOCKET_PATH") {
            config.socket_path = normalize_socket_path(&path);
        }

        config
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_watchdog_interval(mut self, interval: Duration) -> Self {
        self.watchdog_interval = interval;
        self
    }

    pub fn with_idle_grace(mut self, grace: Duration) -> Self {
        self.idle_grace = grace;
        self
    }

    pub fn with_socket_path(mut self, path: &str) -> Self {
        self.socket_path = normalize_socket_path(path);
        self
    }
}

/// Client-side addressing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub socket_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            socket_path: DEFAULT_SOCKET_PATH.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn with_socket_path(mut self, path: &str) -> Self {
        self.socket_path = normalize_socket_path(path);
        self
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Some(Duration::from_millis(ms)),
        _ => {
            tracing::warn!(target: "woolly::config", %key, value = %raw, "ignoring invalid duration");
            None
        }
    }
}

/// `woolly/` and `/woolly/` both become `/woolly`; empty becomes `""`.
fn normalize_socket_path(path: &str) -> String {
    let trimmed = path.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}
