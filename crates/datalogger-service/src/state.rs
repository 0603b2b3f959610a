//! Application state shared across handlers.
//!
//! One [`AppState`] is created at startup and passed to every component.
//! It owns the single GUI state store, the single hardware handle, the
//! subscriber registry and the broadcaster slot.
//!
//! # Locks
//!
//! - `gui` (std `Mutex`, inside [`GuiStateStore`]): held for one field
//!   write or one clone, never across an await.
//! - `hardware` (async `Mutex`, inside [`HardwareHandle`]): held for
//!   exactly one driver call.
//! - `subscribers` (std `Mutex`): held while queueing one event, never
//!   across an await.
//! - `broadcaster.slot` (std `Mutex`): the start lock. Held only around
//!   the check-and-spawn in [`crate::Broadcaster::start`], never while the
//!   loop runs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use datalogger_core::SharedLogger;

use crate::broadcaster::BroadcasterHandle;
use crate::config::Config;
use crate::gui::GuiStateStore;
use crate::hardware::HardwareHandle;
use crate::subscribers::SubscriberRegistry;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    /// Last-known values shown by the panel.
    pub gui: GuiStateStore,
    /// Serialized access to the driver.
    pub hardware: HardwareHandle,
    /// Connected push-channel subscribers.
    pub subscribers: SubscriberRegistry,
    /// Status broadcaster slot and statistics.
    pub broadcaster: BroadcasterState,
    /// Configuration the service was started with.
    pub config: Config,
    /// Cancelled when the service shuts down.
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Create new application state around a driver.
    pub fn new(logger: SharedLogger, config: Config) -> Arc<Self> {
        Arc::new(Self {
            gui: GuiStateStore::new(),
            hardware: HardwareHandle::new(logger),
            subscribers: SubscriberRegistry::new(config.server.subscriber_buffer),
            broadcaster: BroadcasterState::new(config.broadcaster.interval()),
            config,
            shutdown: CancellationToken::new(),
        })
    }
}

/// State for the status broadcaster.
#[derive(Debug)]
pub struct BroadcasterState {
    interval: Duration,
    /// Handle of the running loop. `Some` means a loop has been started.
    slot: Mutex<Option<BroadcasterHandle>>,
    /// Ticks completed so far.
    ticks: AtomicU64,
    /// Poll statistics.
    pub stats: RwLock<BroadcasterStats>,
}

impl BroadcasterState {
    /// Create a new broadcaster state.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            slot: Mutex::new(None),
            ticks: AtomicU64::new(0),
            stats: RwLock::new(BroadcasterStats::default()),
        }
    }

    /// Time between two ticks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Lock the broadcaster slot.
    pub(crate) fn slot(&self) -> MutexGuard<'_, Option<BroadcasterHandle>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The handle of the started loop, if any.
    pub fn handle(&self) -> Option<BroadcasterHandle> {
        self.slot().clone()
    }

    /// Whether a loop has been started and has not exited.
    pub fn is_running(&self) -> bool {
        self.slot().as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Current tick count.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Advance the tick counter and return the new value.
    pub(crate) fn next_tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Status poll statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct BroadcasterStats {
    /// Successful status polls.
    pub success_count: u64,
    /// Failed status polls.
    pub failure_count: u64,
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Time of last successful poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_poll_at: Option<OffsetDateTime>,
    /// Time of last failed poll.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_error_at: Option<OffsetDateTime>,
    /// Last error message.
    pub last_error: Option<String>,
}

impl BroadcasterStats {
    /// Record a successful poll.
    pub fn record_success(&mut self) {
        self.success_count += 1;
        self.consecutive_failures = 0;
        self.last_poll_at = Some(OffsetDateTime::now_utc());
    }

    /// Record a failed poll and return the number of consecutive failures.
    pub fn record_failure(&mut self, error: impl Into<String>) -> u32 {
        self.failure_count += 1;
        self.consecutive_failures += 1;
        self.last_error_at = Some(OffsetDateTime::now_utc());
        self.last_error = Some(error.into());
        self.consecutive_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalogger_core::MockLogger;

    #[tokio::test]
    async fn test_app_state_new() {
        let state = AppState::new(Arc::new(MockLogger::new()), Config::default());

        assert_eq!(state.config.server.bind, "127.0.0.1:5000");
        assert_eq!(state.broadcaster.interval(), Duration::from_secs(5));
        assert!(state.subscribers.is_empty());
        assert!(!state.shutdown.is_cancelled());
    }

    #[test]
    fn test_broadcaster_state_initial() {
        let broadcaster = BroadcasterState::new(Duration::from_secs(5));
        assert!(!broadcaster.is_running());
        assert!(broadcaster.handle().is_none());
        assert_eq!(broadcaster.ticks(), 0);
    }

    #[test]
    fn test_next_tick_is_monotonic() {
        let broadcaster = BroadcasterState::new(Duration::from_secs(5));
        assert_eq!(broadcaster.next_tick(), 1);
        assert_eq!(broadcaster.next_tick(), 2);
        assert_eq!(broadcaster.ticks(), 2);
    }

    #[test]
    fn test_stats_record_success_resets_failures() {
        let mut stats = BroadcasterStats::default();
        assert_eq!(stats.record_failure("timeout"), 1);
        assert_eq!(stats.record_failure("timeout"), 2);
        stats.record_success();

        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 2);
        assert_eq!(stats.consecutive_failures, 0);
        assert!(stats.last_poll_at.is_some());
        assert_eq!(stats.last_error.as_deref(), Some("timeout"));
    }

    #[test]
    fn test_stats_serialization() {
        let mut stats = BroadcasterStats::default();
        stats.record_failure("Serial port error: device unplugged");

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["failure_count"], 1);
        assert!(json["last_poll_at"].is_null());
        assert!(json["last_error_at"].is_string());
        assert_eq!(json["last_error"], "Serial port error: device unplugged");
    }
}
