//! Background status broadcaster.
//!
//! One loop per process. Each tick it sleeps for the configured interval,
//! pushes a heartbeat, polls the hardware status, stores it in the GUI
//! state and pushes the full snapshot to every subscriber. A failed poll
//! is logged and the loop carries on with the next tick; only the
//! shutdown token ends it.

use std::sync::{Arc, Mutex, PoisonError};

use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::events::ServerEvent;
use crate::state::AppState;

/// Heartbeat text sent on every tick.
pub const TICK_MESSAGE: &str = "Server generated event";

/// Ownership token for the running broadcaster loop.
///
/// Clones refer to the same loop.
#[derive(Clone)]
pub struct BroadcasterHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    started_at: OffsetDateTime,
    task: Mutex<Option<JoinHandle<()>>>,
    /// Cancelled when the loop future is dropped, on exit or on panic.
    stopped: CancellationToken,
}

impl std::fmt::Debug for BroadcasterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcasterHandle")
            .field("started_at", &self.inner.started_at)
            .field("finished", &self.is_finished())
            .finish()
    }
}

impl BroadcasterHandle {
    fn new(task: JoinHandle<()>, stopped: CancellationToken) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                started_at: OffsetDateTime::now_utc(),
                task: Mutex::new(Some(task)),
                stopped,
            }),
        }
    }

    /// When the loop was started.
    pub fn started_at(&self) -> OffsetDateTime {
        self.inner.started_at
    }

    /// Whether the loop has exited.
    pub fn is_finished(&self) -> bool {
        self.inner.stopped.is_cancelled()
    }

    /// Whether both handles refer to the same loop.
    pub fn same_loop(&self, other: &BroadcasterHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Wait for the loop to exit.
    ///
    /// The first caller also collects the task result; later callers only
    /// wait for the exit.
    pub async fn join(&self) {
        let task = self
            .inner
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match task {
            Some(task) => {
                if let Err(e) = task.await {
                    error!("Status broadcaster task failed: {}", e);
                }
            }
            None => self.inner.stopped.cancelled().await,
        }
    }
}

/// Starts the status broadcaster.
pub struct Broadcaster {
    state: Arc<AppState>,
}

impl Broadcaster {
    /// Create a new broadcaster.
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Start the loop unless one was already started.
    ///
    /// The check and the spawn happen under the broadcaster start lock, so
    /// concurrent callers all get the handle of the same single loop.
    /// Returns immediately; the loop runs in the background.
    pub fn start(&self) -> BroadcasterHandle {
        let mut slot = self.state.broadcaster.slot();
        if let Some(handle) = slot.as_ref() {
            debug!("Status broadcaster already started");
            return handle.clone();
        }

        info!(
            "Starting status broadcaster (interval: {}s)",
            self.state.broadcaster.interval().as_secs_f64()
        );
        let stopped = CancellationToken::new();
        let task = tokio::spawn(run(Arc::clone(&self.state), stopped.clone()));
        let handle = BroadcasterHandle::new(task, stopped);
        *slot = Some(handle.clone());
        handle
    }
}

async fn run(state: Arc<AppState>, stopped: CancellationToken) {
    let _stopped = stopped.drop_guard();
    let interval = state.broadcaster.interval();
    let shutdown = state.shutdown.clone();

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        tick(&state).await;
    }

    info!(
        "Status broadcaster stopped after {} ticks",
        state.broadcaster.ticks()
    );
}

/// Run one tick and return its number.
pub(crate) async fn tick(state: &AppState) -> u64 {
    let count = state.broadcaster.next_tick();

    state
        .subscribers
        .broadcast(ServerEvent::status_report(TICK_MESSAGE, count));

    match state.hardware.status().await {
        Ok(status) => {
            state.gui.set_hardware_status(status);
            state.broadcaster.stats.write().await.record_success();

            let delivery = state
                .subscribers
                .broadcast(ServerEvent::GuiStatus(state.gui.snapshot()));
            debug!(
                "Tick {}: status pushed to {} subscriber(s)",
                count, delivery.delivered
            );
        }
        Err(e) => {
            let failures = state
                .broadcaster
                .stats
                .write()
                .await
                .record_failure(e.to_string());
            if failures <= 3 {
                warn!("Status poll failed on tick {}: {} (attempt {})", count, e, failures);
            } else if failures == 4 {
                error!(
                    "Status poll failed {} times in a row, will continue trying silently",
                    failures
                );
            }
        }
    }

    count
}
