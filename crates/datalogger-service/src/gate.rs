//! Connection gate: runs on every push-channel subscriber connect and disconnect.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{info, warn};

use crate::broadcaster::Broadcaster;
use crate::events::ServerEvent;
use crate::state::AppState;
use crate::subscribers::{EventReceiver, SubscriberId};

/// Acknowledgement text sent to a new subscriber.
pub const CONNECTED_MESSAGE: &str = "Connected";

/// Admit a new subscriber.
///
/// Refreshes the port and baud lists, makes sure the status broadcaster is
/// running and registers the subscriber with a `status_report` acknowledgement
/// (count 0) as its first queued event. Other subscribers do not see the
/// acknowledgement.
pub async fn connect(
    state: &Arc<AppState>,
    peer: Option<SocketAddr>,
) -> (SubscriberId, EventReceiver) {
    refresh_lists(state).await;

    Broadcaster::new(Arc::clone(state)).start();

    let (id, rx) = state.subscribers.register_with(
        peer,
        ServerEvent::status_report(CONNECTED_MESSAGE, 0),
    );
    info!(
        "Subscriber {} connected from {} ({} active)",
        id,
        peer.map_or_else(|| "unknown".to_string(), |p| p.to_string()),
        state.subscribers.len()
    );
    (id, rx)
}

/// Remove a departing subscriber. The broadcaster keeps running.
pub fn disconnect(state: &AppState, id: &SubscriberId) {
    match state.subscribers.unregister(id) {
        Some(info) => info!(
            "Subscriber {} disconnected (peer: {:?}, connected since {})",
            id, info.peer, info.connected_at
        ),
        // Already removed by a broadcast that found its queue closed.
        None => info!("Subscriber {} disconnected", id),
    }
}

/// Re-read the port and baud lists into the GUI state.
///
/// A failed port scan keeps the previous list.
async fn refresh_lists(state: &AppState) {
    match state.hardware.list_ports().await {
        Ok(ports) => state.gui.set_port_list(ports),
        Err(e) => warn!("Failed to refresh serial port list: {}", e),
    }
    match state.hardware.list_baud_rates().await {
        Ok(rates) => state.gui.set_baud_list(rates),
        Err(e) => warn!("Failed to refresh baud rate list: {}", e),
    }
}
