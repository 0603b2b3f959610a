//! GUI state store.
//!
//! [`GuiStateStore`] holds the last-known values the browser panel needs.
//! Every setter replaces exactly one field under a short-lived lock and
//! [`GuiStateStore::snapshot`] returns an owned copy, so a delivered
//! snapshot never changes after the fact and no reader observes a half
//! written field. No method performs I/O.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use datalogger_core::HardwareStatus;

/// Whether the panel considers the serial port connected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Immutable copy of the GUI state taken for a single push.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuiSnapshot {
    /// Available serial ports.
    pub port_list: Vec<String>,
    /// Supported baud rates.
    pub baud_list: Vec<u32>,
    /// Connection state as last set by a request handler.
    pub connection_state: ConnectionState,
    /// Last status document returned by the hardware.
    pub hardware_status: HardwareStatus,
    /// Last diagnostic message.
    pub debug_message: String,
}

/// Shared, mutable GUI state.
#[derive(Debug, Default)]
pub struct GuiStateStore {
    state: Mutex<GuiSnapshot>,
}

impl GuiStateStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, GuiSnapshot> {
        // Setters replace whole fields, so a poisoned lock still holds consistent data.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_port_list(&self, ports: Vec<String>) {
        self.lock().port_list = ports;
    }

    pub fn set_baud_list(&self, rates: Vec<u32>) {
        self.lock().baud_list = rates;
    }

    pub fn set_connection_state(&self, state: ConnectionState) {
        self.lock().connection_state = state;
    }

    pub fn set_hardware_status(&self, status: HardwareStatus) {
        self.lock().hardware_status = status;
    }

    pub fn set_debug_message(&self, message: impl Into<String>) {
        self.lock().debug_message = message.into();
    }

    /// Take an independent copy of every field.
    pub fn snapshot(&self) -> GuiSnapshot {
        self.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_new_store_is_empty() {
        let store = GuiStateStore::new();
        let snapshot = store.snapshot();
        assert!(snapshot.port_list.is_empty());
        assert!(snapshot.baud_list.is_empty());
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert_eq!(snapshot.debug_message, "");
    }

    #[test]
    fn test_setter_changes_only_its_field() {
        let store = GuiStateStore::new();
        store.set_port_list(vec!["COM1".to_string()]);
        store.set_baud_list(vec![9600, 115200]);

        let before = store.snapshot();
        store.set_debug_message("Scan Serial Ports");
        let after = store.snapshot();

        assert_ne!(before, after);
        assert_eq!(
            GuiSnapshot {
                debug_message: before.debug_message.clone(),
                ..after.clone()
            },
            before
        );
        assert_eq!(after.debug_message, "Scan Serial Ports");
    }

    #[test]
    fn test_snapshot_is_not_affected_by_later_mutation() {
        let store = GuiStateStore::new();
        store.set_port_list(vec!["COM1".to_string()]);

        let snapshot = store.snapshot();
        store.set_port_list(vec!["COM2".to_string(), "COM3".to_string()]);
        store.set_connection_state(ConnectionState::Connected);

        assert_eq!(snapshot.port_list, vec!["COM1"]);
        assert_eq!(snapshot.connection_state, ConnectionState::Disconnected);
        assert_eq!(store.snapshot().port_list, vec!["COM2", "COM3"]);
    }

    #[test]
    fn test_hardware_status_last_value_wins() {
        let store = GuiStateStore::new();
        store.set_hardware_status(HardwareStatus::connected("COM3", 9600));
        store.set_hardware_status(HardwareStatus::disconnected());
        assert_eq!(store.snapshot().hardware_status, HardwareStatus::disconnected());
    }

    #[test]
    fn test_concurrent_setters_and_snapshots() {
        let store = Arc::new(GuiStateStore::new());

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..500 {
                        let ports: Vec<String> = (0..i + 1).map(|p| format!("COM{}", p)).collect();
                        store.set_port_list(ports);
                        store.set_debug_message(format!("writer {} step {}", i, n));
                    }
                })
            })
            .collect();

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..500 {
                    let snapshot = store.snapshot();
                    // Every list written is a contiguous COM0..COMn prefix.
                    for (idx, port) in snapshot.port_list.iter().enumerate() {
                        assert_eq!(port, &format!("COM{}", idx));
                    }
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();
        assert!(store.snapshot().debug_message.ends_with("step 499"));
    }

    #[test]
    fn test_snapshot_serialization() {
        let store = GuiStateStore::new();
        store.set_port_list(vec!["COM3".to_string()]);
        store.set_baud_list(vec![9600]);
        store.set_connection_state(ConnectionState::Connected);

        let json = serde_json::to_value(store.snapshot()).unwrap();
        assert_eq!(json["port_list"][0], "COM3");
        assert_eq!(json["baud_list"][0], 9600);
        assert_eq!(json["connection_state"], "connected");
        assert_eq!(json["hardware_status"]["connected"], false);
        assert_eq!(json["debug_message"], "");
    }
}
