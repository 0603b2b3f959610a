//! Events pushed to subscribers over the WebSocket channel.
//!
//! Every event is sent as one text frame of the form
//! `{"event": "<name>", "data": <payload>}`.

use serde::{Deserialize, Serialize};

use datalogger_core::HardwareStatus;

use crate::gui::GuiSnapshot;

/// Heartbeat payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    /// Short description of why the heartbeat was sent.
    pub data: String,
    /// Broadcaster tick counter (0 for the connect acknowledgement).
    pub count: u64,
}

impl StatusReport {
    pub fn new(data: impl Into<String>, count: u64) -> Self {
        Self {
            data: data.into(),
            count,
        }
    }
}

/// Server-to-client events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Heartbeat, sent every tick and once on connect.
    StatusReport(StatusReport),
    /// Full GUI snapshot, sent every tick.
    GuiStatus(GuiSnapshot),
    /// Hardware status, sent after a folder was chosen.
    DlStatus(HardwareStatus),
}

impl ServerEvent {
    /// Event name as seen by clients.
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::StatusReport(_) => "status_report",
            ServerEvent::GuiStatus(_) => "gui_status",
            ServerEvent::DlStatus(_) => "dl_status",
        }
    }

    /// Heartbeat event.
    pub fn status_report(data: impl Into<String>, count: u64) -> Self {
        ServerEvent::StatusReport(StatusReport::new(data, count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_wire_format() {
        let event = ServerEvent::status_report("Connected", 0);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"event": "status_report", "data": {"data": "Connected", "count": 0}})
        );
    }

    #[test]
    fn test_gui_status_wire_format() {
        let event = ServerEvent::GuiStatus(GuiSnapshot::default());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "gui_status");
        assert!(json["data"]["port_list"].is_array());
        assert_eq!(json["data"]["connection_state"], "disconnected");
    }

    #[test]
    fn test_dl_status_round_trip() {
        let event = ServerEvent::DlStatus(HardwareStatus::connected("COM3", 9600));
        let text = serde_json::to_string(&event).unwrap();
        let parsed: ServerEvent = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, event);
        assert_eq!(parsed.name(), "dl_status");
    }
}
