//! HTTP endpoints for the control panel.
//!
//! Action endpoints (`/serial_scan`, `/browse_folder`, `/serial_connect`,
//! `/serial_disconnect`, `/download`) answer with `{"data": ...}`. Hardware
//! failures never turn into HTTP errors: they are reported in the `Status`
//! field of the payload. Form validation errors are reported as
//! `{"data": {"<field>": ["<message>", ...]}}` and skip the hardware entirely.
//!
//! # Lock Acquisition
//!
//! Handlers make one guarded hardware call at a time (see
//! [`crate::hardware::HardwareHandle`]) and touch the GUI state only after
//! the call returned, so no GUI lock is ever held across hardware I/O.
//!
//! # Example
//!
//! ```ignore
//! use axum::Router;
//! use datalogger_service::api;
//!
//! let app = api::router().with_state(state);
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};

use datalogger_core::HardwareStatus;

use crate::events::ServerEvent;
use crate::form::{FieldErrors, SerialPortForm};
use crate::gui::{ConnectionState, GuiSnapshot};
use crate::state::{AppState, BroadcasterStats};
use crate::subscribers::SubscriberInfo;

/// Debug text and heartbeat text used by the scan action.
pub const SCAN_MESSAGE: &str = "Scan Serial Ports";

/// Create the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        // Health and status
        .route("/api/health", get(health))
        .route("/api/status", get(get_status))
        .route("/api/gui", get(get_gui))
        // Panel actions
        .route("/serial_scan", post(serial_scan))
        .route("/browse_folder", post(browse_folder))
        .route("/serial_connect", post(serial_connect))
        .route("/serial_disconnect", post(serial_disconnect))
        .route("/download", post(download))
}

/// Envelope for every action response.
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    fn json(data: T) -> Json<Self> {
        Json(Self { data })
    }
}

/// Either a handler result or the form's field errors.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum FormOutcome<T> {
    Done(T),
    Invalid(FieldErrors),
}

/// `Status` field of an action response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ActionStatus {
    /// Status document returned by the hardware.
    Hardware(HardwareStatus),
    /// Plain message, also used for hardware errors.
    Message(String),
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

/// Health check endpoint.
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
    })
}

/// Service status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: &'static str,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub broadcaster: BroadcasterStatus,
    pub subscriber_count: usize,
    pub subscribers: Vec<SubscriberInfo>,
}

/// Broadcaster part of [`StatusResponse`].
#[derive(Debug, Serialize)]
pub struct BroadcasterStatus {
    pub running: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    pub uptime_seconds: Option<u64>,
    pub interval_secs: u64,
    pub ticks: u64,
    pub stats: BroadcasterStats,
}

/// Get broadcaster and subscriber status.
async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let started_at = state.broadcaster.handle().map(|h| h.started_at());
    let uptime_seconds = started_at.map(|s| {
        let now = OffsetDateTime::now_utc();
        (now - s).whole_seconds().max(0) as u64
    });
    let stats = state.broadcaster.stats.read().await.clone();
    let subscribers = state.subscribers.list();

    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION"),
        timestamp: OffsetDateTime::now_utc(),
        broadcaster: BroadcasterStatus {
            running: state.broadcaster.is_running(),
            started_at,
            uptime_seconds,
            interval_secs: state.broadcaster.interval().as_secs(),
            ticks: state.broadcaster.ticks(),
            stats,
        },
        subscriber_count: subscribers.len(),
        subscribers,
    })
}

/// Current GUI snapshot.
async fn get_gui(State(state): State<Arc<AppState>>) -> Json<GuiSnapshot> {
    Json(state.gui.snapshot())
}

/// Rescan the serial ports.
async fn serial_scan(State(state): State<Arc<AppState>>) -> Json<DataResponse<GuiSnapshot>> {
    info!("Scanning serial ports");

    state.subscribers.broadcast(ServerEvent::status_report(
        SCAN_MESSAGE,
        state.broadcaster.ticks(),
    ));
    state.gui.set_debug_message(SCAN_MESSAGE);

    match state.hardware.list_ports().await {
        Ok(ports) => state.gui.set_port_list(ports),
        Err(e) => {
            warn!("Serial port scan failed: {}", e);
            state.gui.set_debug_message(format!("{}: {}", SCAN_MESSAGE, e));
        }
    }

    DataResponse::json(state.gui.snapshot())
}

/// Response of the browse action.
#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub folder_path: Option<PathBuf>,
    #[serde(rename = "Status", skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

/// Pick the download folder and push the new hardware status.
async fn browse_folder(State(state): State<Arc<AppState>>) -> Json<DataResponse<BrowseResponse>> {
    info!("Browsing for download folder");

    let folder = match state.hardware.browse_folder().await {
        Ok(folder) => folder,
        Err(e) => {
            warn!("Folder selection failed: {}", e);
            return DataResponse::json(BrowseResponse {
                folder_path: None,
                status: Some(e.to_string()),
            });
        }
    };

    match state.hardware.status().await {
        Ok(status) => {
            state.gui.set_hardware_status(status.clone());
            state.subscribers.broadcast(ServerEvent::DlStatus(status));
        }
        Err(e) => warn!("Failed to read status after folder selection: {}", e),
    }

    info!("Download folder set to {}", folder.display());
    DataResponse::json(BrowseResponse {
        folder_path: Some(folder),
        status: None,
    })
}

/// Response of the connect and disconnect actions.
#[derive(Debug, Serialize)]
pub struct SerialResponse {
    pub comm_port: String,
    pub baud_rate: String,
    #[serde(rename = "Status")]
    pub status: ActionStatus,
}

/// Open the serial port named in the form.
async fn serial_connect(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SerialPortForm>,
) -> Json<DataResponse<FormOutcome<SerialResponse>>> {
    let settings = match form.validate() {
        Ok(settings) => settings,
        Err(errors) => {
            info!("Rejected serial connect request: {:?}", errors);
            return DataResponse::json(FormOutcome::Invalid(errors));
        }
    };

    info!("Connecting to {} @ {} baud", settings.port, settings.baud_rate);
    let status = match state
        .hardware
        .connect(settings.port.clone(), settings.baud_rate)
        .await
    {
        Ok(status) => {
            state.gui.set_connection_state(ConnectionState::Connected);
            ActionStatus::Hardware(status)
        }
        Err(e) => {
            warn!("Failed to connect to {}: {}", settings.port, e);
            resync_connection_state(&state).await;
            ActionStatus::Message(e.to_string())
        }
    };

    DataResponse::json(FormOutcome::Done(SerialResponse {
        comm_port: settings.port,
        baud_rate: settings.baud_rate.to_string(),
        status,
    }))
}

/// Align the GUI with the driver after a failed connect.
///
/// A driver may close its previous port before opening the new one, so a
/// failed reconnect can leave it disconnected.
async fn resync_connection_state(state: &AppState) {
    match state.hardware.status().await {
        Ok(status) => {
            let connection = if status.connected {
                ConnectionState::Connected
            } else {
                ConnectionState::Disconnected
            };
            state.gui.set_hardware_status(status);
            state.gui.set_connection_state(connection);
        }
        Err(e) => warn!("Failed to read status after connect error: {}", e),
    }
}

/// Close the serial port.
async fn serial_disconnect(
    State(state): State<Arc<AppState>>,
    Form(form): Form<SerialPortForm>,
) -> Json<DataResponse<FormOutcome<SerialResponse>>> {
    let settings = match form.validate() {
        Ok(settings) => settings,
        Err(errors) => {
            info!("Rejected serial disconnect request: {:?}", errors);
            return DataResponse::json(FormOutcome::Invalid(errors));
        }
    };

    info!("Disconnecting from {}", settings.port);
    let status = match state.hardware.disconnect().await {
        Ok(()) => {
            state.gui.set_connection_state(ConnectionState::Disconnected);
            "Disconnect".to_string()
        }
        Err(e) => {
            warn!("Failed to disconnect: {}", e);
            e.to_string()
        }
    };

    DataResponse::json(FormOutcome::Done(SerialResponse {
        comm_port: settings.port,
        baud_rate: settings.baud_rate.to_string(),
        status: ActionStatus::Message(status),
    }))
}

/// Response of the download action.
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    #[serde(rename = "Status")]
    pub status: String,
}

/// Start a bulk download from the device.
async fn download(State(state): State<Arc<AppState>>) -> Json<DataResponse<DownloadResponse>> {
    info!("Starting download");

    let status = match state.hardware.start_download().await {
        Ok(()) => "Downloading".to_string(),
        Err(e) => {
            warn!("Failed to start download: {}", e);
            e.to_string()
        }
    };

    DataResponse::json(DownloadResponse { status })
}
