//! Control panel backend for serial data loggers.
//!
//! This crate provides a service that:
//! - Polls the data logger for its status on a fixed interval
//! - Keeps the last-known panel state (ports, baud rates, connection, status)
//! - Pushes heartbeat and status events to every WebSocket subscriber
//! - Exposes HTTP actions to scan, connect, disconnect, browse and download
//!
//! Every hardware call is serialized through one [`hardware::HardwareHandle`],
//! so the status poll and the request handlers never reach the driver at the
//! same time. The status broadcaster is started by the first subscriber and
//! at most one runs per process.
//!
//! # Endpoints
//!
//! - `GET /api/health` - Service health check
//! - `GET /api/status` - Broadcaster and subscriber status
//! - `GET /api/gui` - Current panel state
//! - `POST /serial_scan` - Rescan serial ports
//! - `POST /browse_folder` - Choose the download folder
//! - `POST /serial_connect` - Open a port (`comm_port`, `baud_rate` form fields)
//! - `POST /serial_disconnect` - Close the port
//! - `POST /download` - Start a bulk download
//! - `WS /ws` - Event stream (`status_report`, `gui_status`, `dl_status`)
//!
//! # Configuration
//!
//! The service reads configuration from `~/.config/datalogger/server.toml`:
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:5000"
//! subscriber_buffer = 64
//!
//! [broadcaster]
//! interval_secs = 5
//!
//! [hardware]
//! driver = "serial"   # or "mock"
//! download_dir = "~/datalogger"
//! read_timeout_ms = 500
//! idle_timeout_secs = 3
//! ```

pub mod api;
pub mod broadcaster;
pub mod config;
pub mod events;
pub mod form;
pub mod gate;
pub mod gui;
pub mod hardware;
pub mod state;
pub mod subscribers;
pub mod ws;

pub use broadcaster::{Broadcaster, BroadcasterHandle};
pub use config::{BroadcasterConfig, Config, ConfigError, DriverKind, HardwareConfig, ServerConfig};
pub use events::{ServerEvent, StatusReport};
pub use gui::{ConnectionState, GuiSnapshot, GuiStateStore};
pub use hardware::{HardwareError, HardwareHandle};
pub use state::{AppState, BroadcasterStats};
pub use subscribers::{SubscriberId, SubscriberRegistry};

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the full application router: API, WebSocket, tracing and CORS.
pub fn app(state: std::sync::Arc<AppState>) -> Router {
    Router::new()
        .merge(api::router())
        .merge(ws::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
