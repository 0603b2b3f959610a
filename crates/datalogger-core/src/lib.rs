//! Hardware driver abstraction for serial data-logging devices.
//!
//! This crate provides the operations a control panel needs from a data
//! logger: serial port discovery, connect/disconnect, status queries and
//! bulk downloads.
//!
//! # Drivers
//!
//! | Driver | Use |
//! |--------|-----|
//! | [`SerialLogger`] | Device attached to a local serial port |
//! | [`MockLogger`] | Tests and demos, with failure and latency injection |
//!
//! Both implement [`DataLogger`]. The trait is synchronous: serial I/O
//! blocks, so async callers should run calls on a blocking thread and
//! serialize access to a shared driver.
//!
//! # Quick Start
//!
//! ```no_run
//! use datalogger_core::{DataLogger, SerialLogger, SerialOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let logger = SerialLogger::new(SerialOptions::default());
//!
//!     let ports = logger.list_ports()?;
//!     println!("Found {} ports", ports.len());
//!
//!     if let Some(port) = ports.first() {
//!         let status = logger.connect(port, 115200)?;
//!         println!("{}", status);
//!         logger.start_download()?;
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod mock;
pub mod serial;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use mock::MockLogger;
pub use serial::{SerialLogger, SerialOptions};
pub use traits::DataLogger;
pub use types::{DownloadState, HardwareStatus, STANDARD_BAUD_RATES};

/// Type alias for a driver shared between tasks.
pub type SharedLogger = std::sync::Arc<dyn DataLogger>;
