//! Trait abstraction for data logger drivers.
//!
//! This module provides the [`DataLogger`] trait that abstracts over the
//! real serial driver and the mock driver used in tests.

use std::path::PathBuf;

use crate::error::Result;
use crate::types::HardwareStatus;

/// Operations a data logger driver must provide.
///
/// All methods are synchronous and may block for a while (serial I/O,
/// native dialogs). Implementations are not required to be reentrant:
/// callers that share one driver between tasks must serialize calls
/// themselves.
///
/// # Example
///
/// ```
/// use datalogger_core::{DataLogger, MockLogger};
///
/// fn describe<D: DataLogger + ?Sized>(logger: &D) -> String {
///     match logger.status() {
///         Ok(status) => status.to_string(),
///         Err(e) => format!("unavailable: {}", e),
///     }
/// }
///
/// let logger = MockLogger::new();
/// assert_eq!(describe(&logger), "Disconnected, download Idle");
/// ```
pub trait DataLogger: Send + Sync {
    // --- Discovery ---

    /// List the names of the serial ports currently available.
    fn list_ports(&self) -> Result<Vec<String>>;

    /// List the baud rates the device supports.
    fn list_baud_rates(&self) -> Vec<u32>;

    // --- Status ---

    /// Query the current device status.
    fn status(&self) -> Result<HardwareStatus>;

    // --- Connection Management ---

    /// Open `port` at `baud_rate`.
    ///
    /// Connecting while already connected replaces the previous connection.
    fn connect(&self, port: &str, baud_rate: u32) -> Result<HardwareStatus>;

    /// Close the open port. A no-op when not connected.
    fn disconnect(&self) -> Result<()>;

    // --- Download ---

    /// Choose the folder downloads are written to and return it.
    fn browse_folder(&self) -> Result<PathBuf>;

    /// Start a bulk download in the background.
    ///
    /// Returns once the download has started; progress is reported
    /// through [`DataLogger::status`].
    fn start_download(&self) -> Result<()>;
}
