//! Core types for data logger status.

use core::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Baud rates offered to the user when no driver-specific list exists.
pub const STANDARD_BAUD_RATES: [u32; 10] = [
    2400, 4800, 9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600,
];

/// Progress of a bulk download.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new states
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum DownloadState {
    /// No download has been started.
    #[default]
    Idle,
    /// Bytes are being captured from the device.
    Downloading,
    /// The last download finished.
    Complete,
    /// The last download stopped with an error.
    Failed,
}

impl DownloadState {
    /// Whether a download is currently running.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadState::Downloading)
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadState::Idle => write!(f, "Idle"),
            DownloadState::Downloading => write!(f, "Downloading"),
            DownloadState::Complete => write!(f, "Complete"),
            DownloadState::Failed => write!(f, "Failed"),
        }
    }
}

/// Status document reported by a data logger driver.
///
/// This is what the status poll returns and what gets pushed to clients
/// as part of every GUI snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareStatus {
    /// Whether a serial port is currently open.
    pub connected: bool,
    /// Name of the open port.
    pub port: Option<String>,
    /// Baud rate of the open port.
    pub baud_rate: Option<u32>,
    /// Folder downloads are written to.
    pub download_folder: Option<PathBuf>,
    /// Current download state.
    pub download: DownloadState,
    /// Bytes captured by the current or last download.
    pub bytes_downloaded: u64,
    /// File written by the current or last download.
    pub last_file: Option<PathBuf>,
    /// Human readable detail, e.g. the reason a download failed.
    pub message: Option<String>,
}

impl HardwareStatus {
    /// Status of a driver with no open port.
    #[must_use]
    pub fn disconnected() -> Self {
        Self::default()
    }

    /// Status of a driver connected to `port` at `baud_rate`.
    #[must_use]
    pub fn connected(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            connected: true,
            port: Some(port.into()),
            baud_rate: Some(baud_rate),
            ..Self::default()
        }
    }
}

impl fmt::Display for HardwareStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.port, self.baud_rate) {
            (Some(port), Some(baud)) if self.connected => {
                write!(f, "Connected to {} @ {} baud", port, baud)?
            }
            _ => write!(f, "Disconnected")?,
        }
        write!(f, ", download {}", self.download)?;
        if self.bytes_downloaded > 0 {
            write!(f, " ({} bytes)", self.bytes_downloaded)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_status_is_disconnected_and_idle() {
        let status = HardwareStatus::default();
        assert!(!status.connected);
        assert_eq!(status.download, DownloadState::Idle);
        assert_eq!(status, HardwareStatus::disconnected());
    }

    #[test]
    fn test_connected_status() {
        let status = HardwareStatus::connected("COM3", 9600);
        assert!(status.connected);
        assert_eq!(status.port.as_deref(), Some("COM3"));
        assert_eq!(status.baud_rate, Some(9600));
    }

    #[test]
    fn test_status_display() {
        let mut status = HardwareStatus::connected("/dev/ttyUSB0", 115200);
        assert_eq!(
            status.to_string(),
            "Connected to /dev/ttyUSB0 @ 115200 baud, download Idle"
        );

        status.download = DownloadState::Downloading;
        status.bytes_downloaded = 512;
        assert!(status.to_string().ends_with("download Downloading (512 bytes)"));

        assert_eq!(
            HardwareStatus::disconnected().to_string(),
            "Disconnected, download Idle"
        );
    }

    #[test]
    fn test_download_state_serializes_snake_case() {
        let json = serde_json::to_string(&DownloadState::Downloading).unwrap();
        assert_eq!(json, "\"downloading\"");
        assert!(DownloadState::Downloading.is_active());
        assert!(!DownloadState::Complete.is_active());
    }

    #[test]
    fn test_status_serialization() {
        let status = HardwareStatus::connected("COM3", 9600);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["connected"], true);
        assert_eq!(json["port"], "COM3");
        assert_eq!(json["baud_rate"], 9600);
        assert_eq!(json["download"], "idle");
        assert!(json["last_file"].is_null());
    }

    #[test]
    fn test_standard_baud_rates_are_sorted() {
        assert!(STANDARD_BAUD_RATES.windows(2).all(|w| w[0] < w[1]));
        assert!(STANDARD_BAUD_RATES.contains(&9600));
    }
}
