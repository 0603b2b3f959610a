//! Error types for datalogger-core.
//!
//! # Error Recovery
//!
//! | Error Type | Strategy |
//! |------------|----------|
//! | [`Error::NotConnected`] | Connect first, then retry |
//! | [`Error::PortNotFound`] | Rescan ports; do not retry blindly |
//! | [`Error::Serial`] | Often transient (device unplugged); reconnect |
//! | [`Error::Io`] | May be transient |
//! | [`Error::DownloadInProgress`] | Wait for the running download |
//! | [`Error::Cancelled`] | User dismissed the action; nothing to do |
//! | [`Error::Hardware`] | Driver-specific; report to the user |
//!
//! None of these errors is fatal to a long-running service. The status
//! poller in `datalogger-service` logs them and keeps polling.

use thiserror::Error;

/// Errors that can occur when talking to a data logger.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Operation requires an open serial port.
    #[error("Not connected to a serial port")]
    NotConnected,

    /// The requested port does not exist.
    #[error("Serial port not found: {0}")]
    PortNotFound(String),

    /// Error reported by the serial port layer.
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A download is already running.
    #[error("A download is already in progress")]
    DownloadInProgress,

    /// Operation was cancelled by the user.
    #[error("Operation cancelled")]
    Cancelled,

    /// Driver-specific failure.
    #[error("Hardware error: {0}")]
    Hardware(String),
}

/// Result type alias using datalogger-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::NotConnected.to_string(),
            "Not connected to a serial port"
        );
        assert_eq!(
            Error::PortNotFound("COM9".to_string()).to_string(),
            "Serial port not found: COM9"
        );
        assert_eq!(
            Error::Hardware("no response".to_string()).to_string(),
            "Hardware error: no response"
        );
    }

    #[test]
    fn test_io_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::TimedOut, "read timed out");
        let err: Error = io.into();
        assert_eq!(err.to_string(), "read timed out");
    }
}
