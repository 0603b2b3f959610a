//! Mock data logger implementation for testing.
//!
//! This module provides a mock driver that can be used for unit testing
//! without a device attached to a serial port.
//!
//! The [`MockLogger`] implements the [`DataLogger`] trait, allowing it to be
//! used interchangeably with [`SerialLogger`](crate::SerialLogger) in generic code.
//!
//! # Features
//!
//! - **Failure injection**: Fail every call, or only the next N status polls
//! - **Latency simulation**: Add artificial delays to every call
//! - **Call accounting**: Count calls and track how many ran concurrently

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::traits::DataLogger;
use crate::types::{DownloadState, HardwareStatus, STANDARD_BAUD_RATES};

/// A mock data logger for testing.
///
/// # Example
///
/// ```
/// use datalogger_core::{DataLogger, MockLogger};
///
/// let logger = MockLogger::new().with_ports(["COM3", "COM4"]);
/// assert_eq!(logger.list_ports().unwrap(), vec!["COM3", "COM4"]);
///
/// let status = logger.connect("COM3", 9600).unwrap();
/// assert!(status.connected);
/// assert_eq!(logger.total_calls(), 2);
/// ```
pub struct MockLogger {
    ports: RwLock<Vec<String>>,
    baud_rates: RwLock<Vec<u32>>,
    status: RwLock<HardwareStatus>,
    folder: RwLock<PathBuf>,
    should_fail: AtomicBool,
    fail_message: RwLock<String>,
    /// Number of status polls that still have to fail.
    failing_polls: AtomicU32,
    /// Simulated latency for every call in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    total_calls: AtomicU32,
    status_calls: AtomicU32,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
}

impl std::fmt::Debug for MockLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockLogger")
            .field("connected", &self.read_status().connected)
            .field("total_calls", &self.total_calls())
            .field("status_calls", &self.status_calls())
            .finish()
    }
}

impl Default for MockLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLogger {
    /// Create a new mock logger with two ports and the standard baud rates.
    pub fn new() -> Self {
        Self {
            ports: RwLock::new(vec!["COM1".to_string(), "COM3".to_string()]),
            baud_rates: RwLock::new(STANDARD_BAUD_RATES.to_vec()),
            status: RwLock::new(HardwareStatus::disconnected()),
            folder: RwLock::new(std::env::temp_dir()),
            should_fail: AtomicBool::new(false),
            fail_message: RwLock::new("Mock failure".to_string()),
            failing_polls: AtomicU32::new(0),
            latency_ms: AtomicU64::new(0),
            total_calls: AtomicU32::new(0),
            status_calls: AtomicU32::new(0),
            in_flight: AtomicU32::new(0),
            max_in_flight: AtomicU32::new(0),
        }
    }

    /// Replace the reported port list.
    pub fn with_ports<I, S>(self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_ports(ports);
        self
    }

    /// Set the simulated latency for every call.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.set_latency(latency);
        self
    }

    /// Replace the reported port list.
    pub fn set_ports<I, S>(&self, ports: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.ports.write().unwrap_or_else(PoisonError::into_inner) =
            ports.into_iter().map(Into::into).collect();
    }

    /// Replace the reported baud rate list.
    pub fn set_baud_rates(&self, rates: Vec<u32>) {
        *self.baud_rates.write().unwrap_or_else(PoisonError::into_inner) = rates;
    }

    /// Set the simulated latency for every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Make every call fail (or succeed again).
    pub fn set_should_fail(&self, fail: bool, message: Option<&str>) {
        self.should_fail.store(fail, Ordering::Relaxed);
        if let Some(msg) = message {
            *self.fail_message.write().unwrap_or_else(PoisonError::into_inner) = msg.to_string();
        }
    }

    /// Make the next `count` status polls fail.
    pub fn fail_next_status(&self, count: u32) {
        self.failing_polls.store(count, Ordering::Relaxed);
    }

    /// Total number of driver calls, of any kind.
    pub fn total_calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Number of status polls, failed ones included.
    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were executing at the same time.
    pub fn max_concurrent_calls(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Whether the mock currently reports an open port.
    pub fn is_connected(&self) -> bool {
        self.read_status().connected
    }

    /// Mark the simulated download as finished.
    pub fn finish_download(&self, bytes: u64) {
        let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
        status.download = DownloadState::Complete;
        status.bytes_downloaded = bytes;
    }

    fn read_status(&self) -> HardwareStatus {
        self.status
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `op` with call accounting and latency applied.
    fn account<T>(&self, op: impl FnOnce() -> T) -> T {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            std::thread::sleep(Duration::from_millis(latency));
        }

        let result = op();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Like [`Self::account`], with failure injection on top.
    fn call<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        self.account(|| {
            if self.should_fail.load(Ordering::Relaxed) {
                let message = self
                    .fail_message
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                Err(Error::Hardware(message))
            } else {
                op()
            }
        })
    }
}

impl DataLogger for MockLogger {
    fn list_ports(&self) -> Result<Vec<String>> {
        self.call(|| {
            Ok(self
                .ports
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone())
        })
    }

    // Infallible in the trait, so `set_should_fail` does not apply here.
    fn list_baud_rates(&self) -> Vec<u32> {
        self.account(|| {
            self.baud_rates
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    fn status(&self) -> Result<HardwareStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        self.call(|| {
            let remaining = self.failing_polls.load(Ordering::Relaxed);
            if remaining > 0 {
                self.failing_polls.store(remaining - 1, Ordering::Relaxed);
                return Err(Error::Hardware("Injected status failure".to_string()));
            }
            Ok(self.read_status())
        })
    }

    fn connect(&self, port: &str, baud_rate: u32) -> Result<HardwareStatus> {
        self.call(|| {
            let known = self
                .ports
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .any(|p| p == port);
            if !known {
                return Err(Error::PortNotFound(port.to_string()));
            }

            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            status.connected = true;
            status.port = Some(port.to_string());
            status.baud_rate = Some(baud_rate);
            Ok(status.clone())
        })
    }

    fn disconnect(&self) -> Result<()> {
        self.call(|| {
            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            status.connected = false;
            status.port = None;
            status.baud_rate = None;
            Ok(())
        })
    }

    fn browse_folder(&self) -> Result<PathBuf> {
        self.call(|| {
            let folder = self
                .folder
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            self.status
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .download_folder = Some(folder.clone());
            Ok(folder)
        })
    }

    fn start_download(&self) -> Result<()> {
        self.call(|| {
            let mut status = self.status.write().unwrap_or_else(PoisonError::into_inner);
            if !status.connected {
                return Err(Error::NotConnected);
            }
            if status.download.is_active() {
                return Err(Error::DownloadInProgress);
            }
            status.download = DownloadState::Downloading;
            status.bytes_downloaded = 0;
            Ok(())
        })
    }
}
