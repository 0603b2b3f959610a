//! Single-flight access to the hardware driver.
//!
//! The status broadcaster and the request handlers share one driver, and
//! the driver is not reentrant. [`HardwareHandle`] runs every call on the
//! blocking thread pool while holding one async mutex, so at most one
//! driver call executes at a time and no async worker blocks on serial I/O.
//!
//! The mutex guard moves into the blocking closure: if the awaiting
//! caller is dropped mid-call, the lock is still held until the driver
//! call itself returns.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use datalogger_core::{DataLogger, HardwareStatus, SharedLogger};

/// Errors from a guarded hardware call.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The driver reported an error.
    #[error(transparent)]
    Driver(#[from] datalogger_core::Error),
    /// The blocking task running the call panicked or was cancelled.
    #[error("Hardware task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Shared, serialized handle to the hardware driver.
pub struct HardwareHandle {
    logger: SharedLogger,
    gate: Arc<Mutex<()>>,
}

impl std::fmt::Debug for HardwareHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareHandle")
            .field("busy", &self.gate.try_lock().is_err())
            .finish()
    }
}

impl HardwareHandle {
    /// Wrap a driver.
    pub fn new(logger: SharedLogger) -> Self {
        Self {
            logger,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Run `op` against the driver, one call at a time.
    pub async fn call<T, F>(&self, op: F) -> Result<T, HardwareError>
    where
        F: FnOnce(&dyn DataLogger) -> datalogger_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let guard = Arc::clone(&self.gate).lock_owned().await;
        let logger = Arc::clone(&self.logger);
        let result = tokio::task::spawn_blocking(move || {
            let _guard = guard;
            op(logger.as_ref())
        })
        .await?;
        Ok(result?)
    }

    pub async fn list_ports(&self) -> Result<Vec<String>, HardwareError> {
        self.call(|hw| hw.list_ports()).await
    }

    pub async fn list_baud_rates(&self) -> Result<Vec<u32>, HardwareError> {
        self.call(|hw| Ok(hw.list_baud_rates())).await
    }

    pub async fn status(&self) -> Result<HardwareStatus, HardwareError> {
        self.call(|hw| hw.status()).await
    }

    pub async fn connect(
        &self,
        port: String,
        baud_rate: u32,
    ) -> Result<HardwareStatus, HardwareError> {
        self.call(move |hw| hw.connect(&port, baud_rate)).await
    }

    pub async fn disconnect(&self) -> Result<(), HardwareError> {
        self.call(|hw| hw.disconnect()).await
    }

    pub async fn browse_folder(&self) -> Result<PathBuf, HardwareError> {
        self.call(|hw| hw.browse_folder()).await
    }

    pub async fn start_download(&self) -> Result<(), HardwareError> {
        self.call(|hw| hw.start_download()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use datalogger_core::MockLogger;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_calls_never_overlap() {
        let mock = Arc::new(MockLogger::new().with_latency(Duration::from_millis(20)));
        let handle = Arc::new(HardwareHandle::new(mock.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let handle = Arc::clone(&handle);
                tokio::spawn(async move {
                    if i % 2 == 0 {
                        handle.status().await.map(|_| ())
                    } else {
                        handle.list_ports().await.map(|_| ())
                    }
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(mock.total_calls(), 8);
        assert_eq!(mock.max_concurrent_calls(), 1);
    }

    #[tokio::test]
    async fn test_driver_errors_are_propagated() {
        let mock = Arc::new(MockLogger::new());
        mock.set_should_fail(true, Some("unplugged"));
        let handle = HardwareHandle::new(mock);

        let err = handle.status().await.unwrap_err();
        assert!(matches!(err, HardwareError::Driver(_)));
        assert_eq!(err.to_string(), "Hardware error: unplugged");
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_through_handle() {
        let mock = Arc::new(MockLogger::new());
        let handle = HardwareHandle::new(mock.clone());

        let status = handle.connect("COM3".to_string(), 9600).await.unwrap();
        assert!(status.connected);
        assert!(mock.is_connected());

        handle.disconnect().await.unwrap();
        assert!(!mock.is_connected());
    }

    #[tokio::test]
    async fn test_panicking_call_reports_task_error() {
        let handle = HardwareHandle::new(Arc::new(MockLogger::new()));

        let err = handle
            .call(|_| -> datalogger_core::Result<()> { panic!("driver bug") })
            .await
            .unwrap_err();
        assert!(matches!(err, HardwareError::Task(_)));

        // The gate is released after the panic.
        assert!(handle.status().await.is_ok());
    }
}
