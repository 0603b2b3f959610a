//! Serial port driver for data loggers.
//!
//! [`SerialLogger`] opens the device's serial port with the `serialport`
//! crate and captures bulk downloads to disk on a background thread. The
//! bytes are stored as received; interpreting the download format is left
//! to downstream tools.

use std::fs::File;
use std::io::{BufWriter, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serialport::SerialPort;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::traits::DataLogger;
use crate::types::{DownloadState, HardwareStatus, STANDARD_BAUD_RATES};

/// Size of a single read from the port during a download.
const READ_CHUNK: usize = 4096;

/// Options for [`SerialLogger`].
#[derive(Debug, Clone)]
pub struct SerialOptions {
    /// Read timeout applied to the open port.
    pub read_timeout: Duration,
    /// A download finishes once no byte arrived for this long.
    pub idle_timeout: Duration,
    /// Initial download folder.
    pub download_dir: PathBuf,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(500),
            idle_timeout: Duration::from_secs(3),
            download_dir: std::env::temp_dir(),
        }
    }
}

#[derive(Debug, Default)]
struct DownloadProgress {
    state: DownloadState,
    bytes: u64,
    file: Option<PathBuf>,
    message: Option<String>,
}

struct Connection {
    port: Box<dyn SerialPort>,
    name: String,
    baud_rate: u32,
}

struct Inner {
    connection: Option<Connection>,
    folder: PathBuf,
    /// Stop flag of the running download thread, if any.
    download_stop: Option<Arc<AtomicBool>>,
}

/// Data logger attached to a local serial port.
pub struct SerialLogger {
    options: SerialOptions,
    inner: Mutex<Inner>,
    progress: Arc<Mutex<DownloadProgress>>,
}

impl std::fmt::Debug for SerialLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.lock_inner();
        f.debug_struct("SerialLogger")
            .field("port", &inner.connection.as_ref().map(|c| c.name.as_str()))
            .field("folder", &inner.folder)
            .finish()
    }
}

impl SerialLogger {
    /// Create a driver with no open port.
    pub fn new(options: SerialOptions) -> Self {
        let folder = options.download_dir.clone();
        Self {
            options,
            inner: Mutex::new(Inner {
                connection: None,
                folder,
                download_stop: None,
            }),
            progress: Arc::new(Mutex::new(DownloadProgress::default())),
        }
    }

    fn lock_inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stop_download(inner: &mut Inner) {
        if let Some(stop) = inner.download_stop.take() {
            stop.store(true, Ordering::SeqCst);
        }
    }

    #[cfg(feature = "dialog")]
    fn pick_folder(current: &Path) -> Result<PathBuf> {
        rfd::FileDialog::new()
            .set_title("Select download folder")
            .set_directory(current)
            .pick_folder()
            .ok_or(Error::Cancelled)
    }

    #[cfg(not(feature = "dialog"))]
    fn pick_folder(current: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(current)?;
        Ok(current.to_path_buf())
    }
}

impl DataLogger for SerialLogger {
    fn list_ports(&self) -> Result<Vec<String>> {
        let mut ports: Vec<String> = serialport::available_ports()?
            .into_iter()
            .map(|p| p.port_name)
            .collect();
        ports.sort();
        ports.dedup();
        debug!("Found {} serial port(s)", ports.len());
        Ok(ports)
    }

    fn list_baud_rates(&self) -> Vec<u32> {
        STANDARD_BAUD_RATES.to_vec()
    }

    fn status(&self) -> Result<HardwareStatus> {
        let inner = self.lock_inner();
        let progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);

        Ok(HardwareStatus {
            connected: inner.connection.is_some(),
            port: inner.connection.as_ref().map(|c| c.name.clone()),
            baud_rate: inner.connection.as_ref().map(|c| c.baud_rate),
            download_folder: Some(inner.folder.clone()),
            download: progress.state,
            bytes_downloaded: progress.bytes,
            last_file: progress.file.clone(),
            message: progress.message.clone(),
        })
    }

    fn connect(&self, port: &str, baud_rate: u32) -> Result<HardwareStatus> {
        {
            let mut inner = self.lock_inner();
            if let Some(previous) = inner.connection.take() {
                info!("Closing {} before connecting to {}", previous.name, port);
                Self::stop_download(&mut inner);
            }

            let opened = serialport::new(port, baud_rate)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(self.options.read_timeout)
                .open()
                .map_err(|e| match e.kind() {
                    serialport::ErrorKind::NoDevice => Error::PortNotFound(port.to_string()),
                    _ => Error::Serial(e),
                })?;

            info!("Opened {} at {} baud", port, baud_rate);
            inner.connection = Some(Connection {
                port: opened,
                name: port.to_string(),
                baud_rate,
            });
        }
        self.status()
    }

    fn disconnect(&self) -> Result<()> {
        let mut inner = self.lock_inner();
        Self::stop_download(&mut inner);
        if let Some(connection) = inner.connection.take() {
            info!("Closed {}", connection.name);
        }
        Ok(())
    }

    fn browse_folder(&self) -> Result<PathBuf> {
        let current = self.lock_inner().folder.clone();
        let folder = Self::pick_folder(&current)?;
        info!("Download folder set to {:?}", folder);
        self.lock_inner().folder = folder.clone();
        Ok(folder)
    }

    fn start_download(&self) -> Result<()> {
        let mut guard = self.lock_inner();
        let inner = &mut *guard;
        let connection = inner.connection.as_ref().ok_or(Error::NotConnected)?;

        let mut progress = self.progress.lock().unwrap_or_else(PoisonError::into_inner);
        if progress.state.is_active() {
            return Err(Error::DownloadInProgress);
        }

        let port = connection.port.try_clone()?;
        std::fs::create_dir_all(&inner.folder)?;
        let path = inner.folder.join(format!(
            "datalogger-{}.bin",
            OffsetDateTime::now_utc().unix_timestamp()
        ));
        let file = File::create(&path)?;

        let stop = Arc::new(AtomicBool::new(false));
        let shared = Arc::clone(&self.progress);
        let thread_stop = Arc::clone(&stop);
        let idle_timeout = self.options.idle_timeout;
        info!("Starting download from {} into {:?}", connection.name, path);
        let spawned = std::thread::Builder::new()
            .name("datalogger-download".to_string())
            .spawn(move || capture(port, file, &shared, &thread_stop, idle_timeout))
            .map(drop);

        // The capture thread blocks on `progress` until the launch is recorded.
        record_launch(&mut progress, path, spawned)?;
        inner.download_stop = Some(stop);
        Ok(())
    }
}

/// Mark a download as running, or as failed when its thread did not start.
fn record_launch(
    progress: &mut DownloadProgress,
    path: PathBuf,
    spawned: std::io::Result<()>,
) -> Result<()> {
    match spawned {
        Ok(()) => {
            *progress = DownloadProgress {
                state: DownloadState::Downloading,
                bytes: 0,
                file: Some(path),
                message: None,
            };
            Ok(())
        }
        Err(e) => {
            warn!("Failed to start download thread: {}", e);
            *progress = DownloadProgress {
                state: DownloadState::Failed,
                bytes: 0,
                file: None,
                message: Some(e.to_string()),
            };
            Err(e.into())
        }
    }
}

/// Copy bytes from `port` into `file` until the line goes idle or `stop` is set.
fn capture(
    mut port: Box<dyn SerialPort>,
    file: File,
    progress: &Mutex<DownloadProgress>,
    stop: &AtomicBool,
    idle_timeout: Duration,
) {
    let mut writer = BufWriter::new(file);
    let mut buf = [0u8; READ_CHUNK];
    let mut last_data = Instant::now();

    let outcome: std::io::Result<&'static str> = loop {
        if stop.load(Ordering::SeqCst) {
            break Ok("Download stopped");
        }
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if let Err(e) = writer.write_all(&buf[..n]) {
                    break Err(e);
                }
                last_data = Instant::now();
                progress
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .bytes += n as u64;
                continue;
            }
            Err(e) if e.kind() == ErrorKind::TimedOut || e.kind() == ErrorKind::Interrupted => {}
            Err(e) => break Err(e),
        }
        if last_data.elapsed() >= idle_timeout {
            break Ok("Download complete");
        }
    };

    let outcome = outcome.and_then(|msg| writer.flush().map(|()| msg));

    let mut progress = progress.lock().unwrap_or_else(PoisonError::into_inner);
    match outcome {
        Ok(msg) => {
            info!("{} ({} bytes)", msg, progress.bytes);
            progress.state = DownloadState::Complete;
            progress.message = Some(msg.to_string());
        }
        Err(e) => {
            warn!("Download failed after {} bytes: {}", progress.bytes, e);
            progress.state = DownloadState::Failed;
            progress.message = Some(e.to_string());
        }
    }
}
