//! Barcode scanner device.
//!
//! Two input models feed one output stream: push sources (the UI camera
//! component and Bluetooth HID scanners that type like a keyboard) hand
//! their raw line to [`ScannerDevice::ingest`], while serial COM-port
//! scanners get a background reader task. Either way, raw input is
//! normalized (prefix/suffix stripped, length-checked), tagged with a
//! detected symbology and an RFC3339 timestamp, and emitted on a channel.
//!
//! Key design goals:
//! - **Background reader**: a tokio task reads the serial port, assembles
//!   newline-terminated barcodes, and retries with backoff on read errors
//! - **One event shape**: every source produces the same [`ScanResult`]
//! - **Bounded buffers**: the line buffer clears past 512 bytes

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::error::{HardwareError, TransportKind};
use crate::link::DeviceStatus;
use crate::serial::{SerialHandle, SerialPool};
use crate::settings::{ScannerConnection, ScannerSettings};

/// Barcodes shorter or longer than this are noise, not scans.
const MIN_BARCODE_LEN: usize = 3;
const MAX_BARCODE_LEN: usize = 50;

/// Line buffer cap; a buffer past this without a newline is garbage.
const LINE_BUF_CAP: usize = 512;

const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);
const READ_ERROR_BACKOFF: Duration = Duration::from_secs(1);
const SERIAL_TIMEOUT_MS: u64 = 200;

// ---------------------------------------------------------------------------
// Scan results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BarcodeFormat {
    Ean8,
    Ean13,
    UpcA,
    Code39,
    Code128,
    Qr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSource {
    Camera,
    Bluetooth,
    Serial,
}

/// One normalized scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub barcode: String,
    pub format: BarcodeFormat,
    pub source: ScanSource,
    /// RFC3339 capture time.
    pub timestamp: String,
}

/// Strip a configured prefix/suffix and surrounding whitespace; reject
/// lines of implausible length. Shared by `ingest` and the serial reader.
pub fn normalize_barcode(raw: &str, prefix: &str, suffix: &str) -> Option<String> {
    let mut code = raw.trim();
    if !prefix.is_empty() {
        code = code.strip_prefix(prefix).unwrap_or(code);
    }
    if !suffix.is_empty() {
        code = code.strip_suffix(suffix).unwrap_or(code);
    }
    let code = code.trim();
    if (MIN_BARCODE_LEN..=MAX_BARCODE_LEN).contains(&code.len()) {
        Some(code.to_string())
    } else {
        None
    }
}

/// Classify a normalized barcode by its content.
pub fn detect_format(code: &str) -> BarcodeFormat {
    let all_digits = !code.is_empty() && code.chars().all(|c| c.is_ascii_digit());
    if all_digits {
        match code.len() {
            8 => return BarcodeFormat::Ean8,
            12 => return BarcodeFormat::UpcA,
            13 => return BarcodeFormat::Ean13,
            _ => return BarcodeFormat::Code128,
        }
    }
    if !code.is_ascii() || code.len() > 25 {
        return BarcodeFormat::Qr;
    }
    let code39_charset = |c: char| {
        c.is_ascii_uppercase() || c.is_ascii_digit() || " -.$/+%".contains(c)
    };
    if code.chars().all(code39_charset) {
        BarcodeFormat::Code39
    } else {
        BarcodeFormat::Code128
    }
}

// ---------------------------------------------------------------------------
// Device
// ---------------------------------------------------------------------------

pub struct ScannerDevice {
    settings: ScannerSettings,
    pool: Arc<SerialPool>,
    status: Mutex<DeviceStatus>,
    running: Arc<AtomicBool>,
    serial_handle: Mutex<Option<SerialHandle>>,
    events: mpsc::UnboundedSender<ScanResult>,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<ScanResult>>>,
    last_scan: Arc<Mutex<Option<ScanResult>>>,
}

impl ScannerDevice {
    pub fn new(settings: ScannerSettings, pool: Arc<SerialPool>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            settings,
            pool,
            status: Mutex::new(DeviceStatus::Disconnected),
            running: Arc::new(AtomicBool::new(false)),
            serial_handle: Mutex::new(None),
            events: tx,
            receiver: Mutex::new(Some(rx)),
            last_scan: Arc::new(Mutex::new(None)),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: DeviceStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Take the scan event stream. Yields `None` after the first call —
    /// there is one consumer.
    pub fn take_events(&self) -> Option<mpsc::UnboundedReceiver<ScanResult>> {
        self.receiver.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    pub fn last_scan(&self) -> Option<ScanResult> {
        self.last_scan
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Bring the scanner up. Push sources (camera, Bluetooth HID) have no
    /// resources of their own; serial starts the background reader.
    pub async fn initialize(&self) -> Result<bool, HardwareError> {
        if !self.settings.enabled {
            self.set_status(DeviceStatus::Disconnected);
            return Ok(false);
        }

        self.set_status(DeviceStatus::Connecting);

        match &self.settings.connection {
            ScannerConnection::Camera | ScannerConnection::Bluetooth => {
                self.set_status(DeviceStatus::Connected);
                info!("Scanner ready (push source)");
                Ok(true)
            }
            ScannerConnection::Serial { port, baud_rate } => {
                match self.pool.open(port, *baud_rate, SERIAL_TIMEOUT_MS) {
                    Ok(handle) => {
                        *self
                            .serial_handle
                            .lock()
                            .unwrap_or_else(|e| e.into_inner()) = Some(handle.clone());
                        self.spawn_reader(port.clone(), handle);
                        self.set_status(DeviceStatus::Connected);
                        Ok(true)
                    }
                    Err(e) => {
                        warn!(port = %port, error = %e, "Scanner serial open failed");
                        self.set_status(DeviceStatus::Error);
                        Ok(false)
                    }
                }
            }
            ScannerConnection::Usb { device } => {
                self.set_status(DeviceStatus::Error);
                warn!(device = %device, "USB scanners are not supported");
                Err(HardwareError::UnsupportedTransport {
                    device: "scanner",
                    kind: TransportKind::Usb,
                })
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        self.status() == DeviceStatus::Connected
    }

    /// Settings flag the UI consults to decide whether a scan submits the
    /// line immediately.
    pub fn auto_submit(&self) -> bool {
        self.settings.auto_submit
    }

    fn normalize(&self, raw: &str) -> Option<String> {
        normalize_barcode(raw, &self.settings.prefix, &self.settings.suffix)
    }

    /// Accept a raw scan from a push source. Returns the normalized result,
    /// or `None` when the input does not look like a barcode.
    pub fn ingest(&self, raw: &str, source: ScanSource) -> Option<ScanResult> {
        let code = self.normalize(raw)?;
        let result = ScanResult {
            format: detect_format(&code),
            barcode: code,
            source,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        info!(barcode = %result.barcode, source = ?source, "Barcode scanned");
        *self.last_scan.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.clone());
        let _ = self.events.send(result.clone());
        Some(result)
    }

    fn spawn_reader(&self, port: String, handle: SerialHandle) {
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let pool = Arc::clone(&self.pool);
        let events = self.events.clone();
        let last_scan = Arc::clone(&self.last_scan);
        let prefix = self.settings.prefix.clone();
        let suffix = self.settings.suffix.clone();

        tokio::spawn(async move {
            info!(port = %port, "Serial scanner background reader started");
            let mut line_buf = String::new();

            while running.load(Ordering::SeqCst) {
                match pool.read(&handle, 256) {
                    Ok(data) if !data.is_empty() => {
                        line_buf.push_str(&String::from_utf8_lossy(&data));

                        // Scanners terminate barcodes with \r\n or \n
                        while let Some(pos) = line_buf.find('\n') {
                            let line = line_buf[..pos].to_string();
                            line_buf = line_buf[pos + 1..].to_string();

                            if let Some(code) = normalize_barcode(&line, &prefix, &suffix) {
                                let result = ScanResult {
                                    format: detect_format(&code),
                                    barcode: code,
                                    source: ScanSource::Serial,
                                    timestamp: chrono::Utc::now().to_rfc3339(),
                                };
                                info!(barcode = %result.barcode, "Serial scanner: barcode detected");
                                *last_scan.lock().unwrap_or_else(|e| e.into_inner()) =
                                    Some(result.clone());
                                let _ = events.send(result);
                            }
                        }

                        if line_buf.len() > LINE_BUF_CAP {
                            line_buf.clear();
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Serial scanner read error");
                        tokio::time::sleep(READ_ERROR_BACKOFF).await;
                    }
                }

                tokio::time::sleep(READ_POLL_INTERVAL).await;
            }

            pool.close(&handle);
            info!(port = %port, "Serial scanner background reader stopped");
        });
    }

    /// Stop the reader (if any) and release the port.
    pub async fn disconnect(&self) {
        let reader_was_running = self.running.swap(false, Ordering::SeqCst);
        let handle = self
            .serial_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        // A running reader owns the handle and closes it on exit; closing
        // here as well would double-close.
        if let Some(handle) = handle {
            if !reader_was_running {
                self.pool.close(&handle);
            }
        }
        self.set_status(DeviceStatus::Disconnected);
        info!("Scanner disconnected");
    }
}

impl std::fmt::Debug for ScannerDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerDevice")
            .field("status", &self.status())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
