//! Cash drawer device.
//!
//! Most drawers hang off the receipt printer's DK (drawer kick) port, so the
//! default path relays the kick through [`PrinterDevice`]. A directly wired
//! serial drawer gets its own port; USB drawers are reported as unsupported.
//!
//! Key design goals:
//! - **Non-blocking**: a drawer kick never blocks checkout or print jobs
//! - **Rate-limited**: max 1 kick per 2 seconds to prevent accidental spam
//! - **Fail-safe**: errors are logged but never propagated to callers that
//!   would otherwise block the POS flow

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::{HardwareError, TransportKind};
use crate::escpos::drawer_kick_bytes;
use crate::link::DeviceStatus;
use crate::printer::PrinterDevice;
use crate::serial::{SerialHandle, SerialPool};
use crate::settings::{DrawerConnection, DrawerSettings};

/// Minimum interval between kicks.
const MIN_KICK_INTERVAL: Duration = Duration::from_secs(2);

const SERIAL_TIMEOUT_MS: u64 = 1000;

pub struct CashDrawerDevice {
    settings: DrawerSettings,
    pool: Arc<SerialPool>,
    printer: Arc<PrinterDevice>,
    serial_handle: Mutex<Option<SerialHandle>>,
    status: Mutex<DeviceStatus>,
    last_kick: Mutex<Option<Instant>>,
}

impl CashDrawerDevice {
    pub fn new(
        settings: DrawerSettings,
        pool: Arc<SerialPool>,
        printer: Arc<PrinterDevice>,
    ) -> Self {
        Self {
            settings,
            pool,
            printer,
            serial_handle: Mutex::new(None),
            status: Mutex::new(DeviceStatus::Disconnected),
            last_kick: Mutex::new(None),
        }
    }

    pub fn status(&self) -> DeviceStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: DeviceStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    /// Resolve the configured connection. The printer-relay path has no
    /// resources of its own, so it succeeds immediately; readiness then
    /// tracks the printer.
    pub async fn initialize(&self) -> Result<bool, HardwareError> {
        if !self.settings.enabled {
            self.set_status(DeviceStatus::Disconnected);
            return Ok(false);
        }

        self.set_status(DeviceStatus::Connecting);

        match &self.settings.connection {
            DrawerConnection::Printer => {
                self.set_status(DeviceStatus::Connected);
                info!("Cash drawer relaying through printer");
                Ok(true)
            }
            DrawerConnection::Serial { port, baud_rate } => {
                match self.pool.open(port, *baud_rate, SERIAL_TIMEOUT_MS) {
                    Ok(handle) => {
                        info!(port = %port, "Cash drawer serial port opened");
                        *self
                            .serial_handle
                            .lock()
                            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
                        self.set_status(DeviceStatus::Connected);
                        Ok(true)
                    }
                    Err(e) => {
                        warn!(port = %port, error = %e, "Cash drawer serial open failed");
                        self.set_status(DeviceStatus::Error);
                        Ok(false)
                    }
                }
            }
            DrawerConnection::Usb { device } => {
                self.set_status(DeviceStatus::Error);
                warn!(device = %device, "USB cash drawers are not supported");
                Err(HardwareError::UnsupportedTransport {
                    device: "cash drawer",
                    kind: TransportKind::Usb,
                })
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        match &self.settings.connection {
            // Relay readiness is the printer's readiness
            DrawerConnection::Printer => {
                self.status() == DeviceStatus::Connected && self.printer.is_ready()
            }
            _ => self.status() == DeviceStatus::Connected,
        }
    }

    /// Pure settings read the coordinator consults after a cash payment.
    pub fn should_auto_open_on_sale(&self) -> bool {
        self.settings.enabled && self.settings.auto_open_on_sale
    }

    fn rate_limit_ok(&self) -> bool {
        let mut last = self.last_kick.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(t) = *last {
            if t.elapsed() < MIN_KICK_INTERVAL {
                return false;
            }
        }
        *last = Some(Instant::now());
        true
    }

    /// Kick the drawer open. Returns `false` when disabled, rate-limited,
    /// or the underlying transport fails.
    pub async fn open_drawer(&self) -> bool {
        if !self.settings.enabled {
            return false;
        }
        if !self.rate_limit_ok() {
            info!("Drawer kick skipped (rate-limited)");
            return false;
        }

        match &self.settings.connection {
            DrawerConnection::Printer => self.printer.open_cash_drawer().await,
            DrawerConnection::Serial { .. } => {
                let handle = self
                    .serial_handle
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .clone();
                let Some(handle) = handle else {
                    warn!("Drawer kick requested with no open serial port");
                    return false;
                };
                let bytes = drawer_kick_bytes(self.settings.pulse_width);
                match self.pool.write(&handle, &bytes) {
                    Ok(_) => {
                        info!("Drawer kick sent over serial");
                        true
                    }
                    Err(e) => {
                        warn!(error = %e, "Serial drawer kick failed");
                        false
                    }
                }
            }
            DrawerConnection::Usb { .. } => false,
        }
    }

    pub async fn disconnect(&self) {
        let handle = self
            .serial_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            self.pool.close(&handle);
        }
        self.set_status(DeviceStatus::Disconnected);
        info!("Cash drawer disconnected");
    }
}

impl std::fmt::Debug for CashDrawerDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CashDrawerDevice")
            .field("status", &self.status())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{BluetoothTransport, FakeBluetoothAdapter};
    use crate::settings::{BluetoothEndpoint, PrinterConnection, PrinterSettings};

    async fn connected_printer() -> (Arc<SerialPool>, Arc<PrinterDevice>) {
        let pool = Arc::new(SerialPool::new());
        let transport = Arc::new(BluetoothTransport::new(Box::new(
            FakeBluetoothAdapter::empty(),
        )));
        transport.initialize().await.unwrap();
        let printer = Arc::new(PrinterDevice::new(
            PrinterSettings {
                enabled: true,
                connection: PrinterConnection::Bluetooth(BluetoothEndpoint::new(
                    "aa:bb:cc:dd:ee:ff",
                )),
                paper_width_mm: 80,
                auto_cut: true,
                open_drawer: false,
            },
            Arc::clone(&pool),
            transport,
        ));
        printer.initialize().await.unwrap();
        (pool, printer)
    }

    fn drawer_settings(connection: DrawerConnection) -> DrawerSettings {
        DrawerSettings {
            enabled: true,
            connection,
            pulse_width: 25,
            auto_open_on_sale: true,
        }
    }

    #[tokio::test]
    async fn test_printer_relay_kick() {
        let (pool, printer) = connected_printer().await;
        let drawer = CashDrawerDevice::new(
            drawer_settings(DrawerConnection::Printer),
            pool,
            printer,
        );
        assert!(drawer.initialize().await.unwrap());
        assert!(drawer.is_ready());
        assert!(drawer.open_drawer().await);
    }

    #[tokio::test]
    async fn test_rate_limit_blocks_second_kick() {
        let (pool, printer) = connected_printer().await;
        let drawer = CashDrawerDevice::new(
            drawer_settings(DrawerConnection::Printer),
            pool,
            printer,
        );
        drawer.initialize().await.unwrap();
        assert!(drawer.open_drawer().await);
        assert!(!drawer.open_drawer().await);
    }

    #[tokio::test]
    async fn test_relay_readiness_tracks_printer() {
        let (pool, printer) = connected_printer().await;
        let drawer = CashDrawerDevice::new(
            drawer_settings(DrawerConnection::Printer),
            pool,
            Arc::clone(&printer),
        );
        drawer.initialize().await.unwrap();
        assert!(drawer.is_ready());

        printer.disconnect().await;
        assert!(!drawer.is_ready());
    }

    #[tokio::test]
    async fn test_usb_drawer_is_unsupported() {
        let (pool, printer) = connected_printer().await;
        let drawer = CashDrawerDevice::new(
            drawer_settings(DrawerConnection::Usb {
                device: "usb001".into(),
            }),
            pool,
            printer,
        );
        let err = drawer.initialize().await.unwrap_err();
        assert!(matches!(
            err,
            HardwareError::UnsupportedTransport {
                device: "cash drawer",
                kind: TransportKind::Usb,
            }
        ));
        assert!(!drawer.open_drawer().await);
    }

    #[tokio::test]
    async fn test_disabled_drawer_never_kicks() {
        let (pool, printer) = connected_printer().await;
        let mut s = drawer_settings(DrawerConnection::Printer);
        s.enabled = false;
        let drawer = CashDrawerDevice::new(s, pool, printer);
        assert!(!drawer.initialize().await.unwrap());
        assert!(!drawer.open_drawer().await);
        assert!(!drawer.should_auto_open_on_sale());
    }

    #[tokio::test]
    async fn test_serial_drawer_open_failure_degrades() {
        let (pool, printer) = connected_printer().await;
        let drawer = CashDrawerDevice::new(
            drawer_settings(DrawerConnection::Serial {
                port: "/dev/ttyDOESNOTEXIST".into(),
                baud_rate: 9600,
            }),
            pool,
            printer,
        );
        assert!(!drawer.initialize().await.unwrap());
        assert_eq!(drawer.status(), DeviceStatus::Error);
    }
}
