//! Hardware coordinator.
//!
//! Owns the shared transports (serial pool, Bluetooth) and the four
//! peripheral devices, and sequences their lifecycle: full re-init on every
//! `initialize`, concurrent device bring-up that never lets one device's
//! failure block a sibling, and best-effort post-sale fan-out.
//!
//! Key design goals:
//! - **All-settled init**: the four device inits run concurrently and all
//!   complete; failures are logged, never propagated
//! - **Independent failure domains**: status is a pure read-through of each
//!   device's own state
//! - **Best-effort sale completion**: print, drawer kick, and display
//!   update each proceed regardless of the others' outcome

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::bluetooth::{BluetoothAdapter, BluetoothTransport, ConnectResult, DiscoveredDevice};
use crate::cart::PaymentMethod;
use crate::display::CustomerDisplayDevice;
use crate::drawer::CashDrawerDevice;
use crate::link::DeviceStatus;
use crate::printer::PrinterDevice;
use crate::receipt::ReceiptData;
use crate::scanner::{ScanResult, ScannerDevice};
use crate::serial::SerialPool;
use crate::settings::HardwareSettings;

/// How long the thank-you screen stays up before reverting to welcome.
const THANK_YOU_HOLD: Duration = Duration::from_secs(4);

/// Status snapshot across all four devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareStatus {
    pub printer: DeviceStatus,
    pub scanner: DeviceStatus,
    pub cash_drawer: DeviceStatus,
    pub customer_display: DeviceStatus,
}

impl Default for HardwareStatus {
    fn default() -> Self {
        Self {
            printer: DeviceStatus::Disconnected,
            scanner: DeviceStatus::Disconnected,
            cash_drawer: DeviceStatus::Disconnected,
            customer_display: DeviceStatus::Disconnected,
        }
    }
}

/// What `handle_sale_complete` managed to do. Informational; callers must
/// not treat a `false` as a checkout failure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleCompletion {
    pub printed: bool,
    pub drawer_opened: bool,
    pub display_updated: bool,
}

struct DeviceSet {
    settings: HardwareSettings,
    printer: Arc<PrinterDevice>,
    scanner: Arc<ScannerDevice>,
    drawer: Arc<CashDrawerDevice>,
    display: Arc<CustomerDisplayDevice>,
}

pub struct HardwareCoordinator {
    pool: Arc<SerialPool>,
    transport: Arc<BluetoothTransport>,
    devices: tokio::sync::Mutex<Option<DeviceSet>>,
}

impl HardwareCoordinator {
    pub fn new(adapter: Box<dyn BluetoothAdapter>) -> Self {
        Self {
            pool: Arc::new(SerialPool::new()),
            transport: Arc::new(BluetoothTransport::new(adapter)),
            devices: tokio::sync::Mutex::new(None),
        }
    }

    pub fn serial_pool(&self) -> &Arc<SerialPool> {
        &self.pool
    }

    pub fn transport(&self) -> &Arc<BluetoothTransport> {
        &self.transport
    }

    /// Bring up the full peripheral set. A previous configuration is torn
    /// down first; this is a full re-init, not an incremental reconfigure.
    ///
    /// Returns `true` once all four device inits have settled — individual
    /// device outcomes are reported through [`hardware_status`].
    ///
    /// [`hardware_status`]: Self::hardware_status
    pub async fn initialize(&self, settings: HardwareSettings) -> bool {
        let mut slot = self.devices.lock().await;

        if let Some(old) = slot.take() {
            info!("Re-initializing hardware; disconnecting previous devices");
            tokio::join!(
                old.printer.disconnect(),
                old.scanner.disconnect(),
                old.drawer.disconnect(),
                old.display.disconnect(),
            );
        }

        // Transport comes up once; Bluetooth devices report their own
        // connect failures if it didn't.
        if let Err(e) = self.transport.initialize().await {
            warn!(error = %e, "Bluetooth transport initialization failed");
        }

        let printer = Arc::new(PrinterDevice::new(
            settings.printer.clone().unwrap_or_default(),
            Arc::clone(&self.pool),
            Arc::clone(&self.transport),
        ));
        let scanner = Arc::new(ScannerDevice::new(
            settings.scanner.clone().unwrap_or_default(),
            Arc::clone(&self.pool),
        ));
        let drawer = Arc::new(CashDrawerDevice::new(
            settings.cash_drawer.clone().unwrap_or_default(),
            Arc::clone(&self.pool),
            Arc::clone(&printer),
        ));
        let display = Arc::new(CustomerDisplayDevice::new(
            settings.customer_display.clone().unwrap_or_default(),
            Arc::clone(&self.pool),
            Arc::clone(&self.transport),
        ));

        // All-settled: every init runs to completion even when siblings fail
        let (p, s, d, c) = tokio::join!(
            printer.initialize(),
            scanner.initialize(),
            drawer.initialize(),
            display.initialize(),
        );
        for (name, result) in [
            ("printer", &p),
            ("scanner", &s),
            ("cash drawer", &d),
            ("customer display", &c),
        ] {
            match result {
                Ok(true) => info!(device = name, "Device initialized"),
                Ok(false) => info!(device = name, "Device not brought up"),
                Err(e) => warn!(device = name, error = %e, "Device initialization failed"),
            }
        }

        *slot = Some(DeviceSet {
            settings,
            printer,
            scanner,
            drawer,
            display,
        });
        true
    }

    /// Pure read-through of the four devices' own states.
    pub async fn hardware_status(&self) -> HardwareStatus {
        let slot = self.devices.lock().await;
        match slot.as_ref() {
            Some(d) => HardwareStatus {
                printer: d.printer.status(),
                scanner: d.scanner.status(),
                cash_drawer: d.drawer.status(),
                customer_display: d.display.status(),
            },
            None => HardwareStatus::default(),
        }
    }

    /// True iff every device enabled in settings reports ready. Disabled
    /// devices are vacuously ready.
    pub async fn are_devices_ready(&self) -> bool {
        let slot = self.devices.lock().await;
        let Some(d) = slot.as_ref() else {
            return false;
        };
        (!d.settings.printer_enabled() || d.printer.is_ready())
            && (!d.settings.scanner_enabled() || d.scanner.is_ready())
            && (!d.settings.drawer_enabled() || d.drawer.is_ready())
            && (!d.settings.display_enabled() || d.display.is_ready())
    }

    /// Post-sale fan-out: print the receipt, kick the drawer on cash, show
    /// the thank-you screen. Each step is independent; one device failing
    /// never stops the others.
    pub async fn handle_sale_complete(
        &self,
        receipt: &ReceiptData,
        payment_method: PaymentMethod,
    ) -> SaleCompletion {
        let slot = self.devices.lock().await;
        let Some(d) = slot.as_ref() else {
            warn!("handle_sale_complete before initialize");
            return SaleCompletion::default();
        };

        let mut outcome = SaleCompletion::default();

        if d.settings.printer_enabled() {
            outcome.printed = d.printer.print_receipt(receipt).await;
            if !outcome.printed {
                warn!("Sale receipt did not print");
            }
        }

        if payment_method == PaymentMethod::Cash && d.drawer.should_auto_open_on_sale() {
            outcome.drawer_opened = d.drawer.open_drawer().await;
            if !outcome.drawer_opened {
                warn!("Cash drawer did not open after sale");
            }
        }

        if d.settings.display_enabled() {
            outcome.display_updated = d.display.display_thank_you().await;
            if outcome.display_updated {
                let display = Arc::clone(&d.display);
                tokio::spawn(async move {
                    tokio::time::sleep(THANK_YOU_HOLD).await;
                    display.display_welcome().await;
                });
            } else {
                warn!("Customer display did not show thank-you");
            }
        }

        info!(?outcome, "Sale completion fan-out done");
        outcome
    }

    /// Tear down all devices in parallel. Transport state survives; a
    /// subsequent `initialize` reuses it.
    pub async fn disconnect(&self) {
        let mut slot = self.devices.lock().await;
        if let Some(d) = slot.take() {
            tokio::join!(
                d.printer.disconnect(),
                d.scanner.disconnect(),
                d.drawer.disconnect(),
                d.display.disconnect(),
            );
        }
        info!("All hardware disconnected");
    }

    /// Full process-state reset: devices, serial pool, and the Bluetooth
    /// transport's discovery/connection maps.
    pub async fn cleanup(&self) {
        self.disconnect().await;
        self.pool.close_all();
        self.transport.cleanup().await;
        info!("Hardware coordinator cleaned up");
    }

    // -----------------------------------------------------------------------
    // Pass-throughs for UI-driven flows
    // -----------------------------------------------------------------------

    /// Bluetooth discovery for the settings screen. An in-flight scan must
    /// be stopped (here or via `stop_scan`) before connecting.
    pub async fn scan_for_devices(&self, duration_secs: u64) -> Vec<DiscoveredDevice> {
        self.transport.scan_for_devices(duration_secs).await
    }

    pub async fn stop_scan(&self) {
        self.transport.stop_scan().await;
    }

    /// Connect to a scanned peripheral. The transport stops any in-flight
    /// scan before touching the radio.
    pub async fn connect_device(&self, device_id: &str) -> ConnectResult {
        self.transport.connect(device_id).await
    }

    pub async fn paired_devices(&self) -> Vec<DiscoveredDevice> {
        self.transport.get_paired_devices().await
    }

    /// Take the scanner's event stream (single consumer).
    pub async fn take_scan_events(
        &self,
    ) -> Option<tokio::sync::mpsc::UnboundedReceiver<ScanResult>> {
        let slot = self.devices.lock().await;
        slot.as_ref().and_then(|d| d.scanner.take_events())
    }

    /// Push a raw scan from the camera or a Bluetooth HID scanner.
    pub async fn ingest_scan(
        &self,
        raw: &str,
        source: crate::scanner::ScanSource,
    ) -> Option<ScanResult> {
        let slot = self.devices.lock().await;
        slot.as_ref().and_then(|d| d.scanner.ingest(raw, source))
    }

    pub async fn last_scan(&self) -> Option<ScanResult> {
        let slot = self.devices.lock().await;
        slot.as_ref().and_then(|d| d.scanner.last_scan())
    }

    /// Manual drawer kick from the UI.
    pub async fn open_cash_drawer(&self) -> bool {
        let slot = self.devices.lock().await;
        match slot.as_ref() {
            Some(d) => d.drawer.open_drawer().await,
            None => false,
        }
    }

    pub async fn print_test_page(&self) -> bool {
        let slot = self.devices.lock().await;
        match slot.as_ref() {
            Some(d) => d.printer.print_test_page().await,
            None => false,
        }
    }

    pub async fn test_display(&self) -> bool {
        let slot = self.devices.lock().await;
        match slot.as_ref() {
            Some(d) => d.display.test_display().await,
            None => false,
        }
    }
}

impl std::fmt::Debug for HardwareCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HardwareCoordinator").finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
