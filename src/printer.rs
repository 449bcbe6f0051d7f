//! Thermal receipt printer device.
//!
//! Resolves printer settings to an active [`Link`] (Bluetooth, network, or
//! serial), renders [`ReceiptData`] into an ESC/POS byte stream sized to the
//! configured paper width, and ships it down the link.
//!
//! Key design goals:
//! - **Fail-safe**: I/O failures are logged and degrade to `false` — a
//!   printer problem never aborts a checkout
//! - **Transport-agnostic rendering**: one layout path feeds all transports
//! - **Explicit unsupported paths**: USB printing surfaces as a typed error
//!   instead of a silent success

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::bluetooth::BluetoothTransport;
use crate::error::{HardwareError, TransportKind};
use crate::escpos::EscPosBuilder;
use crate::link::{DeviceStatus, Link};
use crate::net::TcpTarget;
use crate::receipt::{ReceiptData, ReceiptItem};
use crate::serial::SerialPool;
use crate::settings::{PrinterConnection, PrinterSettings};

const SERIAL_TIMEOUT_MS: u64 = 1000;

/// Pulse width for the kick trailer when the printer itself opens the
/// drawer (ESC p on-time units, 2 ms each).
const DRAWER_PULSE_WIDTH: u8 = 25;

pub struct PrinterDevice {
    settings: PrinterSettings,
    pool: Arc<SerialPool>,
    transport: Arc<BluetoothTransport>,
    link: Mutex<Option<Link>>,
    status: Mutex<DeviceStatus>,
}

impl PrinterDevice {
    pub fn new(
        settings: PrinterSettings,
        pool: Arc<SerialPool>,
        transport: Arc<BluetoothTransport>,
    ) -> Self {
        Self {
            settings,
            pool,
            transport,
            link: Mutex::new(None),
            status: Mutex::new(DeviceStatus::Disconnected),
        }
    }

    pub fn settings(&self) -> &PrinterSettings {
        &self.settings
    }

    pub fn status(&self) -> DeviceStatus {
        *self.status.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_status(&self, status: DeviceStatus) {
        *self.status.lock().unwrap_or_else(|e| e.into_inner()) = status;
    }

    fn set_link(&self, link: Option<Link>) {
        *self.link.lock().unwrap_or_else(|e| e.into_inner()) = link;
    }

    fn current_link(&self) -> Option<Link> {
        self.link.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Resolve settings to a live link. Returns `Ok(false)` when the device
    /// is disabled or the transport refused the connection; only an
    /// unsupported transport type is a hard error.
    pub async fn initialize(&self) -> Result<bool, HardwareError> {
        if !self.settings.enabled {
            self.set_link(None);
            self.set_status(DeviceStatus::Disconnected);
            return Ok(false);
        }

        self.set_status(DeviceStatus::Connecting);

        match &self.settings.connection {
            PrinterConnection::Bluetooth(endpoint) => {
                let result = self.transport.connect(&endpoint.device_address).await;
                if result.success {
                    self.set_link(Some(Link::Bluetooth {
                        endpoint: endpoint.clone(),
                    }));
                    self.set_status(DeviceStatus::Connected);
                    info!(device = %endpoint.device_address, "Printer connected over Bluetooth");
                    Ok(true)
                } else {
                    warn!(device = %endpoint.device_address, message = %result.message,
                        "Printer Bluetooth connect failed");
                    self.set_link(None);
                    self.set_status(DeviceStatus::Error);
                    Ok(false)
                }
            }
            PrinterConnection::Network { host, port } => {
                let target = TcpTarget::new(host, *port);
                if target.probe() {
                    info!(target = %target, "Printer reachable over network");
                    self.set_link(Some(Link::Network { target }));
                    self.set_status(DeviceStatus::Connected);
                    Ok(true)
                } else {
                    warn!(target = %target, "Printer network probe failed");
                    self.set_link(None);
                    self.set_status(DeviceStatus::Error);
                    Ok(false)
                }
            }
            PrinterConnection::Serial { port, baud_rate } => {
                match self.pool.open(port, *baud_rate, SERIAL_TIMEOUT_MS) {
                    Ok(handle) => {
                        info!(port = %port, baud = baud_rate, "Printer serial port opened");
                        self.set_link(Some(Link::Serial { handle }));
                        self.set_status(DeviceStatus::Connected);
                        Ok(true)
                    }
                    Err(e) => {
                        warn!(port = %port, error = %e, "Printer serial open failed");
                        self.set_link(None);
                        self.set_status(DeviceStatus::Error);
                        Ok(false)
                    }
                }
            }
            PrinterConnection::Usb { device } => {
                self.set_link(None);
                self.set_status(DeviceStatus::Error);
                warn!(device = %device, "USB printing is not supported");
                Err(HardwareError::UnsupportedTransport {
                    device: "printer",
                    kind: TransportKind::Usb,
                })
            }
        }
    }

    pub fn is_ready(&self) -> bool {
        if self.status() != DeviceStatus::Connected {
            return false;
        }
        match self.current_link() {
            Some(link) => link.is_live(&self.pool, &self.transport),
            None => false,
        }
    }

    /// Render and print a receipt. Returns `false` when the printer is not
    /// connected or the write fails.
    pub async fn print_receipt(&self, data: &ReceiptData) -> bool {
        let Some(link) = self.current_link() else {
            warn!("print_receipt called with no active printer link");
            return false;
        };
        if self.status() != DeviceStatus::Connected {
            warn!("print_receipt called while printer not connected");
            return false;
        }

        let bytes = self.render_receipt(data);
        match link.write(&self.pool, &self.transport, &bytes).await {
            Ok(()) => {
                info!(bytes = bytes.len(), "Receipt printed");
                true
            }
            Err(e) => {
                warn!(error = %e, "Receipt print failed");
                self.set_status(DeviceStatus::Error);
                false
            }
        }
    }

    /// Canned two-item receipt for settings-screen verification.
    pub async fn print_test_page(&self) -> bool {
        let data = ReceiptData {
            header_lines: vec!["TEST PAGE".to_string(), "Printer check".to_string()],
            items: vec![
                ReceiptItem {
                    name: "Sample Item A".to_string(),
                    quantity: 1,
                    unit_price: 4.50,
                    line_total: 4.50,
                },
                ReceiptItem {
                    name: "Sample Item B".to_string(),
                    quantity: 2,
                    unit_price: 1.25,
                    line_total: 2.50,
                },
            ],
            subtotal: 7.00,
            discount_total: 0.0,
            tax_total: 0.70,
            total: 7.70,
            payment_method: None,
            footer_lines: vec!["If you can read this,".to_string(), "printing works".to_string()],
        };
        self.print_receipt(&data).await
    }

    /// Send just the drawer kick pulse through the printer's DK port.
    pub async fn open_cash_drawer(&self) -> bool {
        let Some(link) = self.current_link() else {
            warn!("open_cash_drawer called with no active printer link");
            return false;
        };
        let bytes = crate::escpos::drawer_kick_bytes(DRAWER_PULSE_WIDTH);
        match link.write(&self.pool, &self.transport, &bytes).await {
            Ok(()) => {
                info!("Drawer kick sent via printer");
                true
            }
            Err(e) => {
                warn!(error = %e, "Drawer kick via printer failed");
                false
            }
        }
    }

    pub async fn disconnect(&self) {
        if let Some(link) = self.current_link() {
            link.close(&self.pool, &self.transport).await;
        }
        self.set_link(None);
        self.set_status(DeviceStatus::Disconnected);
        info!("Printer disconnected");
    }

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    fn render_receipt(&self, data: &ReceiptData) -> Vec<u8> {
        let paper = self.settings.paper_width();
        let mut b = EscPosBuilder::new().with_paper(paper);
        b.init();

        // Header: first line emphasized, the rest plain, all centered
        b.center();
        for (i, line) in data.header_lines.iter().enumerate() {
            if i == 0 {
                b.bold(true).double_height().text(line).lf().normal_size().bold(false);
            } else {
                b.text(line).lf();
            }
        }
        b.lf();

        // Item table
        b.left().separator();
        for item in &data.items {
            b.item_row(
                &item.name,
                item.quantity,
                &format!("{:.2}", item.line_total),
            );
        }
        b.separator();

        // Totals block
        b.line_pair("Subtotal", &format!("{:.2}", data.subtotal));
        if data.discount_total > 0.0 {
            b.line_pair("Discount", &format!("-{:.2}", data.discount_total));
        }
        b.line_pair("Tax", &format!("{:.2}", data.tax_total));
        b.bold(true)
            .line_pair("TOTAL", &format!("{:.2}", data.total))
            .bold(false);

        if let Some(method) = &data.payment_method {
            b.lf().line_pair("Paid by", method);
        }

        // Footer
        if !data.footer_lines.is_empty() {
            b.lf().center();
            for line in &data.footer_lines {
                b.text(line).lf();
            }
        }

        b.feed(3);
        if self.settings.auto_cut {
            b.cut();
        }
        if self.settings.open_drawer {
            b.drawer_pulse(DRAWER_PULSE_WIDTH);
        }
        b.build()
    }
}

impl std::fmt::Debug for PrinterDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrinterDevice")
            .field("status", &self.status())
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
