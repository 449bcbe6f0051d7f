//! Hardware configuration for POS peripherals.
//!
//! Each device carries an `enabled` flag plus a connection enum tagged by
//! `type`, so a bluetooth printer config cannot smuggle serial-only fields
//! and vice versa. The JSON shape matches what the settings screens produce:
//!
//! ```json
//! { "printer": { "enabled": true,
//!                "connection": { "type": "network", "host": "192.168.1.50" },
//!                "paperWidthMm": 80, "autoCut": true, "openDrawer": false } }
//! ```

use serde::{Deserialize, Serialize};

use crate::escpos::PaperWidth;

// ---------------------------------------------------------------------------
// Bluetooth endpoint
// ---------------------------------------------------------------------------

/// GATT write endpoint for a BLE peripheral.
///
/// Defaults target the ISSC/Microchip transparent-UART service most thermal
/// printers and pole displays expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BluetoothEndpoint {
    /// Platform device id (MAC on Android/Linux, CBPeripheral UUID on iOS).
    pub device_address: String,
    #[serde(default = "default_service_id")]
    pub service_id: String,
    #[serde(default = "default_characteristic_id")]
    pub characteristic_id: String,
}

fn default_service_id() -> String {
    "49535343-fe7d-4ae5-8fa9-9fafd205e455".to_string()
}

fn default_characteristic_id() -> String {
    "49535343-8841-43f4-a8d4-ecbe34729bb3".to_string()
}

impl BluetoothEndpoint {
    pub fn new(device_address: &str) -> Self {
        Self {
            device_address: device_address.to_string(),
            service_id: default_service_id(),
            characteristic_id: default_characteristic_id(),
        }
    }
}

// ---------------------------------------------------------------------------
// Printer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum PrinterConnection {
    Bluetooth(BluetoothEndpoint),
    Network {
        host: String,
        #[serde(default = "default_raw_port")]
        port: u16,
    },
    Usb {
        /// OS identifier for the USB printer (vid:pid or platform name).
        device: String,
    },
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud_rate: u32,
    },
}

fn default_raw_port() -> u16 {
    9100
}

fn default_baud() -> u32 {
    9600
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterSettings {
    pub enabled: bool,
    pub connection: PrinterConnection,
    /// 58 or 80 — anything else is snapped to the nearest supported width.
    #[serde(default = "default_paper_mm")]
    pub paper_width_mm: i32,
    #[serde(default = "default_true")]
    pub auto_cut: bool,
    /// Append the drawer-kick pulse after each receipt.
    #[serde(default)]
    pub open_drawer: bool,
}

fn default_paper_mm() -> i32 {
    80
}

fn default_true() -> bool {
    true
}

impl PrinterSettings {
    pub fn paper_width(&self) -> PaperWidth {
        PaperWidth::from_mm(self.paper_width_mm)
    }
}

/// Disabled stand-in used when no printer was configured.
impl Default for PrinterSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            connection: PrinterConnection::Network {
                host: "127.0.0.1".to_string(),
                port: default_raw_port(),
            },
            paper_width_mm: default_paper_mm(),
            auto_cut: true,
            open_drawer: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ScannerConnection {
    /// UI-side camera component; scans arrive via `ScannerDevice::ingest`.
    Camera,
    /// Bluetooth HID scanners type like a keyboard; the UI pushes the
    /// assembled line via `ingest`.
    Bluetooth,
    Usb {
        device: String,
    },
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud_rate: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScannerSettings {
    pub enabled: bool,
    pub connection: ScannerConnection,
    /// Fixed prefix some scanners prepend (stripped during normalization).
    #[serde(default)]
    pub prefix: String,
    /// Fixed suffix (e.g. a tab) appended by the scanner.
    #[serde(default)]
    pub suffix: String,
    /// Whether a scan should submit the cart line immediately in the UI.
    #[serde(default)]
    pub auto_submit: bool,
}

impl Default for ScannerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            connection: ScannerConnection::Camera,
            prefix: String::new(),
            suffix: String::new(),
            auto_submit: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Cash drawer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DrawerConnection {
    /// Drawer wired to the receipt printer's DK port; kicks relay through
    /// the printer device.
    Printer,
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud_rate: u32,
    },
    Usb {
        device: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawerSettings {
    pub enabled: bool,
    pub connection: DrawerConnection,
    /// Kick pulse on-time in 2 ms units (ESC p t1). 25 = 50 ms.
    #[serde(default = "default_pulse_width")]
    pub pulse_width: u8,
    /// Kick automatically after a cash sale.
    #[serde(default = "default_true")]
    pub auto_open_on_sale: bool,
}

fn default_pulse_width() -> u8 {
    25
}

impl Default for DrawerSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            connection: DrawerConnection::Printer,
            pulse_width: default_pulse_width(),
            auto_open_on_sale: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Customer display
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DisplayConnection {
    Bluetooth(BluetoothEndpoint),
    Network {
        host: String,
        #[serde(default = "default_raw_port")]
        port: u16,
    },
    Usb {
        device: String,
    },
    Serial {
        port: String,
        #[serde(default = "default_baud")]
        baud_rate: u32,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySettings {
    pub enabled: bool,
    pub connection: DisplayConnection,
    #[serde(default = "default_columns")]
    pub columns: usize,
    #[serde(default = "default_lines")]
    pub lines: usize,
}

fn default_columns() -> usize {
    20
}

fn default_lines() -> usize {
    2
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            connection: DisplayConnection::Network {
                host: "127.0.0.1".to_string(),
                port: default_raw_port(),
            },
            columns: default_columns(),
            lines: default_lines(),
        }
    }
}

// ---------------------------------------------------------------------------
// Aggregate
// ---------------------------------------------------------------------------

/// Full peripheral configuration handed to the hardware coordinator.
///
/// A `None` sub-config means the device was never configured; it is treated
/// like a disabled device everywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardwareSettings {
    #[serde(default)]
    pub printer: Option<PrinterSettings>,
    #[serde(default)]
    pub scanner: Option<ScannerSettings>,
    #[serde(default)]
    pub cash_drawer: Option<DrawerSettings>,
    #[serde(default)]
    pub customer_display: Option<DisplaySettings>,
}

impl HardwareSettings {
    pub fn printer_enabled(&self) -> bool {
        self.printer.as_ref().map(|p| p.enabled).unwrap_or(false)
    }

    pub fn scanner_enabled(&self) -> bool {
        self.scanner.as_ref().map(|s| s.enabled).unwrap_or(false)
    }

    pub fn drawer_enabled(&self) -> bool {
        self.cash_drawer.as_ref().map(|d| d.enabled).unwrap_or(false)
    }

    pub fn display_enabled(&self) -> bool {
        self.customer_display.as_ref().map(|d| d.enabled).unwrap_or(false)
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printer_connection_tagged_json() {
        let json = r#"{
            "enabled": true,
            "connection": { "type": "network", "host": "192.168.1.50" },
            "paperWidthMm": 58
        }"#;
        let settings: PrinterSettings = serde_json::from_str(json).unwrap();
        assert!(settings.enabled);
        assert_eq!(
            settings.connection,
            PrinterConnection::Network {
                host: "192.168.1.50".into(),
                port: 9100,
            }
        );
        assert_eq!(settings.paper_width().chars(), 32);
        assert!(settings.auto_cut); // default
        assert!(!settings.open_drawer); // default
    }

    #[test]
    fn test_bluetooth_endpoint_defaults() {
        let json = r#"{
            "enabled": true,
            "connection": { "type": "bluetooth", "deviceAddress": "AA:BB:CC:DD:EE:FF" }
        }"#;
        let settings: PrinterSettings = serde_json::from_str(json).unwrap();
        match settings.connection {
            PrinterConnection::Bluetooth(ep) => {
                assert_eq!(ep.device_address, "AA:BB:CC:DD:EE:FF");
                assert!(ep.service_id.starts_with("49535343"));
            }
            other => panic!("expected bluetooth connection, got {other:?}"),
        }
    }

    #[test]
    fn test_drawer_printer_relay_roundtrip() {
        let settings = DrawerSettings {
            enabled: true,
            connection: DrawerConnection::Printer,
            pulse_width: 25,
            auto_open_on_sale: true,
        };
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["connection"]["type"], "printer");
        let back: DrawerSettings = serde_json::from_value(json).unwrap();
        assert_eq!(back, settings);
    }

    #[test]
    fn test_unknown_connection_type_rejected() {
        let json = r#"{
            "enabled": true,
            "connection": { "type": "parallel", "port": "LPT1" }
        }"#;
        assert!(serde_json::from_str::<PrinterSettings>(json).is_err());
    }

    #[test]
    fn test_empty_hardware_settings() {
        let settings: HardwareSettings = serde_json::from_str("{}").unwrap();
        assert!(!settings.printer_enabled());
        assert!(!settings.scanner_enabled());
        assert!(!settings.drawer_enabled());
        assert!(!settings.display_enabled());
    }

    #[test]
    fn test_display_defaults() {
        let json = r#"{
            "enabled": true,
            "connection": { "type": "serial", "port": "COM4" }
        }"#;
        let settings: DisplaySettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.columns, 20);
        assert_eq!(settings.lines, 2);
        match settings.connection {
            DisplayConnection::Serial { baud_rate, .. } => assert_eq!(baud_rate, 9600),
            other => panic!("expected serial connection, got {other:?}"),
        }
    }
}
