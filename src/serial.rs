//! Serial port pool for POS peripherals.
//!
//! Managed pool of COM/serial ports shared by printers, serial barcode
//! scanners, cash drawers and customer displays. Each opened port gets a
//! UUID handle; callers reference ports by handle rather than raw COM name.
//!
//! Key design goals:
//! - **Constructed, not global**: the pool is an owned object injected into
//!   each device, so tests never share port state between cases
//! - **Safe close**: closing a handle removes it from the pool
//! - **Timeout-as-empty**: a read timeout is a normal empty read, not an
//!   error — scanners poll quiet ports constantly

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{HardwareError, TransportKind};

// ---------------------------------------------------------------------------
// Port descriptions
// ---------------------------------------------------------------------------

/// One enumerated system serial port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerialPortInfo {
    pub name: String,
    pub port_type: String,
    #[serde(default)]
    pub manufacturer: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
}

/// Handle to an open port in the pool.
pub type SerialHandle = String;

// ---------------------------------------------------------------------------
// Pool
// ---------------------------------------------------------------------------

/// Managed pool of open serial ports.
pub struct SerialPool {
    ports: Mutex<HashMap<SerialHandle, Box<dyn serialport::SerialPort>>>,
}

impl SerialPool {
    pub fn new() -> Self {
        Self {
            ports: Mutex::new(HashMap::new()),
        }
    }

    /// List available serial/COM ports on this system.
    pub fn list_ports(&self) -> Result<Vec<SerialPortInfo>, HardwareError> {
        let ports = serialport::available_ports()
            .map_err(|e| HardwareError::Io(TransportKind::Serial, format!("list ports: {e}")))?;

        Ok(ports
            .iter()
            .map(|p| {
                let (port_type, manufacturer, product) = match &p.port_type {
                    serialport::SerialPortType::UsbPort(usb) => (
                        "usb".to_string(),
                        usb.manufacturer.clone(),
                        usb.product.clone(),
                    ),
                    serialport::SerialPortType::BluetoothPort => {
                        ("bluetooth".to_string(), None, None)
                    }
                    serialport::SerialPortType::PciPort => ("pci".to_string(), None, None),
                    serialport::SerialPortType::Unknown => ("unknown".to_string(), None, None),
                };
                SerialPortInfo {
                    name: p.port_name.clone(),
                    port_type,
                    manufacturer,
                    product,
                }
            })
            .collect())
    }

    /// Open a serial port and return its pool handle.
    pub fn open(
        &self,
        port: &str,
        baud_rate: u32,
        timeout_ms: u64,
    ) -> Result<SerialHandle, HardwareError> {
        let serial = serialport::new(port, baud_rate)
            .timeout(Duration::from_millis(timeout_ms))
            .open()
            .map_err(|e| {
                HardwareError::Io(
                    TransportKind::Serial,
                    format!("open {port} @ {baud_rate}: {e}"),
                )
            })?;

        let handle = Uuid::new_v4().to_string();
        {
            let mut ports = self.ports.lock().unwrap_or_else(|e| e.into_inner());
            ports.insert(handle.clone(), serial);
        }

        info!(port = port, baud = baud_rate, handle = %handle, "Serial port opened");
        Ok(handle)
    }

    /// Write data to an open port. Returns bytes written.
    pub fn write(&self, handle: &str, data: &[u8]) -> Result<usize, HardwareError> {
        let mut ports = self.ports.lock().unwrap_or_else(|e| e.into_inner());
        let port = ports
            .get_mut(handle)
            .ok_or_else(|| HardwareError::NotConnected(format!("serial handle {handle}")))?;

        let written = port
            .write(data)
            .map_err(|e| HardwareError::Io(TransportKind::Serial, format!("write: {e}")))?;
        port.flush()
            .map_err(|e| HardwareError::Io(TransportKind::Serial, format!("flush: {e}")))?;
        Ok(written)
    }

    /// Read up to `max_bytes` from an open port. A timeout yields an empty
    /// buffer.
    pub fn read(&self, handle: &str, max_bytes: usize) -> Result<Vec<u8>, HardwareError> {
        let mut ports = self.ports.lock().unwrap_or_else(|e| e.into_inner());
        let port = ports
            .get_mut(handle)
            .ok_or_else(|| HardwareError::NotConnected(format!("serial handle {handle}")))?;

        let mut buf = vec![0u8; max_bytes.min(4096)];
        match port.read(&mut buf) {
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(ref e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(HardwareError::Io(
                TransportKind::Serial,
                format!("read: {e}"),
            )),
        }
    }

    /// Close an open port. Closing an unknown handle is logged, not fatal.
    pub fn close(&self, handle: &str) {
        let mut ports = self.ports.lock().unwrap_or_else(|e| e.into_inner());
        if ports.remove(handle).is_some() {
            info!(handle = handle, "Serial port closed");
        } else {
            warn!(handle = handle, "Close called on unknown serial handle");
        }
    }

    /// Close every open port (coordinator shutdown path).
    pub fn close_all(&self) {
        let mut ports = self.ports.lock().unwrap_or_else(|e| e.into_inner());
        let count = ports.len();
        ports.clear();
        if count > 0 {
            info!(count = count, "Closed all serial ports");
        }
    }

    pub fn is_open(&self, handle: &str) -> bool {
        let ports = self.ports.lock().unwrap_or_else(|e| e.into_inner());
        ports.contains_key(handle)
    }
}

impl Default for SerialPool {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SerialPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .ports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len();
        f.debug_struct("SerialPool").field("open", &count).finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_ports_does_not_fail() {
        let pool = SerialPool::new();
        // Host may have zero ports; the call itself must succeed.
        assert!(pool.list_ports().is_ok());
    }

    #[test]
    fn test_open_nonexistent_port_fails() {
        let pool = SerialPool::new();
        assert!(pool.open("COM999", 9600, 500).is_err());
    }

    #[test]
    fn test_read_unknown_handle_fails() {
        let pool = SerialPool::new();
        let err = pool.read("no-such-handle", 256).unwrap_err();
        assert!(matches!(err, HardwareError::NotConnected(_)));
    }

    #[test]
    fn test_write_unknown_handle_fails() {
        let pool = SerialPool::new();
        assert!(pool.write("no-such-handle", b"hello").is_err());
    }

    #[test]
    fn test_close_unknown_handle_is_nonfatal() {
        let pool = SerialPool::new();
        pool.close("no-such-handle");
        assert!(!pool.is_open("no-such-handle"));
    }

    #[test]
    fn test_pools_are_isolated() {
        // Two pools share nothing — the reason this isn't a global.
        let a = SerialPool::new();
        let b = SerialPool::new();
        a.close_all();
        assert!(!b.is_open("anything"));
    }
}
