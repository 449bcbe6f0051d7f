//! Bluetooth transport for wireless POS peripherals.
//!
//! Device discovery, pairing-state tracking, and raw byte read/write to a
//! GATT service/characteristic pair. The OS-level adapter binding is
//! injected behind [`BluetoothAdapter`]; this module owns everything the
//! platform doesn't: the discovered-device map, the connected set, and the
//! one-physical-adapter discipline (an in-flight scan is stopped before any
//! connect attempt touches the radio).
//!
//! Key design goals:
//! - **Never throw past the boundary**: scan failures yield an empty list,
//!   connect failures a result object, write failures `false`
//! - **Process-wide adapter**: scan and connect serialize on an internal
//!   gate — the radio can't do both at once
//! - **Cleanup resets everything**: discovery and connection maps are
//!   cleared, matching a full coordinator re-init

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{HardwareError, TransportKind};

// ---------------------------------------------------------------------------
// Platform adapter seam
// ---------------------------------------------------------------------------

/// OS Bluetooth binding. Implemented by the embedding application per
/// platform; tests substitute fakes.
#[async_trait]
pub trait BluetoothAdapter: Send + Sync {
    /// Request platform permissions and power the adapter. Must be safe to
    /// call repeatedly.
    async fn power_on(&self) -> Result<(), HardwareError>;

    async fn start_scan(&self) -> Result<(), HardwareError>;

    async fn stop_scan(&self) -> Result<(), HardwareError>;

    /// Devices seen since the scan started.
    async fn discovered(&self) -> Vec<DiscoveredDevice>;

    /// Devices the OS already has a bond with.
    async fn paired_devices(&self) -> Vec<DiscoveredDevice>;

    async fn connect(&self, device_id: &str) -> Result<(), HardwareError>;

    async fn disconnect(&self, device_id: &str) -> Result<(), HardwareError>;

    async fn write(
        &self,
        device_id: &str,
        service_id: &str,
        characteristic_id: &str,
        data: &[u8],
    ) -> Result<(), HardwareError>;

    async fn read(
        &self,
        device_id: &str,
        service_id: &str,
        characteristic_id: &str,
    ) -> Result<Vec<u8>, HardwareError>;
}

// ---------------------------------------------------------------------------
// Data shapes
// ---------------------------------------------------------------------------

/// One discovered (or paired) peripheral.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredDevice {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Signal strength in dBm at discovery time.
    #[serde(default)]
    pub rssi: Option<i16>,
    #[serde(default)]
    pub connected: bool,
}

/// Outcome of a connect attempt. Failures are data, not panics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub device: Option<DiscoveredDevice>,
}

impl ConnectResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            device: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Bluetooth transport shared by every wireless device.
pub struct BluetoothTransport {
    adapter: Box<dyn BluetoothAdapter>,
    initialized: AtomicBool,
    scanning: AtomicBool,
    /// Serializes radio-exclusive operations (scan window, connect).
    radio_gate: tokio::sync::Mutex<()>,
    /// Wake handle for the in-flight scan window; `stop_scan` takes it and
    /// notifies so the scan ends immediately instead of sleeping out.
    scan_abort: Mutex<Option<Arc<tokio::sync::Notify>>>,
    discovered: Mutex<HashMap<String, DiscoveredDevice>>,
    connected: Mutex<HashSet<String>>,
}

impl BluetoothTransport {
    pub fn new(adapter: Box<dyn BluetoothAdapter>) -> Self {
        Self {
            adapter,
            initialized: AtomicBool::new(false),
            scanning: AtomicBool::new(false),
            radio_gate: tokio::sync::Mutex::new(()),
            scan_abort: Mutex::new(None),
            discovered: Mutex::new(HashMap::new()),
            connected: Mutex::new(HashSet::new()),
        }
    }

    /// Power the adapter and request permissions. Idempotent; a platform
    /// permission refusal surfaces as `PermissionDenied`.
    pub async fn initialize(&self) -> Result<(), HardwareError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.adapter.power_on().await?;
        self.initialized.store(true, Ordering::SeqCst);
        info!("Bluetooth transport initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Scan for peripherals for `duration_secs`, then stop. Returns what
    /// was found — an empty list on any failure, never an error.
    pub async fn scan_for_devices(&self, duration_secs: u64) -> Vec<DiscoveredDevice> {
        if !self.initialized.load(Ordering::SeqCst) {
            warn!("Bluetooth scan requested before initialize");
            return Vec::new();
        }

        let _gate = self.radio_gate.lock().await;

        if let Err(e) = self.adapter.start_scan().await {
            warn!(error = %e, "Bluetooth scan failed to start");
            return Vec::new();
        }

        // Fresh wake handle per scan so a stale notification from an
        // earlier window can't cut this one short.
        let abort = Arc::new(tokio::sync::Notify::new());
        *self.scan_abort.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&abort));
        self.scanning.store(true, Ordering::SeqCst);

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(duration_secs)) => {}
            _ = abort.notified() => {
                info!("Bluetooth scan ended early");
            }
        }
        *self.scan_abort.lock().unwrap_or_else(|e| e.into_inner()) = None;

        let found = self.adapter.discovered().await;
        // stop_scan() may have beaten us to the adapter
        if self.scanning.swap(false, Ordering::SeqCst) {
            if let Err(e) = self.adapter.stop_scan().await {
                warn!(error = %e, "Bluetooth scan failed to stop");
            }
        }

        let connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
        let mut discovered = self.discovered.lock().unwrap_or_else(|e| e.into_inner());
        let mut result = Vec::with_capacity(found.len());
        for mut device in found {
            device.connected = connected.contains(&device.id);
            discovered.insert(device.id.clone(), device.clone());
            result.push(device);
        }
        info!(count = result.len(), "Bluetooth scan complete");
        result
    }

    /// End an in-flight scan early. Wakes the scan window immediately so a
    /// follow-up `connect` doesn't wait out the remaining duration. Safe to
    /// call when no scan is running.
    pub async fn stop_scan(&self) {
        if self.scanning.swap(false, Ordering::SeqCst) {
            let abort = self
                .scan_abort
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(abort) = abort {
                // notify_one stores a permit, so the wake lands even if the
                // scan task hasn't reached its select yet
                abort.notify_one();
            }
            if let Err(e) = self.adapter.stop_scan().await {
                warn!(error = %e, "stop_scan failed");
            }
        }
    }

    /// Connect to a peripheral. An in-flight scan is stopped first — the
    /// radio cannot scan and connect at the same time.
    pub async fn connect(&self, device_id: &str) -> ConnectResult {
        if !self.initialized.load(Ordering::SeqCst) {
            return ConnectResult::failure("bluetooth transport not initialized".into());
        }

        self.stop_scan().await;
        let _gate = self.radio_gate.lock().await;

        match self.adapter.connect(device_id).await {
            Ok(()) => {
                {
                    let mut connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
                    connected.insert(device_id.to_string());
                }
                let device = {
                    let mut discovered =
                        self.discovered.lock().unwrap_or_else(|e| e.into_inner());
                    match discovered.get_mut(device_id) {
                        Some(d) => {
                            d.connected = true;
                            Some(d.clone())
                        }
                        None => Some(DiscoveredDevice {
                            id: device_id.to_string(),
                            name: None,
                            rssi: None,
                            connected: true,
                        }),
                    }
                };
                info!(device = device_id, "Bluetooth device connected");
                ConnectResult {
                    success: true,
                    message: "connected".into(),
                    device,
                }
            }
            Err(e) => {
                warn!(device = device_id, error = %e, "Bluetooth connect failed");
                ConnectResult::failure(e.to_string())
            }
        }
    }

    pub async fn disconnect(&self, device_id: &str) {
        {
            let mut connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
            if !connected.remove(device_id) {
                return;
            }
        }
        {
            let mut discovered = self.discovered.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(d) = discovered.get_mut(device_id) {
                d.connected = false;
            }
        }
        if let Err(e) = self.adapter.disconnect(device_id).await {
            warn!(device = device_id, error = %e, "Bluetooth disconnect failed");
        }
        info!(device = device_id, "Bluetooth device disconnected");
    }

    pub fn is_connected(&self, device_id: &str) -> bool {
        let connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
        connected.contains(device_id)
    }

    /// Write bytes to a connected device's characteristic. Failures log and
    /// return `false`.
    pub async fn write_data(
        &self,
        device_id: &str,
        service_id: &str,
        characteristic_id: &str,
        data: &[u8],
    ) -> bool {
        if !self.is_connected(device_id) {
            warn!(device = device_id, "Bluetooth write to unconnected device");
            return false;
        }
        match self
            .adapter
            .write(device_id, service_id, characteristic_id, data)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!(device = device_id, error = %e, "Bluetooth write failed");
                false
            }
        }
    }

    /// Read bytes from a connected device's characteristic. Failures log
    /// and return `None`.
    pub async fn read_data(
        &self,
        device_id: &str,
        service_id: &str,
        characteristic_id: &str,
    ) -> Option<Vec<u8>> {
        if !self.is_connected(device_id) {
            warn!(device = device_id, "Bluetooth read from unconnected device");
            return None;
        }
        match self
            .adapter
            .read(device_id, service_id, characteristic_id)
            .await
        {
            Ok(data) => Some(data),
            Err(e) => {
                warn!(device = device_id, error = %e, "Bluetooth read failed");
                None
            }
        }
    }

    /// OS-bonded devices; empty on failure.
    pub async fn get_paired_devices(&self) -> Vec<DiscoveredDevice> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Vec::new();
        }
        self.adapter.paired_devices().await
    }

    /// Full reset: disconnect everything, clear discovery/connection state,
    /// drop the initialized flag.
    pub async fn cleanup(&self) {
        self.stop_scan().await;

        let ids: Vec<String> = {
            let connected = self.connected.lock().unwrap_or_else(|e| e.into_inner());
            connected.iter().cloned().collect()
        };
        for id in ids {
            self.disconnect(&id).await;
        }

        self.discovered
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.connected
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.initialized.store(false, Ordering::SeqCst);
        info!("Bluetooth transport cleaned up");
    }
}

impl std::fmt::Debug for BluetoothTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BluetoothTransport")
            .field("initialized", &self.is_initialized())
            .field("scanning", &self.scanning.load(Ordering::SeqCst))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Test adapter
// ---------------------------------------------------------------------------

/// In-memory adapter for tests and hardware-less development. Devices are
/// seeded up front; failure modes are switchable.
pub struct FakeBluetoothAdapter {
    pub devices: Vec<DiscoveredDevice>,
    pub deny_permission: bool,
    pub fail_connect: bool,
    pub fail_write: bool,
    pub writes: Mutex<Vec<(String, Vec<u8>)>>,
}

impl FakeBluetoothAdapter {
    pub fn with_devices(devices: Vec<DiscoveredDevice>) -> Self {
        Self {
            devices,
            deny_permission: false,
            fail_connect: false,
            fail_write: false,
            writes: Mutex::new(Vec::new()),
        }
    }

    pub fn empty() -> Self {
        Self::with_devices(Vec::new())
    }
}

#[async_trait]
impl BluetoothAdapter for FakeBluetoothAdapter {
    async fn power_on(&self) -> Result<(), HardwareError> {
        if self.deny_permission {
            return Err(HardwareError::PermissionDenied("bluetooth".into()));
        }
        Ok(())
    }

    async fn start_scan(&self) -> Result<(), HardwareError> {
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), HardwareError> {
        Ok(())
    }

    async fn discovered(&self) -> Vec<DiscoveredDevice> {
        self.devices.clone()
    }

    async fn paired_devices(&self) -> Vec<DiscoveredDevice> {
        self.devices.iter().filter(|d| d.connected).cloned().collect()
    }

    async fn connect(&self, device_id: &str) -> Result<(), HardwareError> {
        if self.fail_connect {
            return Err(HardwareError::Adapter(format!(
                "connect refused: {device_id}"
            )));
        }
        Ok(())
    }

    async fn disconnect(&self, _device_id: &str) -> Result<(), HardwareError> {
        Ok(())
    }

    async fn write(
        &self,
        device_id: &str,
        _service_id: &str,
        _characteristic_id: &str,
        data: &[u8],
    ) -> Result<(), HardwareError> {
        if self.fail_write {
            return Err(HardwareError::Io(
                TransportKind::Bluetooth,
                "write failed".into(),
            ));
        }
        self.writes
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((device_id.to_string(), data.to_vec()));
        Ok(())
    }

    async fn read(
        &self,
        _device_id: &str,
        _service_id: &str,
        _characteristic_id: &str,
    ) -> Result<Vec<u8>, HardwareError> {
        Ok(vec![0x06]) // ACK
    }
}

// ===========================================================================
// Tests
// ===========================================================================
