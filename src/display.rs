//! Customer-facing pole display device.
//!
//! Drives a small character display (typically 2 lines × 20 columns) over
//! Bluetooth, network, or serial. Every message is truncated/padded to the
//! configured column count so partial writes never leave stale characters
//! on screen.
//!
//! Key design goals:
//! - **Fixed-geometry rendering**: each line is exactly `columns` wide
//! - **Welcome on connect, clear on disconnect**: the display never shows
//!   leftovers from a previous session
//! - **Fail-safe**: write failures log and return `false`

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};

use crate::bluetooth::BluetoothTransport;
use crate::error::{HardwareError, TransportKind};
use crate::link::{DeviceStatus, Link};
use crate::net::TcpTarget;
use crate::serial::SerialPool;
use crate::settings::{DisplayConnection, DisplaySettings};

/// Form feed clears the visible area on the common CD5220-style displays.
const CLEAR: u8 = 0x0C;

const SERIAL_TIMEOUT_MS: u64 = 1000;

/// How long `test_display` holds the pattern before reverting to welcome.
const TEST_PATTERN_HOLD: Duration = Duration::from_secs(3);

pub struct CustomerDisplayDevice {
    settings: DisplaySettings,
    pool: Arc<SerialPool>,
    transport: Arc<BluetoothTransport>,
    link: Mutex<Option<Link>>,
    status: Mutex<DeviceStatus>,
}

impl CustomerDisplayDevice {
    pub fn new(
        settings: DisplaySettings,
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

    /// Connect and show the welcome screen.
    pub async fn initialize(&self) -> Result<bool, HardwareError> {
        if !self.settings.enabled {
            self.set_link(None);
            self.set_status(DeviceStatus::Disconnected);
            return Ok(false);
        }

        self.set_status(DeviceStatus::Connecting);

        let link = match &self.settings.connection {
            DisplayConnection::Bluetooth(endpoint) => {
                let result = self.transport.connect(&endpoint.device_address).await;
                if !result.success {
                    warn!(device = %endpoint.device_address, message = %result.message,
                        "Display Bluetooth connect failed");
                    self.set_status(DeviceStatus::Error);
                    return Ok(false);
                }
                Link::Bluetooth {
                    endpoint: endpoint.clone(),
                }
            }
            DisplayConnection::Network { host, port } => {
                let target = TcpTarget::new(host, *port);
                if !target.probe() {
                    warn!(target = %target, "Display network probe failed");
                    self.set_status(DeviceStatus::Error);
                    return Ok(false);
                }
                Link::Network { target }
            }
            DisplayConnection::Serial { port, baud_rate } => {
                match self.pool.open(port, *baud_rate, SERIAL_TIMEOUT_MS) {
                    Ok(handle) => Link::Serial { handle },
                    Err(e) => {
                        warn!(port = %port, error = %e, "Display serial open failed");
                        self.set_status(DeviceStatus::Error);
                        return Ok(false);
                    }
                }
            }
            DisplayConnection::Usb { device } => {
                self.set_status(DeviceStatus::Error);
                warn!(device = %device, "USB customer displays are not supported");
                return Err(HardwareError::UnsupportedTransport {
                    device: "customer display",
                    kind: TransportKind::Usb,
                });
            }
        };

        self.set_link(Some(link));
        self.set_status(DeviceStatus::Connected);
        info!("Customer display connected");
        self.display_welcome().await;
        Ok(true)
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

    // -----------------------------------------------------------------------
    // Rendering
    // -----------------------------------------------------------------------

    /// Truncate or right-pad to exactly `columns` characters.
    fn fit(&self, text: &str) -> String {
        let cols = self.settings.columns;
        let mut out: String = text.chars().take(cols).collect();
        while out.chars().count() < cols {
            out.push(' ');
        }
        out
    }

    fn centered(&self, text: &str) -> String {
        let cols = self.settings.columns;
        let len = text.chars().count().min(cols);
        let pad = (cols - len) / 2;
        let mut out = " ".repeat(pad);
        out.push_str(text);
        self.fit(&out)
    }

    /// Left label, right-aligned value, single line.
    fn spread(&self, label: &str, value: &str) -> String {
        let cols = self.settings.columns;
        let value_len = value.chars().count();
        if value_len >= cols {
            return self.fit(value);
        }
        let label_room = cols - value_len - 1;
        let label_cut: String = label.chars().take(label_room).collect();
        let gap = cols - label_cut.chars().count() - value_len;
        format!("{label_cut}{}{value}", " ".repeat(gap))
    }

    fn render(&self, lines: &[String]) -> Vec<u8> {
        let mut bytes = vec![CLEAR];
        for (i, line) in lines.iter().take(self.settings.lines).enumerate() {
            if i > 0 {
                bytes.extend_from_slice(b"\r\n");
            }
            // Non-ASCII is unmappable on these displays
            bytes.extend(
                self.fit(line)
                    .chars()
                    .map(|c| if c.is_ascii() { c as u8 } else { b'?' }),
            );
        }
        bytes
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Ship pre-formatted lines to the display. Failures log and return
    /// `false`.
    pub async fn display_message(&self, lines: &[String]) -> bool {
        let Some(link) = self.current_link() else {
            warn!("display_message called with no active display link");
            return false;
        };
        let bytes = self.render(lines);
        match link.write(&self.pool, &self.transport, &bytes).await {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Display write failed");
                false
            }
        }
    }

    pub async fn display_welcome(&self) -> bool {
        self.display_message(&[self.centered("Welcome!"), String::new()])
            .await
    }

    pub async fn display_item(&self, name: &str, price: f64) -> bool {
        self.display_message(&[
            self.fit(name),
            self.spread("", &format!("{price:.2}")),
        ])
        .await
    }

    pub async fn display_total(&self, total: f64) -> bool {
        self.display_message(&[
            self.centered("TOTAL"),
            self.spread("Due", &format!("{total:.2}")),
        ])
        .await
    }

    pub async fn display_thank_you(&self) -> bool {
        self.display_message(&[self.centered("Thank you!"), self.centered("Come again")])
            .await
    }

    pub async fn clear(&self) -> bool {
        let Some(link) = self.current_link() else {
            return false;
        };
        link.write(&self.pool, &self.transport, &[CLEAR])
            .await
            .is_ok()
    }

    /// Show a test pattern, hold it, then revert to the welcome screen.
    pub async fn test_display(&self) -> bool {
        let cols = self.settings.columns;
        let pattern: Vec<String> = (0..self.settings.lines)
            .map(|i| if i % 2 == 0 { "*".repeat(cols) } else { "-".repeat(cols) })
            .collect();
        if !self.display_message(&pattern).await {
            return false;
        }
        tokio::time::sleep(TEST_PATTERN_HOLD).await;
        self.display_welcome().await
    }

    /// Clear the screen, then release the link.
    pub async fn disconnect(&self) {
        self.clear().await;
        if let Some(link) = self.current_link() {
            link.close(&self.pool, &self.transport).await;
        }
        self.set_link(None);
        self.set_status(DeviceStatus::Disconnected);
        info!("Customer display disconnected");
    }
}

impl std::fmt::Debug for CustomerDisplayDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerDisplayDevice")
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
    use crate::bluetooth::{DiscoveredDevice, FakeBluetoothAdapter};

    const ADDR: &str = "aa:bb:cc:dd:ee:ff";

    async fn bt_display() -> (Arc<BluetoothTransport>, CustomerDisplayDevice) {
        let adapter = FakeBluetoothAdapter::with_devices(vec![DiscoveredDevice {
            id: ADDR.to_string(),
            name: Some("Pole Display".to_string()),
            rssi: Some(-50),
            connected: false,
        }]);
        let transport = Arc::new(BluetoothTransport::new(Box::new(adapter)));
        transport.initialize().await.unwrap();
        let display = CustomerDisplayDevice::new(
            DisplaySettings {
                enabled: true,
                connection: DisplayConnection::Bluetooth(
                    crate::settings::BluetoothEndpoint::new(ADDR),
                ),
                columns: 20,
                lines: 2,
            },
            Arc::new(SerialPool::new()),
            Arc::clone(&transport),
        );
        (transport, display)
    }

    #[test]
    fn test_fit_truncates_and_pads() {
        let display = CustomerDisplayDevice::new(
            DisplaySettings {
                enabled: true,
                connection: DisplayConnection::Serial {
                    port: "/dev/null".into(),
                    baud_rate: 9600,
                },
                columns: 10,
                lines: 2,
            },
            Arc::new(SerialPool::new()),
            Arc::new(BluetoothTransport::new(Box::new(
                FakeBluetoothAdapter::empty(),
            ))),
        );
        assert_eq!(display.fit("hi"), "hi        ");
        assert_eq!(display.fit("a very long item name"), "a very lon");
        assert_eq!(display.centered("hey"), "   hey    ");
        assert_eq!(display.spread("Due", "9.99"), "Due   9.99");
        // Value always survives intact; label is cut to make room
        assert_eq!(display.spread("long label here", "12.50"), "long 12.50");
    }

    #[test]
    fn test_render_geometry() {
        let display = CustomerDisplayDevice::new(
            DisplaySettings {
                enabled: true,
                connection: DisplayConnection::Serial {
                    port: "/dev/null".into(),
                    baud_rate: 9600,
                },
                columns: 8,
                lines: 2,
            },
            Arc::new(SerialPool::new()),
            Arc::new(BluetoothTransport::new(Box::new(
                FakeBluetoothAdapter::empty(),
            ))),
        );
        let bytes = display.render(&["Total".to_string(), "9.99".to_string()]);
        assert_eq!(bytes[0], CLEAR);
        let text = String::from_utf8(bytes[1..].to_vec()).unwrap();
        assert_eq!(text, "Total   \r\n9.99    ");
    }

    #[tokio::test]
    async fn test_connect_shows_welcome() {
        let (_transport, display) = bt_display().await;
        assert!(display.initialize().await.unwrap());
        assert_eq!(display.status(), DeviceStatus::Connected);
        assert!(display.is_ready());
    }

    #[tokio::test]
    async fn test_messages_require_link() {
        let (_transport, display) = bt_display().await;
        assert!(!display.display_welcome().await);
        assert!(!display.display_total(12.5).await);
        display.initialize().await.unwrap();
        assert!(display.display_item("Coffee", 3.0).await);
        assert!(display.display_total(6.6).await);
        assert!(display.display_thank_you().await);
    }

    #[tokio::test]
    async fn test_disconnect_clears_and_resets() {
        let (transport, display) = bt_display().await;
        display.initialize().await.unwrap();
        display.disconnect().await;
        assert_eq!(display.status(), DeviceStatus::Disconnected);
        assert!(!display.is_ready());
        assert!(!transport.is_connected(ADDR));
    }

    #[tokio::test(start_paused = true)]
    async fn test_test_display_reverts_to_welcome() {
        let (_transport, display) = bt_display().await;
        display.initialize().await.unwrap();
        assert!(display.test_display().await);
    }

    #[tokio::test]
    async fn test_disabled_display_skips_init() {
        let display = CustomerDisplayDevice::new(
            DisplaySettings {
                enabled: false,
                connection: DisplayConnection::Serial {
                    port: "/dev/null".into(),
                    baud_rate: 9600,
                },
                columns: 20,
                lines: 2,
            },
            Arc::new(SerialPool::new()),
            Arc::new(BluetoothTransport::new(Box::new(
                FakeBluetoothAdapter::empty(),
            ))),
        );
        assert!(!display.initialize().await.unwrap());
        assert_eq!(display.status(), DeviceStatus::Disconnected);
    }
}
