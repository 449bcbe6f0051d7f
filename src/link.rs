//! Active connection handle shared by the output peripherals.
//!
//! A configured device resolves its settings into a [`Link`] at initialize
//! time; afterwards every write goes through the same dispatch regardless
//! of whether the bytes travel over a serial port, a TCP socket, or a
//! Bluetooth characteristic.

use serde::{Deserialize, Serialize};

use crate::bluetooth::BluetoothTransport;
use crate::error::HardwareError;
use crate::net::TcpTarget;
use crate::serial::{SerialHandle, SerialPool};
use crate::settings::BluetoothEndpoint;

/// Lifecycle state a device reports for status queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl Default for DeviceStatus {
    fn default() -> Self {
        Self::Disconnected
    }
}

/// A resolved, usable connection to one peripheral.
#[derive(Debug, Clone)]
pub enum Link {
    Serial { handle: SerialHandle },
    Network { target: TcpTarget },
    Bluetooth { endpoint: BluetoothEndpoint },
}

impl Link {
    /// Send raw bytes down the link.
    pub async fn write(
        &self,
        pool: &SerialPool,
        transport: &BluetoothTransport,
        data: &[u8],
    ) -> Result<(), HardwareError> {
        match self {
            Link::Serial { handle } => {
                pool.write(handle, data)?;
                Ok(())
            }
            Link::Network { target } => target.send(data),
            Link::Bluetooth { endpoint } => {
                let ok = transport
                    .write_data(
                        &endpoint.device_address,
                        &endpoint.service_id,
                        &endpoint.characteristic_id,
                        data,
                    )
                    .await;
                if ok {
                    Ok(())
                } else {
                    Err(HardwareError::NotConnected(endpoint.device_address.clone()))
                }
            }
        }
    }

    /// Release whatever the link holds. Network links are connectionless
    /// (one socket per send) so there is nothing to drop.
    pub async fn close(&self, pool: &SerialPool, transport: &BluetoothTransport) {
        match self {
            Link::Serial { handle } => pool.close(handle),
            Link::Network { .. } => {}
            Link::Bluetooth { endpoint } => transport.disconnect(&endpoint.device_address).await,
        }
    }

    /// Whether the link can accept a write right now without re-resolving.
    pub fn is_live(&self, pool: &SerialPool, transport: &BluetoothTransport) -> bool {
        match self {
            Link::Serial { handle } => pool.is_open(handle),
            Link::Network { .. } => true,
            Link::Bluetooth { endpoint } => transport.is_connected(&endpoint.device_address),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
