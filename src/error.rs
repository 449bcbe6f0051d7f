//! Error taxonomy for the POS core.
//!
//! Two families, matching how failures actually propagate:
//! - [`CartError`] — recoverable validation failures from the cart engine.
//!   The engine never panics; the UI reads the error and shows a message.
//! - [`HardwareError`] — peripheral failures. Devices catch these at their
//!   own boundary, log a diagnostic, and degrade to `false`/`None` results,
//!   so a dead printer can never crash a sale.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Cart engine errors
// ---------------------------------------------------------------------------

/// Recoverable validation errors from the cart engine.
///
/// Every failing cart operation both returns one of these and stores it in
/// the engine's last-error slot for the UI to surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Hold or checkout attempted with no items in the cart.
    #[error("cart is empty")]
    EmptyCart,

    /// `retrieve_sale` / `delete_held_sale` called with an unknown id.
    #[error("held sale not found: {0}")]
    HeldSaleNotFound(String),

    /// A discount value outside its legal range (percentage > 100, negative
    /// fixed amount).
    #[error("invalid discount value: {0}")]
    InvalidDiscount(String),
}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

/// Transport families a peripheral can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Bluetooth,
    Usb,
    Serial,
    Network,
    /// Cash drawer relayed through the receipt printer.
    PrinterRelay,
    /// Camera scanner (UI-side component pushes scans in).
    Camera,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransportKind::Bluetooth => "bluetooth",
            TransportKind::Usb => "usb",
            TransportKind::Serial => "serial",
            TransportKind::Network => "network",
            TransportKind::PrinterRelay => "printer",
            TransportKind::Camera => "camera",
        };
        f.write_str(name)
    }
}

/// Peripheral I/O failures.
///
/// `UnsupportedTransport` is deliberately its own variant rather than a
/// logged no-op: callers must be able to tell "this build has no USB path"
/// apart from "the write succeeded".
#[derive(Debug, Clone, Error)]
pub enum HardwareError {
    /// Transport used before `initialize()` succeeded.
    #[error("{0} transport is not initialized")]
    NotInitialized(TransportKind),

    /// Operation needs a live connection the device doesn't have.
    #[error("device not connected: {0}")]
    NotConnected(String),

    /// The platform refused a required permission (e.g. Bluetooth).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The configured transport has no implementation in this core.
    #[error("{kind} transport is not supported for {device}")]
    UnsupportedTransport { device: &'static str, kind: TransportKind },

    /// Byte-level read/write failure on an otherwise live link.
    #[error("{0} I/O failed: {1}")]
    Io(TransportKind, String),

    /// Anything the platform adapter reports that doesn't fit above.
    #[error("adapter error: {0}")]
    Adapter(String),
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cart_error_messages() {
        assert_eq!(CartError::EmptyCart.to_string(), "cart is empty");
        assert_eq!(
            CartError::HeldSaleNotFound("abc".into()).to_string(),
            "held sale not found: abc"
        );
    }

    #[test]
    fn test_unsupported_transport_message() {
        let err = HardwareError::UnsupportedTransport {
            device: "printer",
            kind: TransportKind::Usb,
        };
        assert_eq!(err.to_string(), "usb transport is not supported for printer");
    }

    #[test]
    fn test_transport_kind_display() {
        assert_eq!(TransportKind::PrinterRelay.to_string(), "printer");
        assert_eq!(TransportKind::Network.to_string(), "network");
    }
}
