//! Tillpoint POS core.
//!
//! The backend engine behind a point-of-sale terminal: a synchronous
//! cart/pricing engine (items, discounts, per-line tax, hold/retrieve,
//! transaction assembly) and an async hardware layer that drives the
//! physical peripherals — thermal printer, barcode scanner, cash drawer,
//! and customer display — over Bluetooth, network, and serial transports.
//!
//! The UI shell embeds this crate, feeds the [`cart::CartEngine`] with
//! validated inputs, and hands each completed sale to the
//! [`coordinator::HardwareCoordinator`] for printing and peripheral
//! fan-out. Platform Bluetooth bindings plug in behind
//! [`bluetooth::BluetoothAdapter`].

pub mod bluetooth;
pub mod cart;
pub mod coordinator;
pub mod display;
pub mod drawer;
pub mod error;
pub mod escpos;
pub mod link;
pub mod net;
pub mod printer;
pub mod receipt;
pub mod scanner;
pub mod serial;
pub mod settings;

pub use bluetooth::{BluetoothAdapter, BluetoothTransport, ConnectResult, DiscoveredDevice};
pub use cart::{
    CartEngine, CartLineItem, CartTotals, Discount, DiscountType, PaymentMethod, Transaction,
};
pub use coordinator::{HardwareCoordinator, HardwareStatus, SaleCompletion};
pub use error::{CartError, HardwareError, TransportKind};
pub use link::DeviceStatus;
pub use receipt::ReceiptData;
pub use scanner::{BarcodeFormat, ScanResult, ScanSource};
pub use settings::HardwareSettings;
