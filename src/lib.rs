//! BLE provisioning and messaging layer for Aivo conversational-AI devices.
//!
//! The crate covers the companion side of pod onboarding: discovering
//! nearby pods, establishing a connection, negotiating the MTU, and
//! exchanging structured provisioning messages (device configuration, WiFi
//! credentials, preset selection) over GATT. The OS Bluetooth stack sits
//! behind [`ble::BlePlatform`]; the `hardware` feature provides a
//! `bluest`-backed implementation.
//!
//! Typical flow:
//!
//! ```text
//! ScanEngine::start_scan  ──▶  pick a BleDevice
//!                               │
//! ConnectionManager::connect ◀──┘
//!         │ (CONNECTED, MTU granted)
//!         ▼
//! ConnectionManager::transport ──▶ send / request exchanges
//!         │
//! ConnectionManager::disconnect
//! ```

// Module declarations
pub mod ble;
pub mod config;
pub mod error;
pub mod logging;
pub mod messages;
pub mod wifi;

// Re-export the types most callers touch
pub use ble::{
    Advertisement, BleDevice, BlePlatform, ConnectionManager, ConnectionState, IncomingMessage,
    LinkEvent, MessageTransport, PlatformError, ScanEngine, ScanState, ScanUpdate,
};
#[cfg(feature = "hardware")]
pub use ble::BluestPlatform;
pub use config::BleConfig;
pub use error::BleError;
pub use messages::ProvisioningMessage;
pub use wifi::{WifiInfo, WifiInspector, is_24ghz_wifi};
