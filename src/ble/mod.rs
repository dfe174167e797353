//! BLE core: device discovery, connection lifecycle, and chunked message
//! transport for Aivo pods.

pub mod chunk;
pub mod connection;
pub mod constants;
pub mod device;
#[cfg(feature = "hardware")]
pub mod hardware;
#[cfg(test)]
pub(crate) mod mock;
pub mod platform;
pub mod scanner;
pub mod transport;
pub mod types;

// Re-export types that should be publicly accessible
pub use connection::ConnectionManager;
pub use device::BleDevice;
#[cfg(feature = "hardware")]
pub use hardware::BluestPlatform;
pub use platform::{Advertisement, BlePlatform, LinkEvent, PlatformError};
pub use scanner::ScanEngine;
pub use transport::MessageTransport;
pub use types::{ConnectionState, IncomingMessage, ScanState, ScanUpdate};
