//! Failure taxonomy shared by every layer of the BLE stack.
//!
//! The set is closed on purpose: callers match on it to decide between
//! retrying, re-scanning, and surfacing the failure to the user, so no
//! catch-all variant exists.

use thiserror::Error;

/// Errors reported by scanning, connection management and the message
/// transport.
///
/// Pre-flight failures (`BluetoothNotAvailable`, `BluetoothPermissionDenied`)
/// are returned synchronously before any async work starts and never touch a
/// state machine. Everything else is surfaced only after the owning state
/// machine has settled in a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BleError {
    /// No usable Bluetooth adapter, or the adapter is powered off.
    #[error("bluetooth is not available")]
    BluetoothNotAvailable,

    /// The application lacks the Bluetooth permissions it needs.
    #[error("bluetooth permission denied")]
    BluetoothPermissionDenied,

    /// The scan window elapsed without an explicit stop.
    #[error("scan timed out")]
    ScanTimeout,

    /// The platform reported a scan failure, or a scan could not start.
    #[error("scan failed: {0}")]
    ScanFailed(String),

    /// Link establishment, service discovery and MTU negotiation did not all
    /// complete within the configured connect timeout.
    #[error("connection attempt timed out")]
    ConnectionTimeout,

    /// The link dropped, or could not be established at all.
    #[error("connection lost")]
    ConnectionLost,

    /// GATT service or characteristic discovery failed after the link came
    /// up.
    #[error("service discovery failed: {0}")]
    ServiceDiscoveryFailed(String),

    /// A chunk write was rejected by the platform; the whole message failed.
    #[error("write failed: {0}")]
    WriteFailed(String),

    /// No complete response arrived within the await timeout.
    #[error("timed out waiting for a response")]
    AwaitTimeout,

    /// The operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// An exchange is already awaiting a response on this characteristic.
    /// The wire protocol carries no request ids, so interleaved exchanges on
    /// one characteristic cannot be told apart.
    #[error("an await is already pending on this characteristic")]
    ConcurrentAwaitNotSupported,

    /// `connect` was called while a connection is active or being
    /// established.
    #[error("a connection is already active or in progress")]
    AlreadyConnected,
}
