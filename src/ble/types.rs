//! Shared state and event types for the BLE module.

use uuid::Uuid;

use crate::ble::device::BleDevice;
use crate::error::BleError;

/// Lifecycle of one managed connection. Exactly one current state per
/// manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

/// Lifecycle of one scan session. `Found` is entered per sighting and is not
/// terminal; `Stopped`, `Timeout` and `Failed` end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Scanning,
    Found,
    Stopped,
    Timeout,
    Failed,
}

impl ScanState {
    /// Whether a scan session is currently running.
    pub fn is_active(self) -> bool {
        matches!(self, ScanState::Scanning | ScanState::Found)
    }
}

/// Event stream emitted by a scan session.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanUpdate {
    /// Session state transition.
    State(ScanState),
    /// A device was sighted. Repeated sightings of one address re-emit this
    /// with updated fields.
    Device(BleDevice),
    /// The platform reported a scan failure; the session is over.
    Error(BleError),
}

/// A complete reassembled message that no pending await correlates to:
/// a status push initiated by the pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    pub service: Uuid,
    pub characteristic: Uuid,
    pub payload: Vec<u8>,
}
