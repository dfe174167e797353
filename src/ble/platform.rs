//! The seam between the BLE state machines and the OS Bluetooth stack.
//!
//! Everything the hardware can do is behind [`BlePlatform`]. Unsolicited
//! hardware callbacks (advertisements, notifications, link loss) surface as
//! streams; operations with a single completion (connect, write, discovery)
//! are async calls that resolve on the platform's acknowledgement.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream};
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

/// Failure reported by a platform backend, before any protocol-phase
/// classification.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct PlatformError(pub String);

/// One raw sighting from the platform scan stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub local_name: Option<String>,
    pub rssi: Option<i16>,
    /// Raw advertisement bytes where the platform exposes them.
    pub raw_data: Option<Vec<u8>>,
}

/// Unsolicited connection-level event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The physical link to `address` dropped without a local disconnect
    /// call.
    Lost { address: String },
}

/// OS Bluetooth stack operations used by the scan engine, connection
/// manager and transport.
///
/// Implementations must deliver stream items in the order the hardware
/// reported them and resolve each async call exactly once.
#[async_trait]
pub trait BlePlatform: Send + Sync + 'static {
    /// Pre-flight: an adapter exists and is powered.
    fn is_available(&self) -> bool;

    /// Pre-flight: the app holds the Bluetooth permissions it needs.
    fn has_permission(&self) -> bool;

    /// Starts scanning. Items arrive until the stream is dropped or
    /// [`stop_scan`](Self::stop_scan) is called; an `Err` item is a
    /// hardware-level scan failure.
    async fn start_scan(
        &self,
    ) -> Result<BoxStream<'static, Result<Advertisement, PlatformError>>, PlatformError>;

    /// Stops an active scan. No-op when idle.
    async fn stop_scan(&self);

    /// Establishes the physical link; resolves once the link is up.
    async fn connect(&self, address: &str) -> Result<(), PlatformError>;

    /// Tears the link down. Safe to call when not connected.
    async fn disconnect(&self, address: &str);

    /// Walks GATT services and characteristics; resolves once the table is
    /// cached for `address`.
    async fn discover_services(&self, address: &str) -> Result<(), PlatformError>;

    /// Requests `requested` MTU and returns the value the platform actually
    /// granted, which may be smaller.
    async fn request_mtu(&self, address: &str, requested: u16) -> Result<u16, PlatformError>;

    /// Writes one chunk; resolves on the platform's write acknowledgement.
    async fn write(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
        chunk: &[u8],
    ) -> Result<(), PlatformError>;

    /// Subscribes to notifications on a characteristic.
    async fn subscribe(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<BoxStream<'static, Vec<u8>>, PlatformError>;

    /// Unsolicited link events. Each call returns an independent stream.
    fn link_events(&self) -> BoxStream<'static, LinkEvent>;
}

/// Adapts a channel receiver into the stream type the trait wants. Glue for
/// backends that bridge platform callbacks through channels.
pub fn stream_from_channel<T: Send + 'static>(
    mut rx: UnboundedReceiver<T>,
) -> BoxStream<'static, T> {
    Box::pin(stream::poll_fn(move |cx| rx.poll_recv(cx)))
}
