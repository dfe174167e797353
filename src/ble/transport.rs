//! Chunked message exchange over a live connection.
//!
//! A [`MessageTransport`] borrows the connection it was created from: it
//! holds no link resources of its own and every operation re-checks that
//! the connection is still CONNECTED. Outgoing payloads are framed into
//! MTU-sized chunks written strictly one at a time; responses are
//! reassembled from the notification stream and correlated to the awaiting
//! call by characteristic.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ble::chunk;
use crate::ble::connection::{Inner, TransportEvent};
use crate::ble::platform::BlePlatform;
use crate::ble::types::ConnectionState;
use crate::error::BleError;

/// Sends and exchanges framed messages on one connection. Created via
/// [`ConnectionManager::transport`](crate::ble::connection::ConnectionManager::transport).
pub struct MessageTransport {
    platform: Arc<dyn BlePlatform>,
    inner: Arc<Mutex<Inner>>,
    address: String,
    await_timeout: Duration,
}

impl MessageTransport {
    pub(crate) fn new(
        platform: Arc<dyn BlePlatform>,
        inner: Arc<Mutex<Inner>>,
        address: String,
        await_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            inner,
            address,
            await_timeout,
        }
    }

    /// Fire-and-forget write. The payload is split into chunks sized to the
    /// granted MTU and written sequentially: chunk N+1 is not issued until
    /// the platform acknowledged chunk N. A failed chunk fails the whole
    /// message; nothing is retried here, the caller owns resending.
    pub async fn send(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<(), BleError> {
        let mtu = self.connected_mtu().await?;
        let chunks = chunk::split_message(payload, mtu)?;
        debug!(
            "sending {} bytes as {} chunk(s) on {characteristic}",
            payload.len(),
            chunks.len()
        );
        for piece in &chunks {
            self.platform
                .write(&self.address, service, characteristic, piece)
                .await
                .map_err(|e| BleError::WriteFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Sends `payload` and waits for the correlated, fully reassembled
    /// response on the same characteristic, up to the manager's configured
    /// await timeout.
    pub async fn request(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
    ) -> Result<Vec<u8>, BleError> {
        self.request_with_timeout(service, characteristic, payload, self.await_timeout)
            .await
    }

    /// [`request`](Self::request) with an explicit per-call timeout.
    ///
    /// At most one exchange may be awaiting per characteristic; a second one
    /// fails with `ConcurrentAwaitNotSupported` (the wire protocol has no
    /// request ids to tell interleaved exchanges apart). Exchanges on
    /// *different* characteristics run concurrently, since buffers and waiters
    /// are keyed per characteristic.
    pub async fn request_with_timeout(
        &self,
        service: Uuid,
        characteristic: Uuid,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, BleError> {
        let key = (service, characteristic);
        let mut response_rx = {
            let mut inner = self.inner.lock().await;
            if inner.state != ConnectionState::Connected {
                return Err(BleError::NotConnected);
            }
            if inner.pending.contains_key(&key) {
                return Err(BleError::ConcurrentAwaitNotSupported);
            }
            let (tx, rx) = oneshot::channel();
            inner.pending.insert(key, tx);
            rx
        };

        if let Err(e) = self.ensure_subscribed(service, characteristic).await {
            self.abandon_exchange(key).await;
            return Err(e);
        }
        if let Err(e) = self.send(service, characteristic, payload).await {
            self.abandon_exchange(key).await;
            return Err(e);
        }

        match tokio::time::timeout(timeout, &mut response_rx).await {
            Ok(Ok(result)) => result,
            // The dispatcher dropped the waiter without resolving it; only
            // teardown does that, and teardown resolves first, so treat it
            // as a lost connection.
            Ok(Err(_)) => Err(BleError::ConnectionLost),
            Err(_elapsed) => {
                self.abandon_exchange(key).await;
                // The response may have landed between the timer firing and
                // the pending slot being removed; a resolved exchange never
                // times out.
                match response_rx.try_recv() {
                    Ok(result) => result,
                    Err(_) => {
                        warn!("await on {characteristic} timed out after {timeout:?}");
                        Err(BleError::AwaitTimeout)
                    }
                }
            }
        }
    }

    async fn connected_mtu(&self) -> Result<u16, BleError> {
        let inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected {
            return Err(BleError::NotConnected);
        }
        Ok(inner.granted_mtu)
    }

    /// Drops the pending waiter and any partial response for `key`.
    async fn abandon_exchange(&self, key: (Uuid, Uuid)) {
        let mut inner = self.inner.lock().await;
        inner.pending.remove(&key);
        inner.reassembly.remove(&key);
    }

    /// Subscribes to the characteristic's notifications once per connection
    /// and forwards them into the connection's event channel.
    async fn ensure_subscribed(
        &self,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<(), BleError> {
        let key = (service, characteristic);
        let (events_tx, cancel) = {
            let mut inner = self.inner.lock().await;
            if inner.state != ConnectionState::Connected {
                return Err(BleError::NotConnected);
            }
            if !inner.subscribed.insert(key) {
                return Ok(());
            }
            let events_tx = match &inner.events_tx {
                Some(tx) => tx.clone(),
                None => return Err(BleError::NotConnected),
            };
            (events_tx, inner.cancel.clone())
        };

        let stream = match self
            .platform
            .subscribe(&self.address, service, characteristic)
            .await
        {
            Ok(stream) => stream,
            Err(e) => {
                self.inner.lock().await.subscribed.remove(&key);
                return Err(BleError::ServiceDiscoveryFailed(e.to_string()));
            }
        };
        tokio::spawn(forward_notifications(
            stream,
            service,
            characteristic,
            events_tx,
            cancel,
        ));
        Ok(())
    }
}

async fn forward_notifications(
    mut stream: BoxStream<'static, Vec<u8>>,
    service: Uuid,
    characteristic: Uuid,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            item = stream.next() => match item {
                Some(data) => {
                    let event = TransportEvent::Notification {
                        service,
                        characteristic,
                        data,
                    };
                    if events_tx.send(event).is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }
    debug!("notification forwarding for {characteristic} ended");
}
