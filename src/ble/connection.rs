//! Connection lifecycle for one pod.
//!
//! A [`ConnectionManager`] owns the platform link for a single device
//! address: it runs the connect sequence (link, service discovery, MTU
//! negotiation) under one timer, tracks the granted MTU, and reacts to
//! spontaneous link loss. All shared connection state is mutated either by
//! the public API or by the single dispatcher task that drains this
//! connection's event channel, never from raw platform callbacks.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ble::chunk::Reassembler;
use crate::ble::device::BleDevice;
use crate::ble::platform::{BlePlatform, LinkEvent};
use crate::ble::transport::MessageTransport;
use crate::ble::types::{ConnectionState, IncomingMessage};
use crate::config::BleConfig;
use crate::error::BleError;

/// Events the dispatcher task consumes. Forwarder tasks translate platform
/// streams into these; nothing else touches connection state.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    Notification {
        service: Uuid,
        characteristic: Uuid,
        data: Vec<u8>,
    },
    LinkLost,
}

type ExchangeKey = (Uuid, Uuid);

/// State shared between the public API, the transport and the dispatcher.
pub(crate) struct Inner {
    pub(crate) state: ConnectionState,
    pub(crate) device: Option<BleDevice>,
    /// The MTU the platform actually granted. Chunk sizing uses this value,
    /// never the requested one.
    pub(crate) granted_mtu: u16,
    /// At most one awaiting exchange per characteristic.
    pub(crate) pending: HashMap<ExchangeKey, oneshot::Sender<Result<Vec<u8>, BleError>>>,
    pub(crate) reassembly: HashMap<ExchangeKey, Reassembler>,
    pub(crate) subscribed: HashSet<ExchangeKey>,
    pub(crate) cancel: CancellationToken,
    pub(crate) events_tx: Option<mpsc::UnboundedSender<TransportEvent>>,
    incoming_tx: Option<mpsc::UnboundedSender<IncomingMessage>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: ConnectionState::Idle,
            device: None,
            granted_mtu: 0,
            pending: HashMap::new(),
            reassembly: HashMap::new(),
            subscribed: HashSet::new(),
            cancel: CancellationToken::new(),
            events_tx: None,
            incoming_tx: None,
        }
    }

    /// Releases everything tied to the current connection: forwarder tasks,
    /// pending awaits (resolved with `error`), reassembly buffers and
    /// subscriptions.
    fn teardown(&mut self, error: BleError) {
        self.cancel.cancel();
        for (_, waiter) in self.pending.drain() {
            let _ = waiter.send(Err(error.clone()));
        }
        self.reassembly.clear();
        self.subscribed.clear();
        self.events_tx = None;
        self.granted_mtu = 0;
    }
}

/// Manages the connection lifecycle for one target device.
pub struct ConnectionManager {
    platform: Arc<dyn BlePlatform>,
    config: BleConfig,
    inner: Arc<Mutex<Inner>>,
}

impl ConnectionManager {
    pub fn new(platform: Arc<dyn BlePlatform>, config: BleConfig) -> Self {
        Self {
            platform,
            config,
            inner: Arc::new(Mutex::new(Inner::new())),
        }
    }

    pub async fn state(&self) -> ConnectionState {
        self.inner.lock().await.state
    }

    /// The MTU granted during negotiation. `None` outside CONNECTED.
    pub async fn granted_mtu(&self) -> Option<u16> {
        let inner = self.inner.lock().await;
        (inner.state == ConnectionState::Connected).then_some(inner.granted_mtu)
    }

    /// Runs the full connect sequence: physical link, service discovery and
    /// MTU negotiation, all under the configured connect timeout. Resolves
    /// at CONNECTED, or at DISCONNECTED with the failure that got there.
    pub async fn connect(&self, device: &BleDevice) -> Result<(), BleError> {
        if !self.platform.is_available() {
            return Err(BleError::BluetoothNotAvailable);
        }
        if !self.platform.has_permission() {
            return Err(BleError::BluetoothPermissionDenied);
        }

        let (events_tx, events_rx, cancel) = {
            let mut inner = self.inner.lock().await;
            if matches!(
                inner.state,
                ConnectionState::Connecting | ConnectionState::Connected
            ) {
                return Err(BleError::AlreadyConnected);
            }
            inner.state = ConnectionState::Connecting;
            inner.device = Some(device.clone());
            inner.cancel = CancellationToken::new();
            let (tx, rx) = mpsc::unbounded_channel();
            inner.events_tx = Some(tx.clone());
            (tx, rx, inner.cancel.clone())
        };

        info!("connecting to {} ({:?})", device.address, device.name);
        let established = tokio::time::timeout(
            self.config.connect_timeout(),
            self.establish(&device.address),
        )
        .await;

        match established {
            Ok(Ok(granted)) => {
                {
                    let mut inner = self.inner.lock().await;
                    if inner.state != ConnectionState::Connecting {
                        // A concurrent disconnect aborted this attempt.
                        drop(inner);
                        self.platform.disconnect(&device.address).await;
                        return Err(BleError::ConnectionLost);
                    }
                    inner.granted_mtu = granted;
                    inner.state = ConnectionState::Connected;
                }
                self.spawn_dispatcher(events_rx, cancel.clone());
                self.spawn_link_watcher(device.address.clone(), events_tx, cancel);
                info!(
                    "connected to {} (requested MTU {}, granted {granted})",
                    device.address, self.config.mtu
                );
                Ok(())
            }
            Ok(Err(e)) => {
                error!("connecting to {} failed: {e}", device.address);
                self.force_disconnect().await;
                Err(e)
            }
            Err(_elapsed) => {
                warn!(
                    "connecting to {} exceeded {:?}",
                    device.address,
                    self.config.connect_timeout()
                );
                self.force_disconnect().await;
                Err(BleError::ConnectionTimeout)
            }
        }
    }

    async fn establish(&self, address: &str) -> Result<u16, BleError> {
        self.platform.connect(address).await.map_err(|e| {
            debug!("link establishment failed: {e}");
            BleError::ConnectionLost
        })?;
        self.platform
            .discover_services(address)
            .await
            .map_err(|e| BleError::ServiceDiscoveryFailed(e.to_string()))?;
        self.platform
            .request_mtu(address, self.config.mtu)
            .await
            .map_err(|e| BleError::ServiceDiscoveryFailed(format!("mtu negotiation: {e}")))
    }

    /// Tears the connection down. Idempotent: safe from any state, always
    /// ends at DISCONNECTED. Pending awaits resolve with `ConnectionLost`
    /// immediately, not with their own timeout.
    pub async fn disconnect(&self) {
        self.force_disconnect().await;
    }

    async fn force_disconnect(&self) {
        let address = {
            let mut inner = self.inner.lock().await;
            inner.teardown(BleError::ConnectionLost);
            inner.state = ConnectionState::Disconnected;
            inner.device.as_ref().map(|d| d.address.clone())
        };
        if let Some(address) = address {
            self.platform.disconnect(&address).await;
            info!("disconnected from {address}");
        }
    }

    /// A transport borrowing this connection. Fails outside CONNECTED; the
    /// transport itself re-checks state on every call, so it cannot outlive
    /// the connection silently.
    pub async fn transport(&self) -> Result<MessageTransport, BleError> {
        let inner = self.inner.lock().await;
        if inner.state != ConnectionState::Connected {
            return Err(BleError::NotConnected);
        }
        let address = inner
            .device
            .as_ref()
            .map(|d| d.address.clone())
            .ok_or(BleError::NotConnected)?;
        Ok(MessageTransport::new(
            self.platform.clone(),
            self.inner.clone(),
            address,
            self.config.await_timeout(),
        ))
    }

    /// Pod-initiated messages that no pending await correlates to.
    pub async fn incoming_messages(&self) -> mpsc::UnboundedReceiver<IncomingMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.lock().await.incoming_tx = Some(tx);
        rx
    }

    /// The single task applying this connection's events to shared state,
    /// in arrival order.
    fn spawn_dispatcher(
        &self,
        mut events_rx: mpsc::UnboundedReceiver<TransportEvent>,
        cancel: CancellationToken,
    ) {
        let inner = self.inner.clone();
        let platform = self.platform.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = events_rx.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                };
                match event {
                    TransportEvent::Notification {
                        service,
                        characteristic,
                        data,
                    } => {
                        let mut guard = inner.lock().await;
                        let key = (service, characteristic);
                        let complete = guard.reassembly.entry(key).or_default().push(&data);
                        if let Some(payload) = complete {
                            if let Some(waiter) = guard.pending.remove(&key) {
                                let _ = waiter.send(Ok(payload));
                            } else if let Some(incoming) = &guard.incoming_tx {
                                let _ = incoming.send(IncomingMessage {
                                    service,
                                    characteristic,
                                    payload,
                                });
                            } else {
                                debug!(
                                    "unsolicited message on {characteristic} dropped, no receiver installed"
                                );
                            }
                        }
                    }
                    TransportEvent::LinkLost => {
                        let address = {
                            let mut guard = inner.lock().await;
                            if guard.state != ConnectionState::Connected {
                                break;
                            }
                            warn!("link lost while connected");
                            guard.teardown(BleError::ConnectionLost);
                            guard.state = ConnectionState::Disconnected;
                            guard.device.as_ref().map(|d| d.address.clone())
                        };
                        if let Some(address) = address {
                            platform.disconnect(&address).await;
                        }
                        break;
                    }
                }
            }
        });
    }

    /// Forwards platform link-loss reports for our address into the event
    /// channel.
    fn spawn_link_watcher(
        &self,
        address: String,
        events_tx: mpsc::UnboundedSender<TransportEvent>,
        cancel: CancellationToken,
    ) {
        let mut stream = self.platform.link_events();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    event = stream.next() => match event {
                        Some(LinkEvent::Lost { address: lost }) if lost == address => {
                            let _ = events_tx.send(TransportEvent::LinkLost);
                            break;
                        }
                        Some(_) => continue,
                        None => break,
                    },
                }
            }
        });
    }
}
