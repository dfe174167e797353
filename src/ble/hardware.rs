//! `bluest`-backed platform implementation.
//!
//! Bridges the OS Bluetooth stack into the [`BlePlatform`] seam: scan and
//! notification streams are forwarded through channels by spawned tasks, and
//! the GATT table is cached per address after discovery so writes and
//! subscriptions resolve characteristics without re-walking services.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use log::{debug, error, info, warn};
use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ble::constants::{UUID_PROVISIONING_SERVICE, UUID_PROVISIONING_WRITE_CHAR};
use crate::ble::platform::{
    Advertisement, BlePlatform, LinkEvent, PlatformError, stream_from_channel,
};

pub struct BluestPlatform {
    adapter: Adapter,
    /// Address → live device handle, filled by the scan task.
    devices: Arc<Mutex<HashMap<String, Device>>>,
    /// (address, service, characteristic) → handle, filled by discovery.
    characteristics: Mutex<HashMap<(String, Uuid, Uuid), Characteristic>>,
    link_txs: Arc<Mutex<Vec<mpsc::UnboundedSender<LinkEvent>>>>,
    scan_cancel: Mutex<CancellationToken>,
}

impl BluestPlatform {
    /// Binds to the default adapter and waits for it to become available.
    pub async fn new() -> Result<Self, PlatformError> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| PlatformError("no bluetooth adapter found".to_string()))?;
        adapter
            .wait_available()
            .await
            .map_err(|e| PlatformError(e.to_string()))?;
        info!("bluetooth adapter is available");
        Ok(Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            characteristics: Mutex::new(HashMap::new()),
            link_txs: Arc::new(Mutex::new(Vec::new())),
            scan_cancel: Mutex::new(CancellationToken::new()),
        })
    }

    fn device_for(&self, address: &str) -> Result<Device, PlatformError> {
        self.devices
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .ok_or_else(|| PlatformError(format!("no device known at {address}")))
    }

    fn characteristic_for(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic, PlatformError> {
        self.characteristics
            .lock()
            .unwrap()
            .get(&(address.to_string(), service, characteristic))
            .cloned()
            .ok_or_else(|| {
                PlatformError(format!(
                    "characteristic {characteristic} of service {service} not discovered on {address}"
                ))
            })
    }

    fn report_link_lost(link_txs: &Mutex<Vec<mpsc::UnboundedSender<LinkEvent>>>, address: &str) {
        for tx in link_txs.lock().unwrap().iter() {
            let _ = tx.send(LinkEvent::Lost {
                address: address.to_string(),
            });
        }
    }
}

/// Pulls a MAC address out of a platform device id. macOS ids carry no MAC;
/// the full id string is used as the address there.
fn extract_mac_address(device_id: &str) -> Option<String> {
    let re = Regex::new(r"([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})").unwrap();
    re.find_iter(device_id)
        .last()
        .map(|m| m.as_str().to_uppercase())
}

#[async_trait]
impl BlePlatform for BluestPlatform {
    fn is_available(&self) -> bool {
        // Construction already awaited adapter availability.
        true
    }

    fn has_permission(&self) -> bool {
        // No portable permission query; the OS prompts on first use.
        true
    }

    async fn start_scan(
        &self,
    ) -> Result<BoxStream<'static, Result<Advertisement, PlatformError>>, PlatformError> {
        let cancel = CancellationToken::new();
        *self.scan_cancel.lock().unwrap() = cancel.clone();

        let adapter = self.adapter.clone();
        let devices = self.devices.clone();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut scan_stream = match adapter.scan(&[]).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(Err(PlatformError(e.to_string())));
                    return;
                }
            };
            loop {
                tokio::select! {
                    result = scan_stream.next() => match result {
                        Some(discovered) => {
                            let device = discovered.device;
                            let rssi = discovered.rssi;
                            let name = device.name().ok();
                            let id = device.id().to_string();
                            let address = extract_mac_address(&id).unwrap_or_else(|| id.clone());
                            debug!("sighted {address} ({name:?}, rssi {rssi:?})");
                            devices.lock().unwrap().insert(address.clone(), device);
                            let sent = tx.send(Ok(Advertisement {
                                address,
                                local_name: name,
                                rssi,
                                raw_data: None,
                            }));
                            if sent.is_err() {
                                break;
                            }
                        }
                        None => {
                            warn!("platform scan stream ended");
                            break;
                        }
                    },
                    _ = cancel.cancelled() => break,
                }
            }
        });
        Ok(stream_from_channel(rx))
    }

    async fn stop_scan(&self) {
        self.scan_cancel.lock().unwrap().cancel();
    }

    async fn connect(&self, address: &str) -> Result<(), PlatformError> {
        let device = self.device_for(address)?;
        if device.is_connected().await {
            info!("device {address} already connected");
            return Ok(());
        }
        self.adapter
            .connect_device(&device)
            .await
            .map_err(|e| PlatformError(e.to_string()))
    }

    async fn disconnect(&self, address: &str) {
        self.characteristics
            .lock()
            .unwrap()
            .retain(|(a, _, _), _| a != address);
        let Ok(device) = self.device_for(address) else {
            return;
        };
        if device.is_connected().await {
            if let Err(e) = self.adapter.disconnect_device(&device).await {
                error!("disconnecting {address} failed: {e}");
            }
        }
    }

    async fn discover_services(&self, address: &str) -> Result<(), PlatformError> {
        let device = self.device_for(address)?;
        let services = device
            .services()
            .await
            .map_err(|e| PlatformError(e.to_string()))?;

        let mut discovered = Vec::new();
        for service in &services {
            let service_uuid = service.uuid();
            let characteristics = service
                .characteristics()
                .await
                .map_err(|e| PlatformError(e.to_string()))?;
            for characteristic in characteristics {
                discovered.push((service_uuid, characteristic.uuid(), characteristic));
            }
        }
        debug!(
            "discovered {} characteristics across {} services on {address}",
            discovered.len(),
            services.len()
        );

        let mut cache = self.characteristics.lock().unwrap();
        for (service_uuid, char_uuid, characteristic) in discovered {
            cache.insert(
                (address.to_string(), service_uuid, char_uuid),
                characteristic,
            );
        }
        Ok(())
    }

    async fn request_mtu(&self, address: &str, requested: u16) -> Result<u16, PlatformError> {
        // The OS negotiates the ATT MTU on its own; what it grants shows up
        // as the provisioning write characteristic's write budget.
        let write_char =
            self.characteristic_for(address, UUID_PROVISIONING_SERVICE, UUID_PROVISIONING_WRITE_CHAR)?;
        match write_char.max_write_len() {
            Ok(len) => Ok(requested.min(len.min(usize::from(u16::MAX)) as u16)),
            Err(e) => {
                warn!("platform reported no write budget ({e}), keeping the requested MTU");
                Ok(requested)
            }
        }
    }

    async fn write(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
        chunk: &[u8],
    ) -> Result<(), PlatformError> {
        let target = self.characteristic_for(address, service, characteristic)?;
        target
            .write(chunk)
            .await
            .map_err(|e| PlatformError(e.to_string()))
    }

    async fn subscribe(
        &self,
        address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<BoxStream<'static, Vec<u8>>, PlatformError> {
        let notify_char = self.characteristic_for(address, service, characteristic)?;
        let link_txs = self.link_txs.clone();
        let address_owned = address.to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::spawn(async move {
            let mut notifications = match notify_char.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(PlatformError(e.to_string())));
                    return;
                }
            };
            while let Some(result) = notifications.next().await {
                match result {
                    Ok(value) => {
                        if tx.send(value).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("notification stream error on {address_owned}: {e}");
                        Self::report_link_lost(&link_txs, &address_owned);
                        break;
                    }
                }
            }
            debug!("notification stream for {address_owned} ended");
        });

        ready_rx
            .await
            .map_err(|_| PlatformError("subscription task died".to_string()))??;
        Ok(stream_from_channel(rx))
    }

    fn link_events(&self) -> BoxStream<'static, LinkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.link_txs.lock().unwrap().push(tx);
        stream_from_channel(rx)
    }
}
