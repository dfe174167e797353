//! Device discovery.
//!
//! One [`ScanEngine`] drives one scan session at a time: it owns the
//! session timer, de-duplicates sightings by address, and reports progress
//! as a [`ScanUpdate`] stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::ble::device::BleDevice;
use crate::ble::platform::{Advertisement, BlePlatform, PlatformError};
use crate::ble::types::{ScanState, ScanUpdate};
use crate::config::BleConfig;
use crate::error::BleError;

pub struct ScanEngine {
    platform: Arc<dyn BlePlatform>,
    config: BleConfig,
    state: Arc<Mutex<ScanState>>,
    devices: Arc<Mutex<HashMap<String, BleDevice>>>,
    cancel_token: CancellationToken,
    scan_task: Option<JoinHandle<()>>,
}

impl ScanEngine {
    pub fn new(platform: Arc<dyn BlePlatform>, config: BleConfig) -> Self {
        Self {
            platform,
            config,
            state: Arc::new(Mutex::new(ScanState::Idle)),
            devices: Arc::new(Mutex::new(HashMap::new())),
            cancel_token: CancellationToken::new(),
            scan_task: None,
        }
    }

    pub fn state(&self) -> ScanState {
        *self.state.lock().unwrap()
    }

    /// Snapshot of the devices seen so far in the current or last session,
    /// one entry per address.
    pub fn devices(&self) -> Vec<BleDevice> {
        self.devices.lock().unwrap().values().cloned().collect()
    }

    /// Starts a scan session and returns its update stream.
    ///
    /// Hardware and permission problems are reported synchronously and leave
    /// the engine at IDLE. A session already being active fails fast; the
    /// running session and its timer are untouched.
    pub async fn start_scan(&mut self) -> Result<mpsc::UnboundedReceiver<ScanUpdate>, BleError> {
        if !self.platform.is_available() {
            return Err(BleError::BluetoothNotAvailable);
        }
        if !self.platform.has_permission() {
            return Err(BleError::BluetoothPermissionDenied);
        }
        if self.state.lock().unwrap().is_active() {
            return Err(BleError::ScanFailed(
                "a scan session is already active".to_string(),
            ));
        }

        self.devices.lock().unwrap().clear();

        let stream = match self.platform.start_scan().await {
            Ok(stream) => stream,
            Err(e) => {
                error!("platform refused to start scanning: {e}");
                *self.state.lock().unwrap() = ScanState::Failed;
                return Err(BleError::ScanFailed(e.to_string()));
            }
        };

        *self.state.lock().unwrap() = ScanState::Scanning;
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ScanUpdate::State(ScanState::Scanning));

        self.cancel_token = CancellationToken::new();
        let cancel = self.cancel_token.clone();
        let platform = self.platform.clone();
        let state = self.state.clone();
        let devices = self.devices.clone();
        let timeout = self.config.scan_timeout();

        let handle = tokio::spawn(async move {
            Self::scan_task(platform, stream, state, devices, tx, cancel, timeout).await;
        });
        self.scan_task = Some(handle);
        info!("scan session started (timeout {timeout:?})");
        Ok(rx)
    }

    async fn scan_task(
        platform: Arc<dyn BlePlatform>,
        mut stream: BoxStream<'static, Result<Advertisement, PlatformError>>,
        state: Arc<Mutex<ScanState>>,
        devices: Arc<Mutex<HashMap<String, BleDevice>>>,
        tx: mpsc::UnboundedSender<ScanUpdate>,
        cancel: CancellationToken,
        timeout: Duration,
    ) {
        // Armed once for the whole session; sightings do not reset it.
        let timer = tokio::time::sleep(timeout);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(adv)) => {
                        let device = Self::upsert_device(&devices, &adv);
                        debug!(
                            "sighted {} ({:?}, rssi {:?})",
                            device.address, device.name, device.rssi
                        );
                        *state.lock().unwrap() = ScanState::Found;
                        let _ = tx.send(ScanUpdate::Device(device));
                    }
                    Some(Err(e)) => {
                        error!("scan failed: {e}");
                        platform.stop_scan().await;
                        *state.lock().unwrap() = ScanState::Failed;
                        let _ = tx.send(ScanUpdate::Error(BleError::ScanFailed(e.to_string())));
                        let _ = tx.send(ScanUpdate::State(ScanState::Failed));
                        break;
                    }
                    None => {
                        warn!("scan stream ended by the platform");
                        *state.lock().unwrap() = ScanState::Failed;
                        let _ = tx.send(ScanUpdate::Error(BleError::ScanFailed(
                            "scan stream ended unexpectedly".to_string(),
                        )));
                        let _ = tx.send(ScanUpdate::State(ScanState::Failed));
                        break;
                    }
                },
                _ = &mut timer => {
                    info!("scan timed out after {timeout:?}");
                    platform.stop_scan().await;
                    *state.lock().unwrap() = ScanState::Timeout;
                    let _ = tx.send(ScanUpdate::Error(BleError::ScanTimeout));
                    let _ = tx.send(ScanUpdate::State(ScanState::Timeout));
                    break;
                }
                _ = cancel.cancelled() => {
                    platform.stop_scan().await;
                    *state.lock().unwrap() = ScanState::Stopped;
                    let _ = tx.send(ScanUpdate::State(ScanState::Stopped));
                    break;
                }
            }
        }
    }

    fn upsert_device(
        devices: &Mutex<HashMap<String, BleDevice>>,
        adv: &Advertisement,
    ) -> BleDevice {
        let mut map = devices.lock().unwrap();
        map.entry(adv.address.clone())
            .and_modify(|known| known.update_from(adv))
            .or_insert_with(|| BleDevice::from_advertisement(adv))
            .clone()
    }

    /// Ends the current session, transitioning it to STOPPED and cancelling
    /// the session timer. Outside an active session this is a no-op.
    pub async fn stop_scan(&mut self) {
        if !self.state.lock().unwrap().is_active() {
            debug!("stop_scan outside an active session, nothing to do");
            return;
        }
        info!("stopping scan session");
        self.cancel_token.cancel();
        if let Some(handle) = self.scan_task.take() {
            if let Err(e) = handle.await {
                error!("scan task ended abnormally: {e}");
            }
        }
    }
}
