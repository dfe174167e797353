//! Scriptable in-memory platform for state-machine and timer tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ble::chunk::FLAG_MORE;
use crate::ble::platform::{
    Advertisement, BlePlatform, LinkEvent, PlatformError, stream_from_channel,
};

type ExchangeKey = (Uuid, Uuid);

pub(crate) struct MockPlatform {
    available: AtomicBool,
    permission: AtomicBool,
    scanning: AtomicBool,
    granted_mtu_cap: AtomicU16,
    hang_connect: AtomicBool,
    hang_discovery: AtomicBool,
    fail_discovery: Mutex<Option<String>>,
    fail_write_at: Mutex<Option<(usize, String)>>,
    writes: Mutex<Vec<(Uuid, Uuid, Vec<u8>)>>,
    scan_tx: Mutex<Option<mpsc::UnboundedSender<Result<Advertisement, PlatformError>>>>,
    link_txs: Mutex<Vec<mpsc::UnboundedSender<LinkEvent>>>,
    notify_txs: Mutex<HashMap<ExchangeKey, mpsc::UnboundedSender<Vec<u8>>>>,
    responses: Mutex<HashMap<ExchangeKey, VecDeque<Vec<Vec<u8>>>>>,
}

impl MockPlatform {
    pub(crate) fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            permission: AtomicBool::new(true),
            scanning: AtomicBool::new(false),
            granted_mtu_cap: AtomicU16::new(517),
            hang_connect: AtomicBool::new(false),
            hang_discovery: AtomicBool::new(false),
            fail_discovery: Mutex::new(None),
            fail_write_at: Mutex::new(None),
            writes: Mutex::new(Vec::new()),
            scan_tx: Mutex::new(None),
            link_txs: Mutex::new(Vec::new()),
            notify_txs: Mutex::new(HashMap::new()),
            responses: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub(crate) fn set_permission(&self, permitted: bool) {
        self.permission.store(permitted, Ordering::SeqCst);
    }

    /// Caps the MTU the platform will grant, regardless of the request.
    pub(crate) fn set_granted_mtu(&self, mtu: u16) {
        self.granted_mtu_cap.store(mtu, Ordering::SeqCst);
    }

    pub(crate) fn hang_connect(&self, hang: bool) {
        self.hang_connect.store(hang, Ordering::SeqCst);
    }

    pub(crate) fn hang_discovery(&self, hang: bool) {
        self.hang_discovery.store(hang, Ordering::SeqCst);
    }

    pub(crate) fn fail_discovery(&self, reason: &str) {
        *self.fail_discovery.lock().unwrap() = Some(reason.to_string());
    }

    /// Fails the write with the given zero-based index.
    pub(crate) fn fail_write_at(&self, index: usize, reason: &str) {
        *self.fail_write_at.lock().unwrap() = Some((index, reason.to_string()));
    }

    pub(crate) fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }

    pub(crate) fn writes(&self) -> Vec<(Uuid, Uuid, Vec<u8>)> {
        self.writes.lock().unwrap().clone()
    }

    /// Injects one advertisement into the running scan.
    pub(crate) fn advertise(&self, adv: Advertisement) {
        if let Some(tx) = self.scan_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Ok(adv));
        }
    }

    /// Injects a hardware-level scan failure.
    pub(crate) fn fail_scan(&self, reason: &str) {
        if let Some(tx) = self.scan_tx.lock().unwrap().as_ref() {
            let _ = tx.send(Err(PlatformError(reason.to_string())));
        }
    }

    /// Queues a response delivered when the next message to the
    /// characteristic completes (its final chunk is written).
    pub(crate) fn respond_on_write(
        &self,
        service: Uuid,
        characteristic: Uuid,
        chunks: Vec<Vec<u8>>,
    ) {
        self.responses
            .lock()
            .unwrap()
            .entry((service, characteristic))
            .or_default()
            .push_back(chunks);
    }

    /// Pushes notification chunks immediately (requires a subscription).
    pub(crate) fn notify(&self, service: Uuid, characteristic: Uuid, chunks: Vec<Vec<u8>>) {
        self.deliver(service, characteristic, chunks);
    }

    /// Reports spontaneous loss of the link to `address`.
    pub(crate) fn drop_link(&self, address: &str) {
        for tx in self.link_txs.lock().unwrap().iter() {
            let _ = tx.send(LinkEvent::Lost {
                address: address.to_string(),
            });
        }
    }

    fn deliver(&self, service: Uuid, characteristic: Uuid, chunks: Vec<Vec<u8>>) {
        if let Some(tx) = self
            .notify_txs
            .lock()
            .unwrap()
            .get(&(service, characteristic))
        {
            for chunk in chunks {
                let _ = tx.send(chunk);
            }
        }
    }
}

#[async_trait]
impl BlePlatform for MockPlatform {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn has_permission(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }

    async fn start_scan(
        &self,
    ) -> Result<BoxStream<'static, Result<Advertisement, PlatformError>>, PlatformError> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.scan_tx.lock().unwrap() = Some(tx);
        self.scanning.store(true, Ordering::SeqCst);
        Ok(stream_from_channel(rx))
    }

    async fn stop_scan(&self) {
        self.scanning.store(false, Ordering::SeqCst);
        *self.scan_tx.lock().unwrap() = None;
    }

    async fn connect(&self, _address: &str) -> Result<(), PlatformError> {
        if self.hang_connect.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn disconnect(&self, _address: &str) {}

    async fn discover_services(&self, _address: &str) -> Result<(), PlatformError> {
        if self.hang_discovery.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if let Some(reason) = self.fail_discovery.lock().unwrap().clone() {
            return Err(PlatformError(reason));
        }
        Ok(())
    }

    async fn request_mtu(&self, _address: &str, requested: u16) -> Result<u16, PlatformError> {
        Ok(requested.min(self.granted_mtu_cap.load(Ordering::SeqCst)))
    }

    async fn write(
        &self,
        _address: &str,
        service: Uuid,
        characteristic: Uuid,
        chunk: &[u8],
    ) -> Result<(), PlatformError> {
        let index = {
            let mut writes = self.writes.lock().unwrap();
            writes.push((service, characteristic, chunk.to_vec()));
            writes.len() - 1
        };
        if let Some((at, reason)) = self.fail_write_at.lock().unwrap().clone() {
            if index == at {
                return Err(PlatformError(reason));
            }
        }
        // Final chunk of a message: deliver the next scripted response.
        if chunk.first().is_some_and(|flags| flags & FLAG_MORE == 0) {
            let response = self
                .responses
                .lock()
                .unwrap()
                .get_mut(&(service, characteristic))
                .and_then(|queue| queue.pop_front());
            if let Some(chunks) = response {
                self.deliver(service, characteristic, chunks);
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        _address: &str,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<BoxStream<'static, Vec<u8>>, PlatformError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.notify_txs
            .lock()
            .unwrap()
            .insert((service, characteristic), tx);
        Ok(stream_from_channel(rx))
    }

    fn link_events(&self) -> BoxStream<'static, LinkEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.link_txs.lock().unwrap().push(tx);
        stream_from_channel(rx)
    }
}
