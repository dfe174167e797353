//! BLE behavior configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_SCAN_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_AWAIT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MTU: u16 = 255;

/// Timeouts and the requested MTU for one manager instance.
///
/// A config is handed to a manager at construction and governs it for its
/// whole lifetime; it is never mutated afterwards. The `mtu` field is the
/// *requested* value; the platform may grant less, and chunk sizing always
/// follows the granted value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleConfig {
    /// How long a scan session runs before transitioning to TIMEOUT.
    pub scan_timeout_ms: u64,

    /// Budget for the whole connect sequence: link establishment, service
    /// discovery and MTU negotiation together.
    pub connect_timeout_ms: u64,

    /// Default wait for a correlated response in `MessageTransport::request`.
    pub await_timeout_ms: u64,

    /// MTU to request during connection setup.
    pub mtu: u16,
}

impl Default for BleConfig {
    fn default() -> Self {
        BleConfig {
            scan_timeout_ms: DEFAULT_SCAN_TIMEOUT_MS,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            await_timeout_ms: DEFAULT_AWAIT_TIMEOUT_MS,
            mtu: DEFAULT_MTU,
        }
    }
}

impl BleConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn await_timeout(&self) -> Duration {
        Duration::from_millis(self.await_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = BleConfig::default();
        assert_eq!(config.scan_timeout_ms, 10_000);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.await_timeout_ms, 10_000);
        assert_eq!(config.mtu, 255);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: BleConfig = serde_json::from_str(r#"{"scan_timeout_ms": 1000}"#).unwrap();
        assert_eq!(config.scan_timeout_ms, 1_000);
        assert_eq!(config.connect_timeout_ms, 10_000);
        assert_eq!(config.mtu, 255);
    }
}
