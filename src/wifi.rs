//! Current WiFi association and frequency-band classification.
//!
//! Pods only join 2.4 GHz networks, so the companion warns before sending
//! credentials for a 5 GHz association. The OS-specific status lookup sits
//! behind [`WifiStatusSource`]; band classification is derived here, never
//! taken from the platform.

use std::sync::Arc;

use log::debug;
use serde::Serialize;

/// Everything below this frequency is 2.4 GHz; everything at or above it is
/// treated as 5 GHz or higher.
const BAND_PARTITION_MHZ: u32 = 3000;

/// `true` for 2.4 GHz frequencies. A single numeric comparison, exact at the
/// partition boundary.
pub fn is_24ghz_wifi(frequency_mhz: u32) -> bool {
    frequency_mhz < BAND_PARTITION_MHZ
}

/// Classified WiFi frequency band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WifiBand {
    #[serde(rename = "2.4GHz")]
    Band24Ghz,
    /// 5 GHz and above.
    #[serde(rename = "5GHz")]
    Band5Ghz,
}

/// Raw association data as reported by the OS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiStatus {
    pub ssid: String,
    pub bssid: String,
    pub link_speed_mbps: i32,
    pub network_id: i32,
    pub frequency_mhz: u32,
}

/// The device's current WiFi association, with the derived band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WifiInfo {
    pub ssid: String,
    pub bssid: String,
    pub link_speed_mbps: i32,
    pub network_id: i32,
    pub frequency_mhz: u32,
    pub band: WifiBand,
}

/// Platform lookup for the current WiFi association.
pub trait WifiStatusSource: Send + Sync {
    /// Whether the app holds the permissions needed to read WiFi state.
    fn check_permissions(&self) -> bool;

    /// The current association, or `None` when not associated.
    fn current_wifi(&self) -> Option<WifiStatus>;
}

/// Reads and classifies the current WiFi association.
pub struct WifiInspector {
    source: Arc<dyn WifiStatusSource>,
}

impl WifiInspector {
    pub fn new(source: Arc<dyn WifiStatusSource>) -> Self {
        Self { source }
    }

    pub fn check_wifi_permissions(&self) -> bool {
        self.source.check_permissions()
    }

    /// The current association, or `None` when there is none *or* the
    /// permission check fails. The two causes are not distinguished here;
    /// call [`check_wifi_permissions`](Self::check_wifi_permissions) first
    /// to tell them apart.
    pub fn current_wifi_info(&self) -> Option<WifiInfo> {
        if !self.source.check_permissions() {
            debug!("wifi info unavailable: permission check failed");
            return None;
        }
        let status = self.source.current_wifi()?;
        let band = if is_24ghz_wifi(status.frequency_mhz) {
            WifiBand::Band24Ghz
        } else {
            WifiBand::Band5Ghz
        };
        Some(WifiInfo {
            ssid: status.ssid,
            bssid: status.bssid,
            link_speed_mbps: status.link_speed_mbps,
            network_id: status.network_id,
            frequency_mhz: status.frequency_mhz,
            band,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource {
        permitted: bool,
        status: Option<WifiStatus>,
    }

    impl WifiStatusSource for FixedSource {
        fn check_permissions(&self) -> bool {
            self.permitted
        }

        fn current_wifi(&self) -> Option<WifiStatus> {
            self.status.clone()
        }
    }

    fn association(frequency_mhz: u32) -> WifiStatus {
        WifiStatus {
            ssid: "HomeNet".to_string(),
            bssid: "a4:2b:b0:c1:d2:e3".to_string(),
            link_speed_mbps: 144,
            network_id: 3,
            frequency_mhz,
        }
    }

    #[test]
    fn band_partition_boundaries() {
        assert!(is_24ghz_wifi(2412));
        assert!(!is_24ghz_wifi(5180));
        assert!(is_24ghz_wifi(2999));
        assert!(!is_24ghz_wifi(3000));
    }

    #[test]
    fn derives_band_from_frequency() {
        let inspector = WifiInspector::new(Arc::new(FixedSource {
            permitted: true,
            status: Some(association(2437)),
        }));
        let info = inspector.current_wifi_info().unwrap();
        assert_eq!(info.band, WifiBand::Band24Ghz);
        assert_eq!(info.frequency_mhz, 2437);

        let inspector = WifiInspector::new(Arc::new(FixedSource {
            permitted: true,
            status: Some(association(5745)),
        }));
        assert_eq!(
            inspector.current_wifi_info().unwrap().band,
            WifiBand::Band5Ghz
        );
    }

    #[test]
    fn absent_without_association() {
        let inspector = WifiInspector::new(Arc::new(FixedSource {
            permitted: true,
            status: None,
        }));
        assert!(inspector.current_wifi_info().is_none());
    }

    #[test]
    fn absent_without_permission() {
        let inspector = WifiInspector::new(Arc::new(FixedSource {
            permitted: false,
            status: Some(association(2412)),
        }));
        assert!(!inspector.check_wifi_permissions());
        assert!(inspector.current_wifi_info().is_none());
    }
}
