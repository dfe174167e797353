//! Discovered peripheral representation.

use serde::Serialize;

use crate::ble::constants::POD_NAME_PREFIX;
use crate::ble::platform::Advertisement;

/// A peripheral sighted during scanning.
///
/// `address` is the natural key: two sightings of the same address update
/// `name`/`rssi` on the existing entity instead of creating a new one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BleDevice {
    /// Platform-unique identifier (MAC address on most platforms).
    pub address: String,
    /// Advertised or cached device name, if any.
    pub name: Option<String>,
    /// Signal strength of the latest sighting.
    pub rssi: Option<i16>,
    /// Raw advertisement bytes when the platform exposes them. Opaque.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_advertisement: Option<Vec<u8>>,
}

impl BleDevice {
    pub fn from_advertisement(adv: &Advertisement) -> Self {
        BleDevice {
            address: adv.address.clone(),
            name: adv.local_name.clone(),
            rssi: adv.rssi,
            raw_advertisement: adv.raw_data.clone(),
        }
    }

    /// Folds a fresh sighting into this entity. Last-seen rssi wins; a
    /// nameless advertisement does not erase a previously seen name.
    pub fn update_from(&mut self, adv: &Advertisement) {
        if adv.local_name.is_some() {
            self.name = adv.local_name.clone();
        }
        if adv.rssi.is_some() {
            self.rssi = adv.rssi;
        }
        if adv.raw_data.is_some() {
            self.raw_advertisement = adv.raw_data.clone();
        }
    }

    /// Whether this looks like an Aivo pod.
    pub fn is_aivo_pod(&self) -> bool {
        self.name
            .as_ref()
            .map(|name| name.starts_with(POD_NAME_PREFIX))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(name: Option<&str>, rssi: Option<i16>) -> Advertisement {
        Advertisement {
            address: "D4:3A:2C:11:22:33".to_string(),
            local_name: name.map(str::to_string),
            rssi,
            raw_data: None,
        }
    }

    #[test]
    fn later_sighting_updates_rssi_and_name() {
        let mut device = BleDevice::from_advertisement(&sighting(Some("Aivo Pod 7F"), Some(-70)));
        device.update_from(&sighting(Some("Aivo Pod 7F v2"), Some(-55)));
        assert_eq!(device.name.as_deref(), Some("Aivo Pod 7F v2"));
        assert_eq!(device.rssi, Some(-55));
    }

    #[test]
    fn nameless_sighting_keeps_known_name() {
        let mut device = BleDevice::from_advertisement(&sighting(Some("Aivo Pod 7F"), Some(-70)));
        device.update_from(&sighting(None, Some(-60)));
        assert_eq!(device.name.as_deref(), Some("Aivo Pod 7F"));
        assert_eq!(device.rssi, Some(-60));
    }

    #[test]
    fn pod_detection_by_name_prefix() {
        let pod = BleDevice::from_advertisement(&sighting(Some("Aivo Pod 7F"), None));
        assert!(pod.is_aivo_pod());
        let other = BleDevice::from_advertisement(&sighting(Some("JBL Flip"), None));
        assert!(!other.is_aivo_pod());
        let unnamed = BleDevice::from_advertisement(&sighting(None, None));
        assert!(!unnamed.is_aivo_pod());
    }
}
