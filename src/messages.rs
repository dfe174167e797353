//! Provisioning payloads carried over the message transport.
//!
//! Messages are JSON with an external `type` tag, matching what the pod
//! firmware parses. The transport itself is payload-agnostic; these types
//! are the schema the companion speaks.

use serde::{Deserialize, Serialize};

/// One provisioning exchange payload, companion ↔ pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisioningMessage {
    DeviceConfig(DeviceConfig),
    WifiCredentials(WifiCredentials),
    PresetSelection(PresetSelection),
    DeviceStatus(DeviceStatus),
}

/// Basic pod setup pushed during onboarding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub device_name: String,
    /// BCP-47 tag, e.g. "en-US".
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
}

/// WiFi credentials for the pod to join. Pods are 2.4 GHz only; the caller
/// is expected to have warned about 5 GHz associations beforehand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WifiCredentials {
    pub ssid: String,
    pub password: String,
    #[serde(default)]
    pub hidden: bool,
}

/// Selects the active conversational preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetSelection {
    pub preset_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,
}

/// Status reply the pod sends after a provisioning command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub firmware: String,
    pub provisioned: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_percent: Option<u8>,
}

impl ProvisioningMessage {
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_format_is_type_tagged() {
        let message = ProvisioningMessage::WifiCredentials(WifiCredentials {
            ssid: "HomeNet".to_string(),
            password: "hunter2".to_string(),
            hidden: false,
        });
        let json: serde_json::Value =
            serde_json::from_slice(&message.to_bytes().unwrap()).unwrap();
        assert_eq!(json["type"], "wifi_credentials");
        assert_eq!(json["ssid"], "HomeNet");
    }

    #[test]
    fn status_reply_parses() {
        let bytes =
            br#"{"type":"device_status","firmware":"1.4.2","provisioned":true,"battery_percent":88}"#;
        let message = ProvisioningMessage::from_bytes(bytes).unwrap();
        assert_eq!(
            message,
            ProvisioningMessage::DeviceStatus(DeviceStatus {
                firmware: "1.4.2".to_string(),
                provisioned: true,
                battery_percent: Some(88),
            })
        );
    }
}
