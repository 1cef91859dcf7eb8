use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Clone)]
pub struct SystemStatus {
    #[serde(rename = "myID")]
    pub my_id: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SyncthingConfig {
    #[serde(default)]
    pub folders: Vec<FolderConfig>,
    #[serde(default)]
    pub devices: Vec<DeviceConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FolderConfig {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub devices: Vec<FolderDevice>,
}

impl FolderConfig {
    /// The label, or the id for unlabelled folders.
    pub fn display_name(&self) -> &str {
        match self.label.as_deref().map(str::trim) {
            Some(label) if !label.is_empty() => label,
            _ => &self.id,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FolderDevice {
    #[serde(rename = "deviceID")]
    pub device_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeviceConfig {
    #[serde(rename = "deviceID")]
    pub device_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub paused: bool,
}

impl DeviceConfig {
    pub fn display_name(&self) -> &str {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => &self.device_id,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
pub struct ConnectionsResponse {
    #[serde(default)]
    pub connections: HashMap<String, ConnectionState>,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ConnectionState {
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub paused: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct SystemErrors {
    #[serde(default)]
    pub errors: Option<Vec<SystemError>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SystemError {
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FolderStatus {
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteCompletion {
    pub completion: f64,
}

/// One entry of `/rest/events`. The payload is decoded lazily per type.
#[derive(Debug, Deserialize, Clone)]
pub struct SyncthingEvent {
    pub id: u64,
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_names_fall_back_to_ids() {
        let config: SyncthingConfig = serde_json::from_str(
            r#"{
                "folders": [
                    { "id": "abcd-1234", "label": "", "path": "/data", "devices": [{ "deviceID": "D1" }] },
                    { "id": "docs", "label": "Documents", "paused": true }
                ],
                "devices": [{ "deviceID": "D1", "name": "" }, { "deviceID": "D2", "name": "Laptop" }]
            }"#,
        )
        .unwrap();

        assert_eq!(config.folders[0].display_name(), "abcd-1234");
        assert_eq!(config.folders[1].display_name(), "Documents");
        assert!(config.folders[1].paused);
        assert!(config.folders[1].devices.is_empty());
        assert_eq!(config.devices[0].display_name(), "D1");
        assert_eq!(config.devices[1].display_name(), "Laptop");
    }

    #[test]
    fn system_errors_may_be_null() {
        let errors: SystemErrors = serde_json::from_str(r#"{ "errors": null }"#).unwrap();
        assert!(errors.errors.is_none());

        let errors: SystemErrors = serde_json::from_str(
            r#"{ "errors": [{ "when": "2024-05-01T10:00:00.123456789+02:00", "message": "disk full" }] }"#,
        )
        .unwrap();
        let list = errors.errors.unwrap();
        assert_eq!(list[0].message, "disk full");
        assert_eq!(list[0].when.to_rfc3339(), "2024-05-01T08:00:00.123456789+00:00");
    }
}
