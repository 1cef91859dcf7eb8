use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::{SyncthingConfig, SyncthingEvent};

/// The daemon events the manager reacts to.
#[derive(Debug, Clone)]
pub enum DaemonEvent {
    StartupComplete,
    ConfigSaved(SyncthingConfig),
    LoginAttempt { success: bool, username: String },
    FolderErrors { folder: String },
    FolderCompletion { folder: String, device: String, completion: f64 },
    FolderSummary { folder: String, state: String },
    FolderPaused { folder: String },
    FolderResumed { folder: String },
    PendingFoldersChanged,
    StateChanged { folder: String, to: String },
    DeviceResumed { device: String },
    DevicePaused { device: String },
    DeviceConnected { device: String },
    DeviceDisconnected { device: String },
    PendingDevicesChanged,
    /// Any event type without a handler.
    Ignored(String),
}

#[derive(Deserialize)]
struct FolderRef {
    folder: String,
}

#[derive(Deserialize)]
struct IdRef {
    id: String,
}

#[derive(Deserialize)]
struct DeviceRef {
    device: String,
}

#[derive(Deserialize)]
struct Completion {
    folder: String,
    device: String,
    completion: f64,
}

#[derive(Deserialize)]
struct Summary {
    folder: String,
    summary: SummaryState,
}

#[derive(Deserialize)]
struct SummaryState {
    #[serde(default)]
    state: String,
}

#[derive(Deserialize)]
struct StateChange {
    folder: String,
    #[serde(default)]
    to: String,
}

#[derive(Deserialize)]
struct Login {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    username: String,
}

impl SyncthingEvent {
    /// Decode the payload according to the event type.
    pub fn decode(&self) -> Result<DaemonEvent, serde_json::Error> {
        let event = match self.event_type.as_str() {
            "StartupComplete" => DaemonEvent::StartupComplete,
            "ConfigSaved" => DaemonEvent::ConfigSaved(self.payload()?),
            "LoginAttempt" => {
                let Login { success, username } = self.payload()?;
                DaemonEvent::LoginAttempt { success, username }
            }
            "FolderErrors" => DaemonEvent::FolderErrors {
                folder: self.payload::<FolderRef>()?.folder,
            },
            "FolderCompletion" => {
                let Completion {
                    folder,
                    device,
                    completion,
                } = self.payload()?;
                DaemonEvent::FolderCompletion {
                    folder,
                    device,
                    completion,
                }
            }
            "FolderSummary" => {
                let Summary { folder, summary } = self.payload()?;
                DaemonEvent::FolderSummary {
                    folder,
                    state: summary.state,
                }
            }
            "FolderPaused" => DaemonEvent::FolderPaused {
                folder: self.payload::<IdRef>()?.id,
            },
            "FolderResumed" => DaemonEvent::FolderResumed {
                folder: self.payload::<IdRef>()?.id,
            },
            "PendingFoldersChanged" => DaemonEvent::PendingFoldersChanged,
            "StateChanged" => {
                let StateChange { folder, to } = self.payload()?;
                DaemonEvent::StateChanged { folder, to }
            }
            "DeviceResumed" => DaemonEvent::DeviceResumed {
                device: self.payload::<DeviceRef>()?.device,
            },
            "DevicePaused" => DaemonEvent::DevicePaused {
                device: self.payload::<DeviceRef>()?.device,
            },
            "DeviceConnected" => DaemonEvent::DeviceConnected {
                device: self.payload::<IdRef>()?.id,
            },
            "DeviceDisconnected" => DaemonEvent::DeviceDisconnected {
                device: self.payload::<IdRef>()?.id,
            },
            "PendingDevicesChanged" => DaemonEvent::PendingDevicesChanged,
            other => DaemonEvent::Ignored(other.to_string()),
        };
        Ok(event)
    }

    fn payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: &str) -> SyncthingEvent {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn decodes_folder_completion() {
        let decoded = event(
            r#"{ "id": 7, "type": "FolderCompletion", "time": "2024-05-01T10:00:00Z",
                 "data": { "folder": "docs", "device": "PEER-1", "completion": 42.5, "needBytes": 10 } }"#,
        )
        .decode()
        .unwrap();

        match decoded {
            DaemonEvent::FolderCompletion {
                folder,
                device,
                completion,
            } => {
                assert_eq!(folder, "docs");
                assert_eq!(device, "PEER-1");
                assert_eq!(completion, 42.5);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn device_connection_events_use_the_id_field() {
        let decoded = event(r#"{ "id": 8, "type": "DeviceConnected", "data": { "id": "PEER-1", "addr": "1.2.3.4" } }"#)
            .decode()
            .unwrap();
        assert!(matches!(decoded, DaemonEvent::DeviceConnected { device } if device == "PEER-1"));
    }

    #[test]
    fn malformed_payload_is_an_error() {
        let result = event(r#"{ "id": 9, "type": "StateChanged", "data": { "from": "idle" } }"#).decode();
        assert!(result.is_err());
    }

    #[test]
    fn unknown_types_are_ignored() {
        let decoded = event(r#"{ "id": 10, "type": "ItemStarted", "data": {} }"#)
            .decode()
            .unwrap();
        assert!(matches!(decoded, DaemonEvent::Ignored(kind) if kind == "ItemStarted"));
    }
}
