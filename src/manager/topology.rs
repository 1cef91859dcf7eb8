use std::collections::{HashMap, HashSet};

use tracing::{debug, error, info};

use crate::model::{Device, Folder, Item, State};
use crate::syncthing_client::{
    ApiRequest, ConnectionsResponse, FolderStatus, RemoteCompletion, SyncthingConfig, SystemErrors,
    SystemStatus,
};

use super::{ErrorKind, Manager};

impl Manager {
    /// Learns the host id, mirrors the config, then opens the event stream
    /// identified by `generation`.
    pub(super) async fn activate(&self, generation: u64) {
        let Some(status) = self.fetch::<SystemStatus>(ApiRequest::system_status()).await else {
            self.stop_stream(generation);
            return;
        };
        if !self.is_current_stream(generation) {
            return;
        }
        info!(host = %status.my_id, "Daemon status");
        self.with_state(|state| state.host_id = status.my_id);

        if !self.call_config().await {
            self.stop_stream(generation);
            return;
        }
        self.call_events(generation).await;
    }

    /// Fetches the daemon config and reconciles against it.
    pub(super) async fn call_config(&self) -> bool {
        match self.fetch::<SyncthingConfig>(ApiRequest::system_config()).await {
            Some(config) => {
                self.process_config(&config);
                true
            }
            None => false,
        }
    }

    pub(super) fn spawn_call_config(&self) {
        let manager = self.clone();
        self.spawn(async move {
            manager.call_config().await;
        });
    }

    /// Brings folders and devices in line with `config`.
    ///
    /// Existing items are renamed in place, new ones added and vanished
    /// ones destroyed. Only devices sharing at least one folder are kept.
    pub(super) fn process_config(&self, config: &SyncthingConfig) {
        let host_id = self.host_id();
        let mut members: HashMap<&str, Vec<Folder>> = HashMap::new();
        let mut paused = HashSet::new();

        for folder_config in &config.folders {
            let name = folder_config.display_name();
            let folder = match self.inner.folders.get(&folder_config.id) {
                Some(folder) if folder.path() == folder_config.path.as_deref() => {
                    folder.set_name(name);
                    folder
                }
                existing => {
                    if existing.is_some() {
                        self.inner.folders.destroy(&folder_config.id);
                    }
                    let folder = Folder::new(&folder_config.id, name, folder_config.path.clone());
                    self.inner.folders.add(folder.clone());
                    folder
                }
            };

            if folder_config.paused {
                paused.insert(folder_config.id.as_str());
                folder.set_state(State::Paused);
            } else {
                self.spawn_folder_status(&folder);
            }

            for device in &folder_config.devices {
                members
                    .entry(device.device_id.as_str())
                    .or_default()
                    .push(folder.clone());
            }
        }

        let configured: HashSet<&str> = config.folders.iter().map(|f| f.id.as_str()).collect();
        for id in self.inner.folders.ids() {
            if !configured.contains(id.as_str()) {
                info!(folder = %id, "Folder removed from config");
                self.inner.folders.destroy(&id);
            }
        }

        let mut used = HashSet::new();
        for device_config in &config.devices {
            let id = device_config.device_id.as_str();
            let Some(folders) = members.get(id) else {
                continue;
            };
            used.insert(id);
            let is_host = id == host_id;
            let name = device_config.display_name();

            let device = match self.inner.devices.get(id) {
                Some(device) if device.is_host() == is_host => {
                    device.set_name(name);
                    device
                }
                existing => {
                    if existing.is_some() {
                        self.inner.devices.destroy(id);
                    }
                    let device = if is_host {
                        Device::host(id, name, &self.inner.devices)
                    } else {
                        Device::new(id, name)
                    };
                    self.inner.devices.add(device.clone());
                    device
                }
            };

            if is_host {
                self.sync_host_folders(&device, folders);
            } else {
                if device_config.paused {
                    device.set_state(State::Paused);
                }
                self.sync_completions(&device, folders, &paused);
            }
        }

        for id in self.inner.devices.ids() {
            if !used.contains(id.as_str()) {
                info!(device = %id, "Device no longer shares folders");
                self.inner.devices.destroy(&id);
            }
        }

        self.spawn_call_connections();
    }

    /// The host shows the shared folders themselves.
    fn sync_host_folders(&self, host: &Device, folders: &[Folder]) {
        for folder in folders {
            if host.folders().get(folder.id()).is_none() {
                host.folders().add(folder.clone());
            }
        }
        let wanted: HashSet<&str> = folders.iter().map(|folder| folder.id()).collect();
        for id in host.folders().ids() {
            if !wanted.contains(id.as_str()) {
                host.folders().remove(&id);
            }
        }
    }

    /// Every other device gets one completion proxy per shared folder.
    fn sync_completions(&self, device: &Device, folders: &[Folder], paused: &HashSet<&str>) {
        for folder in folders {
            let proxy = match device.folders().get(folder.id()) {
                Some(proxy) => {
                    proxy.rename_completion(&folder.name(), &device.name());
                    proxy
                }
                None => {
                    let proxy = Folder::completion(folder, device);
                    folder.completions().add(proxy.clone());
                    device.folders().add(proxy.clone());
                    proxy
                }
            };
            if !paused.contains(folder.id()) {
                self.spawn_completion(&proxy);
            }
        }

        let wanted: HashSet<&str> = folders.iter().map(|folder| folder.id()).collect();
        for id in device.folders().ids() {
            if !wanted.contains(id.as_str()) {
                device.folders().destroy(&id);
            }
        }
    }

    pub(super) fn spawn_folder_status(&self, folder: &Folder) {
        let manager = self.clone();
        let folder = folder.clone();
        self.spawn(async move {
            let request = ApiRequest::folder_status(folder.id());
            if let Some(status) = manager.fetch::<FolderStatus>(request).await {
                match State::from_daemon(&status.state) {
                    Some(state) => folder.set_state(state),
                    None => debug!(folder = %folder.id(), state = %status.state, "Unmapped folder state"),
                }
            }
        });
    }

    fn spawn_completion(&self, proxy: &Folder) {
        let Some(device_id) = proxy.device_id() else {
            return;
        };
        let request = ApiRequest::completion(proxy.folder_id(), device_id);
        let manager = self.clone();
        let proxy = proxy.clone();
        self.spawn(async move {
            if let Some(completion) = manager.fetch::<RemoteCompletion>(request).await {
                proxy.set_completion(completion.completion);
            }
        });
    }

    pub(super) fn spawn_call_connections(&self) {
        let manager = self.clone();
        self.spawn(async move { manager.call_connections().await });
    }

    /// Applies the live connection table to every known peer.
    async fn call_connections(&self) {
        let Some(response) = self
            .fetch::<ConnectionsResponse>(ApiRequest::connections())
            .await
        else {
            return;
        };
        let host_id = self.host_id();
        for (id, connection) in &response.connections {
            if *id == host_id {
                continue;
            }
            let Some(device) = self.inner.devices.get(id) else {
                continue;
            };
            let state = if connection.connected {
                State::Idle
            } else if connection.paused {
                State::Paused
            } else {
                State::Disconnected
            };
            device.set_state(state);
            device.determine_state_delayed();
        }
    }

    pub(super) fn spawn_call_errors(&self) {
        let manager = self.clone();
        self.spawn(async move { manager.call_errors().await });
    }

    /// Reports daemon errors newer than the last one seen.
    async fn call_errors(&self) {
        let Some(response) = self.fetch::<SystemErrors>(ApiRequest::system_errors()).await else {
            return;
        };
        for entry in response.errors.unwrap_or_default() {
            let newer = self.with_state(|state| {
                if entry.when > state.last_error_time {
                    state.last_error_time = entry.when;
                    true
                } else {
                    false
                }
            });
            if newer {
                error!(when = %entry.when, message = %entry.message, "{}", ErrorKind::Service);
                self.emit_error(ErrorKind::Service, Some(entry.message));
            }
        }
    }
}
