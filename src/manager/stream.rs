use tracing::{debug, error, info, warn};

use crate::model::{Item, State};
use crate::syncthing_client::{ApiRequest, DaemonEvent, SyncthingEvent};

use super::{ErrorKind, Manager, ManagerEvent, STREAM_REARM_DELAY};

impl Manager {
    /// Restarts the event stream from the current cursor, unless it runs.
    pub(super) fn ensure_stream(&self) {
        let generation = self.with_state(|state| {
            (!std::mem::replace(&mut state.stream_active, true)).then_some(state.stream_generation)
        });
        if let Some(generation) = generation {
            info!("Restarting event stream");
            self.spawn_events(generation);
        }
    }

    fn spawn_events(&self, generation: u64) {
        let manager = self.clone();
        self.spawn(async move { manager.call_events(generation).await });
    }

    /// One long-poll of `/rest/events`, then the next one is scheduled.
    ///
    /// Without a cursor only the newest event is requested. Events are
    /// handled in order and the cursor follows every event, including ones
    /// that failed to decode. A stream detached while its request was in
    /// flight drops the response and stops.
    pub(super) async fn call_events(&self, generation: u64) {
        let Some((cursor, timeout)) = self.with_state(|state| {
            (state.stream_generation == generation).then_some((state.last_event_id, state.event_timeout))
        }) else {
            return;
        };
        let request = if cursor <= 1 {
            ApiRequest::latest_event(timeout)
        } else {
            ApiRequest::events_since(cursor, timeout)
        };

        let Some(events) = self.fetch::<Vec<SyncthingEvent>>(request).await else {
            self.stop_stream(generation);
            return;
        };
        if !self.is_current_stream(generation) {
            debug!(generation, dropped = events.len(), "Stream detached, dropping events");
            return;
        }

        for event in &events {
            debug!(id = event.id, kind = %event.event_type, "Processing event");
            match event.decode() {
                Ok(decoded) => self.handle_event(decoded),
                Err(err) => {
                    warn!(id = event.id, kind = %event.event_type, error = ?err, "Event processing failed")
                }
            }
            self.with_state(|state| state.last_event_id = event.id);
        }

        if !self.requests_allowed() || !self.is_current_stream(generation) {
            self.stop_stream(generation);
            return;
        }
        self.rearm_stream(generation);
    }

    fn rearm_stream(&self, generation: u64) {
        let weak = self.downgrade();
        self.inner
            .stream_timer
            .run(STREAM_REARM_DELAY, false, move || {
                let weak = weak.clone();
                async move {
                    if let Some(manager) = Manager::from_weak(&weak) {
                        manager.spawn_events(generation);
                    }
                }
            });
    }

    pub(super) fn is_current_stream(&self, generation: u64) -> bool {
        self.with_state(|state| state.stream_generation == generation)
    }

    /// Marks the stream stopped, unless a newer one took over already.
    pub(super) fn stop_stream(&self, generation: u64) {
        self.with_state(|state| {
            if state.stream_generation == generation {
                state.stream_active = false;
            }
        });
    }

    fn handle_event(&self, event: DaemonEvent) {
        match event {
            DaemonEvent::StartupComplete
            | DaemonEvent::PendingFoldersChanged
            | DaemonEvent::PendingDevicesChanged => self.spawn_call_config(),
            DaemonEvent::ConfigSaved(config) => self.process_config(&config),
            DaemonEvent::LoginAttempt { success: true, username } => {
                info!(username = %username, "Login");
                self.emit(ManagerEvent::Login { username });
            }
            DaemonEvent::LoginAttempt { success: false, username } => {
                error!(username = %username, "{}", ErrorKind::Login);
                self.emit_error(ErrorKind::Login, Some(username));
            }
            DaemonEvent::FolderErrors { folder } => self.set_folder_state(&folder, State::Erroneous),
            DaemonEvent::FolderCompletion {
                folder,
                device,
                completion,
            } => {
                if !self.inner.folders.exists(&folder) {
                    return;
                }
                let Some(device) = self.inner.devices.get(&device) else {
                    return;
                };
                if let Some(proxy) = device.folders().get(&folder) {
                    if device.is_online() {
                        device.set_state(State::Scanning);
                    }
                    proxy.set_completion(completion);
                }
            }
            DaemonEvent::FolderSummary { folder, state } | DaemonEvent::StateChanged { folder, to: state } => {
                match State::from_daemon(&state) {
                    Some(state) => self.set_folder_state(&folder, state),
                    None => debug!(folder = %folder, state = %state, "Unmapped folder state"),
                }
            }
            DaemonEvent::FolderPaused { folder } => self.set_folder_state(&folder, State::Paused),
            DaemonEvent::FolderResumed { folder } => {
                if let Some(folder) = self.inner.folders.get(&folder) {
                    self.spawn_folder_status(&folder);
                }
            }
            DaemonEvent::DeviceResumed { device } | DaemonEvent::DeviceDisconnected { device } => {
                self.set_device_state(&device, State::Disconnected)
            }
            DaemonEvent::DevicePaused { device } => self.set_device_state(&device, State::Paused),
            DaemonEvent::DeviceConnected { device } => self.set_device_state(&device, State::Idle),
            DaemonEvent::Ignored(kind) => debug!(kind = %kind, "Event ignored"),
        }
    }

    fn set_folder_state(&self, id: &str, state: State) {
        if let Some(folder) = self.inner.folders.get(id) {
            folder.set_state(state);
        }
    }

    fn set_device_state(&self, id: &str, state: State) {
        if let Some(device) = self.inner.devices.get(id) {
            device.set_state(state);
        }
    }
}
