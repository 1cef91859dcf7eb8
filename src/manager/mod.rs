//! The reconciliation core: watches the daemon's service unit, mirrors its
//! folders and devices, and republishes everything as [`ManagerEvent`]s.

mod poll;
mod service;
mod stream;
mod topology;
mod transport;

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::config::Config;
use crate::model::{lock, CollectionEvent, Device, Folder, Item, ItemCollection};
use crate::service::{ServiceControl, ServiceScope, Systemctl};
use crate::settings::Settings;
use crate::signals::{Emitter, SubscriptionId};
use crate::syncthing_client::{ApiRequest, HttpClient, Transport};
use crate::timer::Timer;
use crate::types::MonitorError;

/// Period of the state poll.
pub const POLL_INTERVAL: Duration = Duration::from_secs(20);
/// Every n-th poll re-checks enablement and the connection table.
pub const POLL_CONNECTION_HOOK: u64 = 6;
/// Every n-th poll re-fetches and reconciles the daemon config.
pub const POLL_CONFIG_HOOK: u64 = 45;
/// Delay before a timed out request is sent again.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);
/// Delay before the next long-poll of the event stream.
pub const STREAM_REARM_DELAY: Duration = Duration::from_millis(50);
/// Debounce for [`Manager::apply_settings`].
pub const SETTINGS_DELAY: Duration = Duration::from_millis(500);
/// Delay before re-checking the unit after start or stop.
pub const SERVICE_SETTLE_DELAY: Duration = Duration::from_secs(1);
/// Consecutive request failures that put the manager in the error state.
pub const MAX_CONNECTION_ERRORS: u32 = 3;

/// Service and connectivity transitions. Each is published on the edge only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceState {
    Active(ServiceScope),
    Stopped(ServiceScope),
    Enabled(ServiceScope),
    Disabled(ServiceScope),
    Connected,
    Disconnected,
    /// Terminal until the next [`Manager::attach`].
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Login,
    Daemon,
    Service,
    Stream,
    Connection,
    Config,
}

impl ErrorKind {
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::Login => "Login attempt failed",
            ErrorKind::Daemon => "Service failed to start",
            ErrorKind::Service => "Service reported error",
            ErrorKind::Stream => "Stream parsing error",
            ErrorKind::Connection => "Connection status error",
            ErrorKind::Config => "Config not found",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEvent {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

impl fmt::Display for ErrorEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.kind, message),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// Everything the manager publishes to its subscribers.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    ServiceChange(ServiceState),
    Error(ErrorEvent),
    Login { username: String },
    FolderAdd(Folder),
    DeviceAdd(Device),
    HostAdd(Device),
}

/// Handle to the reconciliation core. Clones share the same state.
#[derive(Clone)]
pub struct Manager {
    inner: Arc<ManagerInner>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("folders", &self.inner.folders.len())
            .field("devices", &self.inner.devices.len())
            .field("events", &self.inner.events)
            .finish()
    }
}

struct ManagerInner {
    transport: Arc<dyn Transport>,
    service: Arc<dyn ServiceControl>,
    config: tokio::sync::Mutex<Config>,
    folders: ItemCollection<Folder>,
    devices: ItemCollection<Device>,
    state: Mutex<ManagerState>,
    poll_timer: Timer,
    stream_timer: Timer,
    service_timer: Timer,
    settings_timer: Timer,
    requests: Mutex<JoinSet<()>>,
    events: Emitter<ManagerEvent>,
}

#[derive(Debug)]
struct ManagerState {
    unit: String,
    event_timeout: Duration,
    host_id: String,
    host: Option<Device>,
    poll_count: u64,
    last_event_id: u64,
    last_error_time: DateTime<Utc>,
    connection_errors: u32,
    connection_failed: bool,
    service_scope: Option<ServiceScope>,
    service_failed: bool,
    service_active: bool,
    service_enabled: bool,
    service_connected: bool,
    stream_active: bool,
    /// Set by attach: the next check of a running service reloads the
    /// topology even without an edge.
    needs_activation: bool,
    /// Identifies the current event stream; a long-poll started under an
    /// older value drops its results.
    stream_generation: u64,
}

impl ManagerState {
    fn new(settings: &Settings) -> Self {
        Self {
            unit: settings.service_name.clone(),
            event_timeout: settings.event_timeout(),
            host_id: String::new(),
            host: None,
            poll_count: 0,
            last_event_id: 1,
            last_error_time: Utc::now(),
            connection_errors: 0,
            connection_failed: false,
            service_scope: None,
            service_failed: false,
            service_active: false,
            service_enabled: false,
            service_connected: false,
            stream_active: false,
            needs_activation: false,
            stream_generation: 0,
        }
    }

    /// Detaches the running event stream, if any.
    fn end_stream(&mut self) {
        self.stream_generation += 1;
        self.stream_active = false;
    }
}

impl Manager {
    pub fn new(
        settings: Settings,
        transport: Arc<dyn Transport>,
        service: Arc<dyn ServiceControl>,
    ) -> Self {
        let inner = Arc::new(ManagerInner {
            transport,
            service,
            state: Mutex::new(ManagerState::new(&settings)),
            config: tokio::sync::Mutex::new(Config::new(settings)),
            folders: ItemCollection::new(),
            devices: ItemCollection::new(),
            poll_timer: Timer::new(),
            stream_timer: Timer::new(),
            service_timer: Timer::new(),
            settings_timer: Timer::new(),
            requests: Mutex::new(JoinSet::new()),
            events: Emitter::new(),
        });
        let manager = Self { inner };
        manager.forward_collection_events();
        manager
    }

    /// Manager talking to the daemon over HTTP and to systemd via `systemctl`.
    pub fn with_defaults(settings: Settings) -> Result<Self, MonitorError> {
        let transport = HttpClient::new(settings.request_timeout())?;
        Ok(Self::new(
            settings,
            Arc::new(transport),
            Arc::new(Systemctl::new()),
        ))
    }

    fn from_weak(weak: &Weak<ManagerInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn downgrade(&self) -> Weak<ManagerInner> {
        Arc::downgrade(&self.inner)
    }

    fn forward_collection_events(&self) {
        let weak = self.downgrade();
        self.inner.folders.subscribe(move |event| {
            if let (CollectionEvent::Added(folder), Some(manager)) = (event, Manager::from_weak(&weak)) {
                manager.emit(ManagerEvent::FolderAdd(folder.clone()));
            }
        });

        let weak = self.downgrade();
        self.inner.devices.subscribe(move |event| {
            let Some(manager) = Manager::from_weak(&weak) else {
                return;
            };
            match event {
                CollectionEvent::Added(device) if device.is_host() => {
                    manager.with_state(|state| state.host = Some(device.clone()));
                    manager.emit(ManagerEvent::HostAdd(device.clone()));
                }
                CollectionEvent::Added(device) => {
                    manager.emit(ManagerEvent::DeviceAdd(device.clone()));
                }
                CollectionEvent::Removed(device) => {
                    manager.with_state(|state| {
                        if state.host.as_ref().is_some_and(|host| host.id() == device.id()) {
                            state.host = None;
                        }
                    });
                }
            }
        });
    }

    /// Starts polling. Reports a Config error first when no endpoint can be
    /// resolved; polling still runs so the service state stays visible.
    ///
    /// The first poll afterwards reloads the topology of a running service,
    /// and a new event stream replaces any old one.
    pub async fn attach(&self) {
        self.inner.stream_timer.cancel();
        self.with_state(|state| {
            state.connection_failed = false;
            state.connection_errors = 0;
            state.needs_activation = true;
            state.poll_count = 0;
            state.end_stream();
        });

        if !self.inner.config.lock().await.exists().await {
            tracing::error!("{}", ErrorKind::Config);
            self.emit(ManagerEvent::ServiceChange(ServiceState::Error));
            self.emit_error(ErrorKind::Config, None);
        }

        self.start_polling();
    }

    /// Cancels every timer, destroys all folders and devices and forgets
    /// the service state. The resolved config is kept; call
    /// [`Manager::attach`] to resume.
    pub fn destroy(&self) {
        self.inner.poll_timer.cancel();
        self.inner.stream_timer.cancel();
        self.inner.service_timer.cancel();
        self.inner.settings_timer.cancel();
        self.inner.folders.destroy_all();
        self.inner.devices.destroy_all();
        self.with_state(|state| {
            state.host = None;
            state.service_active = false;
            state.service_enabled = false;
            state.service_connected = false;
            state.service_failed = false;
            state.end_stream();
        });
        info!("Manager destroyed");
    }

    /// Aborts every in-flight request along with the pending stream re-arm.
    pub fn abort_connections(&self) {
        self.inner.stream_timer.cancel();
        lock(&self.inner.requests).abort_all();
        self.with_state(ManagerState::end_stream);
    }

    pub fn rescan(&self, folder: Option<&Folder>) {
        let request = ApiRequest::scan(folder.map(|folder| folder.folder_id()));
        self.spawn_post(request);
    }

    pub fn pause(&self, device: &Device) {
        self.spawn_post(ApiRequest::pause_device(device.id()));
    }

    pub fn resume(&self, device: &Device) {
        self.spawn_post(ApiRequest::resume_device(device.id()));
    }

    /// Web GUI address of the daemon, if known.
    pub async fn service_uri(&self) -> Option<String> {
        self.inner.config.lock().await.uri().map(str::to_string)
    }

    /// Swaps in new settings after [`SETTINGS_DELAY`] and re-attaches.
    /// Calls inside the delay collapse into the last one.
    pub fn apply_settings(&self, settings: Settings) {
        let weak = self.downgrade();
        self.inner
            .settings_timer
            .run(SETTINGS_DELAY, false, move || {
                let weak = weak.clone();
                let settings = settings.clone();
                async move {
                    if let Some(manager) = Manager::from_weak(&weak) {
                        // Reloading destroys this timer's task, so it runs on its own.
                        tokio::spawn(async move { manager.reload(settings).await });
                    }
                }
            });
    }

    async fn reload(&self, settings: Settings) {
        info!(service = %settings.service_name, "Applying settings");
        self.abort_connections();
        self.destroy();
        self.with_state(|state| {
            state.unit = settings.service_name.clone();
            state.event_timeout = settings.event_timeout();
            state.last_event_id = 1;
        });
        *self.inner.config.lock().await = Config::new(settings);
        self.attach().await;
    }

    pub fn folders(&self) -> &ItemCollection<Folder> {
        &self.inner.folders
    }

    pub fn devices(&self) -> &ItemCollection<Device> {
        &self.inner.devices
    }

    pub fn host(&self) -> Option<Device> {
        self.with_state(|state| state.host.clone())
    }

    /// Id the daemon reported for the local device.
    pub fn host_id(&self) -> String {
        self.with_state(|state| state.host_id.clone())
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ManagerEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<ManagerEvent>) {
        self.inner.events.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    fn emit(&self, event: ManagerEvent) {
        self.inner.events.emit(&event);
    }

    fn emit_error(&self, kind: ErrorKind, message: Option<String>) {
        self.emit(ManagerEvent::Error(ErrorEvent { kind, message }));
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ManagerState) -> R) -> R {
        f(&mut lock(&self.inner.state))
    }

    /// Runs `future` as a tracked request task, so
    /// [`Manager::abort_connections`] can reach it.
    fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut requests = lock(&self.inner.requests);
        while requests.try_join_next().is_some() {}
        requests.spawn(future);
    }

    fn spawn_post(&self, request: ApiRequest) {
        let manager = self.clone();
        self.spawn(async move {
            if manager.send(&request).await.is_none() {
                warn!(uri = %request.uri(), "Command request not delivered");
            }
        });
    }
}
