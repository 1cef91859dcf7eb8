use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tracing::debug;

use crate::signals::SubscriptionId;
use crate::timer::Timer;

use super::item::lock;
use super::{
    CollectionEvent, Folder, Item, ItemCollection, ItemCore, ItemEvent, State,
    WeakItemCollection, DETERMINE_STATE_DELAY,
};

/// A peer taking part in at least one shared folder, or the local host.
///
/// A device derives its state from the folders it shares. The host also
/// looks at every other online device first, so it shows activity anywhere
/// in the cluster.
#[derive(Clone, Debug)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

#[derive(Debug)]
struct DeviceInner {
    core: ItemCore,
    role: Role,
    folders: ItemCollection<Folder>,
    determine_timer: Timer,
    watches: Mutex<Watches>,
}

#[derive(Debug)]
enum Role {
    Peer,
    Host { peers: WeakItemCollection<Device> },
}

#[derive(Debug, Default)]
struct Watches {
    folders: HashMap<String, (Folder, SubscriptionId)>,
    peers: HashMap<String, (Device, SubscriptionId)>,
    peer_collection: Option<SubscriptionId>,
}

impl Device {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::build(ItemCore::new(id, name), Role::Peer)
    }

    /// Builds the device standing for the local machine. `peers` is the
    /// collection the other devices live in.
    pub fn host(
        id: impl Into<String>,
        name: impl Into<String>,
        peers: &ItemCollection<Device>,
    ) -> Self {
        let device = Self::build(
            ItemCore::new(id, name),
            Role::Host {
                peers: peers.downgrade(),
            },
        );
        device.watch_peers(peers);
        device.determine_state();
        device
    }

    fn build(core: ItemCore, role: Role) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<DeviceInner>| {
            let folders = ItemCollection::new();
            let weak = weak.clone();
            folders.subscribe(move |event| {
                if let Some(inner) = weak.upgrade() {
                    Device { inner }.on_folders_changed(event);
                }
            });
            DeviceInner {
                core,
                role,
                folders,
                determine_timer: Timer::new(),
                watches: Mutex::new(Watches::default()),
            }
        });
        Self { inner }
    }

    pub fn is_host(&self) -> bool {
        matches!(self.inner.role, Role::Host { .. })
    }

    /// Online means reachable and not paused.
    pub fn is_online(&self) -> bool {
        !matches!(self.state(), State::Disconnected | State::Paused)
    }

    /// Folders this device takes part in: the shared folders themselves for
    /// the host, completion proxies for everybody else.
    pub fn folders(&self) -> &ItemCollection<Folder> {
        &self.inner.folders
    }

    /// Recomputes the aggregate state once things settled for
    /// [`DETERMINE_STATE_DELAY`].
    pub fn determine_state_delayed(&self) {
        if self.core().is_destroyed() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .determine_timer
            .run(DETERMINE_STATE_DELAY, false, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        Device { inner }.determine_state();
                    }
                }
            });
    }

    /// Folds folder (and, for the host, peer) states into this device's state.
    ///
    /// Starts from paused and adopts candidate states in collection order
    /// until one of them makes the device busy; that one sticks.
    pub fn determine_state(&self) {
        if self.core().is_destroyed() {
            return;
        }
        match &self.inner.role {
            Role::Peer => {
                if !self.is_online() {
                    return;
                }
                self.set_state(State::Paused);
                self.adopt_folder_states();
            }
            Role::Host { peers } => {
                self.set_state(State::Paused);
                if let Some(peers) = peers.upgrade() {
                    for peer in peers.items() {
                        if peer.id() != self.id() && !self.is_busy() && peer.is_online() {
                            debug!(host = %self.id(), peer = %peer.id(), state = %peer.state(), "Determine host state");
                            self.set_state(peer.state());
                        }
                    }
                }
                if !self.is_busy() {
                    self.adopt_folder_states();
                }
            }
        }
    }

    fn adopt_folder_states(&self) {
        for folder in self.inner.folders.items() {
            if !self.is_busy() {
                debug!(device = %self.id(), folder = %folder.id(), state = %folder.state(), "Determine device state");
                self.set_state(folder.state());
            }
        }
    }

    fn on_folders_changed(&self, event: &CollectionEvent<Folder>) {
        match event {
            CollectionEvent::Added(folder) => {
                let weak = Arc::downgrade(&self.inner);
                let watch = folder.subscribe(move |event| {
                    if let ItemEvent::StateChange(_) = event {
                        if let Some(inner) = weak.upgrade() {
                            Device { inner }.determine_state_delayed();
                        }
                    }
                });
                let previous = lock(&self.inner.watches)
                    .folders
                    .insert(folder.id().to_string(), (folder.clone(), watch));
                if let Some((folder, watch)) = previous {
                    folder.unsubscribe(watch);
                }
            }
            CollectionEvent::Removed(folder) => {
                let watched = lock(&self.inner.watches).folders.remove(folder.id());
                if let Some((folder, watch)) = watched {
                    folder.unsubscribe(watch);
                }
                self.determine_state_delayed();
            }
        }
    }

    fn watch_peers(&self, peers: &ItemCollection<Device>) {
        for peer in peers.items() {
            self.watch_peer(&peer);
        }
        let weak = Arc::downgrade(&self.inner);
        let subscription = peers.subscribe(move |event| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let host = Device { inner };
            match event {
                CollectionEvent::Added(peer) => host.watch_peer(peer),
                CollectionEvent::Removed(peer) => {
                    let watched = lock(&host.inner.watches).peers.remove(peer.id());
                    if let Some((peer, watch)) = watched {
                        peer.unsubscribe(watch);
                    }
                    host.determine_state_delayed();
                }
            }
        });
        lock(&self.inner.watches).peer_collection = Some(subscription);
    }

    fn watch_peer(&self, peer: &Device) {
        if peer.id() == self.id() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        let watch = peer.subscribe(move |event| {
            if let ItemEvent::StateChange(_) = event {
                if let Some(inner) = weak.upgrade() {
                    Device { inner }.determine_state_delayed();
                }
            }
        });
        let previous = lock(&self.inner.watches)
            .peers
            .insert(peer.id().to_string(), (peer.clone(), watch));
        if let Some((peer, watch)) = previous {
            peer.unsubscribe(watch);
        }
    }
}

impl Item for Device {
    fn core(&self) -> &ItemCore {
        &self.inner.core
    }

    /// Proxies die with their device; the host only lets go of the real
    /// folders, which stay owned by the manager.
    fn destroy(&self) {
        if self.core().is_destroyed() {
            return;
        }
        self.inner.core.destroy();
        match &self.inner.role {
            Role::Peer => self.inner.folders.destroy_all(),
            Role::Host { peers } => {
                self.inner.folders.clear();
                let watches = std::mem::take(&mut *lock(&self.inner.watches));
                if let (Some(peers), Some(subscription)) = (peers.upgrade(), watches.peer_collection) {
                    peers.unsubscribe(subscription);
                }
                for (peer, watch) in watches.peers.into_values() {
                    peer.unsubscribe(watch);
                }
            }
        }
        self.inner.determine_timer.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn folder(id: &str, state: State) -> Folder {
        let folder = Folder::new(id, id, None);
        folder.set_state(state);
        folder
    }

    #[tokio::test]
    async fn first_busy_folder_wins() {
        let device = Device::new("PEER-1", "Laptop");
        device.folders().add(folder("f1", State::Idle));
        device.folders().add(folder("f2", State::Syncing));

        device.determine_state();
        assert_eq!(device.state(), State::Syncing);
    }

    #[tokio::test]
    async fn busy_state_is_not_overridden_by_later_folders() {
        let device = Device::new("PEER-1", "Laptop");
        device.folders().add(folder("f1", State::Scanning));
        device.folders().add(folder("f2", State::Syncing));

        device.determine_state();
        assert_eq!(device.state(), State::Scanning);
    }

    #[tokio::test]
    async fn offline_devices_keep_their_state() {
        let device = Device::new("PEER-1", "Laptop");
        device.set_state(State::Disconnected);
        device.folders().add(folder("f1", State::Syncing));

        device.determine_state();
        assert_eq!(device.state(), State::Disconnected);
    }

    #[tokio::test]
    async fn device_without_folders_rests_paused() {
        let device = Device::new("PEER-1", "Laptop");
        device.determine_state();
        assert_eq!(device.state(), State::Paused);
    }

    #[tokio::test]
    async fn host_adopts_busy_peer_before_its_folders() {
        let devices = ItemCollection::new();
        let peer = Device::new("PEER-1", "Laptop");
        peer.set_state(State::Scanning);
        devices.add(peer);

        let host = Device::host("HOST", "Desktop", &devices);
        devices.add(host.clone());
        host.folders().add(folder("f1", State::Syncing));

        host.determine_state();
        assert_eq!(host.state(), State::Scanning);
    }

    #[tokio::test]
    async fn host_ignores_offline_peers() {
        let devices = ItemCollection::new();
        let peer = Device::new("PEER-1", "Laptop");
        peer.set_state(State::Paused);
        devices.add(peer);

        let host = Device::host("HOST", "Desktop", &devices);
        host.folders().add(folder("f1", State::Idle));

        host.determine_state();
        assert_eq!(host.state(), State::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn folder_state_changes_trigger_aggregation() {
        let device = Device::new("PEER-1", "Laptop");
        let docs = folder("docs", State::Idle);
        device.folders().add(docs.clone());
        device.set_state(State::Idle);

        docs.set_state(State::Syncing);
        // 200ms for the folder to publish, 600ms for the device to settle.
        tokio::time::sleep(Duration::from_millis(900)).await;

        assert_eq!(device.state(), State::Syncing);
    }

    #[tokio::test(start_paused = true)]
    async fn peer_state_changes_reach_the_host() {
        let devices = ItemCollection::new();
        let host = Device::host("HOST", "Desktop", &devices);
        devices.add(host.clone());
        let peer = Device::new("PEER-1", "Laptop");
        devices.add(peer.clone());

        peer.set_state(State::Syncing);
        tokio::time::sleep(Duration::from_millis(900)).await;

        assert_eq!(host.state(), State::Syncing);
    }

    #[tokio::test]
    async fn destroying_the_host_keeps_shared_folders() {
        let devices = ItemCollection::new();
        let host = Device::host("HOST", "Desktop", &devices);
        let docs = folder("docs", State::Idle);
        host.folders().add(docs.clone());

        host.destroy();

        assert!(!docs.core().is_destroyed());
        assert!(host.folders().is_empty());
    }
}
