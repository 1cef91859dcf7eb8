use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;
use tracing::debug;

use crate::signals::{Emitter, SubscriptionId};
use crate::timer::Timer;

use super::{ItemEvent, State, STATE_EMIT_DELAY};

/// Identity, display name and debounced state shared by every item kind.
///
/// Cloning is cheap and yields another handle to the same item.
#[derive(Clone, Debug)]
pub struct ItemCore {
    inner: Arc<CoreInner>,
}

#[derive(Debug)]
struct CoreInner {
    id: String,
    name: Mutex<String>,
    state: Mutex<StateCell>,
    state_timer: Timer,
    destroyed: AtomicBool,
    events: Emitter<ItemEvent>,
}

#[derive(Debug, Default)]
struct StateCell {
    current: State,
    emitted: State,
}

impl ItemCore {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(CoreInner {
                id: id.into(),
                name: Mutex::new(name.into()),
                state: Mutex::new(StateCell::default()),
                state_timer: Timer::new(),
                destroyed: AtomicBool::new(false),
                events: Emitter::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn name(&self) -> String {
        lock(&self.inner.name).clone()
    }

    /// Renames the item, notifying listeners only on an actual change.
    pub fn set_name(&self, name: &str) {
        if name.is_empty() || self.is_destroyed() {
            return;
        }
        {
            let mut current = lock(&self.inner.name);
            if *current == name {
                return;
            }
            *current = name.to_string();
        }
        debug!(item = %self.inner.id, name, "Name change");
        self.inner.events.emit(&ItemEvent::NameChange(name.to_string()));
    }

    pub fn state(&self) -> State {
        lock(&self.inner.state).current
    }

    /// Records `state` immediately and publishes it after [`STATE_EMIT_DELAY`].
    ///
    /// Bursts inside the delay collapse into one notification carrying the
    /// last value; nothing is published when the burst ends where the last
    /// notification left off.
    pub fn set_state(&self, state: State) {
        if self.is_destroyed() {
            return;
        }
        {
            let mut cell = lock(&self.inner.state);
            if cell.current == state {
                return;
            }
            cell.current = state;
        }
        debug!(item = %self.inner.id, %state, "State change");

        let weak: Weak<CoreInner> = Arc::downgrade(&self.inner);
        self.inner
            .state_timer
            .run(STATE_EMIT_DELAY, false, move || {
                let weak = weak.clone();
                async move {
                    if let Some(inner) = weak.upgrade() {
                        inner.flush_state();
                    }
                }
            });
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ItemEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<ItemEvent>) {
        self.inner.events.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// Cancels the pending notification and announces the destruction.
    /// Later calls are ignored.
    pub(crate) fn destroy(&self) {
        if self.inner.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inner.state_timer.cancel();
        debug!(item = %self.inner.id, "Destroy");
        self.inner.events.emit(&ItemEvent::Destroy);
        self.inner.events.clear();
    }

    pub fn ptr_eq(&self, other: &ItemCore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl CoreInner {
    fn flush_state(&self) {
        let state = {
            let mut cell = lock(&self.state);
            if cell.emitted == cell.current {
                return;
            }
            cell.emitted = cell.current;
            cell.current
        };
        debug!(item = %self.id, %state, "Emit state change");
        self.events.emit(&ItemEvent::StateChange(state));
    }
}

/// Behaviour common to folders and devices, on top of their [`ItemCore`].
pub trait Item: Clone + Send + Sync + 'static {
    fn core(&self) -> &ItemCore;

    /// Tears the item down. Kinds owning other items cascade from here.
    fn destroy(&self) {
        self.core().destroy();
    }

    fn id(&self) -> &str {
        self.core().id()
    }

    fn name(&self) -> String {
        self.core().name()
    }

    fn set_name(&self, name: &str) {
        self.core().set_name(name);
    }

    fn state(&self) -> State {
        self.core().state()
    }

    fn set_state(&self, state: State) {
        self.core().set_state(state);
    }

    fn is_busy(&self) -> bool {
        self.core().is_busy()
    }

    fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&ItemEvent) + Send + Sync + 'static,
    {
        self.core().subscribe(listener)
    }

    fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<ItemEvent>) {
        self.core().subscribe_channel()
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.core().unsubscribe(id)
    }
}

impl Item for ItemCore {
    fn core(&self) -> &ItemCore {
        self
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn drain(rx: &mut mpsc::UnboundedReceiver<ItemEvent>) -> Vec<ItemEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_state_is_emitted_once() {
        let item = ItemCore::new("folder-a", "Folder A");
        let (_, mut rx) = item.subscribe_channel();

        item.set_state(State::Idle);
        item.set_state(State::Idle);
        tokio::time::sleep(Duration::from_millis(250)).await;
        item.set_state(State::Idle);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(drain(&mut rx), vec![ItemEvent::StateChange(State::Idle)]);
    }

    #[tokio::test(start_paused = true)]
    async fn bursts_collapse_to_the_last_state() {
        let item = ItemCore::new("folder-a", "Folder A");
        let (_, mut rx) = item.subscribe_channel();

        item.set_state(State::Scanning);
        item.set_state(State::Syncing);
        item.set_state(State::Idle);
        assert_eq!(item.state(), State::Idle);
        assert!(drain(&mut rx).is_empty());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(drain(&mut rx), vec![ItemEvent::StateChange(State::Idle)]);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_returning_to_emitted_state_stays_silent() {
        let item = ItemCore::new("device-a", "Device A");
        item.set_state(State::Idle);
        tokio::time::sleep(Duration::from_millis(250)).await;
        let (_, mut rx) = item.subscribe_channel();

        item.set_state(State::Syncing);
        item.set_state(State::Idle);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn name_changes_are_not_debounced() {
        let item = ItemCore::new("device-a", "Device A");
        let (_, mut rx) = item.subscribe_channel();

        item.set_name("Device A");
        item.set_name("");
        item.set_name("Laptop");

        assert_eq!(item.name(), "Laptop");
        assert_eq!(drain(&mut rx), vec![ItemEvent::NameChange("Laptop".into())]);
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_cancels_pending_emission() {
        let item = ItemCore::new("folder-a", "Folder A");
        let (_, mut rx) = item.subscribe_channel();

        item.set_state(State::Syncing);
        item.destroy();
        item.destroy();
        item.set_state(State::Idle);
        tokio::time::sleep(Duration::from_millis(250)).await;

        assert_eq!(drain(&mut rx), vec![ItemEvent::Destroy]);
        assert_eq!(item.state(), State::Syncing);
    }
}
