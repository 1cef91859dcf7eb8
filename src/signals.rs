//! Typed observer lists used by items, collections and the manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

/// Handle returned by [`Emitter::subscribe`], used to unsubscribe later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Synchronous fan-out of one event type to any number of listeners.
///
/// Listeners run on the emitting task, in subscription order. The listener
/// list is snapshotted before dispatch, so a listener may subscribe or
/// unsubscribe (itself included) without deadlocking.
pub struct Emitter<E> {
    listeners: Mutex<Vec<(SubscriptionId, Listener<E>)>>,
    next_id: AtomicU64,
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E> std::fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.lock().len())
            .finish()
    }
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the subscription was still registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn emit(&self, event: &E) {
        let listeners: Vec<Listener<E>> = self
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Listener<E>)>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E> Emitter<E>
where
    E: Clone + Send + 'static,
{
    /// Forward every event into an unbounded channel. Dropping the receiver
    /// stops delivery; call [`Emitter::unsubscribe`] to release the listener.
    pub fn subscribe_channel(&self) -> (SubscriptionId, mpsc::UnboundedReceiver<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn unsubscribed_listeners_stop_receiving() {
        let emitter = Emitter::<u32>::new();
        let total = Arc::new(AtomicUsize::new(0));
        let seen = total.clone();
        let id = emitter.subscribe(move |value| {
            seen.fetch_add(*value as usize, Ordering::SeqCst);
        });

        emitter.emit(&2);
        assert!(emitter.unsubscribe(id));
        assert!(!emitter.unsubscribe(id));
        emitter.emit(&5);

        assert_eq!(total.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.listener_count(), 0);
    }

    #[test]
    fn listeners_may_subscribe_during_dispatch() {
        let emitter = Arc::new(Emitter::<&'static str>::new());
        let inner = emitter.clone();
        emitter.subscribe(move |_| {
            inner.subscribe(|_| {});
        });

        emitter.emit(&"first");
        assert_eq!(emitter.listener_count(), 2);
    }

    #[test]
    fn channel_subscription_receives_clones() {
        let emitter = Emitter::<String>::new();
        let (_, mut rx) = emitter.subscribe_channel();
        emitter.emit(&"hello".to_string());
        assert_eq!(rx.try_recv().ok().as_deref(), Some("hello"));
        assert!(rx.try_recv().is_err());
    }
}
