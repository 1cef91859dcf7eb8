use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::mpsc;

use crate::signals::{Emitter, SubscriptionId};

use super::item::lock;
use super::{Item, ItemEvent};

/// Membership changes published by an [`ItemCollection`].
#[derive(Debug, Clone)]
pub enum CollectionEvent<T> {
    Added(T),
    Removed(T),
}

/// Registry of items keyed by id (or a custom key), kept in insertion order.
///
/// Items destroyed anywhere drop out of every collection holding them, and
/// each removal is announced exactly once.
#[derive(Debug)]
pub struct ItemCollection<T: Item> {
    inner: Arc<CollectionInner<T>>,
}

impl<T: Item> Clone for ItemCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Non-owning handle to an [`ItemCollection`].
#[derive(Debug)]
pub struct WeakItemCollection<T: Item> {
    inner: Weak<CollectionInner<T>>,
}

impl<T: Item> Clone for WeakItemCollection<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Item> WeakItemCollection<T> {
    pub fn upgrade(&self) -> Option<ItemCollection<T>> {
        self.inner.upgrade().map(|inner| ItemCollection { inner })
    }
}

struct CollectionInner<T> {
    entries: Mutex<Entries<T>>,
    events: Emitter<CollectionEvent<T>>,
    key: fn(&T) -> String,
}

impl<T: std::fmt::Debug> std::fmt::Debug for CollectionInner<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionInner")
            .field("entries", &self.entries)
            .field("events", &self.events)
            .finish()
    }
}

#[derive(Debug)]
struct Entries<T> {
    order: Vec<String>,
    items: HashMap<String, Entry<T>>,
}

#[derive(Debug)]
struct Entry<T> {
    item: T,
    watch: SubscriptionId,
}

impl<T: Item> Default for ItemCollection<T> {
    fn default() -> Self {
        Self::with_key(|item| item.id().to_string())
    }
}

impl<T: Item> ItemCollection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A collection keyed by `key` instead of the item id.
    pub fn with_key(key: fn(&T) -> String) -> Self {
        Self {
            inner: Arc::new(CollectionInner {
                entries: Mutex::new(Entries {
                    order: Vec::new(),
                    items: HashMap::new(),
                }),
                events: Emitter::new(),
                key,
            }),
        }
    }

    pub fn downgrade(&self) -> WeakItemCollection<T> {
        WeakItemCollection {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Adds `item` unless its key is already present or it was destroyed.
    pub fn add(&self, item: T) -> bool {
        let id = (self.inner.key)(&item);
        if item.core().is_destroyed() || self.exists(&id) {
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        let watched_id = id.clone();
        let watch = item.subscribe(move |event| {
            if *event == ItemEvent::Destroy {
                if let Some(inner) = weak.upgrade() {
                    ItemCollection { inner }.detach(&watched_id);
                }
            }
        });

        {
            let mut entries = lock(&self.inner.entries);
            if entries.items.contains_key(&id) {
                drop(entries);
                item.unsubscribe(watch);
                return false;
            }
            entries.order.push(id.clone());
            entries.items.insert(
                id,
                Entry {
                    item: item.clone(),
                    watch,
                },
            );
        }

        self.inner.events.emit(&CollectionEvent::Added(item));
        true
    }

    pub fn get(&self, id: &str) -> Option<T> {
        lock(&self.inner.entries)
            .items
            .get(id)
            .map(|entry| entry.item.clone())
    }

    pub fn exists(&self, id: &str) -> bool {
        lock(&self.inner.entries).items.contains_key(id)
    }

    /// Snapshot of the members in insertion order.
    pub fn items(&self) -> Vec<T> {
        let entries = lock(&self.inner.entries);
        entries
            .order
            .iter()
            .filter_map(|id| entries.items.get(id).map(|entry| entry.item.clone()))
            .collect()
    }

    pub fn ids(&self) -> Vec<String> {
        lock(&self.inner.entries).order.clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.entries).items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Takes `id` out of the collection without destroying it.
    pub fn remove(&self, id: &str) -> Option<T> {
        let entry = self.take(id)?;
        entry.item.unsubscribe(entry.watch);
        self.inner
            .events
            .emit(&CollectionEvent::Removed(entry.item.clone()));
        Some(entry.item)
    }

    /// Destroys the item with `id`; the destruction removes it from here.
    pub fn destroy(&self, id: &str) {
        if let Some(item) = self.get(id) {
            item.destroy();
            // An item that is already destroyed no longer notifies us.
            self.detach(id);
        }
    }

    /// Destroys every member.
    pub fn destroy_all(&self) {
        for id in self.ids() {
            self.destroy(&id);
        }
    }

    /// Removes every member without destroying any of them.
    pub fn clear(&self) {
        for id in self.ids() {
            self.remove(&id);
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&CollectionEvent<T>) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn subscribe_channel(
        &self,
    ) -> (SubscriptionId, mpsc::UnboundedReceiver<CollectionEvent<T>>) {
        self.inner.events.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    fn detach(&self, id: &str) {
        if let Some(entry) = self.take(id) {
            self.inner.events.emit(&CollectionEvent::Removed(entry.item));
        }
    }

    fn take(&self, id: &str) -> Option<Entry<T>> {
        let mut entries = lock(&self.inner.entries);
        let entry = entries.items.remove(id)?;
        entries.order.retain(|existing| existing != id);
        Some(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ItemCore;

    fn removed_ids(rx: &mut mpsc::UnboundedReceiver<CollectionEvent<ItemCore>>) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let CollectionEvent::Removed(item) = event {
                ids.push(item.id().to_string());
            }
        }
        ids
    }

    #[tokio::test]
    async fn destroying_an_item_removes_it_once() {
        let collection = ItemCollection::new();
        let item = ItemCore::new("a", "A");
        assert!(collection.add(item.clone()));
        let (_, mut rx) = collection.subscribe_channel();

        Item::destroy(&item);

        assert!(!collection.exists("a"));
        assert_eq!(removed_ids(&mut rx), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn collection_destroy_announces_each_removal_once() {
        let collection = ItemCollection::new();
        let item = ItemCore::new("a", "A");
        collection.add(item.clone());
        collection.add(ItemCore::new("b", "B"));
        let (_, mut rx) = collection.subscribe_channel();

        collection.destroy("a");
        collection.destroy("a");

        assert!(item.is_destroyed());
        assert_eq!(collection.ids(), vec!["b".to_string()]);
        assert_eq!(removed_ids(&mut rx), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let collection = ItemCollection::new();
        assert!(collection.add(ItemCore::new("a", "A")));
        assert!(!collection.add(ItemCore::new("a", "Other")));
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get("a").map(|item| item.name()), Some("A".into()));
    }

    #[tokio::test]
    async fn remove_keeps_the_item_alive() {
        let collection = ItemCollection::new();
        let item = ItemCore::new("a", "A");
        collection.add(item.clone());

        let removed = collection.remove("a");
        assert!(removed.is_some());
        assert!(!item.is_destroyed());

        // The collection no longer watches the item.
        Item::destroy(&item);
        assert!(collection.is_empty());
    }

    #[tokio::test]
    async fn shared_items_leave_every_collection() {
        let first = ItemCollection::new();
        let second = ItemCollection::new();
        let item = ItemCore::new("a", "A");
        first.add(item.clone());
        second.add(item.clone());

        first.destroy_all();

        assert!(first.is_empty());
        assert!(second.is_empty());
    }
}
