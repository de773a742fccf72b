//! Add/remove notifications.
//!
//! Each store owns one `ListenerRegistry`. Subscribe, unsubscribe and
//! dispatch all take the same lock, and dispatch runs synchronously on the
//! thread that changed the store, in registration order.
//!
//! Callbacks run while the lock is held: a listener may use the store that
//! notified it, but must not subscribe or unsubscribe from inside a
//! callback. A panicking listener unwinds into the caller of the write or
//! delete that triggered it; the content change is already visible by then.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::hash::Hash;
use crate::store::ContentStore;

/// A change notification: which store, and which hash.
#[derive(Clone, Copy)]
pub struct StoreEvent<'a> {
    source: &'a dyn ContentStore,
    hash: &'a Hash,
}

impl<'a> StoreEvent<'a> {
    pub fn new(source: &'a dyn ContentStore, hash: &'a Hash) -> Self {
        Self { source, hash }
    }

    /// The store that produced the event.
    pub fn source(&self) -> &'a dyn ContentStore {
        self.source
    }

    pub fn hash(&self) -> &'a Hash {
        self.hash
    }
}

impl fmt::Debug for StoreEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreEvent")
            .field("source", &self.source.id())
            .field("hash", self.hash)
            .finish()
    }
}

/// Receives content added/removed notifications from a store.
pub trait StoreListener: Send + Sync {
    /// Called once when a write publishes content that wasn't stored yet,
    /// after any requested encodings have been materialized.
    fn content_added(&self, event: &StoreEvent<'_>);

    /// Called once when a delete removes stored content.
    fn content_removed(&self, event: &StoreEvent<'_>);
}

/// Ordered, lock-guarded subscription list owned by each store.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn StoreListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A listener that panicked mid-dispatch poisons the lock; the list itself
    // is still consistent, so keep using it.
    fn lock(&self) -> MutexGuard<'_, Vec<Arc<dyn StoreListener>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, listener: Arc<dyn StoreListener>) {
        self.lock().push(listener);
    }

    /// Remove the first registration of `listener` (by pointer identity).
    pub fn unsubscribe(&self, listener: &Arc<dyn StoreListener>) -> bool {
        let mut listeners = self.lock();
        match listeners.iter().position(|l| Arc::ptr_eq(l, listener)) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn notify_added(&self, source: &dyn ContentStore, hash: &Hash) {
        let event = StoreEvent::new(source, hash);
        for listener in self.lock().iter() {
            listener.content_added(&event);
        }
    }

    pub fn notify_removed(&self, source: &dyn ContentStore, hash: &Hash) {
        let event = StoreEvent::new(source, hash);
        for listener in self.lock().iter() {
            listener.content_removed(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Drop every subscription.
    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("listeners", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        tag: &'static str,
    }

    impl Recorder {
        fn tagged(tag: &'static str) -> Arc<Self> {
            Arc::new(Self {
                log: Mutex::new(Vec::new()),
                tag,
            })
        }

        fn entries(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl StoreListener for Recorder {
        fn content_added(&self, event: &StoreEvent<'_>) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}+{}", self.tag, event.hash()));
        }

        fn content_removed(&self, event: &StoreEvent<'_>) {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}-{}", self.tag, event.hash()));
        }
    }

    #[test]
    fn test_dispatch_in_registration_order() {
        let store = MemoryStore::new("listener-order");
        let registry = ListenerRegistry::new();
        let shared = Arc::new(Mutex::new(Vec::new()));

        struct Ordered(&'static str, Arc<Mutex<Vec<&'static str>>>);
        impl StoreListener for Ordered {
            fn content_added(&self, _: &StoreEvent<'_>) {
                self.1.lock().unwrap().push(self.0);
            }
            fn content_removed(&self, _: &StoreEvent<'_>) {}
        }

        registry.subscribe(Arc::new(Ordered("first", shared.clone())));
        registry.subscribe(Arc::new(Ordered("second", shared.clone())));
        registry.notify_added(&store, &Hash::compute(b"x"));

        assert_eq!(*shared.lock().unwrap(), vec!["first", "second"]);
    }

    #[test]
    fn test_event_carries_source_and_hash() {
        let store = MemoryStore::new("listener-source");
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(None));

        struct Capture(Arc<Mutex<Option<(crate::store::StoreId, Hash)>>>);
        impl StoreListener for Capture {
            fn content_added(&self, event: &StoreEvent<'_>) {
                *self.0.lock().unwrap() = Some((event.source().id(), *event.hash()));
            }
            fn content_removed(&self, _: &StoreEvent<'_>) {}
        }

        registry.subscribe(Arc::new(Capture(seen.clone())));
        let hash = Hash::compute(b"payload");
        registry.notify_added(&store, &hash);

        assert_eq!(*seen.lock().unwrap(), Some((store.id(), hash)));
    }

    #[test]
    fn test_unsubscribe_by_identity() {
        let store = MemoryStore::new("listener-unsub");
        let registry = ListenerRegistry::new();
        let a = Recorder::tagged("a");
        let b = Recorder::tagged("b");
        let a_dyn: Arc<dyn StoreListener> = a.clone();
        let b_dyn: Arc<dyn StoreListener> = b.clone();

        registry.subscribe(a_dyn.clone());
        registry.subscribe(b_dyn.clone());
        assert_eq!(registry.len(), 2);

        assert!(registry.unsubscribe(&a_dyn));
        assert!(!registry.unsubscribe(&a_dyn));

        let hash = Hash::compute(b"y");
        registry.notify_removed(&store, &hash);

        assert!(a.entries().is_empty());
        assert_eq!(b.entries(), vec![format!("b-{}", hash)]);
    }

    #[test]
    fn test_clear() {
        let registry = ListenerRegistry::new();
        registry.subscribe(Recorder::tagged("a"));
        assert_eq!(registry.len(), 1);
        registry.clear();
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_survives_panicking_listener() {
        struct Boom;
        impl StoreListener for Boom {
            fn content_added(&self, _: &StoreEvent<'_>) {
                panic!("listener failure");
            }
            fn content_removed(&self, _: &StoreEvent<'_>) {}
        }

        let store = MemoryStore::new("listener-panic");
        let registry = ListenerRegistry::new();
        let boom: Arc<dyn StoreListener> = Arc::new(Boom);
        registry.subscribe(boom.clone());

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.notify_added(&store, &Hash::compute(b"z"));
        }));
        assert!(result.is_err());

        // Lock was poisoned by the panic but the registry keeps working.
        assert!(registry.unsubscribe(&boom));
        assert_eq!(registry.len(), 0);
    }
}
