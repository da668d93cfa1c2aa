//! Typed listener registry

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::error;

/// Returned by [`EventEmitter::subscribe`]; pass it back to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Registry<E> {
    next_id: u64,
    listeners: Vec<(ListenerId, Listener<E>)>,
}

/// Fan-out of events to registered callbacks
///
/// A listener that panics is logged and skipped; the rest still run.
pub struct EventEmitter<E> {
    registry: Mutex<Registry<E>>,
}

impl<E> Default for EventEmitter<E> {
    fn default() -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 0,
                listeners: Vec::new(),
            }),
        }
    }
}

impl<E> EventEmitter<E> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry<E>> {
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self, listener: impl Fn(&E) + Send + Sync + 'static) -> ListenerId {
        let mut registry = self.lock();
        let id = ListenerId(registry.next_id);
        registry.next_id += 1;
        registry.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Returns whether the listener was registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registry = self.lock();
        let before = registry.listeners.len();
        registry.listeners.retain(|(lid, _)| *lid != id);
        registry.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    pub fn emit(&self, event: &E) {
        // Call outside the lock so listeners may (un)subscribe.
        let listeners: Vec<Listener<E>> = self
            .lock()
            .listeners
            .iter()
            .map(|(_, l)| l.clone())
            .collect();

        for listener in listeners {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
                error!("Event listener panicked");
            }
        }
    }
}
