//! Listeners that subscribe themselves to one or more events.

use parking_lot::Mutex;

use crate::bus::{EventBus, ListenerHandle};

/// A unit of behavior that decides for itself which events it handles.
///
/// Whoever activates the aggregate only calls [`attach`](Self::attach); the
/// aggregate picks event names and priorities.
pub trait ListenerAggregate<E>: Send + Sync {
    /// Subscribe to events on `bus`.
    fn attach(&self, bus: &EventBus<E>);

    /// Undo [`attach`](Self::attach). Aggregates that never detach keep the default.
    fn detach(&self, bus: &EventBus<E>) {
        let _ = bus;
    }
}

/// Remembers handles returned by `attach` so an aggregate can detach later.
///
/// One aggregate may be attached to several buses; each bus only gives back
/// the handles it issued.
#[derive(Debug, Default)]
pub struct ListenerHandles {
    handles: Mutex<Vec<ListenerHandle>>,
}

impl ListenerHandles {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, handle: ListenerHandle) {
        self.handles.lock().push(handle);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    /// Number of stored handles issued by `bus` or its shared pool.
    #[must_use]
    pub fn count_on<E>(&self, bus: &EventBus<E>) -> usize {
        self.handles.lock().iter().filter(|handle| bus.owns(handle)).count()
    }

    /// Detaches the stored handles issued by `bus`; returns how many were
    /// removed. Handles of other buses are kept.
    pub fn detach_all<E>(&self, bus: &EventBus<E>) -> usize {
        let mut handles = self.handles.lock();
        let (owned, others): (Vec<_>, Vec<_>) =
            handles.drain(..).partition(|handle| bus.owns(handle));
        *handles = others;
        owned.iter().filter(|handle| bus.detach(handle)).count()
    }
}
