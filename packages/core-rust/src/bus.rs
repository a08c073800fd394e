//! Priority-ordered event bus with identifier-scoped shared listener pools.
//!
//! Listeners are stored per event name in descending priority order; equal
//! priorities keep attach order. A trigger snapshots the listener set before
//! iterating, so listeners attached while a trigger is running only take part
//! in later triggers of that event.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, trace};

use crate::event::Event;

/// Priority used by [`EventBus::attach_default`].
pub const DEFAULT_PRIORITY: i32 = 1;

/// Handle ids are unique across every bus and pool in the process.
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Ids of buses and shared pools, recorded on the handles they issue.
static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// A listener callback. Receives the event by mutable reference.
pub type Callback<E> = Arc<dyn Fn(&mut E) -> anyhow::Result<Outcome> + Send + Sync>;

// ---------------------------------------------------------------------------
// Outcome / TriggerResult
// ---------------------------------------------------------------------------

/// What a listener hands back to the bus after it ran.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Nothing to report.
    Continue,
    /// A result value (for example a controller's return value).
    Value(Value),
    /// The response carried by the event is final; the caller may skip ahead.
    Respond,
}

impl Outcome {
    #[must_use]
    pub fn is_respond(&self) -> bool {
        matches!(self, Self::Respond)
    }

    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Continue | Self::Respond => None,
        }
    }
}

/// Collected outcomes of one trigger call, in invocation order.
#[derive(Debug, Default)]
pub struct TriggerResult {
    /// `(listener_id, outcome)` for every listener that ran.
    pub outcomes: Vec<(String, Outcome)>,
    /// Whether the stop condition halted the trigger early.
    pub stopped: bool,
    /// The listener after which the trigger halted.
    pub stopped_by: Option<String>,
}

impl TriggerResult {
    /// Outcome of the last listener that ran.
    #[must_use]
    pub fn last(&self) -> Option<&Outcome> {
        self.outcomes.last().map(|(_, outcome)| outcome)
    }

    /// Ids of the listeners that ran, in order.
    pub fn listeners(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().map(|(id, _)| id.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Errors surfaced by [`EventBus::trigger`].
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("listener `{listener}` failed while handling `{event}`")]
    ListenerFailed {
        event: String,
        listener: String,
        #[source]
        source: anyhow::Error,
    },
}

// ---------------------------------------------------------------------------
// ListenerHandle / entries
// ---------------------------------------------------------------------------

/// Returned by `attach`; pass it back to `detach` to remove the listener.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListenerHandle {
    id: u64,
    /// Id of the bus or pool that issued the handle.
    owner: u64,
    event: String,
    /// Shared-pool identifier, `None` for bus-local listeners.
    scope: Option<String>,
}

impl ListenerHandle {
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }
}

struct ListenerEntry<E> {
    id: u64,
    listener_id: String,
    priority: i32,
    callback: Callback<E>,
}

type EntryMap<E> = HashMap<String, Vec<Arc<ListenerEntry<E>>>>;

/// Inserts after every entry with priority >= the new one (stable for ties).
fn insert_ordered<E>(entries: &mut Vec<Arc<ListenerEntry<E>>>, entry: ListenerEntry<E>) {
    let pos = entries
        .iter()
        .position(|existing| existing.priority < entry.priority)
        .unwrap_or(entries.len());
    entries.insert(pos, Arc::new(entry));
}

fn remove_entry<E>(map: &mut EntryMap<E>, event: &str, id: u64) -> bool {
    let Some(entries) = map.get_mut(event) else {
        return false;
    };
    let before = entries.len();
    entries.retain(|entry| entry.id != id);
    let removed = entries.len() < before;
    if entries.is_empty() {
        map.remove(event);
    }
    removed
}

fn new_entry<E>(listener_id: &str, priority: i32, callback: Callback<E>) -> ListenerEntry<E> {
    ListenerEntry {
        id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
        listener_id: listener_id.to_string(),
        priority,
        callback,
    }
}

// ---------------------------------------------------------------------------
// SharedListenerPool
// ---------------------------------------------------------------------------

/// Listeners attached against an identifier rather than a concrete bus.
///
/// Every bus that was built with this pool and declares a matching identifier
/// also invokes these listeners, after its own.
pub struct SharedListenerPool<E> {
    id: u64,
    pools: RwLock<HashMap<String, EntryMap<E>>>,
}

impl<E> SharedListenerPool<E> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Attach `callback` to `event` for every bus declaring `identifier`.
    pub fn attach<F>(
        &self,
        identifier: &str,
        event: &str,
        listener_id: &str,
        priority: i32,
        callback: F,
    ) -> ListenerHandle
    where
        F: Fn(&mut E) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        let entry = new_entry(listener_id, priority, Arc::new(callback));
        let handle = ListenerHandle {
            id: entry.id,
            owner: self.id,
            event: event.to_string(),
            scope: Some(identifier.to_string()),
        };
        let mut pools = self.pools.write();
        let entries = pools
            .entry(identifier.to_string())
            .or_default()
            .entry(event.to_string())
            .or_default();
        insert_ordered(entries, entry);
        debug!(identifier, event, listener = listener_id, priority, "shared listener attached");
        handle
    }

    /// Remove a listener previously attached to this pool.
    pub fn detach(&self, handle: &ListenerHandle) -> bool {
        let Some(identifier) = handle.scope.as_deref().filter(|_| handle.owner == self.id) else {
            return false;
        };
        let mut pools = self.pools.write();
        match pools.get_mut(identifier) {
            Some(map) => remove_entry(map, &handle.event, handle.id),
            None => false,
        }
    }

    /// Number of listeners attached for `identifier` and `event`.
    #[must_use]
    pub fn listener_count(&self, identifier: &str, event: &str) -> usize {
        self.pools
            .read()
            .get(identifier)
            .and_then(|map| map.get(event))
            .map_or(0, Vec::len)
    }

    fn snapshot_into(&self, identifier: &str, event: &str, out: &mut Vec<Arc<ListenerEntry<E>>>) {
        if let Some(entries) = self.pools.read().get(identifier).and_then(|map| map.get(event)) {
            out.extend(entries.iter().cloned());
        }
    }
}

impl<E> Default for SharedListenerPool<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Maps event names to priority-ordered listeners and triggers them.
pub struct EventBus<E> {
    id: u64,
    listeners: RwLock<EntryMap<E>>,
    identifiers: RwLock<Vec<String>>,
    shared: Option<Arc<SharedListenerPool<E>>>,
}

impl<E> EventBus<E> {
    /// Creates a bus that only consults its own listeners.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed),
            listeners: RwLock::new(HashMap::new()),
            identifiers: RwLock::new(Vec::new()),
            shared: None,
        }
    }

    /// Creates a bus that also consults `shared` for its declared identifiers.
    #[must_use]
    pub fn with_shared(shared: Arc<SharedListenerPool<E>>) -> Self {
        Self {
            shared: Some(shared),
            ..Self::new()
        }
    }

    /// Replaces the identifiers used to look up shared listeners.
    ///
    /// Duplicates are dropped; declaration order is kept.
    pub fn set_identifiers<I, S>(&self, identifiers: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for id in identifiers {
            let id = id.into();
            if !unique.contains(&id) {
                unique.push(id);
            }
        }
        *self.identifiers.write() = unique;
    }

    #[must_use]
    pub fn identifiers(&self) -> Vec<String> {
        self.identifiers.read().clone()
    }

    #[must_use]
    pub fn shared(&self) -> Option<&Arc<SharedListenerPool<E>>> {
        self.shared.as_ref()
    }

    /// Registers `callback` for `event`. Attaching the same callback twice
    /// yields two independent registrations.
    pub fn attach<F>(&self, event: &str, listener_id: &str, priority: i32, callback: F) -> ListenerHandle
    where
        F: Fn(&mut E) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.attach_callback(event, listener_id, priority, Arc::new(callback))
    }

    /// [`attach`](Self::attach) with [`DEFAULT_PRIORITY`].
    pub fn attach_default<F>(&self, event: &str, listener_id: &str, callback: F) -> ListenerHandle
    where
        F: Fn(&mut E) -> anyhow::Result<Outcome> + Send + Sync + 'static,
    {
        self.attach(event, listener_id, DEFAULT_PRIORITY, callback)
    }

    /// Registers an already shared callback.
    pub fn attach_callback(
        &self,
        event: &str,
        listener_id: &str,
        priority: i32,
        callback: Callback<E>,
    ) -> ListenerHandle {
        let entry = new_entry(listener_id, priority, callback);
        let handle = ListenerHandle {
            id: entry.id,
            owner: self.id,
            event: event.to_string(),
            scope: None,
        };
        insert_ordered(
            self.listeners.write().entry(event.to_string()).or_default(),
            entry,
        );
        debug!(event, listener = listener_id, priority, "listener attached");
        handle
    }

    /// Whether `handle` was issued by this bus or by its shared pool.
    #[must_use]
    pub fn owns(&self, handle: &ListenerHandle) -> bool {
        handle.owner == self.id
            || self
                .shared
                .as_ref()
                .is_some_and(|shared| shared.id == handle.owner)
    }

    /// Removes a listener. Handles scoped to a shared pool are forwarded to it;
    /// handles issued by another bus are ignored.
    pub fn detach(&self, handle: &ListenerHandle) -> bool {
        if handle.scope.is_some() {
            return self
                .shared
                .as_ref()
                .is_some_and(|shared| shared.detach(handle));
        }
        if handle.owner != self.id {
            return false;
        }
        remove_entry(&mut self.listeners.write(), &handle.event, handle.id)
    }

    /// Number of bus-local listeners for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.read().get(event).map_or(0, Vec::len)
    }

    /// Names of events with at least one bus-local listener, sorted.
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self.listeners.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Ids of the listeners a trigger of `event` would invoke, in order.
    #[must_use]
    pub fn listener_ids(&self, event: &str) -> Vec<String> {
        self.snapshot(event)
            .iter()
            .map(|entry| entry.listener_id.clone())
            .collect()
    }

    /// Local listeners first, then shared pools in identifier order.
    fn snapshot(&self, event: &str) -> Vec<Arc<ListenerEntry<E>>> {
        let mut entries: Vec<Arc<ListenerEntry<E>>> = self
            .listeners
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();
        if let Some(shared) = &self.shared {
            for identifier in self.identifiers.read().iter() {
                shared.snapshot_into(identifier, event, &mut entries);
            }
        }
        entries
    }
}

impl<E: Event> EventBus<E> {
    /// Invokes every listener for `name` until one stops propagation.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ListenerFailed`] as soon as a listener fails; the
    /// remaining listeners are not invoked.
    pub fn trigger(&self, name: &str, event: &mut E) -> Result<TriggerResult, BusError> {
        self.run_listeners(name, event, None)
    }

    /// Like [`trigger`](Self::trigger), but also halts after the first
    /// listener whose outcome satisfies `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::ListenerFailed`] as soon as a listener fails.
    pub fn trigger_until<P>(
        &self,
        name: &str,
        event: &mut E,
        predicate: P,
    ) -> Result<TriggerResult, BusError>
    where
        P: Fn(&Outcome) -> bool,
    {
        let predicate: &dyn Fn(&Outcome) -> bool = &predicate;
        self.run_listeners(name, event, Some(predicate))
    }

    fn run_listeners(
        &self,
        name: &str,
        event: &mut E,
        predicate: Option<&dyn Fn(&Outcome) -> bool>,
    ) -> Result<TriggerResult, BusError> {
        event.set_name(name);
        event.stop_propagation(false);

        let mut result = TriggerResult::default();
        for entry in self.snapshot(name) {
            trace!(event = name, listener = %entry.listener_id, priority = entry.priority, "invoking listener");
            let outcome = (entry.callback)(event).map_err(|source| BusError::ListenerFailed {
                event: name.to_string(),
                listener: entry.listener_id.clone(),
                source,
            })?;
            let satisfied = predicate.is_some_and(|p| p(&outcome));
            result.outcomes.push((entry.listener_id.clone(), outcome));

            if satisfied || event.propagation_is_stopped() {
                debug!(event = name, listener = %entry.listener_id, "propagation stopped");
                result.stopped = true;
                result.stopped_by = Some(entry.listener_id.clone());
                break;
            }
        }
        Ok(result)
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
