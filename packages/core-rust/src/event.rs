//! The capability every value passed through an [`EventBus`](crate::EventBus) must expose.

use serde_json::{Map, Value};

/// A value threaded by mutable reference through every listener of a trigger.
///
/// The bus writes the event name before invoking listeners and reads the
/// propagation flag after each one returns.
pub trait Event {
    /// Name of the event currently being triggered.
    fn name(&self) -> &str;

    /// Set by the bus at the start of every trigger.
    fn set_name(&mut self, name: &str);

    /// Raise (or clear) the stop-propagation flag.
    fn stop_propagation(&mut self, flag: bool);

    /// Whether a listener asked the bus to stop invoking further listeners.
    fn propagation_is_stopped(&self) -> bool;
}

/// Minimal event carrying a free-form parameter map.
///
/// Useful for buses that do not need a dedicated context type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenericEvent {
    name: String,
    stopped: bool,
    params: Map<String, Value>,
}

impl GenericEvent {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: Value) {
        self.params.insert(key.into(), value);
    }

    #[must_use]
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }
}

impl Event for GenericEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }

    fn stop_propagation(&mut self, flag: bool) {
        self.stopped = flag;
    }

    fn propagation_is_stopped(&self) -> bool {
        self.stopped
    }
}
