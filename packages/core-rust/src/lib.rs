//! RSL Core: event bus, shared listener pools, listener aggregates and the
//! request-lifecycle error vocabulary.

pub mod aggregate;
pub mod bus;
pub mod error_kind;
pub mod event;
pub mod names;

pub use aggregate::{ListenerAggregate, ListenerHandles};
pub use bus::{
    BusError, Callback, EventBus, ListenerHandle, Outcome, SharedListenerPool, TriggerResult,
    DEFAULT_PRIORITY,
};
pub use error_kind::{ErrorKind, UnknownErrorKind};
pub use event::{Event, GenericEvent};
pub use names::merge_unique;
