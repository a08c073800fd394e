//! Listener resolution: listener names -> aggregates -> attached listeners.

use std::sync::Arc;

use rsl_core::{EventBus, ListenerAggregate};
use tracing::debug;

use crate::container::{ContainerError, ServiceManager};
use crate::event::MvcEvent;

/// A listener aggregate as stored in the container.
pub type SharedListener = Arc<dyn ListenerAggregate<MvcEvent>>;

/// Resolves a listener aggregate by service name.
///
/// # Errors
///
/// Any [`ContainerError`]; a service that is not a listener aggregate is a
/// [`ContainerError::TypeMismatch`].
pub fn resolve_listener(services: &ServiceManager, name: &str) -> Result<SharedListener, ContainerError> {
    services
        .get::<SharedListener>(name)
        .map(|listener| Arc::clone(&*listener))
}

/// Tracks which listener aggregates were attached to the orchestrator's bus.
#[derive(Default)]
pub struct ListenerRegistry {
    attached: Vec<(String, SharedListener)>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves every name through `services` and lets each aggregate attach
    /// itself to `bus`. Names are expected to be deduplicated already.
    ///
    /// # Errors
    ///
    /// Stops at the first name that cannot be resolved; aggregates attached
    /// before the failure stay attached.
    pub fn resolve_and_attach(
        &mut self,
        names: &[String],
        bus: &EventBus<MvcEvent>,
        services: &ServiceManager,
    ) -> Result<(), ContainerError> {
        for name in names {
            let listener = resolve_listener(services, name)?;
            listener.attach(bus);
            debug!(listener = %name, "listener aggregate attached");
            self.attached.push((name.clone(), listener));
        }
        Ok(())
    }

    /// Names of attached aggregates, in attach order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.attached.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Detaches every aggregate from `bus` and forgets it.
    pub fn detach_all(&mut self, bus: &EventBus<MvcEvent>) {
        for (name, listener) in self.attached.drain(..) {
            listener.detach(bus);
            debug!(listener = %name, "listener aggregate detached");
        }
    }
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("attached", &self.names())
            .finish()
    }
}
