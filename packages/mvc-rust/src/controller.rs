//! Controllers and the plugin container that holds them.

use std::any::Any;
use std::sync::Arc;

use rsl_core::Outcome;

use crate::container::{ContainerError, ServiceManager};
use crate::event::MvcEvent;

/// A controller as stored in the [`ControllerManager`].
pub type SharedController = Arc<dyn Controller>;

/// Handles a routed request.
///
/// Returning [`Outcome::Value`] stores the value as the request result for
/// rendering; [`Outcome::Respond`] means the response on the event is final.
pub trait Controller: Send + Sync {
    /// # Errors
    ///
    /// Any error is recorded as [`ErrorKind::Exception`](rsl_core::ErrorKind::Exception).
    fn dispatch(&self, event: &mut MvcEvent) -> anyhow::Result<Outcome>;
}

impl<F> Controller for F
where
    F: Fn(&mut MvcEvent) -> anyhow::Result<Outcome> + Send + Sync,
{
    fn dispatch(&self, event: &mut MvcEvent) -> anyhow::Result<Outcome> {
        self(event)
    }
}

/// Name-keyed controller registry backed by its own container.
#[derive(Debug)]
pub struct ControllerManager {
    controllers: ServiceManager,
}

impl ControllerManager {
    #[must_use]
    pub fn new() -> Self {
        let controllers = ServiceManager::new();
        controllers.set_allow_override(true);
        Self { controllers }
    }

    /// Registers a shared controller factory.
    pub fn register<C, F>(&self, name: &str, factory: F)
    where
        C: Controller + 'static,
        F: Fn(&ServiceManager) -> anyhow::Result<C> + Send + Sync + 'static,
    {
        self.register_shared(name, move |services| {
            let controller: SharedController = Arc::new(factory(services)?);
            Ok(controller)
        });
    }

    /// Registers a factory that already yields a [`SharedController`].
    pub fn register_shared<F>(&self, name: &str, factory: F)
    where
        F: Fn(&ServiceManager) -> anyhow::Result<SharedController> + Send + Sync + 'static,
    {
        self.controllers.insert_factory(
            name,
            true,
            Arc::new(move |services| {
                let service: Arc<dyn Any + Send + Sync> = Arc::new(factory(services)?);
                Ok(service)
            }),
        );
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.controllers.has(name)
    }

    /// Resolves a controller by name.
    ///
    /// # Errors
    ///
    /// [`ContainerError::ServiceNotFound`] if nothing is registered,
    /// [`ContainerError::TypeMismatch`] if the entry is not a controller,
    /// [`ContainerError::CreationFailed`] if its factory failed.
    pub fn get(&self, name: &str) -> Result<SharedController, ContainerError> {
        self.controllers
            .get::<SharedController>(name)
            .map(|controller| Arc::clone(&*controller))
    }

    /// The backing container, for registrations that are not controllers.
    #[must_use]
    pub fn services(&self) -> &ServiceManager {
        &self.controllers
    }
}

impl Default for ControllerManager {
    fn default() -> Self {
        Self::new()
    }
}
