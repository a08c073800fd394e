//! Resolves and invokes the matched controller on `dispatch`.

use std::sync::Arc;

use rsl_core::{ErrorKind, EventBus, ListenerAggregate, ListenerHandles, Outcome, DEFAULT_PRIORITY};
use tracing::{debug, warn};

use crate::container::ContainerError;
use crate::controller::ControllerManager;
use crate::event::MvcEvent;
use crate::router::RouteMatch;

pub const NAME: &str = "DispatchListener";

#[derive(Debug)]
pub struct DispatchListener {
    controllers: Arc<ControllerManager>,
    handles: ListenerHandles,
}

impl DispatchListener {
    #[must_use]
    pub fn new(controllers: Arc<ControllerManager>) -> Self {
        Self {
            controllers,
            handles: ListenerHandles::new(),
        }
    }

    /// Runs the controller named by the route match.
    ///
    /// Lookup failures and controller errors are recorded on the event as an
    /// error kind; a value returned by the controller becomes the result.
    ///
    /// # Errors
    ///
    /// Never fails; failures are reported through the error kind.
    pub fn on_dispatch(controllers: &ControllerManager, event: &mut MvcEvent) -> anyhow::Result<Outcome> {
        let Some(route_match) = event.route_match() else {
            event.set_error(ErrorKind::RouterNoMatch);
            return Ok(Outcome::Continue);
        };
        let action = route_match.action().map(str::to_string);
        let Some(name) = route_match.controller().map(str::to_string) else {
            warn!(route = route_match.route_name(), "route match names no controller");
            event.set_error(ErrorKind::ControllerNotFound);
            return Ok(Outcome::Continue);
        };
        event.set_param(RouteMatch::CONTROLLER, name.clone().into());
        if let Some(action) = action {
            event.set_param(RouteMatch::ACTION, action.into());
        }

        let controller = match controllers.get(&name) {
            Ok(controller) => controller,
            Err(err) => {
                let kind = match err {
                    ContainerError::ServiceNotFound { .. } => ErrorKind::ControllerNotFound,
                    ContainerError::TypeMismatch { .. } => ErrorKind::ControllerInvalid,
                    _ => ErrorKind::ControllerCannotDispatch,
                };
                warn!(controller = %name, error = %err, %kind, "controller lookup failed");
                event.set_error(kind);
                return Ok(Outcome::Continue);
            }
        };

        debug!(controller = %name, "dispatching");
        match controller.dispatch(event) {
            Ok(Outcome::Value(value)) => {
                event.set_result(value.clone());
                Ok(Outcome::Value(value))
            }
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                warn!(controller = %name, error = %err, "controller failed");
                event.fail_with(err);
                Ok(Outcome::Continue)
            }
        }
    }
}

impl ListenerAggregate<MvcEvent> for DispatchListener {
    fn attach(&self, bus: &EventBus<MvcEvent>) {
        let controllers = Arc::clone(&self.controllers);
        self.handles.push(bus.attach(
            MvcEvent::EVENT_DISPATCH,
            NAME,
            DEFAULT_PRIORITY,
            move |event| Self::on_dispatch(&controllers, event),
        ));
    }

    fn detach(&self, bus: &EventBus<MvcEvent>) {
        self.handles.detach_all(bus);
    }
}
