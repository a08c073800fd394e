//! Matches the request against the router on `route`.

use rsl_core::{ErrorKind, EventBus, ListenerAggregate, ListenerHandles, Outcome, DEFAULT_PRIORITY};
use tracing::{debug, warn};

use crate::event::MvcEvent;

pub const NAME: &str = "RouteListener";

/// Stores the route match on the context, or flags [`ErrorKind::RouterNoMatch`].
#[derive(Debug, Default)]
pub struct RouteListener {
    handles: ListenerHandles,
}

impl RouteListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    ///
    /// Never fails; a miss is reported through the error kind.
    pub fn on_route(event: &mut MvcEvent) -> anyhow::Result<Outcome> {
        match event.router().route(event.request()) {
            Some(route_match) => {
                debug!(route = route_match.route_name(), "route matched");
                event.set_route_match(route_match);
            }
            None => {
                warn!(path = event.request().path(), "no route matched");
                event.set_error(ErrorKind::RouterNoMatch);
            }
        }
        Ok(Outcome::Continue)
    }
}

impl ListenerAggregate<MvcEvent> for RouteListener {
    fn attach(&self, bus: &EventBus<MvcEvent>) {
        self.handles.push(bus.attach(
            MvcEvent::EVENT_ROUTE,
            NAME,
            DEFAULT_PRIORITY,
            Self::on_route,
        ));
    }

    fn detach(&self, bus: &EventBus<MvcEvent>) {
        self.handles.detach_all(bus);
    }
}
