//! The lifecycle context threaded through every listener of one request.

use std::fmt;
use std::sync::Arc;

use rsl_core::{ErrorKind, Event, EventBus};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::config::ApplicationConfig;
use crate::container::ServiceManager;
use crate::message::{Request, Response};
use crate::router::{RouteMatch, SharedRouter};

/// Cheap handle back to the orchestrator that owns a lifecycle context.
#[derive(Clone)]
pub struct ApplicationHandle {
    services: Arc<ServiceManager>,
    events: Arc<EventBus<MvcEvent>>,
    config: Arc<ApplicationConfig>,
}

impl ApplicationHandle {
    #[must_use]
    pub fn new(
        services: Arc<ServiceManager>,
        events: Arc<EventBus<MvcEvent>>,
        config: Arc<ApplicationConfig>,
    ) -> Self {
        Self {
            services,
            events,
            config,
        }
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceManager> {
        &self.services
    }

    /// The orchestrator's bus. Listeners attached through it during a
    /// trigger run from the next trigger of that event on.
    #[must_use]
    pub fn events(&self) -> &Arc<EventBus<MvcEvent>> {
        &self.events
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ApplicationConfig> {
        &self.config
    }
}

impl fmt::Debug for ApplicationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationHandle")
            .field("identifiers", &self.events.identifiers())
            .finish_non_exhaustive()
    }
}

/// Per-request mutable state passed by reference to every listener.
///
/// `target`, `request`, `router` and `request_id` are fixed at construction.
/// The response is owned here for the request's duration.
pub struct MvcEvent {
    name: String,
    propagation_stopped: bool,
    target: ApplicationHandle,
    request_id: Uuid,
    request: Arc<Request>,
    response: Response,
    router: SharedRouter,
    route_match: Option<RouteMatch>,
    error: Option<ErrorKind>,
    exception: Option<anyhow::Error>,
    result: Option<Value>,
    params: Map<String, Value>,
    response_sent: bool,
}

impl MvcEvent {
    pub const EVENT_BOOTSTRAP: &'static str = "bootstrap";
    pub const EVENT_ROUTE: &'static str = "route";
    pub const EVENT_DISPATCH: &'static str = "dispatch";
    pub const EVENT_DISPATCH_ERROR: &'static str = "dispatch.error";
    pub const EVENT_RENDER: &'static str = "render";
    pub const EVENT_RENDER_ERROR: &'static str = "render.error";
    pub const EVENT_FINISH: &'static str = "finish";

    /// Every lifecycle event name, in nominal firing order.
    pub const ALL_EVENTS: [&'static str; 7] = [
        Self::EVENT_BOOTSTRAP,
        Self::EVENT_ROUTE,
        Self::EVENT_DISPATCH,
        Self::EVENT_DISPATCH_ERROR,
        Self::EVENT_RENDER,
        Self::EVENT_RENDER_ERROR,
        Self::EVENT_FINISH,
    ];

    #[must_use]
    pub fn new(
        target: ApplicationHandle,
        request: Arc<Request>,
        response: Response,
        router: SharedRouter,
    ) -> Self {
        Self {
            name: String::new(),
            propagation_stopped: false,
            target,
            request_id: Uuid::new_v4(),
            request,
            response,
            router,
            route_match: None,
            error: None,
            exception: None,
            result: None,
            params: Map::new(),
            response_sent: false,
        }
    }

    #[must_use]
    pub fn target(&self) -> &ApplicationHandle {
        &self.target
    }

    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    #[must_use]
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    #[must_use]
    pub fn response(&self) -> &Response {
        &self.response
    }

    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }

    #[must_use]
    pub fn router(&self) -> &SharedRouter {
        &self.router
    }

    #[must_use]
    pub fn route_match(&self) -> Option<&RouteMatch> {
        self.route_match.as_ref()
    }

    pub fn set_route_match(&mut self, route_match: RouteMatch) {
        self.route_match = Some(route_match);
    }

    #[must_use]
    pub fn error(&self) -> Option<ErrorKind> {
        self.error
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Flags the request as failed. The orchestrator diverts to the error
    /// event once the current event finishes.
    pub fn set_error(&mut self, kind: ErrorKind) {
        self.error = Some(kind);
    }

    /// Flags [`ErrorKind::Exception`] and keeps the fault for error rendering.
    pub fn fail_with(&mut self, exception: anyhow::Error) {
        self.error = Some(ErrorKind::Exception);
        self.exception = Some(exception);
    }

    #[must_use]
    pub fn exception(&self) -> Option<&anyhow::Error> {
        self.exception.as_ref()
    }

    #[must_use]
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn set_result(&mut self, result: Value) {
        self.result = Some(result);
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }

    pub fn set_param(&mut self, key: impl Into<String>, value: Value) {
        self.params.insert(key.into(), value);
    }

    #[must_use]
    pub fn response_sent(&self) -> bool {
        self.response_sent
    }

    pub fn mark_response_sent(&mut self) {
        self.response_sent = true;
    }
}

impl Event for MvcEvent {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }

    fn stop_propagation(&mut self, flag: bool) {
        self.propagation_stopped = flag;
    }

    fn propagation_is_stopped(&self) -> bool {
        self.propagation_stopped
    }
}

impl fmt::Debug for MvcEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MvcEvent")
            .field("name", &self.name)
            .field("request_id", &self.request_id)
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("status", &self.response.status())
            .field("route_match", &self.route_match)
            .field("error", &self.error)
            .field("result", &self.result)
            .finish_non_exhaustive()
    }
}
