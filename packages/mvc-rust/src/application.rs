//! The lifecycle orchestrator.
//!
//! An [`Application`] owns one event bus and one lifecycle context. Startup
//! attaches the listener aggregates and fires `bootstrap`; [`Application::run`]
//! then drives the request through `route`, `dispatch`, `render` and `finish`,
//! diverting to `dispatch.error` as soon as a stage leaves an error kind on
//! the context.

use std::any::type_name;
use std::sync::Arc;

use rsl_core::{merge_unique, BusError, EventBus, Outcome, TriggerResult};
use tracing::{debug, info, info_span, warn};

use crate::config::{ApplicationConfig, MergedConfig};
use crate::container::{ContainerError, Service, ServiceManager};
use crate::event::{ApplicationHandle, MvcEvent};
use crate::listeners::DEFAULT_LISTENERS;
use crate::message::{Request, Response};
use crate::module::{ModuleError, ModuleManager};
use crate::registry::ListenerRegistry;
use crate::router::SharedRouter;
use crate::services::service_names::{
    APPLICATION_CONFIG, CONFIG, EVENT_MANAGER, MODULE_MANAGER, REQUEST, RESPONSE, ROUTER,
};

/// Base identifier declared by every application bus. Shared listeners
/// attached against it observe every application.
pub const APPLICATION_IDENTIFIER: &str = "rsl_mvc::Application";

/// Orchestrator state.
///
/// State machine: Constructed -> Bootstrapped -> Running -> Completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Services resolved, no listener attached yet.
    Constructed,
    /// Listeners attached and `bootstrap` fired.
    Bootstrapped,
    /// Inside [`Application::run`].
    Running,
    /// `finish` fired; the response is final.
    Completed,
}

/// Failures that abort startup or escape a request.
#[derive(Debug, thiserror::Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Module(#[from] ModuleError),
    #[error("`run` called before `bootstrap`")]
    NotBootstrapped,
    #[error(transparent)]
    Listener(#[from] BusError),
}

/// Where the pipeline goes after a stage.
enum Step {
    Proceed,
    Respond,
    Divert,
}

pub struct Application {
    services: Arc<ServiceManager>,
    events: Arc<EventBus<MvcEvent>>,
    config: Arc<ApplicationConfig>,
    request: Arc<Request>,
    response: Response,
    registry: ListenerRegistry,
    event: Option<MvcEvent>,
    state: LifecycleState,
}

impl Application {
    /// Builds an orchestrator over an already configured container.
    ///
    /// Resolves `EventManager`, `Request` and `Response`; `ApplicationConfig`
    /// is used when registered.
    ///
    /// # Errors
    ///
    /// Returns [`ApplicationError::Container`] if a required service cannot
    /// be resolved.
    pub fn new(services: Arc<ServiceManager>) -> Result<Self, ApplicationError> {
        let events = services.get::<EventBus<MvcEvent>>(EVENT_MANAGER)?;
        events.set_identifiers([APPLICATION_IDENTIFIER, type_name::<Self>()]);
        let request = services.get::<Request>(REQUEST)?;
        let response = Response::clone(&*services.get::<Response>(RESPONSE)?);
        let config = if services.has(APPLICATION_CONFIG) {
            services.get::<ApplicationConfig>(APPLICATION_CONFIG)?
        } else {
            Arc::new(ApplicationConfig::default())
        };

        debug!(identifiers = ?events.identifiers(), "application constructed");
        Ok(Self {
            services,
            events,
            config,
            request,
            response,
            registry: ListenerRegistry::new(),
            event: None,
            state: LifecycleState::Constructed,
        })
    }

    /// Builds a container from `config`, loads modules and returns a
    /// bootstrapped application.
    ///
    /// Listener names are the `Config` service's `listeners` followed by
    /// `config.listeners`; the defaults are added by [`bootstrap`](Self::bootstrap).
    ///
    /// # Errors
    ///
    /// - [`ContainerError::ReservedName`] if the container configuration
    ///   already defines `ApplicationConfig`
    /// - [`ApplicationError::Module`] if module loading fails
    /// - any error of [`new`](Self::new) or [`bootstrap`](Self::bootstrap)
    pub fn init(config: ApplicationConfig) -> Result<Self, ApplicationError> {
        let services = Arc::new(ServiceManager::with_config(&config.service_manager));
        if services.has(APPLICATION_CONFIG) {
            return Err(ContainerError::ReservedName {
                name: APPLICATION_CONFIG.to_string(),
            }
            .into());
        }
        let config = Arc::new(config);
        services.set_instance(APPLICATION_CONFIG, Arc::clone(&config) as Service)?;

        services
            .get::<ModuleManager>(MODULE_MANAGER)?
            .load_modules(&services)?;

        let merged = services.get::<MergedConfig>(CONFIG)?;
        let listeners = merge_unique([merged.listeners(), config.listeners.clone()]);

        let mut application = Self::new(services)?;
        application.bootstrap(&listeners)?;
        Ok(application)
    }

    /// Attaches the default listeners plus `extra`, builds a fresh lifecycle
    /// context and fires `bootstrap`.
    ///
    /// Meant to be called once. A second call attaches the listeners again
    /// and replaces the context.
    ///
    /// # Errors
    ///
    /// [`ApplicationError::Container`] if a listener name or the router cannot
    /// be resolved, [`ApplicationError::Listener`] if a `bootstrap` listener fails.
    pub fn bootstrap<S: AsRef<str>>(&mut self, extra: &[S]) -> Result<&mut Self, ApplicationError> {
        if self.state != LifecycleState::Constructed {
            warn!(state = ?self.state, "bootstrap called again; listeners are attached twice");
        }

        let names = merge_unique([
            DEFAULT_LISTENERS.iter().map(|name| (*name).to_string()).collect::<Vec<_>>(),
            extra.iter().map(|name| name.as_ref().to_string()).collect(),
        ]);
        self.registry
            .resolve_and_attach(&names, &self.events, &self.services)?;

        let router = self.services.get::<SharedRouter>(ROUTER)?;
        let mut event = MvcEvent::new(
            self.handle(),
            Arc::clone(&self.request),
            self.response.clone(),
            Arc::clone(&*router),
        );
        self.events.trigger(MvcEvent::EVENT_BOOTSTRAP, &mut event)?;

        info!(listeners = ?self.registry.names(), "application bootstrapped");
        self.event = Some(event);
        self.state = LifecycleState::Bootstrapped;
        Ok(self)
    }

    /// Runs the request through the lifecycle events.
    ///
    /// Request-level failures never escape: they are recorded as an error kind
    /// and rendered through `dispatch.error`. Only a failure inside the error
    /// handling itself (`dispatch.error`, `render.error`) or in `finish` is
    /// returned.
    ///
    /// # Errors
    ///
    /// [`ApplicationError::NotBootstrapped`] before [`bootstrap`](Self::bootstrap),
    /// [`ApplicationError::Listener`] as described above.
    pub fn run(&mut self) -> Result<&mut Self, ApplicationError> {
        let event = self.event.as_mut().ok_or(ApplicationError::NotBootstrapped)?;
        let span = info_span!(
            "request",
            request_id = %event.request_id(),
            method = %event.request().method(),
            path = event.request().path(),
        );
        let _entered = span.enter();

        self.state = LifecycleState::Running;
        let outcome = Self::run_stages(&self.events, event);
        self.state = LifecycleState::Completed;
        outcome?;

        info!(status = event.response().status().as_u16(), "request completed");
        Ok(self)
    }

    fn run_stages(events: &EventBus<MvcEvent>, event: &mut MvcEvent) -> Result<(), ApplicationError> {
        for stage in [MvcEvent::EVENT_ROUTE, MvcEvent::EVENT_DISPATCH] {
            let result = events.trigger_until(stage, event, Outcome::is_respond);
            match Self::settle(stage, result, event) {
                Step::Proceed => {}
                Step::Respond => {
                    debug!(stage, "response is final; skipping to finish");
                    return Self::finish(events, event);
                }
                Step::Divert => {
                    warn!(
                        stage,
                        error = event.error().map(|kind| kind.as_str()),
                        "diverting to dispatch.error"
                    );
                    events.trigger(MvcEvent::EVENT_DISPATCH_ERROR, event)?;
                    Self::render(events, event)?;
                    return Self::finish(events, event);
                }
            }
        }

        Self::render(events, event)?;
        Self::finish(events, event)
    }

    fn settle(stage: &str, result: Result<TriggerResult, BusError>, event: &mut MvcEvent) -> Step {
        match result {
            Err(err) => {
                warn!(stage, error = %err, "listener failed");
                event.fail_with(err.into());
                Step::Divert
            }
            Ok(_) if event.is_error() => Step::Divert,
            Ok(result) if result.stopped && result.last().is_some_and(Outcome::is_respond) => {
                Step::Respond
            }
            Ok(_) => Step::Proceed,
        }
    }

    fn render(events: &EventBus<MvcEvent>, event: &mut MvcEvent) -> Result<(), ApplicationError> {
        let error_before = event.error();
        let failed = match events.trigger(MvcEvent::EVENT_RENDER, event) {
            Ok(_) => false,
            Err(err) => {
                warn!(error = %err, "render failed");
                event.fail_with(err.into());
                true
            }
        };
        if failed || (error_before.is_none() && event.is_error()) {
            events.trigger(MvcEvent::EVENT_RENDER_ERROR, event)?;
        }
        Ok(())
    }

    fn finish(events: &EventBus<MvcEvent>, event: &mut MvcEvent) -> Result<(), ApplicationError> {
        events.trigger(MvcEvent::EVENT_FINISH, event)?;
        Ok(())
    }

    /// Handle listeners use to reach back into this application.
    #[must_use]
    pub fn handle(&self) -> ApplicationHandle {
        ApplicationHandle::new(
            Arc::clone(&self.services),
            Arc::clone(&self.events),
            Arc::clone(&self.config),
        )
    }

    #[must_use]
    pub fn services(&self) -> &Arc<ServiceManager> {
        &self.services
    }

    #[must_use]
    pub fn events(&self) -> &Arc<EventBus<MvcEvent>> {
        &self.events
    }

    #[must_use]
    pub fn config(&self) -> &Arc<ApplicationConfig> {
        &self.config
    }

    #[must_use]
    pub fn request(&self) -> &Arc<Request> {
        &self.request
    }

    /// The context's response once bootstrapped, the initial one before.
    #[must_use]
    pub fn response(&self) -> &Response {
        self.event
            .as_ref()
            .map_or(&self.response, MvcEvent::response)
    }

    #[must_use]
    pub fn mvc_event(&self) -> Option<&MvcEvent> {
        self.event.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    /// Names of the attached listener aggregates, in attach order.
    #[must_use]
    pub fn listeners(&self) -> Vec<&str> {
        self.registry.names()
    }

    #[must_use]
    pub fn into_response(self) -> Response {
        match self.event {
            Some(event) => event.into_response(),
            None => self.response,
        }
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("state", &self.state)
            .field("listeners", &self.registry)
            .field("event", &self.event)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use http::header::{ALLOW, CONTENT_LENGTH};
    use http::{Method, StatusCode, Uri};
    use parking_lot::Mutex;
    use rsl_core::{Callback, ErrorKind, Event, ListenerAggregate, ListenerHandles, SharedListenerPool};
    use serde_json::{json, Value};

    use super::*;
    use crate::container::ServiceManagerConfig;
    use crate::module::Module;
    use crate::services::service_names::SHARED_EVENT_MANAGER;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Attaches one callback to one event.
    struct OnEvent {
        id: &'static str,
        event: &'static str,
        priority: i32,
        callback: Callback<MvcEvent>,
        handles: ListenerHandles,
    }

    impl OnEvent {
        fn new<F>(id: &'static str, event: &'static str, priority: i32, callback: F) -> Self
        where
            F: Fn(&mut MvcEvent) -> anyhow::Result<Outcome> + Send + Sync + 'static,
        {
            Self {
                id,
                event,
                priority,
                callback: Arc::new(callback),
                handles: ListenerHandles::new(),
            }
        }
    }

    impl ListenerAggregate<MvcEvent> for OnEvent {
        fn attach(&self, bus: &EventBus<MvcEvent>) {
            self.handles.push(bus.attach_callback(
                self.event,
                self.id,
                self.priority,
                Arc::clone(&self.callback),
            ));
        }
    }

    /// Records every lifecycle event fired on any application bus.
    fn recorder(log: &Log) -> Arc<SharedListenerPool<MvcEvent>> {
        let pool = Arc::new(SharedListenerPool::new());
        for name in MvcEvent::ALL_EVENTS {
            let log = Arc::clone(log);
            pool.attach(APPLICATION_IDENTIFIER, name, "Recorder", 0, move |event: &mut MvcEvent| {
                log.lock().push(event.name().to_string());
                Ok(Outcome::Continue)
            });
        }
        pool
    }

    fn home_route() -> Value {
        json!({"routes": {"home": {"path": "/", "controller": "Index"}}})
    }

    fn index_controller(config: ServiceManagerConfig) -> ServiceManagerConfig {
        config.controller("Index", |_| {
            Ok(|_: &mut MvcEvent| -> anyhow::Result<Outcome> {
                Ok(Outcome::Value(json!({"page": "home"})))
            })
        })
    }

    fn routed_config(service_manager: ServiceManagerConfig) -> ApplicationConfig {
        ApplicationConfig::new()
            .with_service_manager(index_controller(service_manager))
            .with_extra_config("router", home_route())
    }

    fn noop(id: &'static str) -> impl Fn(&ServiceManager) -> anyhow::Result<OnEvent> + Send + Sync {
        move |_| Ok(OnEvent::new(id, MvcEvent::EVENT_FINISH, 0, |_| Ok(Outcome::Continue)))
    }

    fn position(log: &[String], name: &str) -> Option<usize> {
        log.iter().position(|event| event == name)
    }

    #[test]
    fn init_with_empty_config_uses_defaults() {
        let mut app = Application::init(ApplicationConfig::default()).unwrap();
        assert_eq!(app.state(), LifecycleState::Bootstrapped);
        assert_eq!(app.listeners(), DEFAULT_LISTENERS);

        app.run().unwrap();
        assert_eq!(app.state(), LifecycleState::Completed);
        let event = app.mvc_event().unwrap();
        assert_eq!(event.error(), Some(ErrorKind::RouterNoMatch));
        assert!(event.response_sent());
        assert_eq!(app.response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn empty_extra_list_attaches_each_default_once() {
        let services = Arc::new(ServiceManager::with_config(&ServiceManagerConfig::new()));
        let mut app = Application::new(services).unwrap();
        app.bootstrap::<&str>(&[]).unwrap();

        assert_eq!(app.listeners(), DEFAULT_LISTENERS);
        let events = app.events();
        assert_eq!(events.listener_count(MvcEvent::EVENT_BOOTSTRAP), 1);
        assert_eq!(events.listener_count(MvcEvent::EVENT_ROUTE), 2);
        assert_eq!(events.listener_count(MvcEvent::EVENT_DISPATCH), 1);
        assert_eq!(events.listener_count(MvcEvent::EVENT_FINISH), 1);
        // Installed by the view manager while `bootstrap` fired.
        assert_eq!(events.listener_count(MvcEvent::EVENT_RENDER), 1);
        assert_eq!(events.listener_count(MvcEvent::EVENT_DISPATCH_ERROR), 1);
    }

    #[test]
    fn duplicate_default_name_is_attached_once() {
        let services = Arc::new(ServiceManager::with_config(&ServiceManagerConfig::new()));
        let mut app = Application::new(services).unwrap();
        app.bootstrap(&["RouteListener", "RouteListener"]).unwrap();

        assert_eq!(app.listeners(), DEFAULT_LISTENERS);
        assert_eq!(app.events().listener_count(MvcEvent::EVENT_ROUTE), 2);
    }

    #[test]
    fn listener_names_are_a_first_occurrence_union() {
        struct Audit;

        impl Module for Audit {
            fn name(&self) -> &str {
                "Audit"
            }

            fn config(&self) -> Value {
                json!({"listeners": ["AuditListener", "DispatchListener"]})
            }
        }

        let service_manager = ServiceManagerConfig::new()
            .module(Audit)
            .listener("AuditListener", noop("AuditListener"))
            .listener("TraceListener", noop("TraceListener"));
        let config = ApplicationConfig::new()
            .with_service_manager(service_manager)
            .with_module("Audit")
            .with_listener("TraceListener")
            .with_listener("AuditListener");

        let app = Application::init(config).unwrap();
        let mut expected: Vec<&str> = DEFAULT_LISTENERS.to_vec();
        expected.extend(["AuditListener", "TraceListener"]);
        assert_eq!(app.listeners(), expected);
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn attached_names_are_defaults_then_extra_without_repeats(
            extra in proptest::collection::vec(
                proptest::sample::select(vec!["RouteListener", "ViewManager", "A", "B", "C"]),
                0..8,
            )
        ) {
            let service_manager = ["A", "B", "C"]
                .into_iter()
                .fold(ServiceManagerConfig::new(), |config, id| config.listener(id, noop(id)));
            let services = Arc::new(ServiceManager::with_config(&service_manager));
            let mut app = Application::new(services).unwrap();
            app.bootstrap(&extra).unwrap();

            let expected = merge_unique([DEFAULT_LISTENERS.to_vec(), extra.clone()]);
            proptest::prop_assert_eq!(app.listeners(), expected.iter().map(String::as_str).collect::<Vec<_>>());
            proptest::prop_assert_eq!(app.events().listener_count(MvcEvent::EVENT_ROUTE), 2);
        }
    }

    #[test]
    fn listeners_run_in_priority_order() {
        let order: Log = Arc::default();
        let mut service_manager = ServiceManagerConfig::new();
        for (id, priority) in [("p1", 1), ("p5a", 5), ("p10", 10), ("p5b", 5)] {
            let order = Arc::clone(&order);
            service_manager = service_manager.listener(id, move |_| {
                let order = Arc::clone(&order);
                Ok(OnEvent::new(id, "dispatch", priority, move |_| {
                    order.lock().push(id.to_string());
                    Ok(Outcome::Continue)
                }))
            });
        }
        let config = routed_config(service_manager)
            .with_listener("p1")
            .with_listener("p5a")
            .with_listener("p10")
            .with_listener("p5b");

        Application::init(config).unwrap().run().unwrap();
        assert_eq!(*order.lock(), vec!["p10", "p5a", "p5b", "p1"]);
    }

    #[test]
    fn routed_request_renders_controller_result() {
        let mut app = Application::init(routed_config(ServiceManagerConfig::new())).unwrap();
        app.run().unwrap();

        let event = app.mvc_event().unwrap();
        assert!(!event.is_error());
        assert_eq!(event.result(), Some(&json!({"page": "home"})));
        let response = app.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(&response.body()[..], br#"{"page":"home"}"#);
        assert_eq!(response.headers()[CONTENT_LENGTH], "15");
    }

    #[test]
    fn error_flagged_in_dispatch_diverts_after_the_event() {
        let log: Log = Arc::default();
        let service_manager = ServiceManagerConfig::new()
            .service(SHARED_EVENT_MANAGER, recorder(&log))
            .listener("NoMatch", |_| {
                Ok(OnEvent::new("NoMatch", "dispatch", 100, |event| {
                    event.set_error(ErrorKind::RouterNoMatch);
                    Ok(Outcome::Continue)
                }))
            });
        let mut app = Application::init(routed_config(service_manager).with_listener("NoMatch")).unwrap();
        app.run().unwrap();

        let log = log.lock().clone();
        let dispatch = position(&log, MvcEvent::EVENT_DISPATCH).unwrap();
        assert_eq!(log[dispatch + 1], MvcEvent::EVENT_DISPATCH_ERROR);
        assert!(position(&log, MvcEvent::EVENT_RENDER).unwrap() > dispatch + 1);
        assert_eq!(log.last().map(String::as_str), Some(MvcEvent::EVENT_FINISH));

        let event = app.mvc_event().unwrap();
        // The lower-priority dispatcher still ran after the error was flagged.
        assert_eq!(event.result().unwrap()["error"], "error-router-no-match");
        assert_eq!(event.param("controller"), Some(&json!("Index")));
        assert_eq!(app.response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn listener_failure_becomes_an_exception() {
        let service_manager = ServiceManagerConfig::new().listener("Exploding", |_| {
            Ok(OnEvent::new("Exploding", "dispatch", 50, |_| anyhow::bail!("kaboom")))
        });
        let mut config = routed_config(service_manager).with_listener("Exploding");
        config
            .extra_config
            .insert("view_manager".to_string(), json!({"display_exceptions": true}));

        let mut app = Application::init(config).unwrap();
        app.run().unwrap();

        let event = app.mvc_event().unwrap();
        assert_eq!(event.error(), Some(ErrorKind::Exception));
        assert!(event.result().unwrap()["message"]
            .as_str()
            .unwrap()
            .contains("kaboom"));
        assert_eq!(app.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn respond_in_route_skips_to_finish() {
        let log: Log = Arc::default();
        let service_manager = ServiceManagerConfig::new()
            .service(SHARED_EVENT_MANAGER, recorder(&log))
            .service(REQUEST, Request::new(Method::TRACE, Uri::from_static("/")));
        let mut app = Application::init(routed_config(service_manager)).unwrap();
        app.run().unwrap();

        let log = log.lock().clone();
        assert!(position(&log, MvcEvent::EVENT_DISPATCH).is_none());
        assert!(position(&log, MvcEvent::EVENT_RENDER).is_none());
        assert_eq!(log.last().map(String::as_str), Some(MvcEvent::EVENT_FINISH));
        assert_eq!(app.response().status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(app.response().headers().contains_key(ALLOW));
        assert!(app.mvc_event().unwrap().response_sent());
    }

    #[test]
    fn render_failure_fires_render_error() {
        let log: Log = Arc::default();
        let service_manager = ServiceManagerConfig::new()
            .service(SHARED_EVENT_MANAGER, recorder(&log))
            .listener("BrokenView", |_| {
                Ok(OnEvent::new("BrokenView", "render", 0, |_| anyhow::bail!("template missing")))
            });
        let mut app = Application::init(routed_config(service_manager).with_listener("BrokenView")).unwrap();
        app.run().unwrap();

        let log = log.lock().clone();
        assert_eq!(
            &log[log.len() - 2..],
            [MvcEvent::EVENT_RENDER_ERROR, MvcEvent::EVENT_FINISH]
        );
        assert_eq!(app.mvc_event().unwrap().error(), Some(ErrorKind::Exception));
        assert_eq!(app.response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn failure_in_finish_escapes() {
        let service_manager = ServiceManagerConfig::new().listener("BadFinish", |_| {
            Ok(OnEvent::new("BadFinish", "finish", 0, |_| anyhow::bail!("socket closed")))
        });
        let mut app = Application::init(routed_config(service_manager).with_listener("BadFinish")).unwrap();
        let err = app.run().unwrap_err();
        assert!(matches!(err, ApplicationError::Listener(BusError::ListenerFailed { ref listener, .. }) if listener == "BadFinish"));
        assert_eq!(app.state(), LifecycleState::Completed);
    }

    #[test]
    fn request_and_router_are_not_cloned_by_bootstrap() {
        let services = Arc::new(ServiceManager::with_config(&ServiceManagerConfig::new()));
        let request = services.get::<Request>(REQUEST).unwrap();
        let router = services.get::<SharedRouter>(ROUTER).unwrap();

        let mut app = Application::new(Arc::clone(&services)).unwrap();
        assert!(Arc::ptr_eq(app.request(), &request));
        app.bootstrap::<&str>(&[]).unwrap();

        let event = app.mvc_event().unwrap();
        assert!(Arc::ptr_eq(event.request(), &request));
        assert!(Arc::ptr_eq(event.router(), &*router));
        app.run().unwrap();
        assert!(Arc::ptr_eq(app.mvc_event().unwrap().request(), &request));
    }

    #[test]
    fn run_before_bootstrap_is_rejected() {
        let services = Arc::new(ServiceManager::with_config(&ServiceManagerConfig::new()));
        let mut app = Application::new(services).unwrap();
        assert!(matches!(app.run(), Err(ApplicationError::NotBootstrapped)));
        assert_eq!(app.state(), LifecycleState::Constructed);
    }

    #[test]
    fn reserved_application_config_name_is_fatal() {
        let config = ApplicationConfig::new()
            .with_service_manager(ServiceManagerConfig::new().service(APPLICATION_CONFIG, 1u8));
        let err = Application::init(config).unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Container(ContainerError::ReservedName { ref name }) if name == APPLICATION_CONFIG
        ));
    }

    #[test]
    fn unknown_listener_name_is_fatal() {
        let err = Application::init(ApplicationConfig::new().with_listener("Ghost")).unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Container(ContainerError::ServiceNotFound { ref name }) if name == "Ghost"
        ));
    }

    #[test]
    fn failing_default_service_is_fatal() {
        let config = ApplicationConfig::new().with_extra_config("router", json!({"routes": []}));
        let err = Application::init(config).unwrap_err();
        assert!(matches!(
            err,
            ApplicationError::Container(ContainerError::CreationFailed { ref name, .. }) if name == ROUTER
        ));
    }

    #[test]
    fn applications_sharing_a_container_each_render_errors() {
        let services = Arc::new(ServiceManager::with_config(&ServiceManagerConfig::new()));

        for _ in 0..2 {
            let mut app = Application::new(Arc::clone(&services)).unwrap();
            app.bootstrap::<&str>(&[]).unwrap();
            assert_eq!(app.events().listener_count(MvcEvent::EVENT_RENDER), 1);
            assert_eq!(app.events().listener_count(MvcEvent::EVENT_DISPATCH_ERROR), 1);
            assert_eq!(app.events().listener_count(MvcEvent::EVENT_RENDER_ERROR), 1);

            app.run().unwrap();
            assert_eq!(app.mvc_event().unwrap().error(), Some(ErrorKind::RouterNoMatch));
            let response = app.into_response();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let body: Value = serde_json::from_slice(response.body()).unwrap();
            assert_eq!(body["error"], "error-router-no-match");
        }
    }

    #[test]
    fn bus_declares_both_identifiers() {
        let app = Application::init(ApplicationConfig::default()).unwrap();
        assert_eq!(
            app.events().identifiers(),
            vec![APPLICATION_IDENTIFIER.to_string(), type_name::<Application>().to_string()]
        );
    }
}
