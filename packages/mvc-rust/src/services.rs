//! Default service registrations.

use std::sync::Arc;

use rsl_core::{EventBus, SharedListenerPool};
use tracing::debug;

use crate::config::{ApplicationConfig, MergedConfig};
use crate::container::{Factory, Service, ServiceManager, ServiceManagerConfig};
use crate::controller::ControllerManager;
use crate::event::MvcEvent;
use crate::listeners::{
    dispatch, http_method, route, send_response, view, DispatchListener, HttpMethodListener,
    RouteListener, SendResponseListener, ViewManager,
};
use crate::message::{Request, Response};
use crate::module::ModuleManager;
use crate::registry::SharedListener;
use crate::router::{LiteralRouter, SharedRouter};

/// Reserved service names.
pub mod service_names {
    pub const EVENT_MANAGER: &str = "EventManager";
    pub const SHARED_EVENT_MANAGER: &str = "SharedEventManager";
    pub const MODULE_MANAGER: &str = "ModuleManager";
    pub const CONFIG: &str = "Config";
    pub const APPLICATION_CONFIG: &str = "ApplicationConfig";
    pub const APPLICATION: &str = "Application";
    pub const REQUEST: &str = "Request";
    pub const RESPONSE: &str = "Response";
    pub const ROUTER: &str = "Router";
    pub const CONTROLLER_MANAGER: &str = "ControllerManager";
}

use service_names::{
    APPLICATION_CONFIG, CONFIG, CONTROLLER_MANAGER, EVENT_MANAGER, MODULE_MANAGER, REQUEST,
    RESPONSE, ROUTER, SHARED_EVENT_MANAGER,
};

fn erase<T, F>(build: F) -> Factory
where
    T: Send + Sync + 'static,
    F: Fn(&ServiceManager) -> anyhow::Result<T> + Send + Sync + 'static,
{
    Arc::new(move |services| {
        let service: Service = Arc::new(build(services)?);
        Ok(service)
    })
}

fn listener<L, F>(build: F) -> Factory
where
    L: rsl_core::ListenerAggregate<MvcEvent> + 'static,
    F: Fn(&ServiceManager) -> anyhow::Result<L> + Send + Sync + 'static,
{
    erase(move |services| {
        let listener: SharedListener = Arc::new(build(services)?);
        Ok(listener)
    })
}

/// Registers the framework services on `manager`.
///
/// Replaces earlier registrations of the same names whatever the override
/// flag; per-name `shared` flags in `config` override the defaults below.
pub fn register_defaults(manager: &ServiceManager, config: &ServiceManagerConfig) {
    let catalog = config.modules().to_vec();
    let controllers = config.controllers().to_vec();

    let defaults: Vec<(&str, bool, Factory)> = vec![
        (
            SHARED_EVENT_MANAGER,
            true,
            erase(|_| Ok(Arc::new(SharedListenerPool::<MvcEvent>::new()))),
        ),
        (
            EVENT_MANAGER,
            false,
            erase(|services| {
                let shared = services.get::<Arc<SharedListenerPool<MvcEvent>>>(SHARED_EVENT_MANAGER)?;
                Ok(EventBus::<MvcEvent>::with_shared(Arc::clone(&*shared)))
            }),
        ),
        (
            MODULE_MANAGER,
            true,
            erase(move |services| {
                let (requested, extra) = if services.has(APPLICATION_CONFIG) {
                    let app_config = services.get::<ApplicationConfig>(APPLICATION_CONFIG)?;
                    (app_config.modules.clone(), app_config.extra_config.clone())
                } else {
                    (Vec::new(), serde_json::Map::new())
                };
                Ok(ModuleManager::new(&catalog, requested, extra))
            }),
        ),
        (
            CONFIG,
            true,
            erase(|services| {
                let modules = services.get::<ModuleManager>(MODULE_MANAGER)?;
                Ok(MergedConfig::new(modules.merged_config()))
            }),
        ),
        (REQUEST, true, erase(|_| Ok(Request::default()))),
        (RESPONSE, true, erase(|_| Ok(Response::default()))),
        (
            ROUTER,
            true,
            erase(|services| {
                let config = services.get::<MergedConfig>(CONFIG)?;
                let router: SharedRouter = Arc::new(LiteralRouter::from_config(&config)?);
                Ok(router)
            }),
        ),
        (
            CONTROLLER_MANAGER,
            true,
            erase(move |_| {
                let manager = ControllerManager::new();
                for (name, factory) in &controllers {
                    let factory = Arc::clone(factory);
                    manager.register_shared(name, move |services| factory(services));
                }
                Ok(manager)
            }),
        ),
        (route::NAME, true, listener(|_| Ok(RouteListener::new()))),
        (
            dispatch::NAME,
            true,
            listener(|services| {
                let controllers = services.get::<ControllerManager>(CONTROLLER_MANAGER)?;
                Ok(DispatchListener::new(controllers))
            }),
        ),
        (
            http_method::NAME,
            true,
            listener(|services| {
                let config = services.get::<MergedConfig>(CONFIG)?;
                Ok(HttpMethodListener::new(config.section(http_method::CONFIG_KEY)?))
            }),
        ),
        (
            view::NAME,
            true,
            listener(|services| {
                let config = services.get::<MergedConfig>(CONFIG)?;
                Ok(ViewManager::new(config.section(view::CONFIG_KEY)?))
            }),
        ),
        (
            send_response::NAME,
            true,
            listener(|_| Ok(SendResponseListener::new())),
        ),
    ];

    for (name, shared, factory) in defaults {
        let shared = config.shared.get(name).copied().unwrap_or(shared);
        manager.insert_factory(name, shared, factory);
    }
    debug!(services = ?manager.registered_names(), "default services registered");
}
