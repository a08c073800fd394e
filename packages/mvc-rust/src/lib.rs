//! RSL MVC: lifecycle orchestrator, service container, modules and the
//! default request listeners.

pub mod application;
pub mod config;
pub mod container;
pub mod controller;
pub mod event;
pub mod listeners;
pub mod logging;
pub mod message;
pub mod module;
pub mod registry;
pub mod router;
pub mod services;

pub use application::{Application, ApplicationError, LifecycleState, APPLICATION_IDENTIFIER};
pub use config::{ApplicationConfig, ConfigError, MergedConfig};
pub use container::{ContainerError, ServiceManager, ServiceManagerConfig};
pub use controller::{Controller, ControllerManager, SharedController};
pub use event::{ApplicationHandle, MvcEvent};
pub use listeners::DEFAULT_LISTENERS;
pub use message::{Request, Response};
pub use module::{Module, ModuleError, ModuleManager};
pub use registry::{ListenerRegistry, SharedListener};
pub use router::{LiteralRouter, RouteMatch, Router, SharedRouter};
