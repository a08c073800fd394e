//! Name-keyed service container.
//!
//! Services are either pre-built instances or factories resolved on first
//! use. Shared factories cache their product; non-shared factories build a
//! fresh instance on every lookup. Lookups are by string name and the result
//! is downcast to the caller's expected type.

use std::any::{type_name, Any};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, trace};

use crate::controller::{Controller, SharedController};
use crate::event::MvcEvent;
use crate::module::Module;
use crate::registry::SharedListener;
use rsl_core::ListenerAggregate;

/// A type-erased service instance.
pub type Service = Arc<dyn Any + Send + Sync>;

/// Builds a service, possibly resolving its own dependencies from the container.
pub type Factory = Arc<dyn Fn(&ServiceManager) -> anyhow::Result<Service> + Send + Sync>;

// ---------------------------------------------------------------------------
// ContainerError
// ---------------------------------------------------------------------------

/// Failures of service resolution and registration.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("service not found: {name}")]
    ServiceNotFound { name: String },
    #[error("circular dependency detected: {}", chain.join(" -> "))]
    CircularDependency { chain: Vec<String> },
    #[error("service already exists: {name}")]
    ServiceAlreadyExists { name: String },
    #[error("`{name}` is a reserved service name")]
    ReservedName { name: String },
    #[error("service `{name}` is not a `{expected}`")]
    TypeMismatch { name: String, expected: &'static str },
    #[error("failed to create service `{name}`")]
    CreationFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

impl ContainerError {
    /// Lifts a factory failure. Cycles detected deeper in the graph are
    /// surfaced as-is rather than wrapped.
    fn from_factory(name: &str, err: anyhow::Error) -> Self {
        match err.downcast::<ContainerError>() {
            Ok(cycle @ ContainerError::CircularDependency { .. }) => cycle,
            Ok(other) => ContainerError::CreationFailed {
                name: name.to_string(),
                source: other.into(),
            },
            Err(source) => ContainerError::CreationFailed {
                name: name.to_string(),
                source,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceManager
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct Definition {
    factory: Factory,
    shared: bool,
}

/// Resolves services by name.
///
/// Registration and lookup take `&self`; the container is shared as
/// `Arc<ServiceManager>` between the orchestrator, modules and factories.
pub struct ServiceManager {
    instances: DashMap<String, Service>,
    definitions: DashMap<String, Definition>,
    aliases: DashMap<String, String>,
    allow_override: AtomicBool,
    /// Names currently being built, per thread, for cycle detection.
    resolving: Mutex<HashMap<ThreadId, Vec<String>>>,
}

impl ServiceManager {
    /// Creates an empty container with overrides disabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            instances: DashMap::new(),
            definitions: DashMap::new(),
            aliases: DashMap::new(),
            allow_override: AtomicBool::new(false),
            resolving: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a container populated from `config`.
    ///
    /// `config` may replace services registered earlier on the same
    /// container; the configured `allow_override` applies afterwards.
    #[must_use]
    pub fn with_config(config: &ServiceManagerConfig) -> Self {
        let manager = Self::new();
        config.configure(&manager);
        manager
    }

    #[must_use]
    pub fn allow_override(&self) -> bool {
        self.allow_override.load(Ordering::Acquire)
    }

    pub fn set_allow_override(&self, allow: bool) {
        self.allow_override.store(allow, Ordering::Release);
    }

    /// Whether `name` (or the service it aliases) can be resolved.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        let name = self.canonical_name(name);
        self.instances.contains_key(&name) || self.definitions.contains_key(&name)
    }

    /// Every registered name (instances, factories and aliases), sorted.
    #[must_use]
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .instances
            .iter()
            .map(|entry| entry.key().clone())
            .chain(self.definitions.iter().map(|entry| entry.key().clone()))
            .chain(self.aliases.iter().map(|entry| entry.key().clone()))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Registers a pre-built instance.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::ServiceAlreadyExists`] if `name` is taken and
    /// overrides are disabled.
    pub fn set_service<T: Any + Send + Sync>(&self, name: &str, service: T) -> Result<(), ContainerError> {
        self.set_instance(name, Arc::new(service))
    }

    /// Registers an already type-erased instance.
    ///
    /// # Errors
    ///
    /// Same as [`set_service`](Self::set_service).
    pub fn set_instance(&self, name: &str, service: Service) -> Result<(), ContainerError> {
        self.check_override(name)?;
        self.insert_instance(name, service);
        Ok(())
    }

    /// Registers a factory; `shared` factories are invoked at most once.
    ///
    /// # Errors
    ///
    /// Same as [`set_service`](Self::set_service).
    pub fn set_factory(&self, name: &str, shared: bool, factory: Factory) -> Result<(), ContainerError> {
        self.check_override(name)?;
        self.insert_factory(name, shared, factory);
        Ok(())
    }

    /// Makes `alias` resolve to `target`.
    ///
    /// # Errors
    ///
    /// Same as [`set_service`](Self::set_service).
    pub fn set_alias(&self, alias: &str, target: &str) -> Result<(), ContainerError> {
        self.check_override(alias)?;
        self.insert_alias(alias, target);
        Ok(())
    }

    /// Registers an instance regardless of the override flag.
    pub(crate) fn insert_instance(&self, name: &str, service: Service) {
        self.definitions.remove(name);
        self.instances.insert(name.to_string(), service);
        debug!(service = name, "service instance registered");
    }

    /// Registers a factory regardless of the override flag.
    pub(crate) fn insert_factory(&self, name: &str, shared: bool, factory: Factory) {
        self.instances.remove(name);
        self.definitions
            .insert(name.to_string(), Definition { factory, shared });
        debug!(service = name, shared, "service factory registered");
    }

    /// Registers an alias regardless of the override flag.
    pub(crate) fn insert_alias(&self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    /// Drops a cached shared instance so its factory runs again on next lookup.
    /// Instances registered without a factory are kept.
    pub fn evict(&self, name: &str) -> bool {
        let name = self.canonical_name(name);
        if self.definitions.contains_key(&name) {
            return self.instances.remove(&name).is_some();
        }
        false
    }

    /// Resolves `name` and downcasts it to `T`.
    ///
    /// # Errors
    ///
    /// [`ServiceNotFound`](ContainerError::ServiceNotFound),
    /// [`CircularDependency`](ContainerError::CircularDependency),
    /// [`CreationFailed`](ContainerError::CreationFailed), or
    /// [`TypeMismatch`](ContainerError::TypeMismatch) when the service is not a `T`.
    pub fn get<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ContainerError> {
        self.get_service(name)?
            .downcast::<T>()
            .map_err(|_| ContainerError::TypeMismatch {
                name: name.to_string(),
                expected: type_name::<T>(),
            })
    }

    /// Resolves `name` without downcasting.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), minus the type check.
    pub fn get_service(&self, name: &str) -> Result<Service, ContainerError> {
        let canonical = self.canonical_name(name);
        if let Some(instance) = self.instances.get(&canonical) {
            return Ok(Arc::clone(instance.value()));
        }

        let definition = self
            .definitions
            .get(&canonical)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ContainerError::ServiceNotFound {
                name: name.to_string(),
            })?;

        let _guard = self.enter(&canonical)?;
        trace!(service = %canonical, "creating service");
        let service =
            (definition.factory)(self).map_err(|err| ContainerError::from_factory(&canonical, err))?;

        if definition.shared {
            self.instances.insert(canonical, Arc::clone(&service));
        }
        Ok(service)
    }

    fn check_override(&self, name: &str) -> Result<(), ContainerError> {
        if !self.allow_override() && (self.has(name) || self.aliases.contains_key(name)) {
            return Err(ContainerError::ServiceAlreadyExists {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn canonical_name(&self, name: &str) -> String {
        let mut current = name.to_string();
        // Bounded so an alias loop cannot spin forever.
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(&current) {
                Some(target) => current = target.value().clone(),
                None => break,
            }
        }
        current
    }

    fn enter(&self, name: &str) -> Result<ResolutionGuard<'_>, ContainerError> {
        let thread = thread::current().id();
        let mut resolving = self.resolving.lock();
        let stack = resolving.entry(thread).or_default();
        if stack.iter().any(|pending| pending == name) {
            let mut chain = stack.clone();
            chain.push(name.to_string());
            return Err(ContainerError::CircularDependency { chain });
        }
        stack.push(name.to_string());
        Ok(ResolutionGuard {
            manager: self,
            thread,
        })
    }
}

impl Default for ServiceManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ServiceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceManager")
            .field("services", &self.registered_names())
            .field("allow_override", &self.allow_override())
            .finish_non_exhaustive()
    }
}

/// Pops the resolution stack entry on drop, including on factory failure.
struct ResolutionGuard<'a> {
    manager: &'a ServiceManager,
    thread: ThreadId,
}

impl Drop for ResolutionGuard<'_> {
    fn drop(&mut self) {
        let mut resolving = self.manager.resolving.lock();
        if let Some(stack) = resolving.get_mut(&self.thread) {
            stack.pop();
            if stack.is_empty() {
                resolving.remove(&self.thread);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ServiceManagerConfig
// ---------------------------------------------------------------------------

/// Container configuration.
///
/// Aliases and flags can come from a configuration file; factories, instances,
/// controllers and the module catalog are registered in code through the
/// builder methods.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceManagerConfig {
    /// `alias -> target` service names.
    pub aliases: BTreeMap<String, String>,
    /// Whether registrations may replace existing services after configuration.
    pub allow_override: bool,
    /// Per-name override of the shared flag for code-registered factories.
    pub shared: BTreeMap<String, bool>,
    #[serde(skip)]
    factories: Vec<(String, Factory)>,
    #[serde(skip)]
    services: Vec<(String, Service)>,
    #[serde(skip)]
    controllers: Vec<(String, ControllerFactory)>,
    #[serde(skip)]
    modules: Vec<Arc<dyn Module>>,
}

/// Builds a controller on demand.
pub type ControllerFactory =
    Arc<dyn Fn(&ServiceManager) -> anyhow::Result<SharedController> + Send + Sync>;

impl ServiceManagerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory producing a `T`.
    #[must_use]
    pub fn factory<T, F>(mut self, name: &str, factory: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&ServiceManager) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let erased: Factory = Arc::new(move |services| {
            let service: Service = Arc::new(factory(services)?);
            Ok(service)
        });
        self.factories.push((name.to_string(), erased));
        self
    }

    /// Registers a pre-built instance.
    #[must_use]
    pub fn service<T: Any + Send + Sync>(mut self, name: &str, service: T) -> Self {
        self.services.push((name.to_string(), Arc::new(service)));
        self
    }

    /// Registers a listener aggregate factory under `name`.
    #[must_use]
    pub fn listener<L, F>(self, name: &str, factory: F) -> Self
    where
        L: ListenerAggregate<MvcEvent> + 'static,
        F: Fn(&ServiceManager) -> anyhow::Result<L> + Send + Sync + 'static,
    {
        self.factory(name, move |services| {
            let listener: SharedListener = Arc::new(factory(services)?);
            Ok(listener)
        })
    }

    /// Registers a controller factory with the `ControllerManager`.
    #[must_use]
    pub fn controller<C, F>(mut self, name: &str, factory: F) -> Self
    where
        C: Controller + 'static,
        F: Fn(&ServiceManager) -> anyhow::Result<C> + Send + Sync + 'static,
    {
        let erased: ControllerFactory = Arc::new(move |services| {
            let controller: SharedController = Arc::new(factory(services)?);
            Ok(controller)
        });
        self.controllers.push((name.to_string(), erased));
        self
    }

    #[must_use]
    pub fn alias(mut self, alias: &str, target: &str) -> Self {
        self.aliases.insert(alias.to_string(), target.to_string());
        self
    }

    /// Makes `module` available to the module manager under its own name.
    #[must_use]
    pub fn module(mut self, module: impl Module + 'static) -> Self {
        self.modules.push(Arc::new(module));
        self
    }

    #[must_use]
    pub fn with_allow_override(mut self, allow: bool) -> Self {
        self.allow_override = allow;
        self
    }

    #[must_use]
    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    #[must_use]
    pub fn controllers(&self) -> &[(String, ControllerFactory)] {
        &self.controllers
    }

    /// Applies defaults and then this configuration to `manager`.
    ///
    /// Configured entries replace earlier registrations whatever the
    /// override flag; `allow_override` governs later registrations only.
    pub fn configure(&self, manager: &ServiceManager) {
        crate::services::register_defaults(manager, self);

        for (name, factory) in &self.factories {
            let shared = self.shared.get(name).copied().unwrap_or(true);
            manager.insert_factory(name, shared, Arc::clone(factory));
        }
        for (name, service) in &self.services {
            manager.insert_instance(name, Arc::clone(service));
        }
        for (alias, target) in &self.aliases {
            manager.insert_alias(alias, target);
        }
        manager.set_allow_override(self.allow_override);
    }
}

impl fmt::Debug for ServiceManagerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let factories: Vec<&str> = self.factories.iter().map(|(name, _)| name.as_str()).collect();
        let services: Vec<&str> = self.services.iter().map(|(name, _)| name.as_str()).collect();
        let controllers: Vec<&str> = self.controllers.iter().map(|(name, _)| name.as_str()).collect();
        let modules: Vec<&str> = self.modules.iter().map(|module| module.name()).collect();
        f.debug_struct("ServiceManagerConfig")
            .field("aliases", &self.aliases)
            .field("allow_override", &self.allow_override)
            .field("shared", &self.shared)
            .field("factories", &factories)
            .field("services", &services)
            .field("controllers", &controllers)
            .field("modules", &modules)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicU32;

    use super::*;

    fn counting_factory(counter: Arc<AtomicU32>) -> Factory {
        Arc::new(move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            let service: Service = Arc::new(n);
            Ok(service)
        })
    }

    #[test]
    fn instance_lookup_downcasts() {
        let services = ServiceManager::new();
        services.set_service("greeting", String::from("hello")).unwrap();

        let greeting = services.get::<String>("greeting").unwrap();
        assert_eq!(greeting.as_str(), "hello");
        assert!(services.has("greeting"));
    }

    #[test]
    fn missing_service_is_not_found() {
        let services = ServiceManager::new();
        let err = services.get::<String>("Router").unwrap_err();
        assert!(matches!(err, ContainerError::ServiceNotFound { name } if name == "Router"));
    }

    #[test]
    fn wrong_type_is_a_mismatch() {
        let services = ServiceManager::new();
        services.set_service("answer", 42u32).unwrap();
        let err = services.get::<String>("answer").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { name, .. } if name == "answer"));
    }

    #[test]
    fn shared_factory_runs_once_and_non_shared_every_time() {
        let services = ServiceManager::new();
        let shared_calls = Arc::new(AtomicU32::new(0));
        let fresh_calls = Arc::new(AtomicU32::new(0));
        services
            .set_factory("shared", true, counting_factory(Arc::clone(&shared_calls)))
            .unwrap();
        services
            .set_factory("fresh", false, counting_factory(Arc::clone(&fresh_calls)))
            .unwrap();

        let a = services.get::<u32>("shared").unwrap();
        let b = services.get::<u32>("shared").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(shared_calls.load(Ordering::SeqCst), 1);

        let first = services.get::<u32>("fresh").unwrap();
        let second = services.get::<u32>("fresh").unwrap();
        assert_eq!((*first, *second), (0, 1));
        assert_eq!(fresh_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn duplicate_registration_fails_unless_overrides_allowed() {
        let services = ServiceManager::new();
        services.set_service("Config", 1u32).unwrap();
        let err = services.set_service("Config", 2u32).unwrap_err();
        assert!(matches!(err, ContainerError::ServiceAlreadyExists { name } if name == "Config"));

        services.set_allow_override(true);
        services.set_service("Config", 2u32).unwrap();
        assert_eq!(*services.get::<u32>("Config").unwrap(), 2);
    }

    #[test]
    fn aliases_resolve_to_target() {
        let services = ServiceManager::new();
        services.set_service("Router", String::from("literal")).unwrap();
        services.set_alias("HttpRouter", "Router").unwrap();
        services.set_alias("DefaultRouter", "HttpRouter").unwrap();

        let router = services.get::<String>("DefaultRouter").unwrap();
        assert_eq!(router.as_str(), "literal");
        assert!(services.has("HttpRouter"));
    }

    #[test]
    fn cycles_are_reported_with_their_chain() {
        let services = ServiceManager::new();
        services
            .set_factory(
                "A",
                true,
                Arc::new(|sm: &ServiceManager| {
                    let b = sm.get::<u32>("B")?;
                    let service: Service = Arc::new(*b);
                    Ok(service)
                }),
            )
            .unwrap();
        services
            .set_factory(
                "B",
                true,
                Arc::new(|sm: &ServiceManager| {
                    let a = sm.get::<u32>("A")?;
                    let service: Service = Arc::new(*a);
                    Ok(service)
                }),
            )
            .unwrap();

        let err = services.get::<u32>("A").unwrap_err();
        match err {
            ContainerError::CircularDependency { chain } => {
                assert_eq!(chain, vec!["A", "B", "A"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        // The resolution stack is unwound after the failure.
        services.set_allow_override(true);
        services.set_service("B", 7u32).unwrap();
        assert_eq!(*services.get::<u32>("A").unwrap(), 7);
    }

    #[test]
    fn factory_failure_is_wrapped() {
        let services = ServiceManager::new();
        services
            .set_factory("Broken", true, Arc::new(|_| Err(anyhow::anyhow!("no database"))))
            .unwrap();

        let err = services.get::<u32>("Broken").unwrap_err();
        match err {
            ContainerError::CreationFailed { name, source } => {
                assert_eq!(name, "Broken");
                assert_eq!(source.to_string(), "no database");
            }
            other => panic!("expected creation failure, got {other:?}"),
        }
    }

    #[test]
    fn evict_forces_shared_factory_to_rerun() {
        let services = ServiceManager::new();
        let calls = Arc::new(AtomicU32::new(0));
        services
            .set_factory("Config", true, counting_factory(Arc::clone(&calls)))
            .unwrap();

        assert_eq!(*services.get::<u32>("Config").unwrap(), 0);
        assert!(services.evict("Config"));
        assert_eq!(*services.get::<u32>("Config").unwrap(), 1);

        services.set_service("Plain", 5u32).unwrap();
        assert!(!services.evict("Plain"));
        assert!(services.has("Plain"));
    }

    #[test]
    fn config_factories_override_defaults_and_respect_shared_flags() {
        let mut config = ServiceManagerConfig::new()
            .factory("Counter", |_| Ok(String::from("built")))
            .service("Request", 99u32)
            .alias("Counter2", "Counter");
        config.shared.insert("Counter".to_string(), false);

        let services = ServiceManager::with_config(&config);
        assert!(!services.allow_override());
        assert_eq!(*services.get::<u32>("Request").unwrap(), 99);
        assert_eq!(services.get::<String>("Counter2").unwrap().as_str(), "built");
        assert!(services.has("EventManager"));

        let err = services.set_service("Request", 1u32).unwrap_err();
        assert!(matches!(err, ContainerError::ServiceAlreadyExists { name } if name == "Request"));
    }

    #[test]
    fn insert_ignores_the_override_flag() {
        let services = ServiceManager::new();
        services.set_service("Config", 1u32).unwrap();
        services.insert_instance("Config", Arc::new(2u32));
        services.insert_alias("Settings", "Config");
        assert!(!services.allow_override());
        assert_eq!(*services.get::<u32>("Settings").unwrap(), 2);
    }

    #[test]
    fn config_deserializes_file_level_keys() {
        let config: ServiceManagerConfig = serde_json::from_str(
            r#"{"aliases": {"Db": "Database"}, "allow_override": true, "shared": {"EventManager": false}}"#,
        )
        .unwrap();
        assert_eq!(config.aliases.get("Db").map(String::as_str), Some("Database"));
        assert!(config.allow_override);
        assert_eq!(config.shared.get("EventManager"), Some(&false));
        assert!(format!("{config:?}").contains("Database"));
    }
}
