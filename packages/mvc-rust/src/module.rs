//! Modules: the extension point that contributes configuration and services.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::config::merge_values;
use crate::container::{ContainerError, ServiceManager};
use crate::services::service_names;

/// A unit of application functionality loaded by name.
pub trait Module: Send + Sync {
    /// Name used in the `modules` configuration list.
    fn name(&self) -> &str;

    /// Configuration merged into the `Config` service, in load order.
    fn config(&self) -> Value {
        Value::Object(Map::new())
    }

    /// Registers services, controllers or listeners. Overrides are allowed here.
    ///
    /// # Errors
    ///
    /// Any error aborts module loading.
    fn on_load(&self, services: &ServiceManager) -> anyhow::Result<()> {
        let _ = services;
        Ok(())
    }
}

/// Failures while loading modules. All of them abort application startup.
#[derive(Debug, thiserror::Error)]
pub enum ModuleError {
    #[error("module `{name}` is not registered")]
    NotFound { name: String },
    #[error("module `{name}` failed to load")]
    LoadFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Container(#[from] ContainerError),
}

#[derive(Debug, Default)]
struct LoadState {
    done: bool,
    loaded: Vec<String>,
    merged: Option<Value>,
}

/// Loads the requested modules from a catalog of available ones.
pub struct ModuleManager {
    catalog: HashMap<String, Arc<dyn Module>>,
    requested: Vec<String>,
    extra_config: Map<String, Value>,
    state: RwLock<LoadState>,
}

impl ModuleManager {
    #[must_use]
    pub fn new(
        catalog: &[Arc<dyn Module>],
        requested: Vec<String>,
        extra_config: Map<String, Value>,
    ) -> Self {
        let catalog = catalog
            .iter()
            .map(|module| (module.name().to_string(), Arc::clone(module)))
            .collect();
        Self {
            catalog,
            requested,
            extra_config,
            state: RwLock::new(LoadState::default()),
        }
    }

    /// Loads every requested module in order. A second call is a no-op.
    ///
    /// Configuration is merged first (modules in order, then `extra_config`),
    /// then each module's `on_load` runs with overrides enabled on `services`.
    /// A cached `Config` instance is dropped so the next lookup sees the merge.
    ///
    /// # Errors
    ///
    /// [`ModuleError::NotFound`] for a name missing from the catalog,
    /// [`ModuleError::LoadFailed`] if a module's `on_load` fails.
    pub fn load_modules(&self, services: &ServiceManager) -> Result<(), ModuleError> {
        if self.is_loaded() {
            debug!("modules already loaded");
            return Ok(());
        }

        let modules = self
            .requested
            .iter()
            .map(|name| {
                self.catalog
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ModuleError::NotFound { name: name.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut merged = Value::Object(Map::new());
        for module in &modules {
            merge_values(&mut merged, module.config());
        }
        merge_values(&mut merged, Value::Object(self.extra_config.clone()));

        {
            let mut state = self.state.write();
            state.merged = Some(merged);
        }
        services.evict(service_names::CONFIG);

        let previous = services.allow_override();
        services.set_allow_override(true);
        let result = modules.iter().try_for_each(|module| {
            debug!(module = module.name(), "loading module");
            module.on_load(services).map_err(|source| ModuleError::LoadFailed {
                name: module.name().to_string(),
                source,
            })
        });
        services.set_allow_override(previous);
        result?;

        let mut state = self.state.write();
        state.loaded = modules.iter().map(|module| module.name().to_string()).collect();
        state.done = true;
        info!(modules = ?state.loaded, "modules loaded");
        Ok(())
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.state.read().done
    }

    /// Names of the loaded modules, in load order.
    #[must_use]
    pub fn loaded_modules(&self) -> Vec<String> {
        self.state.read().loaded.clone()
    }

    /// The merged configuration; only `extra_config` before loading.
    #[must_use]
    pub fn merged_config(&self) -> Value {
        match &self.state.read().merged {
            Some(merged) => merged.clone(),
            None => Value::Object(self.extra_config.clone()),
        }
    }
}

impl std::fmt::Debug for ModuleManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut available: Vec<&String> = self.catalog.keys().collect();
        available.sort();
        f.debug_struct("ModuleManager")
            .field("available", &available)
            .field("requested", &self.requested)
            .field("loaded", &self.loaded_modules())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::config::MergedConfig;

    struct Blog;

    impl Module for Blog {
        fn name(&self) -> &str {
            "Blog"
        }

        fn config(&self) -> Value {
            json!({"listeners": ["BlogListener"], "blog": {"per_page": 10}})
        }

        fn on_load(&self, services: &ServiceManager) -> anyhow::Result<()> {
            services.set_service("BlogRepository", String::from("memory"))?;
            Ok(())
        }
    }

    struct Theme;

    impl Module for Theme {
        fn name(&self) -> &str {
            "Theme"
        }

        fn config(&self) -> Value {
            json!({"listeners": ["ThemeListener"], "blog": {"per_page": 20}})
        }

        fn on_load(&self, services: &ServiceManager) -> anyhow::Result<()> {
            // Replaces a service registered by an earlier module.
            services.set_service("BlogRepository", String::from("themed"))?;
            Ok(())
        }
    }

    struct Broken;

    impl Module for Broken {
        fn name(&self) -> &str {
            "Broken"
        }

        fn on_load(&self, _services: &ServiceManager) -> anyhow::Result<()> {
            anyhow::bail!("missing schema")
        }
    }

    fn catalog() -> Vec<Arc<dyn Module>> {
        vec![Arc::new(Blog), Arc::new(Theme), Arc::new(Broken)]
    }

    #[test]
    fn merges_config_in_load_order_then_extra() {
        let mut extra = Map::new();
        extra.insert("blog".to_string(), json!({"title": "News"}));
        let manager = ModuleManager::new(&catalog(), vec!["Blog".into(), "Theme".into()], extra);
        let services = ServiceManager::new();

        manager.load_modules(&services).unwrap();

        assert_eq!(manager.loaded_modules(), vec!["Blog", "Theme"]);
        let merged = MergedConfig::new(manager.merged_config());
        assert_eq!(merged.listeners(), vec!["BlogListener", "ThemeListener"]);
        assert_eq!(merged.get("blog"), Some(&json!({"per_page": 20, "title": "News"})));
        assert_eq!(services.get::<String>("BlogRepository").unwrap().as_str(), "themed");
        assert!(!services.allow_override());
    }

    #[test]
    fn unknown_module_is_fatal() {
        let manager = ModuleManager::new(&catalog(), vec!["Shop".into()], Map::new());
        let err = manager.load_modules(&ServiceManager::new()).unwrap_err();
        assert!(matches!(err, ModuleError::NotFound { name } if name == "Shop"));
        assert!(!manager.is_loaded());
    }

    #[test]
    fn on_load_failure_names_the_module() {
        let manager = ModuleManager::new(&catalog(), vec!["Broken".into()], Map::new());
        let services = ServiceManager::new();
        let err = manager.load_modules(&services).unwrap_err();
        assert!(matches!(err, ModuleError::LoadFailed { ref name, .. } if name == "Broken"));
        assert!(!services.allow_override());
    }

    #[test]
    fn second_load_is_a_no_op() {
        let manager = ModuleManager::new(&catalog(), vec!["Blog".into()], Map::new());
        let services = ServiceManager::new();
        manager.load_modules(&services).unwrap();
        manager.load_modules(&services).unwrap();
        assert_eq!(manager.loaded_modules(), vec!["Blog"]);
    }

    #[test]
    fn merged_config_before_loading_is_extra_only() {
        let mut extra = Map::new();
        extra.insert("listeners".to_string(), json!(["Early"]));
        let manager = ModuleManager::new(&catalog(), vec![], extra);
        assert_eq!(manager.merged_config(), json!({"listeners": ["Early"]}));

        manager.load_modules(&ServiceManager::new()).unwrap();
        assert!(manager.is_loaded());
        assert!(manager.loaded_modules().is_empty());
    }
}
