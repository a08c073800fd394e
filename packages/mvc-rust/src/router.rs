//! Routing collaborator: maps a request to a route match.

use std::collections::BTreeMap;
use std::sync::Arc;

use http::Method;
use serde::Deserialize;

use crate::config::{ConfigError, MergedConfig};
use crate::message::Request;

/// The router held by every lifecycle context.
pub type SharedRouter = Arc<dyn Router>;

/// Matches requests to named routes.
pub trait Router: Send + Sync {
    /// Returns the first route matching `request`, if any.
    fn route(&self, request: &Request) -> Option<RouteMatch>;
}

/// Result of a successful match: route name plus string parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    route_name: String,
    params: BTreeMap<String, String>,
}

impl RouteMatch {
    pub const CONTROLLER: &'static str = "controller";
    pub const ACTION: &'static str = "action";

    #[must_use]
    pub fn new(route_name: impl Into<String>) -> Self {
        Self {
            route_name: route_name.into(),
            params: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn route_name(&self) -> &str {
        &self.route_name
    }

    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    #[must_use]
    pub fn controller(&self) -> Option<&str> {
        self.param(Self::CONTROLLER)
    }

    #[must_use]
    pub fn action(&self) -> Option<&str> {
        self.param(Self::ACTION)
    }
}

/// One entry under `router.routes` in the `Config` service.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteDefinition {
    pub path: String,
    pub controller: String,
    #[serde(default = "default_action")]
    pub action: String,
    /// Restricts the route to these methods; empty means any.
    #[serde(default)]
    pub methods: Vec<String>,
}

fn default_action() -> String {
    "index".to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RouterSection {
    routes: BTreeMap<String, RouteDefinition>,
}

/// Exact path matching over configured routes, in route-name order.
#[derive(Debug, Default)]
pub struct LiteralRouter {
    routes: Vec<(String, RouteDefinition)>,
}

impl LiteralRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the router from the `router` section of the merged configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Section`] if the section is malformed.
    pub fn from_config(config: &MergedConfig) -> Result<Self, ConfigError> {
        let section: RouterSection = config.section("router")?;
        Ok(Self {
            routes: section.routes.into_iter().collect(),
        })
    }

    #[must_use]
    pub fn with_route(mut self, name: impl Into<String>, definition: RouteDefinition) -> Self {
        self.routes.push((name.into(), definition));
        self
    }

    #[must_use]
    pub fn route_names(&self) -> Vec<&str> {
        self.routes.iter().map(|(name, _)| name.as_str()).collect()
    }
}

fn normalize(path: &str) -> &str {
    match path.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    }
}

fn method_allowed(definition: &RouteDefinition, method: &Method) -> bool {
    definition.methods.is_empty()
        || definition
            .methods
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(method.as_str()))
}

impl Router for LiteralRouter {
    fn route(&self, request: &Request) -> Option<RouteMatch> {
        let path = normalize(request.path());
        self.routes
            .iter()
            .find(|(_, definition)| {
                normalize(&definition.path) == path && method_allowed(definition, request.method())
            })
            .map(|(name, definition)| {
                RouteMatch::new(name.clone())
                    .with_param(RouteMatch::CONTROLLER, definition.controller.clone())
                    .with_param(RouteMatch::ACTION, definition.action.clone())
            })
    }
}
