//! Rejects requests whose HTTP method is not allowed, before routing.

use std::sync::Arc;

use http::header::ALLOW;
use http::{HeaderValue, StatusCode};
use rsl_core::{EventBus, ListenerAggregate, ListenerHandles, Outcome};
use serde::Deserialize;
use tracing::info;

use crate::event::MvcEvent;

pub const NAME: &str = "HttpMethodListener";

/// Configuration section read from the `Config` service.
pub const CONFIG_KEY: &str = "http_method_listener";

const PRIORITY: i32 = 10_000;

/// `http_method_listener` settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpMethodSettings {
    pub enabled: bool,
    pub allowed_methods: Vec<String>,
}

impl Default for HttpMethodSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_methods: ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"]
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }
}

impl HttpMethodSettings {
    fn allows(&self, method: &str) -> bool {
        self.allowed_methods
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(method))
    }

    fn allow_header(&self) -> String {
        self.allowed_methods
            .iter()
            .map(|method| method.to_ascii_uppercase())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Debug)]
pub struct HttpMethodListener {
    settings: Arc<HttpMethodSettings>,
    handles: ListenerHandles,
}

impl HttpMethodListener {
    #[must_use]
    pub fn new(settings: HttpMethodSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            handles: ListenerHandles::new(),
        }
    }

    /// Answers `405 Method Not Allowed` with an `Allow` header for a method
    /// outside the allow list.
    ///
    /// # Errors
    ///
    /// Fails only if the configured method names are not valid header text.
    pub fn on_route(settings: &HttpMethodSettings, event: &mut MvcEvent) -> anyhow::Result<Outcome> {
        if !settings.enabled {
            return Ok(Outcome::Continue);
        }
        let method = event.request().method().clone();
        if settings.allows(method.as_str()) {
            return Ok(Outcome::Continue);
        }

        info!(%method, "method not allowed");
        let allow = HeaderValue::from_str(&settings.allow_header())?;
        let response = event.response_mut();
        response.set_status(StatusCode::METHOD_NOT_ALLOWED);
        response.headers_mut().insert(ALLOW, allow);
        response.set_body(bytes::Bytes::new());
        Ok(Outcome::Respond)
    }
}

impl ListenerAggregate<MvcEvent> for HttpMethodListener {
    fn attach(&self, bus: &EventBus<MvcEvent>) {
        let settings = Arc::clone(&self.settings);
        self.handles.push(bus.attach(
            MvcEvent::EVENT_ROUTE,
            NAME,
            PRIORITY,
            move |event| Self::on_route(&settings, event),
        ));
    }

    fn detach(&self, bus: &EventBus<MvcEvent>) {
        self.handles.detach_all(bus);
    }
}
