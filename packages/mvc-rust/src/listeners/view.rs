//! JSON view layer.
//!
//! On `bootstrap` the view manager installs its rendering strategies on the
//! orchestrator's bus: an error view model builder for `dispatch.error`, and
//! JSON serializers for `render` and `render.error`. The strategies are
//! attached during a trigger, so they take part from the next event on.

use std::sync::Arc;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use rsl_core::{ErrorKind, EventBus, ListenerAggregate, ListenerHandles, Outcome, DEFAULT_PRIORITY};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::event::MvcEvent;

pub const NAME: &str = "ViewManager";

/// Configuration section read from the `Config` service.
pub const CONFIG_KEY: &str = "view_manager";

const BOOTSTRAP_PRIORITY: i32 = 10_000;
const RENDER_PRIORITY: i32 = -10_000;

/// `view_manager` settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ViewSettings {
    /// Include the exception message in error bodies.
    pub display_exceptions: bool,
}

#[derive(Debug)]
pub struct ViewManager {
    settings: Arc<ViewSettings>,
    handles: ListenerHandles,
    strategies: Arc<ListenerHandles>,
}

impl ViewManager {
    #[must_use]
    pub fn new(settings: ViewSettings) -> Self {
        Self {
            settings: Arc::new(settings),
            handles: ListenerHandles::new(),
            strategies: Arc::new(ListenerHandles::new()),
        }
    }

    /// Number of rendering strategies currently installed on `bus`.
    #[must_use]
    pub fn strategy_count(&self, bus: &EventBus<MvcEvent>) -> usize {
        self.strategies.count_on(bus)
    }

    fn install(bus: &EventBus<MvcEvent>, settings: &Arc<ViewSettings>, strategies: &ListenerHandles) {
        let error_settings = Arc::clone(settings);
        strategies.push(bus.attach(
            MvcEvent::EVENT_DISPATCH_ERROR,
            NAME,
            DEFAULT_PRIORITY,
            move |event| Ok(Self::prepare_error(&error_settings, event)),
        ));
        strategies.push(bus.attach(MvcEvent::EVENT_RENDER, NAME, RENDER_PRIORITY, Self::render));

        let render_error_settings = Arc::clone(settings);
        strategies.push(bus.attach(
            MvcEvent::EVENT_RENDER_ERROR,
            NAME,
            RENDER_PRIORITY,
            move |event| {
                Self::prepare_error(&render_error_settings, event);
                Self::render(event)
            },
        ));
        debug!(strategies = strategies.count_on(bus), "view strategies installed");
    }

    /// Builds the error view model for the event's error kind into the result.
    pub fn prepare_error(settings: &ViewSettings, event: &mut MvcEvent) -> Outcome {
        let kind = event.error().unwrap_or(ErrorKind::Exception);
        if event.error().is_none() {
            event.set_error(kind);
        }
        let status = kind.suggested_status();
        let mut model = json!({
            "error": kind.as_str(),
            "status": status,
            "path": event.request().path(),
        });
        if settings.display_exceptions {
            if let Some(exception) = event.exception() {
                model["message"] = Value::String(format!("{exception:#}"));
            }
        }
        event.set_result(model);
        Outcome::Continue
    }

    /// Serializes the result as the JSON response body.
    ///
    /// A flagged error replaces a success status with the error's status.
    /// Without a result the response is left as the controller shaped it.
    ///
    /// # Errors
    ///
    /// Fails if the result cannot be serialized.
    pub fn render(event: &mut MvcEvent) -> anyhow::Result<Outcome> {
        if event.response_sent() {
            return Ok(Outcome::Continue);
        }
        if let Some(kind) = event.error() {
            if event.response().status().is_success() {
                let status = StatusCode::from_u16(kind.suggested_status())?;
                event.response_mut().set_status(status);
            }
        }
        let Some(result) = event.result() else {
            return Ok(Outcome::Continue);
        };
        let body = serde_json::to_vec(result)?;
        let response = event.response_mut();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response.set_body(body);
        Ok(Outcome::Continue)
    }
}

impl ListenerAggregate<MvcEvent> for ViewManager {
    fn attach(&self, bus: &EventBus<MvcEvent>) {
        let settings = Arc::clone(&self.settings);
        let strategies = Arc::clone(&self.strategies);
        self.handles.push(bus.attach(
            MvcEvent::EVENT_BOOTSTRAP,
            NAME,
            BOOTSTRAP_PRIORITY,
            move |event| {
                let bus = Arc::clone(event.target().events());
                if strategies.count_on(&bus) == 0 {
                    Self::install(&bus, &settings, &strategies);
                }
                Ok(Outcome::Continue)
            },
        ));
    }

    fn detach(&self, bus: &EventBus<MvcEvent>) {
        self.handles.detach_all(bus);
        self.strategies.detach_all(bus);
    }
}
