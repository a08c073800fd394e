//! Finalizes the response on `finish`.

use http::header::CONTENT_LENGTH;
use http::HeaderValue;
use rsl_core::{EventBus, ListenerAggregate, ListenerHandles, Outcome};
use tracing::info;

use crate::event::MvcEvent;

pub const NAME: &str = "SendResponseListener";

const PRIORITY: i32 = -10_000;

#[derive(Debug, Default)]
pub struct SendResponseListener {
    handles: ListenerHandles,
}

impl SendResponseListener {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `Content-Length` and marks the response as sent. Runs at most
    /// once per request.
    ///
    /// # Errors
    ///
    /// Never fails.
    pub fn on_finish(event: &mut MvcEvent) -> anyhow::Result<Outcome> {
        if event.response_sent() {
            return Ok(Outcome::Continue);
        }
        let length = event.response().body().len();
        event
            .response_mut()
            .headers_mut()
            .insert(CONTENT_LENGTH, HeaderValue::from(length));
        event.mark_response_sent();
        info!(
            status = event.response().status().as_u16(),
            bytes = length,
            error = event.error().map(|kind| kind.as_str()),
            "response sent"
        );
        Ok(Outcome::Continue)
    }
}

impl ListenerAggregate<MvcEvent> for SendResponseListener {
    fn attach(&self, bus: &EventBus<MvcEvent>) {
        self.handles
            .push(bus.attach(MvcEvent::EVENT_FINISH, NAME, PRIORITY, Self::on_finish));
    }

    fn detach(&self, bus: &EventBus<MvcEvent>) {
        self.handles.detach_all(bus);
    }
}
