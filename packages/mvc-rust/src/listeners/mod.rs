//! The default lifecycle listeners.
//!
//! - [`route`]: matches the request through the router
//! - [`dispatch`]: resolves and invokes the matched controller
//! - [`http_method`]: rejects disallowed HTTP methods before routing
//! - [`view`]: installs the JSON rendering strategies on bootstrap
//! - [`send_response`]: finalizes the response on finish

pub mod dispatch;
pub mod http_method;
pub mod route;
pub mod send_response;
pub mod view;

pub use dispatch::DispatchListener;
pub use http_method::{HttpMethodListener, HttpMethodSettings};
pub use route::RouteListener;
pub use send_response::SendResponseListener;
pub use view::{ViewManager, ViewSettings};

/// Service names of the default listeners, in attach order.
pub const DEFAULT_LISTENERS: [&str; 5] = [
    route::NAME,
    dispatch::NAME,
    http_method::NAME,
    view::NAME,
    send_response::NAME,
];
