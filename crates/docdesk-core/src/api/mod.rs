//! HTTP plumbing shared by every controller.

pub mod dispatcher;
pub mod endpoints;

pub use dispatcher::{
    AuthPolicy, Dispatcher, RequestBody, RequestOptions, ServiceRoutes, parse_body_safely,
    server_message,
};

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("docdesk/", env!("CARGO_PKG_VERSION"));
