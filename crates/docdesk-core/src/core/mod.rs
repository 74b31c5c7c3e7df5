//! Runtime primitives shared by the session and data controllers.

pub mod debounce;
pub mod request_id;
pub mod scope;
