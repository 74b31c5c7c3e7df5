//! Session-authenticated client for the docdesk document and chat services.
//!
//! Components, leaves first:
//! - [`credentials::CredentialStore`]: token persistence with expiry.
//! - [`api::Dispatcher`]: request building, routing and credential gating.
//! - [`session::SessionManager`]: the authenticated-identity state machine.
//! - [`documents::QueryCoordinator`]: listing, search and mutations with
//!   latest-only result handling.
//! - [`chat::ChatSession`]: RAG chat with a conversation thread.

pub mod api;
pub mod chat;
pub mod config;
pub mod core;
pub mod credentials;
pub mod documents;
pub mod error;
pub mod logging;
pub mod session;
pub mod storage;

#[cfg(test)]
mod test_support;

pub use error::ApiError;
