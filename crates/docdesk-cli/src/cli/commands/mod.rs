//! CLI command handlers.

pub mod auth;
pub mod chat;
pub mod config;
pub mod docs;

use anyhow::{Result, anyhow, bail};
use docdesk_core::ApiError;
use docdesk_core::session::SessionManager;

fn require_login(session: &SessionManager) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Not logged in. Run `docdesk login` first.");
    }
    Ok(())
}

/// Prefers the message the controller committed to its state.
fn failure(committed: Option<String>, err: &ApiError) -> anyhow::Error {
    tracing::debug!("command failed: {err}");
    anyhow!(committed.unwrap_or_else(|| err.user_message()))
}
