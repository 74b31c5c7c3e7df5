//! Authenticated-identity state machine.
//!
//! [`SessionManager`] is the single source of truth for "is the user logged
//! in". It restores the session from the credential store on start, performs
//! login against the auth service and clears everything on logout. Every
//! state change is published on a `watch` channel so several surfaces can
//! observe the same session.
//!
//! ```text
//! Uninitialized -> Restoring -> Authenticated | Unauthenticated
//! Unauthenticated | AuthError -> Authenticated   (login ok)
//! *                           -> AuthError       (login failed)
//! *                           -> Unauthenticated (logout / forced logout)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use docdesk_types::{LoginEnvelope, LoginRequest, UserProfile};
use serde_json::Value;
use tokio::sync::watch;

use crate::api::{AuthPolicy, Dispatcher, RequestOptions, endpoints, parse_body_safely};
use crate::core::scope::Scope;
use crate::credentials::{CredentialStore, IdentityError, mask_token};
use crate::error::ApiError;

/// Message recorded when a data call finds the session no longer valid.
pub const SESSION_EXPIRED_MESSAGE: &str = "Session expired. Please log in again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Uninitialized,
    Restoring,
    Authenticated,
    Unauthenticated,
    AuthError,
}

impl SessionStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Restoring => "restoring",
            Self::Authenticated => "authenticated",
            Self::Unauthenticated => "unauthenticated",
            Self::AuthError => "auth error",
        }
    }
}

/// Snapshot of the session. `status == Authenticated` exactly when both
/// `token` and `user` are set.
#[derive(Clone, PartialEq)]
pub struct Session {
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub status: SessionStatus,
    pub last_error: Option<String>,
    pub busy: bool,
}

impl Session {
    fn uninitialized() -> Self {
        Self {
            token: None,
            user: None,
            status: SessionStatus::Uninitialized,
            last_error: None,
            busy: false,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.status == SessionStatus::Authenticated
    }

    fn sign_in(&mut self, token: String, user: UserProfile) {
        self.token = Some(token);
        self.user = Some(user);
        self.status = SessionStatus::Authenticated;
        self.last_error = None;
    }

    fn sign_out(&mut self, status: SessionStatus, error: Option<String>) {
        self.token = None;
        self.user = None;
        self.status = status;
        self.last_error = error;
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_deref().map(mask_token))
            .field("user", &self.user)
            .field("status", &self.status)
            .field("last_error", &self.last_error)
            .field("busy", &self.busy)
            .finish()
    }
}

struct Inner {
    state: watch::Sender<Session>,
    dispatcher: Dispatcher,
    token_ttl: Duration,
    scope: Scope,
    logins_in_flight: AtomicUsize,
}

/// Cloneable handle to the one session of this process.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    /// `token_ttl` applies when the login response carries no lifetime.
    pub fn new(dispatcher: Dispatcher, token_ttl: Duration) -> Self {
        let (state, _) = watch::channel(Session::uninitialized());
        Self {
            inner: Arc::new(Inner {
                state,
                dispatcher,
                token_ttl,
                scope: Scope::new(),
                logins_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    fn credentials(&self) -> &CredentialStore {
        self.inner.dispatcher.credentials()
    }

    /// Lifetime of this manager. Controllers derive their own scope from it.
    pub fn scope(&self) -> &Scope {
        &self.inner.scope
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> Session {
        self.inner.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().status
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.inner.state.borrow().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state.borrow().is_authenticated()
    }

    /// Rehydrates the session from persisted state without any network call.
    ///
    /// Only acts from `Uninitialized`; later calls return the current status.
    pub fn restore(&self) -> SessionStatus {
        if !self.inner.scope.is_alive() {
            return self.status();
        }
        let started = self.inner.state.send_if_modified(|s| {
            if s.status != SessionStatus::Uninitialized {
                return false;
            }
            s.status = SessionStatus::Restoring;
            true
        });
        if !started {
            return self.status();
        }

        let Some(credential) = self.credentials().get() else {
            tracing::debug!("restore: no stored credential");
            self.publish(|s| s.sign_out(SessionStatus::Unauthenticated, None));
            return self.status();
        };

        match self.credentials().identity() {
            Ok(user) => {
                tracing::info!(
                    token = %mask_token(&credential.token),
                    user = user.user_code().unwrap_or("?"),
                    "session restored"
                );
                self.publish(|s| s.sign_in(credential.token, user));
            }
            Err(IdentityError::Missing) => {
                tracing::warn!("restore: credential without cached identity; logging out");
                self.force_logout(None);
            }
            Err(IdentityError::Unreadable(reason)) => {
                tracing::warn!("restore: cached identity unreadable ({reason}); logging out");
                self.force_logout(None);
            }
        }
        self.status()
    }

    /// Logs in with a user code and password.
    ///
    /// On success the token and identity are persisted and the session
    /// becomes `Authenticated`. On failure the session enters `AuthError`
    /// with the reason in `last_error`; the credential store is left as is.
    ///
    /// # Errors
    /// Returns the failure that moved the session to `AuthError`, or
    /// `ApiError::Closed` if the manager was closed meanwhile.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, ApiError> {
        if !self.inner.scope.is_alive() {
            return Err(ApiError::Closed);
        }

        self.inner.logins_in_flight.fetch_add(1, Ordering::SeqCst);
        self.publish(|s| {
            s.busy = true;
            s.last_error = None;
        });

        let result = self.request_login(username, password).await;
        let still_busy = self.inner.logins_in_flight.fetch_sub(1, Ordering::SeqCst) > 1;

        if !self.inner.scope.is_alive() {
            tracing::debug!("login finished after close; result dropped");
            return Err(ApiError::Closed);
        }

        match result {
            Ok((token, user, ttl)) => {
                if let Err(e) = self.credentials().set(&token, ttl) {
                    tracing::warn!("failed to persist credential: {e:#}");
                }
                if let Err(e) = self.credentials().set_identity(&user) {
                    tracing::warn!("failed to persist identity: {e:#}");
                }
                tracing::info!(
                    token = %mask_token(&token),
                    user = user.user_code().unwrap_or(username),
                    "logged in"
                );
                let profile = user.clone();
                self.publish(|s| {
                    s.sign_in(token, user);
                    s.busy = still_busy;
                });
                Ok(profile)
            }
            Err(err) => {
                let message = login_failure_message(&err);
                tracing::warn!("login failed: {err}");
                self.publish(|s| {
                    s.sign_out(SessionStatus::AuthError, Some(message));
                    s.busy = still_busy;
                });
                Err(err)
            }
        }
    }

    async fn request_login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, UserProfile, Duration), ApiError> {
        let options = RequestOptions::post().json(&LoginRequest {
            user_code: username,
            password,
        })?;
        let response = self
            .inner
            .dispatcher
            .dispatch(endpoints::LOGIN, options, AuthPolicy::Anonymous)
            .await?;

        let status = response.status();
        let body = parse_body_safely(response).await;

        if !status.is_success() || body.get("success") != Some(&Value::Bool(true)) {
            let message = rejection_text(&body)
                .unwrap_or_else(|| format!("Login failed: {}", status.as_u16()));
            return Err(ApiError::ServerRejected {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: LoginEnvelope = serde_json::from_value(body)
            .map_err(|e| ApiError::MalformedResponse(format!("login body: {e}")))?;
        let data = envelope
            .data
            .ok_or_else(|| ApiError::MalformedResponse("login body has no data".to_string()))?;
        let token = data
            .token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::MalformedResponse("login body has no token".to_string()))?;
        let user = data
            .user
            .ok_or_else(|| ApiError::MalformedResponse("login body has no user".to_string()))?;
        let ttl = data
            .expires_in
            .filter(|secs| *secs > 0)
            .map_or(self.inner.token_ttl, Duration::from_secs);

        Ok((token, user, ttl))
    }

    /// Clears the credential store, identity and error. Never fails and never
    /// touches the network.
    pub fn logout(&self) {
        self.force_logout(None);
    }

    /// Logout triggered by the system, e.g. a 401 from a data call. `reason`
    /// becomes `last_error`.
    /// Does nothing once the manager is closed.
    pub fn force_logout(&self, reason: Option<&str>) {
        if !self.inner.scope.is_alive() {
            tracing::debug!("logout after close ignored");
            return;
        }
        self.credentials().clear();
        if let Some(reason) = reason {
            tracing::info!("session invalidated: {reason}");
        }
        self.publish(|s| s.sign_out(SessionStatus::Unauthenticated, reason.map(str::to_string)));
    }

    /// Drops `last_error`; an `AuthError` session becomes `Unauthenticated`.
    pub fn clear_error(&self) {
        self.publish(|s| {
            s.last_error = None;
            if s.status == SessionStatus::AuthError {
                s.status = SessionStatus::Unauthenticated;
            }
        });
    }

    /// After this no state change is published, even for calls in flight.
    pub fn close(&self) {
        self.inner.scope.close();
    }

    fn publish(&self, update: impl FnOnce(&mut Session)) {
        if !self.inner.scope.is_alive() {
            return;
        }
        self.inner.state.send_modify(update);
    }
}

fn login_failure_message(err: &ApiError) -> String {
    match err {
        ApiError::MalformedResponse(_) => "Invalid login response from server.".to_string(),
        other => other.user_message(),
    }
}

/// The auth service reports failures in `message`, sometimes in `error`.
fn rejection_text(body: &Value) -> Option<String> {
    if body.get("raw").is_some() {
        return None;
    }
    ["message", "error"].iter().find_map(|key| {
        body.get(*key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    })
}
