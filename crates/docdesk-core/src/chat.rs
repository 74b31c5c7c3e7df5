//! Chat controller for the RAG query endpoint.
//!
//! One [`ChatSession`] is one conversation: a transcript plus the thread id
//! the service uses to keep context between questions.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use docdesk_types::{ChatEnvelope, ChatRequest, SearchType};
use reqwest::StatusCode;
use serde_json::Value;
use tokio::sync::watch;

use crate::api::{AuthPolicy, RequestOptions, endpoints, parse_body_safely};
use crate::core::request_id::LatestOnly;
use crate::core::scope::Scope;
use crate::error::ApiError;
use crate::session::{SESSION_EXPIRED_MESSAGE, SessionManager};

const NO_REPLY: &str = "No response from AI.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// How an assistant message was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    Search(SearchType),
    Error,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub kind: Option<ReplyKind>,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
            kind: None,
            timestamp: Utc::now(),
        }
    }

    fn assistant(content: String, kind: Option<ReplyKind>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            kind,
            timestamp: Utc::now(),
        }
    }

    fn failure(reason: &str) -> Self {
        Self::assistant(
            format!(
                "Sorry, something went wrong: {}. Please try again.",
                reason.trim_end_matches('.')
            ),
            Some(ReplyKind::Error),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatState {
    pub messages: Vec<ChatMessage>,
    pub thread_id: String,
    pub pending: bool,
}

/// `thread_<epoch-ms>_<9 random chars>`
pub fn new_thread_id() -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(9)
        .collect();
    format!("thread_{}_{suffix}", Utc::now().timestamp_millis())
}

struct Inner {
    session: SessionManager,
    state: watch::Sender<ChatState>,
    // Reset invalidates a reply still in flight.
    exchanges: Mutex<LatestOnly>,
    scope: Scope,
}

#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<Inner>,
}

impl ChatSession {
    pub fn new(session: SessionManager) -> Self {
        let (state, _) = watch::channel(ChatState {
            messages: Vec::new(),
            thread_id: new_thread_id(),
            pending: false,
        });
        let scope = session.scope().child();
        Self {
            inner: Arc::new(Inner {
                session,
                state,
                exchanges: Mutex::new(LatestOnly::default()),
                scope,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> ChatState {
        self.inner.state.borrow().clone()
    }

    pub fn thread_id(&self) -> String {
        self.inner.state.borrow().thread_id.clone()
    }

    /// Sends one question and appends the reply to the transcript.
    ///
    /// Returns `Ok(None)` when nothing was sent: blank input, a send already
    /// pending, or a closed or reset conversation. Failures are appended as
    /// an error message and returned.
    pub async fn send(&self, text: &str) -> Result<Option<ChatMessage>, ApiError> {
        let query = text.trim().to_string();
        if query.is_empty() || !self.inner.scope.is_alive() {
            return Ok(None);
        }

        let accepted = self.inner.state.send_if_modified(|s| {
            if s.pending {
                return false;
            }
            s.pending = true;
            s.messages.push(ChatMessage::user(text));
            true
        });
        if !accepted {
            tracing::debug!("chat send ignored; another is pending");
            return Ok(None);
        }

        let token = self.exchanges().begin();
        let thread_id = self.thread_id();

        let result = if self.inner.session.is_authenticated() {
            self.exchange(&query, &thread_id).await
        } else {
            Err((
                ApiError::AuthRequired,
                "Please log in to continue.".to_string(),
            ))
        };

        if !self.inner.scope.is_alive() || !self.exchanges().finish_if_active(token) {
            tracing::debug!(%thread_id, "dropping chat reply for a closed or reset conversation");
            return Ok(None);
        }

        match result {
            Ok((reply, server_thread)) => {
                let message = reply.clone();
                self.inner.state.send_modify(|s| {
                    if let Some(id) = server_thread {
                        s.thread_id = id;
                    }
                    s.messages.push(message);
                    s.pending = false;
                });
                Ok(Some(reply))
            }
            Err((err, reason)) => {
                if matches!(err, ApiError::AuthExpired)
                    || (matches!(err, ApiError::AuthRequired)
                        && self.inner.session.is_authenticated())
                {
                    self.inner.session.force_logout(Some(SESSION_EXPIRED_MESSAGE));
                }
                tracing::warn!("chat query failed: {err}");
                self.inner.state.send_modify(|s| {
                    s.messages.push(ChatMessage::failure(&reason));
                    s.pending = false;
                });
                Err(err)
            }
        }
    }

    async fn exchange(
        &self,
        query: &str,
        thread_id: &str,
    ) -> Result<(ChatMessage, Option<String>), (ApiError, String)> {
        let options = RequestOptions::post()
            .json(&ChatRequest { query, thread_id })
            .map_err(|e| {
                let reason = e.user_message();
                (e, reason)
            })?;

        let response = self
            .inner
            .session
            .dispatcher()
            .dispatch(endpoints::PROCESS_QUERY, options, AuthPolicy::Required)
            .await
            .map_err(|e| {
                let reason = e.user_message();
                (e, reason)
            })?;

        let status = response.status();
        let body = parse_body_safely(response).await;
        let error_field = body
            .get("error")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty() && body.get("raw").is_none())
            .map(str::to_string);

        if status == StatusCode::UNAUTHORIZED {
            let reason = error_field.unwrap_or_else(|| SESSION_EXPIRED_MESSAGE.to_string());
            return Err((ApiError::AuthExpired, reason));
        }
        if !status.is_success() {
            let reason = error_field.unwrap_or_else(|| format!("Server error: {}", status.as_u16()));
            return Err((
                ApiError::ServerRejected {
                    status: status.as_u16(),
                    message: reason.clone(),
                },
                reason,
            ));
        }

        let envelope: ChatEnvelope = serde_json::from_value(body).unwrap_or_default();
        let data = match envelope.data {
            Some(data) if envelope.status.as_deref() == Some("success") => data,
            _ => {
                let reason = error_field.unwrap_or_else(|| "Invalid response".to_string());
                return Err((ApiError::MalformedResponse(reason.clone()), reason));
            }
        };

        let search_type = data.search_type.as_deref().and_then(SearchType::parse);
        let content = match search_type {
            Some(SearchType::Rag) => data.answer,
            Some(SearchType::Direct) => data.message,
            None => None,
        }
        .filter(|c| !c.trim().is_empty());
        let (content, kind) = match content {
            Some(content) => (content, search_type.map(ReplyKind::Search)),
            None => (NO_REPLY.to_string(), None),
        };

        let server_thread = envelope.thread_id.filter(|id| !id.trim().is_empty());
        Ok((ChatMessage::assistant(content, kind), server_thread))
    }

    /// Starts a new conversation with a fresh thread id. A reply still in
    /// flight is dropped.
    pub fn reset(&self) {
        if !self.inner.scope.is_alive() {
            return;
        }
        self.exchanges().cancel();
        let thread_id = new_thread_id();
        tracing::debug!(%thread_id, "conversation reset");
        self.inner.state.send_modify(|s| {
            s.messages.clear();
            s.thread_id = thread_id;
            s.pending = false;
        });
    }

    pub fn close(&self) {
        self.inner.scope.close();
    }

    fn exchanges(&self) -> std::sync::MutexGuard<'_, LatestOnly> {
        self.inner
            .exchanges
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
