//! Documents listing controller.
//!
//! [`QueryCoordinator`] drives the paginated, searchable document list plus
//! the detail view and the upload/rename/delete mutations. User-typed search
//! text is debounced; every list fetch takes a fresh request token and only
//! the latest one may commit. Superseded fetches run to completion and
//! their results are dropped without touching state.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use docdesk_types::{Document, DocumentDetails, DocumentList};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use tokio::sync::watch;

use crate::api::{AuthPolicy, RequestOptions, endpoints, parse_body_safely, server_message};
use crate::core::debounce::Debouncer;
use crate::core::request_id::LatestOnly;
use crate::core::scope::Scope;
use crate::error::ApiError;
use crate::session::{SESSION_EXPIRED_MESSAGE, SessionManager};

/// Quiet period after the last keystroke before a search is sent.
pub const SEARCH_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Extensions the document service indexes.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt", "docx", "csv", "xlsx", "xls"];

const LIST_FAILED: &str = "Failed to load documents.";
const UNREACHABLE: &str = "Could not reach the document service.";

/// Whether a finished call was applied to visible state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Applied,
    /// Superseded, closed, or nothing to do.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    Upload,
    Update,
    Delete,
}

impl Mutation {
    fn failure_prefix(self) -> &'static str {
        match self {
            Self::Upload => "Could not upload",
            Self::Update => "Could not update",
            Self::Delete => "Could not delete",
        }
    }
}

/// Everything a documents screen renders.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentsState {
    pub documents: Vec<Document>,
    pub total: u64,
    /// Text as typed, before the settle delay.
    pub search_text: String,
    /// Query of the most recently issued listing.
    pub query: String,
    pub page: u32,
    /// Unfiltered first-page fetch in flight.
    pub loading: bool,
    /// Filtered fetch in flight.
    pub search_loading: bool,
    pub error: Option<String>,
    pub details: Option<Document>,
    pub details_loading: bool,
    pub mutation: Option<Mutation>,
}

impl Default for DocumentsState {
    fn default() -> Self {
        Self {
            documents: Vec::new(),
            total: 0,
            search_text: String::new(),
            query: String::new(),
            page: 1,
            loading: false,
            search_loading: false,
            error: None,
            details: None,
            details_loading: false,
            mutation: None,
        }
    }
}

impl DocumentsState {
    /// Number of pages for the current total; never below 1.
    pub fn page_count(&self) -> u32 {
        let pages = self.total.div_ceil(u64::from(endpoints::PAGE_SIZE));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }
}

/// A file to add to the index.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
    /// Defaults to the signed-in user's display name.
    pub uploaded_by: Option<String>,
}

struct Inner {
    session: SessionManager,
    state: watch::Sender<DocumentsState>,
    list_requests: Mutex<LatestOnly>,
    details_requests: Mutex<LatestOnly>,
    debouncer: Debouncer,
    scope: Scope,
}

/// Cloneable handle to one documents screen.
#[derive(Clone)]
pub struct QueryCoordinator {
    inner: Arc<Inner>,
}

impl QueryCoordinator {
    pub fn new(session: SessionManager) -> Self {
        Self::with_settle_delay(session, SEARCH_SETTLE_DELAY)
    }

    pub fn with_settle_delay(session: SessionManager, delay: Duration) -> Self {
        let (state, _) = watch::channel(DocumentsState::default());
        let scope = session.scope().child();
        Self {
            inner: Arc::new(Inner {
                session,
                state,
                list_requests: Mutex::new(LatestOnly::default()),
                details_requests: Mutex::new(LatestOnly::default()),
                debouncer: Debouncer::new(delay),
                scope,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DocumentsState> {
        self.inner.state.subscribe()
    }

    pub fn snapshot(&self) -> DocumentsState {
        self.inner.state.borrow().clone()
    }

    /// Records `text`, resets to page 1 and schedules a fetch once typing
    /// settles. Each call restarts the delay.
    pub fn set_search_text(&self, text: &str) {
        if !self.inner.scope.is_alive() {
            return;
        }
        self.publish(|s| {
            s.search_text = text.to_string();
            s.page = 1;
        });

        let weak = Arc::downgrade(&self.inner);
        let text = text.to_string();
        self.inner.debouncer.schedule(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let coordinator = QueryCoordinator { inner };
            tokio::spawn(async move {
                // Every other failure is already committed by fetch_list.
                if let Err(err @ ApiError::AuthRequired) = coordinator.fetch_list(&text, 1).await {
                    tracing::debug!("debounced search skipped: {err}");
                    coordinator.publish(|s| s.error = Some(err.user_message()));
                }
            });
        });
    }

    /// Fetches one page of the listing.
    ///
    /// Returns `Discarded` when a later fetch was issued before this one
    /// completed; state is then left to the later fetch.
    ///
    /// # Errors
    /// `AuthRequired` when the session is not signed in (nothing is sent);
    /// otherwise the failure that was committed to `error`.
    pub async fn fetch_list(&self, query: &str, page: u32) -> Result<Completion, ApiError> {
        if !self.inner.scope.is_alive() {
            return Ok(Completion::Discarded);
        }
        if !self.inner.session.is_authenticated() {
            return Err(ApiError::AuthRequired);
        }

        let page = page.max(1);
        let query = query.trim().to_string();
        // Issuing and publishing the query happen under one lock so a
        // concurrent fetch cannot interleave and leave `query` stale.
        let token = {
            let mut requests = lock(&self.inner.list_requests);
            let token = requests.begin();
            self.publish(|s| {
                s.query.clone_from(&query);
                s.page = page;
                s.loading = page == 1 && query.is_empty();
                s.search_loading = !query.is_empty();
                s.error = None;
            });
            token
        };

        let options = RequestOptions::get().query(endpoints::list_query(&query, page));
        let result = self.send(endpoints::DOCUMENTS_LIST, options).await;

        // Held until the commit is published; a fetch issued meanwhile
        // waits and then supersedes this one.
        let mut requests = lock(&self.inner.list_requests);
        if !self.inner.scope.is_alive() {
            return Ok(Completion::Discarded);
        }
        if !requests.finish_if_active(token) {
            tracing::debug!(request = token.value(), %query, page, "dropping superseded list result");
            return Ok(Completion::Discarded);
        }

        let outcome = match result {
            Ok((status, body)) if status.is_success() => {
                match serde_json::from_value::<DocumentList>(body) {
                    Ok(list) => {
                        let (documents, total) = list.into_parts();
                        tracing::debug!(count = documents.len(), total, "list committed");
                        self.publish(|s| {
                            s.documents = documents;
                            s.total = total;
                        });
                        Ok(Completion::Applied)
                    }
                    Err(e) => {
                        let err = ApiError::MalformedResponse(format!("document list: {e}"));
                        self.publish(|s| s.error = Some(err.user_message()));
                        Err(err)
                    }
                }
            }
            Ok((status, body)) => {
                let err = self.rejection(status, &body, |detail| {
                    detail.unwrap_or_else(|| LIST_FAILED.to_string())
                });
                self.publish(|s| {
                    s.documents.clear();
                    s.total = 0;
                });
                Err(err)
            }
            Err(err) if err.is_auth() => {
                self.expire_session();
                self.publish(|s| {
                    s.documents.clear();
                    s.total = 0;
                });
                Err(err)
            }
            Err(err) => {
                let message = connectivity_message(&err);
                self.publish(|s| s.error = Some(message));
                Err(err)
            }
        };

        self.publish(|s| {
            s.loading = false;
            s.search_loading = false;
        });
        drop(requests);
        outcome
    }

    /// Re-fetches the current query and page.
    pub async fn refresh(&self) -> Result<Completion, ApiError> {
        let (query, page) = self.current_query();
        self.fetch_list(&query, page).await
    }

    /// Jumps to `page`, clamped to the known page range.
    pub async fn set_page(&self, page: u32) -> Result<Completion, ApiError> {
        let (query, _) = self.current_query();
        let page = page.clamp(1, self.snapshot().page_count());
        self.fetch_list(&query, page).await
    }

    pub async fn next_page(&self) -> Result<Completion, ApiError> {
        let state = self.snapshot();
        if state.page >= state.page_count() {
            return Ok(Completion::Discarded);
        }
        self.fetch_list(&state.query, state.page + 1).await
    }

    pub async fn prev_page(&self) -> Result<Completion, ApiError> {
        let state = self.snapshot();
        if state.page <= 1 {
            return Ok(Completion::Discarded);
        }
        self.fetch_list(&state.query, state.page - 1).await
    }

    /// Loads one document for the detail view. Only the latest request
    /// commits.
    pub async fn fetch_details(&self, id: &str) -> Result<Completion, ApiError> {
        if !self.inner.scope.is_alive() || id.trim().is_empty() {
            return Ok(Completion::Discarded);
        }
        if !self.inner.session.is_authenticated() {
            return Err(ApiError::AuthRequired);
        }

        let token = {
            let mut requests = lock(&self.inner.details_requests);
            let token = requests.begin();
            self.publish(|s| {
                s.details = None;
                s.details_loading = true;
            });
            token
        };

        let result = self
            .send(&endpoints::document_details(id), RequestOptions::get())
            .await;

        let mut requests = lock(&self.inner.details_requests);
        if !self.inner.scope.is_alive() {
            return Ok(Completion::Discarded);
        }
        if !requests.finish_if_active(token) {
            tracing::debug!(request = token.value(), %id, "dropping superseded details result");
            return Ok(Completion::Discarded);
        }

        let outcome = match result {
            Ok((status, body)) if status.is_success() => {
                let document = serde_json::from_value::<DocumentDetails>(body)
                    .ok()
                    .and_then(|d| d.document);
                if let Some(document) = document {
                    self.publish(|s| {
                        s.details = Some(document);
                        s.error = None;
                    });
                    Ok(Completion::Applied)
                } else {
                    let err = ApiError::MalformedResponse("details body has no document".into());
                    self.publish(|s| {
                        s.error = Some("Failed to load details: missing document".to_string());
                    });
                    Err(err)
                }
            }
            Ok((status, body)) => {
                if status == StatusCode::UNAUTHORIZED {
                    self.inner.session.force_logout(Some(SESSION_EXPIRED_MESSAGE));
                }
                let detail = server_message(&body)
                    .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));
                self.publish(|s| s.error = Some(format!("Failed to load details: {detail}")));
                Err(if status == StatusCode::UNAUTHORIZED {
                    ApiError::AuthExpired
                } else {
                    ApiError::ServerRejected {
                        status: status.as_u16(),
                        message: detail,
                    }
                })
            }
            Err(err) => {
                if err.is_auth() {
                    self.inner.session.force_logout(Some(SESSION_EXPIRED_MESSAGE));
                }
                let message = connectivity_message(&err);
                self.publish(|s| s.error = Some(format!("Failed to load details: {message}")));
                Err(err)
            }
        };

        self.publish(|s| s.details_loading = false);
        drop(requests);
        outcome
    }

    /// Adds a file to the index, then re-fetches the current page.
    pub async fn upload(&self, upload: Upload) -> Result<Completion, ApiError> {
        if let Err(err) = validate_upload(&upload.file_name) {
            self.publish(|s| s.error = Some(err.user_message()));
            return Err(err);
        }

        let uploaded_by = upload
            .uploaded_by
            .filter(|name| !name.trim().is_empty())
            .or_else(|| {
                self.inner
                    .session
                    .user()
                    .and_then(|u| u.display_name().map(str::to_string))
            })
            .unwrap_or_default();

        let part = Part::bytes(upload.bytes).file_name(upload.file_name);
        let form = Form::new()
            .part("file", part)
            .text("uploaded_by", uploaded_by);

        self.mutate(
            Mutation::Upload,
            endpoints::VECTOR_ADD,
            RequestOptions::post().multipart(form),
        )
        .await
    }

    /// Renames a document. The final extension of `new_name` is dropped.
    pub async fn update(&self, id: &str, new_name: &str) -> Result<Completion, ApiError> {
        let filename = strip_extension(new_name.trim());
        if filename.is_empty() {
            let err = ApiError::InvalidInput("File name cannot be empty.".to_string());
            self.publish(|s| s.error = Some(err.user_message()));
            return Err(err);
        }

        let form = Form::new().text("filename", filename.to_string());
        self.mutate(
            Mutation::Update,
            &endpoints::vector_document(id),
            RequestOptions::put().multipart(form),
        )
        .await
    }

    pub async fn delete(&self, id: &str) -> Result<Completion, ApiError> {
        self.mutate(
            Mutation::Delete,
            &endpoints::vector_document(id),
            RequestOptions::delete(),
        )
        .await
    }

    /// Stops all further state changes. In-flight requests finish unseen.
    pub fn close(&self) {
        self.inner.debouncer.cancel();
        self.inner.scope.close();
    }

    // Shared path for upload/update/delete: any non-2xx is an error, success
    // re-fetches the current page once. The list is never edited locally.
    async fn mutate(
        &self,
        kind: Mutation,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Completion, ApiError> {
        if !self.inner.scope.is_alive() {
            return Ok(Completion::Discarded);
        }
        if !self.inner.session.is_authenticated() {
            return Err(ApiError::AuthRequired);
        }

        self.publish(|s| {
            s.mutation = Some(kind);
            s.error = None;
        });

        let result = self.send(endpoint, options).await;

        if !self.inner.scope.is_alive() {
            return Ok(Completion::Discarded);
        }
        self.publish(|s| s.mutation = None);

        let prefix = kind.failure_prefix();
        match result {
            Ok((status, _)) if status.is_success() => {
                tracing::info!(?kind, %endpoint, "mutation succeeded");
                let (query, page) = self.current_query();
                // The mutation stands even if the re-fetch fails; its error is in state.
                let _ = self.fetch_list(&query, page).await;
                Ok(Completion::Applied)
            }
            Ok((status, body)) => Err(self.rejection(status, &body, |detail| {
                format!(
                    "{prefix}: {}",
                    detail.unwrap_or_else(|| "Unknown error".to_string())
                )
            })),
            Err(err) if err.is_auth() => {
                self.expire_session();
                Err(err)
            }
            Err(err) => {
                let message = format!("{prefix}: {}", connectivity_message(&err));
                self.publish(|s| s.error = Some(message));
                Err(err)
            }
        }
    }

    async fn send(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<(StatusCode, Value), ApiError> {
        let response = self
            .inner
            .session
            .dispatcher()
            .dispatch(endpoint, options, AuthPolicy::Required)
            .await?;
        let status = response.status();
        Ok((status, parse_body_safely(response).await))
    }

    /// Commits a non-2xx answer: 401 expires the session, anything else
    /// records the message built from the server's detail text.
    fn rejection(
        &self,
        status: StatusCode,
        body: &Value,
        message: impl FnOnce(Option<String>) -> String,
    ) -> ApiError {
        if status == StatusCode::UNAUTHORIZED {
            self.expire_session();
            return ApiError::AuthExpired;
        }
        let message = message(server_message(body));
        self.publish(|s| s.error = Some(message.clone()));
        ApiError::ServerRejected {
            status: status.as_u16(),
            message,
        }
    }

    fn expire_session(&self) {
        tracing::info!("document service rejected the credential");
        self.publish(|s| s.error = Some(SESSION_EXPIRED_MESSAGE.to_string()));
        self.inner.session.force_logout(Some(SESSION_EXPIRED_MESSAGE));
    }

    fn current_query(&self) -> (String, u32) {
        let state = self.inner.state.borrow();
        (state.query.clone(), state.page)
    }

    fn publish(&self, update: impl FnOnce(&mut DocumentsState)) {
        if !self.inner.scope.is_alive() {
            return;
        }
        self.inner.state.send_modify(update);
    }
}

fn lock(tracker: &Mutex<LatestOnly>) -> std::sync::MutexGuard<'_, LatestOnly> {
    tracker.lock().unwrap_or_else(PoisonError::into_inner)
}

fn connectivity_message(err: &ApiError) -> String {
    match err {
        ApiError::Connectivity(_) => UNREACHABLE.to_string(),
        other => other.user_message(),
    }
}

/// Drops the final `.ext` of a file name (`report.pdf` -> `report`).
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() && !name[dot + 1..].contains('/') => &name[..dot],
        _ => name,
    }
}

fn validate_upload(file_name: &str) -> Result<(), ApiError> {
    if file_name.trim().is_empty() {
        return Err(ApiError::InvalidInput("Please choose a file.".to_string()));
    }
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(ApiError::InvalidInput(
            "Unsupported file format.".to_string(),
        )),
    }
}
