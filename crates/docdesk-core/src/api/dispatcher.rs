//! Builds and sends requests to the two backend services.
//!
//! The dispatcher resolves the endpoint against a static routing table,
//! fills in the default content type and attaches the bearer credential for
//! authenticated calls. It never interprets status codes; controllers do.

use anyhow::Context;
use docdesk_types::ErrorBody;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Response};
use serde::Serialize;
use serde_json::{Value, json};
use url::Url;

use super::{USER_AGENT, endpoints};
use crate::credentials::{CredentialStore, mask_token};
use crate::error::ApiError;

/// Base URLs of the auth and data services.
#[derive(Debug, Clone)]
pub struct ServiceRoutes {
    auth: Url,
    data: Url,
}

impl ServiceRoutes {
    pub fn new(auth_base_url: &str, data_base_url: &str) -> anyhow::Result<Self> {
        let auth = Url::parse(auth_base_url)
            .with_context(|| format!("Invalid auth service base URL: {auth_base_url}"))?;
        let data = Url::parse(data_base_url)
            .with_context(|| format!("Invalid data service base URL: {data_base_url}"))?;
        Ok(Self { auth, data })
    }

    /// Absolute URL for `endpoint`. Only the login path goes to the auth
    /// service.
    pub fn resolve(&self, endpoint: &str) -> Result<Url, ApiError> {
        let base = if endpoint == endpoints::LOGIN {
            &self.auth
        } else {
            &self.data
        };
        let joined = format!(
            "{}/{}",
            base.as_str().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );
        Ok(Url::parse(&joined)?)
    }
}

/// Whether a call needs the stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthPolicy {
    Required,
    Anonymous,
}

#[derive(Debug, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    /// Sent as `multipart/form-data`; the transport picks the boundary.
    Multipart(reqwest::multipart::Form),
}

/// Method, headers, query and body of one request.
#[derive(Debug)]
pub struct RequestOptions {
    pub method: Method,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl RequestOptions {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    /// Serializes `body` as the JSON payload.
    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::MalformedResponse(format!("request body: {e}")))?;
        self.body = RequestBody::Json(value);
        Ok(self)
    }

    #[must_use]
    pub fn multipart(mut self, form: reqwest::multipart::Form) -> Self {
        self.body = RequestBody::Multipart(form);
        self
    }

    #[must_use]
    pub fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    #[must_use]
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self::get()
    }
}

/// Cloneable handle issuing requests with the shared credential store.
#[derive(Clone)]
pub struct Dispatcher {
    http: reqwest::Client,
    routes: ServiceRoutes,
    credentials: CredentialStore,
}

impl Dispatcher {
    pub fn new(routes: ServiceRoutes, credentials: CredentialStore) -> Self {
        Self {
            http: reqwest::Client::new(),
            routes,
            credentials,
        }
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Sends one request and returns the raw response, whatever its status.
    ///
    /// # Errors
    /// `AuthRequired` when `auth` is required and no valid credential is
    /// stored (no request is sent); `Connectivity` when the transport fails;
    /// `InvalidUrl` when the endpoint cannot be resolved.
    pub async fn dispatch(
        &self,
        endpoint: &str,
        options: RequestOptions,
        auth: AuthPolicy,
    ) -> Result<Response, ApiError> {
        let mut url = self.routes.resolve(endpoint)?;
        if !options.query.is_empty() {
            url.query_pairs_mut().extend_pairs(options.query.iter());
        }

        let mut headers = options.headers;
        let is_multipart = matches!(options.body, RequestBody::Multipart(_));
        if !is_multipart && !headers.contains_key(CONTENT_TYPE) {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }

        if auth == AuthPolicy::Required {
            let Some(credential) = self.credentials.get() else {
                tracing::debug!(%endpoint, "no credential; request not sent");
                return Err(ApiError::AuthRequired);
            };
            let value = HeaderValue::from_str(&format!("Bearer {}", credential.token))
                .map_err(|e| {
                    tracing::warn!(
                        token = %mask_token(&credential.token),
                        "stored token is not a valid header value: {e}"
                    );
                    ApiError::AuthRequired
                })?;
            headers.insert(AUTHORIZATION, value);
        }

        if !headers.contains_key(reqwest::header::USER_AGENT) {
            headers.insert(
                reqwest::header::USER_AGENT,
                HeaderValue::from_static(USER_AGENT),
            );
        }

        let method = options.method;
        tracing::debug!(%method, %url, "dispatching request");

        let builder = self.http.request(method.clone(), url.clone()).headers(headers);
        let builder = match options.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.body(value.to_string()),
            RequestBody::Multipart(form) => builder.multipart(form),
        };

        match builder.send().await {
            Ok(response) => {
                tracing::debug!(%method, %url, status = response.status().as_u16(), "response");
                Ok(response)
            }
            Err(e) => {
                tracing::warn!(%method, %url, "request failed: {e}");
                Err(ApiError::Connectivity(e))
            }
        }
    }
}

/// Reads the body once and decodes it as JSON.
///
/// A body that is not JSON yields `{"error": "non-JSON body", "raw": <text>}`
/// instead of an error.
pub async fn parse_body_safely(response: Response) -> Value {
    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("failed to read response body: {e}");
            String::new()
        }
    };

    serde_json::from_str(&text).unwrap_or_else(|_| {
        tracing::debug!(bytes = text.len(), "response body is not JSON");
        json!({ "error": "non-JSON body", "raw": text })
    })
}

/// Human-readable error text carried by a response body, if any.
///
/// Prefers `detail` (data service), then `error`, then `message`.
pub fn server_message(body: &Value) -> Option<String> {
    let parsed = ErrorBody::from_value(body);
    if parsed.error.as_deref() == Some("non-JSON body") && body.get("raw").is_some() {
        return None;
    }
    parsed
        .detail_text()
        .or_else(|| parsed.error.filter(|s| !s.trim().is_empty()))
        .or_else(|| parsed.message.filter(|s| !s.trim().is_empty()))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::storage::{MemoryStorage, SessionStorage};

    fn dispatcher(server_uri: &str) -> (Dispatcher, CredentialStore) {
        let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new());
        let credentials = CredentialStore::new(storage);
        let routes = ServiceRoutes::new("http://127.0.0.1:9", server_uri).unwrap();
        (Dispatcher::new(routes, credentials.clone()), credentials)
    }

    #[test]
    fn test_routes_send_login_to_auth_service() {
        let routes =
            ServiceRoutes::new("http://auth.local:8000/", "http://data.local:3636").unwrap();
        assert_eq!(
            routes.resolve(endpoints::LOGIN).unwrap().as_str(),
            "http://auth.local:8000/api/auth/login"
        );
        assert_eq!(
            routes.resolve(endpoints::DOCUMENTS_LIST).unwrap().as_str(),
            "http://data.local:3636/documents/list"
        );
    }

    #[tokio::test]
    async fn test_missing_credential_sends_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (dispatcher, _) = dispatcher(&server.uri());
        let err = dispatcher
            .dispatch(
                endpoints::DOCUMENTS_LIST,
                RequestOptions::get(),
                AuthPolicy::Required,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::AuthRequired));
    }

    #[tokio::test]
    async fn test_attaches_bearer_and_json_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/documents/list"))
            .and(query_param("limit", "10"))
            .and(query_param("skip", "0"))
            .and(header("authorization", "Bearer tok-abc"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": []})))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, credentials) = dispatcher(&server.uri());
        credentials
            .set("tok-abc", Duration::from_secs(3600))
            .unwrap();

        let response = dispatcher
            .dispatch(
                endpoints::DOCUMENTS_LIST,
                RequestOptions::get().query(endpoints::list_query("", 1)),
                AuthPolicy::Required,
            )
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_caller_content_type_is_kept() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(header("content-type", "text/plain"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let (dispatcher, _) = dispatcher(&server.uri());
        let options = RequestOptions::post()
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        dispatcher
            .dispatch("/documents/vector/search", options, AuthPolicy::Anonymous)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_status_is_not_interpreted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let (dispatcher, _) = dispatcher(&server.uri());
        let response = dispatcher
            .dispatch(
                endpoints::DOCUMENTS_LIST,
                RequestOptions::get(),
                AuthPolicy::Anonymous,
            )
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 500);

        let body = parse_body_safely(response).await;
        assert_eq!(body, json!({"error": "non-JSON body", "raw": "boom"}));
        assert_eq!(server_message(&body), None);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connectivity() {
        let routes = ServiceRoutes::new("http://127.0.0.1:9", "http://127.0.0.1:9").unwrap();
        let storage: Arc<dyn SessionStorage> = Arc::new(MemoryStorage::new());
        let dispatcher = Dispatcher::new(routes, CredentialStore::new(storage));
        let err = dispatcher
            .dispatch(endpoints::LOGIN, RequestOptions::post(), AuthPolicy::Anonymous)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Connectivity(_)));
    }

    #[test]
    fn test_server_message_precedence() {
        assert_eq!(
            server_message(&json!({"detail": "Not found", "error": "x"})).as_deref(),
            Some("Not found")
        );
        assert_eq!(
            server_message(&json!({"error": "bad creds", "message": "m"})).as_deref(),
            Some("bad creds")
        );
        assert_eq!(
            server_message(&json!({"message": "Invalid password"})).as_deref(),
            Some("Invalid password")
        );
        assert_eq!(server_message(&json!({})), None);
    }
}
