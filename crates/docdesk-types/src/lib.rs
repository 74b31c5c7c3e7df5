//! Wire types shared by the docdesk client crates.
//!
//! These mirror the JSON bodies exchanged with the authentication service
//! and the document/RAG service. Every response field is optional on the
//! wire; callers decide which absences are fatal.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ============================================================================
// Identity
// ============================================================================

/// Opaque identity payload returned by the login endpoint.
///
/// Stored verbatim so a reload can rehydrate it without a network call.
/// Only JSON objects are accepted.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserProfile(Map<String, Value>);

impl UserProfile {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn user_code(&self) -> Option<&str> {
        self.str_field("user_code")
    }

    pub fn full_name(&self) -> Option<&str> {
        self.str_field("full_name")
    }

    /// Name used as the default uploader: full name, then user code.
    pub fn display_name(&self) -> Option<&str> {
        self.full_name().or_else(|| self.user_code())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

// ============================================================================
// Authentication service
// ============================================================================

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub user_code: &'a str,
    pub password: &'a str,
}

/// `{ success, data: { token, user }, message?, error? }`
#[derive(Debug, Default, Deserialize)]
pub struct LoginEnvelope {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Option<LoginData>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginData {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub user: Option<UserProfile>,
    /// Token lifetime in seconds, when the server reports one.
    #[serde(default)]
    pub expires_in: Option<u64>,
}

// ============================================================================
// Document service
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub uploaded_by: Option<String>,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
    /// Remaining server fields, kept for detail views.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `GET /documents/list` body.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentList {
    #[serde(default)]
    pub documents: Option<Vec<Document>>,
    #[serde(default)]
    pub total: Option<u64>,
}

impl DocumentList {
    /// Missing fields count as an empty page.
    pub fn into_parts(self) -> (Vec<Document>, u64) {
        (self.documents.unwrap_or_default(), self.total.unwrap_or(0))
    }
}

/// `GET /documents/list/details/{id}` body.
#[derive(Debug, Default, Deserialize)]
pub struct DocumentDetails {
    #[serde(default)]
    pub document: Option<Document>,
}

/// Error payload shapes used by both services.
///
/// The data service reports `detail` (a string or a validation list);
/// the auth and RAG services use `message` / `error`.
#[derive(Debug, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    pub fn from_value(value: &Value) -> Self {
        serde_json::from_value(value.clone()).unwrap_or_default()
    }

    pub fn detail_text(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

// ============================================================================
// Chat (RAG) service
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ChatRequest<'a> {
    pub query: &'a str,
    pub thread_id: &'a str,
}

/// `{ status: "success", data: { search_type, answer | message }, thread_id? }`
#[derive(Debug, Default, Deserialize)]
pub struct ChatEnvelope {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub data: Option<ChatData>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChatData {
    #[serde(default)]
    pub search_type: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// How the RAG service produced an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Answer grounded in the document index.
    Rag,
    /// Free conversation without retrieval.
    Direct,
}

impl SearchType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "rag" => Some(Self::Rag),
            "direct" => Some(Self::Direct),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Rag => "document search",
            Self::Direct => "free chat",
        }
    }
}
