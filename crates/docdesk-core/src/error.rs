//! Failure taxonomy for calls to the backend services.

use thiserror::Error;

/// Errors produced by the request dispatcher and surfaced by controllers.
#[derive(Debug, Error)]
pub enum ApiError {
    /// No usable credential; nothing was sent.
    #[error("not authenticated")]
    AuthRequired,

    /// The server rejected the credential (HTTP 401).
    #[error("session expired")]
    AuthExpired,

    /// A 2xx body lacked required fields or was not the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// Non-2xx answer other than 401.
    #[error("server rejected request ({status}): {message}")]
    ServerRejected { status: u16, message: String },

    /// The request never produced a response.
    #[error("could not reach server")]
    Connectivity(#[source] reqwest::Error),

    /// Rejected before sending; the text is shown as is.
    #[error("{0}")]
    InvalidInput(String),

    /// The owning controller was closed before the call finished.
    #[error("closed before the request completed")]
    Closed,

    /// The endpoint could not be joined onto its base URL.
    #[error("invalid request url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ApiError {
    /// Message shown for errors when the server supplied no better text.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthRequired | Self::AuthExpired => {
                "Session expired. Please log in again.".to_string()
            }
            Self::MalformedResponse(_) => "The server sent an unexpected response.".to_string(),
            Self::ServerRejected { message, .. } | Self::InvalidInput(message) => message.clone(),
            Self::Connectivity(_) => "Could not reach the server.".to_string(),
            Self::Closed => "The request was abandoned.".to_string(),
            Self::InvalidUrl(_) => "The service address is misconfigured.".to_string(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRequired | Self::AuthExpired)
    }
}
