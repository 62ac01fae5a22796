//! Failure taxonomy and the normalized error every caller receives
//!
//! Whatever went wrong (no response, a CSRF rejection, an expired session,
//! a validation error) reaches the caller as one `ApiError` shape so the
//! rest of the application handles a single type.

use reqwest::StatusCode;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

/// Category assigned to a failed request by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// 403 with a CSRF error code; recoverable with one retry
    CsrfInvalid,
    /// 401; handled by renewal or redirect, never by a CSRF refresh
    SessionExpired,
    /// Any failure of an endpoint that establishes credentials; terminal
    AuthEndpointFailure,
    /// No response received
    Network,
    /// Every other HTTP error
    Other,
}

impl ErrorCategory {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::CsrfInvalid => "csrf_invalid",
            ErrorCategory::SessionExpired => "session_expired",
            ErrorCategory::AuthEndpointFailure => "auth_endpoint_failure",
            ErrorCategory::Network => "network",
            ErrorCategory::Other => "other",
        }
    }
}

/// Per-field validation message from the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Error body the backend sends: `{ message, code?, errors? }`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ErrorPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub errors: Option<Vec<FieldError>>,
}

impl ErrorPayload {
    /// Lenient parse; anything that is not a JSON object yields `None`.
    pub fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<serde_json::Value>(body)
            .ok()
            .filter(|v| v.is_object())
            .and_then(|v| serde_json::from_value(v).ok())
    }
}

/// Normalized error returned to callers.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorCategory::Network,
            message: message.into(),
            status: None,
            code: None,
            errors: Vec::new(),
        }
    }

    /// Local failure before anything was sent (bad path, bad header).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorCategory::Other,
            message: message.into(),
            status: None,
            code: None,
            errors: Vec::new(),
        }
    }

    pub fn from_response(kind: ErrorCategory, status: StatusCode, body: &[u8]) -> Self {
        let payload = ErrorPayload::parse(body).unwrap_or_default();
        let message = payload
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| match status.canonical_reason() {
                Some(reason) => format!("Request failed with status {}: {reason}", status.as_u16()),
                None => format!("Request failed with status {}", status.as_u16()),
            });
        Self {
            kind,
            message,
            status: Some(status.as_u16()),
            code: payload.code,
            errors: payload.errors.unwrap_or_default(),
        }
    }

    pub fn with_kind(mut self, kind: ErrorCategory) -> Self {
        self.kind = kind;
        self
    }
}

/// A request that did not produce a successful response.
#[derive(Debug)]
pub enum Failure {
    Network(String),
    Response(FailedResponse),
}

#[derive(Debug)]
pub struct FailedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
    pub payload: Option<ErrorPayload>,
}

impl FailedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: bytes::Bytes) -> Self {
        let payload = ErrorPayload::parse(&body);
        Self {
            status,
            headers,
            body,
            payload,
        }
    }
}

impl Failure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Failure::Network(_) => None,
            Failure::Response(r) => Some(r.status),
        }
    }

    pub fn into_error(self, kind: ErrorCategory) -> ApiError {
        match self {
            Failure::Network(message) => ApiError::network(message).with_kind(kind),
            Failure::Response(r) => ApiError::from_response(kind, r.status, &r.body),
        }
    }
}

/// Errors building a coordinator.
#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("session store error: {0}")]
    Store(#[from] csrf_token::Error),

    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, ApiError>;
