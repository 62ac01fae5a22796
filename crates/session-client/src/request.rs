//! Outgoing request and successful response types

use bytes::Bytes;
use csrf_token::{CSRF_HEADER, CsrfToken};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

/// Recovery attempts already made for one logical request. Each recovery
/// path sets its flag before resubmitting and never runs twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryMarkers {
    pub csrf_retry: bool,
    pub session_retry: bool,
}

/// A request relative to the configured API base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<serde_json::Value>,
    pub(crate) markers: RetryMarkers,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            markers: RetryMarkers::default(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    pub fn markers(&self) -> RetryMarkers {
        self.markers
    }

    /// POST, PUT, PATCH and DELETE change server state and need a CSRF token.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self.method,
            Method::POST | Method::PUT | Method::PATCH | Method::DELETE
        )
    }

    pub fn csrf_header(&self) -> Option<&HeaderValue> {
        self.headers.get(CSRF_HEADER)
    }

    /// Set (or replace) the CSRF header. Returns false when the token is not
    /// a valid header value.
    pub fn set_csrf_token(&mut self, token: &CsrfToken) -> bool {
        match token.header_value() {
            Some(value) => {
                self.headers
                    .insert(HeaderName::from_static(CSRF_HEADER), value);
                true
            }
            None => false,
        }
    }
}

/// A successful (2xx) response with its body buffered.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    /// Deserialize the body as JSON. An empty body decodes as `null`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body: &[u8] = if self.body.is_empty() { b"null" } else { &self.body };
        serde_json::from_slice(body)
            .map_err(|e| ApiError::invalid_request(format!("invalid JSON response body: {e}")))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}
