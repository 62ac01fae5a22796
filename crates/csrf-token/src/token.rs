//! CSRF token model and the token endpoint call
//!
//! The backend has shipped the token in several places over time, so the
//! response is searched with a fixed list of extraction strategies in
//! priority order. Each strategy is total: it either yields a non-empty
//! string or nothing.

use std::time::Duration;

use common::Secret;
use reqwest::header::{CACHE_CONTROL, EXPIRES, HeaderMap, HeaderValue, PRAGMA};
use tokio::time::Instant;
use tracing::debug;

use crate::constants::CSRF_HEADER;
use crate::error::{Error, Result};

/// Where a cached token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    /// Returned by `GET /auth/csrf-token`
    Fetched,
    /// Rotated by the server on an ordinary response
    ResponseHeader,
    /// Last-known value read back from the durable store
    Durable,
}

/// A CSRF token with the instant it was obtained.
#[derive(Debug, Clone)]
pub struct CsrfToken {
    value: Secret<String>,
    fetched_at: Instant,
    origin: TokenOrigin,
}

impl CsrfToken {
    pub fn new(value: impl Into<String>, origin: TokenOrigin) -> Self {
        Self::obtained_at(value, origin, Instant::now())
    }

    pub fn obtained_at(value: impl Into<String>, origin: TokenOrigin, fetched_at: Instant) -> Self {
        Self {
            value: Secret::new(value.into()),
            fetched_at,
            origin,
        }
    }

    pub fn value(&self) -> &str {
        self.value.expose()
    }

    pub fn origin(&self) -> TokenOrigin {
        self.origin
    }

    pub fn fetched_at(&self) -> Instant {
        self.fetched_at
    }

    /// Stale once strictly more than `ttl` has elapsed since the fetch.
    pub fn is_stale_at(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.fetched_at) > ttl
    }

    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.is_stale_at(Instant::now(), ttl)
    }

    /// Header value for `X-CSRF-Token`. `None` if the token is not a valid
    /// header value, which the server would reject anyway.
    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(self.value()).ok()
    }
}

/// Named locations a token can be read from, tried in `EXTRACTION_ORDER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// `{ "csrfToken": "..." }`
    BodyCsrfToken,
    /// `{ "data": { "csrfToken": "..." } }`
    NestedDataCsrfToken,
    /// `{ "token": "..." }`
    BodyToken,
    /// `X-CSRF-Token` response header
    ResponseHeader,
}

pub const EXTRACTION_ORDER: [Extraction; 4] = [
    Extraction::BodyCsrfToken,
    Extraction::NestedDataCsrfToken,
    Extraction::BodyToken,
    Extraction::ResponseHeader,
];

impl Extraction {
    pub fn name(&self) -> &'static str {
        match self {
            Extraction::BodyCsrfToken => "body.csrfToken",
            Extraction::NestedDataCsrfToken => "body.data.csrfToken",
            Extraction::BodyToken => "body.token",
            Extraction::ResponseHeader => "header.x-csrf-token",
        }
    }

    pub fn extract(&self, headers: &HeaderMap, body: &serde_json::Value) -> Option<String> {
        let found = match self {
            Extraction::BodyCsrfToken => body.get("csrfToken").and_then(|v| v.as_str()),
            Extraction::NestedDataCsrfToken => body
                .get("data")
                .and_then(|d| d.get("csrfToken"))
                .and_then(|v| v.as_str()),
            Extraction::BodyToken => body.get("token").and_then(|v| v.as_str()),
            Extraction::ResponseHeader => {
                headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok())
            }
        };
        found
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
    }
}

/// Run every strategy in order and return the first hit.
pub fn extract_token(
    headers: &HeaderMap,
    body: &serde_json::Value,
) -> Option<(Extraction, String)> {
    EXTRACTION_ORDER
        .iter()
        .find_map(|strategy| strategy.extract(headers, body).map(|v| (*strategy, v)))
}

/// Call the token endpoint and extract a fresh token.
///
/// Sends no-cache directives so an intermediary cannot hand back a token
/// minted for another session. `timeout` bounds the whole exchange; a
/// timeout surfaces as `Error::Http`.
pub async fn request_csrf_token(
    client: &reqwest::Client,
    url: &reqwest::Url,
    timeout: Duration,
) -> Result<String> {
    let response = client
        .get(url.clone())
        .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(PRAGMA, "no-cache")
        .header(EXPIRES, "0")
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| Error::Http(format!("csrf token request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        return Err(Error::Status(format!("{status}: {body}")));
    }

    let headers = response.headers().clone();
    let bytes = response
        .bytes()
        .await
        .map_err(|e| Error::Http(format!("reading csrf token response: {e}")))?;
    // A non-JSON body can still carry the token in the header.
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap_or_default();

    match extract_token(&headers, &body) {
        Some((strategy, value)) => {
            debug!(source = strategy.name(), "extracted csrf token");
            Ok(value)
        }
        None => Err(Error::MissingToken(format!(
            "tried {}",
            EXTRACTION_ORDER
                .iter()
                .map(Extraction::name)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;
    use serde_json::json;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn header_map(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CSRF_HEADER, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn stale_only_after_ttl_elapsed() {
        let ttl = Duration::from_secs(3000);
        let token = CsrfToken::new("abc", TokenOrigin::Fetched);
        let at = token.fetched_at();

        assert!(!token.is_stale_at(at, ttl));
        assert!(!token.is_stale_at(at + ttl, ttl), "exactly ttl is still fresh");
        assert!(token.is_stale_at(at + ttl + Duration::from_millis(1), ttl));
    }

    #[test]
    fn top_level_csrf_token_wins() {
        let body = json!({"csrfToken": "top", "data": {"csrfToken": "nested"}, "token": "plain"});
        let (strategy, value) = extract_token(&header_map("hdr"), &body).unwrap();
        assert_eq!(strategy, Extraction::BodyCsrfToken);
        assert_eq!(value, "top");
    }

    #[test]
    fn nested_data_used_when_top_level_missing() {
        let body = json!({"success": true, "data": {"csrfToken": "nested"}});
        let (strategy, value) = extract_token(&HeaderMap::new(), &body).unwrap();
        assert_eq!(strategy, Extraction::NestedDataCsrfToken);
        assert_eq!(value, "nested");
    }

    #[test]
    fn header_is_last_resort() {
        let body = json!({"message": "ok"});
        let (strategy, value) = extract_token(&header_map("from-header"), &body).unwrap();
        assert_eq!(strategy, Extraction::ResponseHeader);
        assert_eq!(value, "from-header");
    }

    #[test]
    fn empty_and_non_string_values_are_skipped() {
        let body = json!({"csrfToken": "", "data": {"csrfToken": 42}, "token": "  fallback  "});
        let (strategy, value) = extract_token(&HeaderMap::new(), &body).unwrap();
        assert_eq!(strategy, Extraction::BodyToken);
        assert_eq!(value, "fallback");
    }

    #[test]
    fn nothing_found_yields_none() {
        assert!(extract_token(&HeaderMap::new(), &serde_json::Value::Null).is_none());
        assert!(extract_token(&HeaderMap::new(), &json!(["csrfToken"])).is_none());
    }

    #[tokio::test]
    async fn request_sends_no_cache_headers_and_parses_body() {
        let app = Router::new().route(
            "/auth/csrf-token",
            get(|headers: axum::http::HeaderMap| async move {
                let cache = headers
                    .get("cache-control")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("")
                    .to_string();
                let pragma = headers.get("pragma").is_some();
                axum::Json(json!({"csrfToken": format!("tok|{cache}|{pragma}")}))
            }),
        );
        let base = serve(app).await;
        let url = reqwest::Url::parse(&format!("{base}/auth/csrf-token")).unwrap();

        let value = request_csrf_token(&reqwest::Client::new(), &url, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, "tok|no-cache, no-store, must-revalidate|true");
    }

    #[tokio::test]
    async fn request_reads_header_when_body_is_not_json() {
        let app = Router::new().route(
            "/auth/csrf-token",
            get(|| async { ([("x-csrf-token", "hdr-token")], "plain text") }),
        );
        let base = serve(app).await;
        let url = reqwest::Url::parse(&format!("{base}/auth/csrf-token")).unwrap();

        let value = request_csrf_token(&reqwest::Client::new(), &url, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(value, "hdr-token");
    }

    #[tokio::test]
    async fn server_error_is_reported_with_status() {
        let app = Router::new().route(
            "/auth/csrf-token",
            get(|| async { (axum::http::StatusCode::SERVICE_UNAVAILABLE, "down") }),
        );
        let base = serve(app).await;
        let url = reqwest::Url::parse(&format!("{base}/auth/csrf-token")).unwrap();

        let err = request_csrf_token(&reqwest::Client::new(), &url, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Status(ref msg) if msg.contains("503")), "got: {err}");
    }

    #[tokio::test]
    async fn missing_token_lists_strategies() {
        let app = Router::new().route(
            "/auth/csrf-token",
            get(|| async { axum::Json(json!({"ok": true})) }),
        );
        let base = serve(app).await;
        let url = reqwest::Url::parse(&format!("{base}/auth/csrf-token")).unwrap();

        let err = request_csrf_token(&reqwest::Client::new(), &url, Duration::from_secs(5))
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("body.data.csrfToken"), "got: {msg}");
    }

    #[tokio::test]
    async fn slow_endpoint_times_out() {
        let app = Router::new().route(
            "/auth/csrf-token",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                axum::Json(json!({"csrfToken": "late"}))
            }),
        );
        let base = serve(app).await;
        let url = reqwest::Url::parse(&format!("{base}/auth/csrf-token")).unwrap();

        let err = request_csrf_token(&reqwest::Client::new(), &url, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err}");
    }
}
