//! Client-side counters
//!
//! - `api_requests_total` (counter): labels `method`, `status`
//! - `csrf_retries_total` (counter)
//! - `session_renewals_total` (counter): label `outcome`
//! - `session_redirects_total` (counter)
//!
//! `csrf_token_fetches_total` is recorded by the token fetcher itself.
//! Without an installed recorder every call is a no-op.

/// Record a completed HTTP exchange. `status` is `"network"` when no
/// response arrived.
pub fn record_request(method: &str, status: &str) {
    metrics::counter!("api_requests_total", "method" => method.to_string(), "status" => status.to_string())
        .increment(1);
}

pub fn record_csrf_retry() {
    metrics::counter!("csrf_retries_total").increment(1);
}

/// `outcome` is `"success"` or `"failure"`.
pub fn record_session_renewal(outcome: &'static str) {
    metrics::counter!("session_renewals_total", "outcome" => outcome).increment(1);
}

pub fn record_redirect() {
    metrics::counter!("session_redirects_total").increment(1);
}
