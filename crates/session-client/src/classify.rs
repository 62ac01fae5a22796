//! Failure classification
//!
//! Decides which recovery path a failed request takes. Auth endpoints are
//! checked first: a failure there is never recovered, whatever its status,
//! so login and refresh cannot trigger themselves.

use csrf_token::{AUTH_ENDPOINTS, CSRF_ERROR_CODES};

use crate::error::{ErrorCategory, ErrorPayload, Failure};

/// Whether `path` targets an endpoint that establishes credentials.
///
/// Matches on suffix after dropping any query string and trailing slash, so
/// `/api/v1/auth/login` and `/auth/login?next=/` both count.
pub fn is_auth_endpoint(path: &str) -> bool {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    let path = path.trim_end_matches('/');
    AUTH_ENDPOINTS.iter().any(|endpoint| path.ends_with(endpoint))
}

/// Whether the payload carries one of the known CSRF error codes.
pub fn is_csrf_code(payload: Option<&ErrorPayload>) -> bool {
    payload
        .and_then(|p| p.code.as_deref())
        .is_some_and(|code| CSRF_ERROR_CODES.contains(&code))
}

/// Classify an HTTP error status for a request to `path`.
pub fn classify_status(path: &str, status: u16, payload: Option<&ErrorPayload>) -> ErrorCategory {
    if is_auth_endpoint(path) {
        return ErrorCategory::AuthEndpointFailure;
    }
    match status {
        403 if is_csrf_code(payload) => ErrorCategory::CsrfInvalid,
        401 => ErrorCategory::SessionExpired,
        _ => ErrorCategory::Other,
    }
}

/// Classify a failed request to `path`.
pub fn classify(path: &str, failure: &Failure) -> ErrorCategory {
    match failure {
        Failure::Network(_) if is_auth_endpoint(path) => ErrorCategory::AuthEndpointFailure,
        Failure::Network(_) => ErrorCategory::Network,
        Failure::Response(response) => {
            classify_status(path, response.status.as_u16(), response.payload.as_ref())
        }
    }
}
