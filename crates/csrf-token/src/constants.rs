//! Wire-level names shared with the platform backend
//!
//! Header, cookie and endpoint names are fixed by the server. The auth
//! endpoints listed here are never retried or redirected on failure.

/// Request header carrying the token, also used by the server to rotate it
pub const CSRF_HEADER: &str = "x-csrf-token";

/// Cookie the server sets with the current token
pub const CSRF_COOKIE: &str = "XSRF-TOKEN";

pub const CSRF_TOKEN_PATH: &str = "/auth/csrf-token";
pub const LOGIN_PATH: &str = "/auth/login";
pub const REGISTER_PATH: &str = "/auth/register";
pub const LOGOUT_PATH: &str = "/auth/logout";
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Endpoints that establish credentials. Failures here are terminal.
pub const AUTH_ENDPOINTS: &[&str] = &[
    LOGIN_PATH,
    REGISTER_PATH,
    LOGOUT_PATH,
    REFRESH_PATH,
    CSRF_TOKEN_PATH,
];

/// Error codes the server returns with a 403 when the token is unusable
pub const CSRF_ERROR_CODES: &[&str] = &[
    "CSRF_TOKEN_INVALID",
    "CSRF_TOKEN_EXPIRED",
    "CSRF_TOKEN_MISSING",
    "CSRF_ORIGIN_INVALID",
];

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
/// Older pages read the access token under this name
pub const ACCESS_TOKEN_ALIAS_COOKIE: &str = "token";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

pub const ACCESS_TOKEN_MAX_AGE_SECS: u64 = 15 * 60;
pub const REFRESH_TOKEN_MAX_AGE_SECS: u64 = 7 * 24 * 60 * 60;
