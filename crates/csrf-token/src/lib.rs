//! CSRF token lifecycle for the recruit platform client
//!
//! Owns everything about the anti-forgery token short of deciding when a
//! request should be retried:
//!
//! 1. `token::request_csrf_token()` calls `GET /auth/csrf-token` and pulls the
//!    value out of the response with an ordered list of extraction strategies
//! 2. `store::TokenStore` caches it with its fetch time and mirrors it into
//!    the `durable::DurableStore` file
//! 3. `fetcher::TokenFetcher` wraps both with single-flight semantics so
//!    concurrent callers share one network round trip
//! 4. `cookies` reads the server-set `XSRF-TOKEN` cookie and writes the
//!    session cookies after login

pub mod constants;
pub mod cookies;
pub mod durable;
pub mod error;
pub mod fetcher;
pub mod store;
pub mod token;

pub use constants::*;
pub use durable::{DurableStore, PersistedSession};
pub use error::{Error, Result};
pub use fetcher::TokenFetcher;
pub use store::TokenStore;
pub use token::{CsrfToken, EXTRACTION_ORDER, Extraction, TokenOrigin, request_csrf_token};
