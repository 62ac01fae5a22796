//! Request decoration
//!
//! Attaches `X-CSRF-Token` to state-changing requests from whatever the
//! client already holds. Never touches the network: when nothing is held the
//! coordinator decides whether to fetch.

use std::sync::Arc;

use csrf_token::cookies::xsrf_cookie;
use csrf_token::{CsrfToken, TokenOrigin, TokenStore};
use reqwest::Url;
use reqwest::cookie::Jar;
use tracing::{debug, warn};

use crate::request::ApiRequest;

/// Where an attached token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    /// Fresh token in the in-memory store
    Store,
    /// Server-set `XSRF-TOKEN` cookie
    Cookie,
}

/// What the interceptor did to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoration {
    /// Safe method, nothing to attach
    NotMutating,
    /// Caller supplied the header; left untouched
    AlreadySet,
    Attached(TokenSource),
    /// Mutating request with no token available locally
    Missing,
}

pub struct RequestInterceptor {
    store: Arc<TokenStore>,
    jar: Arc<Jar>,
    cookie_url: Url,
}

impl RequestInterceptor {
    pub fn new(store: Arc<TokenStore>, jar: Arc<Jar>, cookie_url: Url) -> Self {
        Self {
            store,
            jar,
            cookie_url,
        }
    }

    /// Attach a CSRF header if the request needs one and a token is held.
    pub async fn decorate(&self, request: &mut ApiRequest) -> Decoration {
        if !request.is_mutating() {
            return Decoration::NotMutating;
        }
        if request.csrf_header().is_some() {
            debug!(path = %request.path(), "csrf header supplied by caller");
            return Decoration::AlreadySet;
        }

        if let Some(token) = self.store.fresh().await
            && request.set_csrf_token(&token)
        {
            return Decoration::Attached(TokenSource::Store);
        }

        if let Some(value) = xsrf_cookie(&self.jar, &self.cookie_url) {
            let token = CsrfToken::new(value, TokenOrigin::ResponseHeader);
            if request.set_csrf_token(&token) {
                return Decoration::Attached(TokenSource::Cookie);
            }
            warn!("XSRF-TOKEN cookie is not a valid header value, ignoring");
        }

        Decoration::Missing
    }
}
