//! Single-flight CSRF token fetching
//!
//! At most one `GET /auth/csrf-token` is outstanding at any instant. The
//! first caller to find no operation in flight starts one and publishes it
//! as a shared future; every caller that arrives before it settles awaits the
//! same future and observes the same outcome. The operation clears its own
//! slot when it settles, so the next caller after that starts a new fetch.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::store::TokenStore;
use crate::token::{CsrfToken, TokenOrigin, request_csrf_token};

/// Handle to the token fetch currently in flight.
type RefreshOperation = Shared<BoxFuture<'static, Option<CsrfToken>>>;

pub struct TokenFetcher {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    timeout: Duration,
    store: Arc<TokenStore>,
    // std Mutex: the check-and-set below never spans an await.
    in_flight: Mutex<Option<RefreshOperation>>,
}

impl TokenFetcher {
    pub fn new(
        client: reqwest::Client,
        endpoint: reqwest::Url,
        timeout: Duration,
        store: Arc<TokenStore>,
    ) -> Self {
        Self {
            client,
            endpoint,
            timeout,
            store,
            in_flight: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<TokenStore> {
        &self.store
    }

    /// Whether a token fetch is currently outstanding.
    pub fn is_fetching(&self) -> bool {
        self.slot().is_some()
    }

    /// Cached token if fresh and `force_refresh` is false, else a fetch.
    pub async fn get_token(self: &Arc<Self>, force_refresh: bool) -> Option<CsrfToken> {
        if !force_refresh && let Some(token) = self.store.fresh().await {
            return Some(token);
        }
        self.fetch_token().await
    }

    /// Fetch a token, joining the in-flight operation if there is one.
    ///
    /// On failure falls back to the durable store's last-known value, then
    /// `None`. The fallback is returned but not cached, so the next caller
    /// tries the network again.
    pub async fn fetch_token(self: &Arc<Self>) -> Option<CsrfToken> {
        let operation = {
            let mut slot = self.slot();
            match slot.as_ref() {
                Some(operation) => {
                    debug!("joining in-flight csrf token fetch");
                    operation.clone()
                }
                None => {
                    let this = Arc::clone(self);
                    let operation = async move {
                        let outcome = this.run_fetch().await;
                        this.slot().take();
                        outcome
                    }
                    .boxed()
                    .shared();
                    *slot = Some(operation.clone());
                    operation
                }
            }
        };
        operation.await
    }

    /// Overwrite the cached token, e.g. when a response rotates it.
    pub async fn update_token(&self, value: String) -> Option<CsrfToken> {
        self.store.update_token(value, TokenOrigin::ResponseHeader).await
    }

    pub async fn clear_token(&self) {
        self.store.clear_token().await;
    }

    async fn run_fetch(&self) -> Option<CsrfToken> {
        match request_csrf_token(&self.client, &self.endpoint, self.timeout).await {
            Ok(value) => {
                metrics::counter!("csrf_token_fetches_total", "outcome" => "success").increment(1);
                info!("fetched fresh csrf token");
                self.store.update_token(value, TokenOrigin::Fetched).await
            }
            Err(e) => {
                metrics::counter!("csrf_token_fetches_total", "outcome" => "failure").increment(1);
                match self.store.durable_fallback().await {
                    Some(token) => {
                        warn!(error = %e, "csrf token fetch failed, using persisted token");
                        Some(token)
                    }
                    None => {
                        warn!(error = %e, "csrf token fetch failed, no persisted token");
                        None
                    }
                }
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<RefreshOperation>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
