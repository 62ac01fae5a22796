//! Request pipeline
//!
//! Every call goes through `SessionCoordinator::send`:
//!
//! 1. The interceptor attaches a held CSRF token to mutating requests; when
//!    none is held the coordinator fetches one (single-flight) first.
//! 2. The request is sent. Any `X-CSRF-Token` on the response replaces the
//!    held token.
//! 3. A failure is classified. A CSRF rejection is retried once with a
//!    forced token refresh. A 401 renews the session (one renewal at a time,
//!    other 401s park behind it) and retries once, or hands over to the
//!    redirect guard. Everything else is returned normalized.

use std::sync::Arc;
use std::time::Duration;

use common::Config;
use csrf_token::cookies::{clear_session_cookies, write_login_cookies};
use csrf_token::{
    CSRF_HEADER, CSRF_TOKEN_PATH, DurableStore, LOGIN_PATH, LOGOUT_PATH, REFRESH_PATH,
    TokenFetcher, TokenStore,
};
use reqwest::Url;
use reqwest::cookie::Jar;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::classify::classify;
use crate::error::{ApiError, ErrorCategory, FailedResponse, Failure, InitError, Result};
use crate::guard::{Navigator, SessionGuard};
use crate::interceptor::{Decoration, RequestInterceptor};
use crate::metrics;
use crate::queue::{RenewalLease, RetryQueue, Ticket};
use crate::request::{ApiRequest, ApiResponse};
use crate::session::{SessionCredentials, SessionTokens, user_from_body};

/// Coarse session state, mostly for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Authenticated,
    /// A renewal is in flight and 401s are parking behind it
    Refreshing,
    /// The guard has navigated to login; cleared by login or logout
    Redirecting,
}

pub struct SessionCoordinator {
    client: reqwest::Client,
    base_url: String,
    cookie_url: Url,
    jar: Arc<Jar>,
    timeout: Duration,
    refresh_enabled: bool,
    fetcher: Arc<TokenFetcher>,
    interceptor: RequestInterceptor,
    guard: SessionGuard,
    queue: RetryQueue,
    credentials: SessionCredentials,
    durable: Arc<DurableStore>,
}

impl SessionCoordinator {
    /// Build the HTTP client and cookie jar, and load persisted session state.
    pub async fn init(
        config: &Config,
        navigator: Arc<dyn Navigator>,
    ) -> std::result::Result<Self, InitError> {
        let base_url = config.api.base_url.trim_end_matches('/').to_string();
        let cookie_url = Url::parse(&base_url)
            .map_err(|e| InitError::Config(format!("invalid base_url {base_url}: {e}")))?;
        let endpoint = Url::parse(&format!("{base_url}{CSRF_TOKEN_PATH}"))
            .map_err(|e| InitError::Config(format!("invalid token endpoint: {e}")))?;

        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| InitError::Client(e.to_string()))?;

        let durable = Arc::new(DurableStore::load(config.storage.path.clone()).await?);
        let store = Arc::new(TokenStore::new(config.csrf_ttl(), durable.clone()));
        let fetcher = Arc::new(TokenFetcher::new(
            client.clone(),
            endpoint,
            config.csrf_fetch_timeout(),
            store.clone(),
        ));
        let interceptor = RequestInterceptor::new(store, jar.clone(), cookie_url.clone());
        let guard = SessionGuard::new(
            &config.session,
            navigator,
            durable.clone(),
            jar.clone(),
            cookie_url.clone(),
        );

        info!(
            base_url = %base_url,
            refresh_enabled = config.session.refresh_enabled,
            storage = %config.storage.path.display(),
            "session coordinator ready"
        );

        Ok(Self {
            client,
            base_url,
            cookie_url,
            jar,
            timeout: config.request_timeout(),
            refresh_enabled: config.session.refresh_enabled,
            fetcher,
            interceptor,
            guard,
            queue: RetryQueue::new(),
            credentials: SessionCredentials::new(),
            durable,
        })
    }

    pub fn token_fetcher(&self) -> &Arc<TokenFetcher> {
        &self.fetcher
    }

    pub fn state(&self) -> SessionState {
        if self.guard.is_redirecting() {
            SessionState::Redirecting
        } else if self.queue.is_refreshing() {
            SessionState::Refreshing
        } else {
            SessionState::Authenticated
        }
    }

    /// Cached user from the last login, if any.
    pub async fn user(&self) -> Option<Value> {
        self.durable.user().await
    }

    /// Send a request through the full pipeline.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", Uuid::new_v4().simple());
        self.execute(request, &request_id).await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.path()))]
    async fn execute(&self, mut request: ApiRequest, request_id: &str) -> Result<ApiResponse> {
        let url = self.url_for(request.path())?;
        self.prepare(&mut request).await;
        let generation = self.credentials.generation();
        match self.dispatch(&request, &url).await {
            Ok(response) => Ok(response),
            Err(failure) => {
                self.recover(request, &url, request_id, generation, failure)
                    .await
            }
        }
    }

    fn url_for(&self, path: &str) -> Result<Url> {
        let joined = if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        };
        Url::parse(&joined)
            .map_err(|e| ApiError::invalid_request(format!("invalid request path {path}: {e}")))
    }

    /// Decorate, fetching a token first if the request needs one and none
    /// is held. A mutating request still goes out when no token can be had;
    /// the server's rejection then drives the retry path.
    async fn prepare(&self, request: &mut ApiRequest) {
        if self.interceptor.decorate(request).await != Decoration::Missing {
            return;
        }
        match self.fetcher.get_token(false).await {
            Some(token) if request.set_csrf_token(&token) => {
                debug!(origin = ?token.origin(), "attached fetched csrf token");
            }
            _ => warn!("no csrf token available, sending without one"),
        }
    }

    /// One HTTP exchange. Non-2xx responses come back as `Failure`.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        url: &Url,
    ) -> std::result::Result<ApiResponse, Failure> {
        let mut builder = self
            .client
            .request(request.method().clone(), url.clone())
            .headers(request.headers().clone())
            .timeout(self.timeout);
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_request(request.method().as_str(), "network");
                warn!(error = %e, "no response received");
                return Err(Failure::Network(format!(
                    "request to {} failed: {e}",
                    request.path()
                )));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        self.pick_up_rotated_token(&headers).await;
        let body = response
            .bytes()
            .await
            .map_err(|e| Failure::Network(format!("reading response body: {e}")))?;

        metrics::record_request(request.method().as_str(), status.as_str());
        debug!(status = status.as_u16(), "response received");

        if status.is_success() {
            Ok(ApiResponse {
                status,
                headers,
                body,
            })
        } else {
            Err(Failure::Response(FailedResponse::new(status, headers, body)))
        }
    }

    /// Adopt a token the server rotated in via the response header.
    async fn pick_up_rotated_token(&self, headers: &HeaderMap) {
        let Some(value) = headers
            .get(CSRF_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
        else {
            return;
        };
        let current = self.fetcher.store().current().await;
        if current.is_some_and(|token| token.value() == value) {
            return;
        }
        debug!("server rotated csrf token");
        self.fetcher.update_token(value.to_string()).await;
    }

    async fn recover(
        &self,
        request: ApiRequest,
        url: &Url,
        request_id: &str,
        generation: u64,
        failure: Failure,
    ) -> Result<ApiResponse> {
        let category = classify(request.path(), &failure);
        match category {
            ErrorCategory::CsrfInvalid if !request.markers.csrf_retry => {
                self.retry_with_fresh_token(request, url, failure).await
            }
            ErrorCategory::SessionExpired => {
                self.recover_session(request, url, request_id, generation, failure)
                    .await
            }
            _ => {
                debug!(category = category.label(), status = ?failure.status(), "request failed");
                Err(failure.into_error(category))
            }
        }
    }

    /// Force a token refresh and resubmit once. Whatever the retry returns
    /// is final.
    async fn retry_with_fresh_token(
        &self,
        mut request: ApiRequest,
        url: &Url,
        failure: Failure,
    ) -> Result<ApiResponse> {
        request.markers.csrf_retry = true;
        let token = match self.fetcher.get_token(true).await {
            Some(token) if request.set_csrf_token(&token) => token,
            _ => {
                warn!("csrf token rejected and no replacement available");
                return Err(failure.into_error(ErrorCategory::CsrfInvalid));
            }
        };

        metrics::record_csrf_retry();
        info!(origin = ?token.origin(), "csrf token rejected, retrying with a fresh token");
        self.dispatch(&request, url).await.map_err(|f| {
            let category = classify(request.path(), &f);
            f.into_error(category)
        })
    }

    /// Renew-and-replay for a 401, or redirect when that is not possible.
    async fn recover_session(
        &self,
        mut request: ApiRequest,
        url: &Url,
        request_id: &str,
        generation: u64,
        failure: Failure,
    ) -> Result<ApiResponse> {
        if !self.refresh_enabled || request.markers.session_retry || self.guard.is_redirecting() {
            self.guard.on_session_expired().await;
            return Err(failure.into_error(ErrorCategory::SessionExpired));
        }
        request.markers.session_retry = true;

        if generation < self.credentials.generation() {
            debug!(generation, "session renewed since this request was sent");
        } else {
            match self.queue.enter(request_id) {
                Ticket::Leader(lease) => {
                    let outcome = self.renew_session(&lease).await;
                    if outcome.is_err() && lease.is_current() {
                        self.guard.on_session_expired().await;
                    }
                    let released = lease.settle(outcome.clone());
                    debug!(released, "session renewal settled");
                    outcome?;
                }
                Ticket::Parked(parked) => match parked.await {
                    Ok(outcome) => {
                        outcome?;
                    }
                    Err(_) => return Err(failure.into_error(ErrorCategory::SessionExpired)),
                },
            }
        }

        match self.dispatch(&request, url).await {
            Ok(response) => Ok(response),
            Err(f) => {
                let category = classify(request.path(), &f);
                if category == ErrorCategory::SessionExpired {
                    self.guard.on_session_expired().await;
                }
                Err(f.into_error(category))
            }
        }
    }

    /// POST `/auth/refresh`. Returns the new credential generation.
    ///
    /// Tokens from a renewal that a logout discarded mid-flight are dropped.
    async fn renew_session(&self, lease: &RenewalLease<'_>) -> Result<u64> {
        let body = match self.credentials.refresh_token().await {
            Some(token) => json!({ "refreshToken": token.expose() }),
            None => json!({}),
        };
        let mut request = ApiRequest::post(REFRESH_PATH).json(body);
        let url = self.url_for(REFRESH_PATH)?;
        self.prepare(&mut request).await;

        match self.dispatch(&request, &url).await {
            Ok(_) if !lease.is_current() => {
                metrics::record_session_renewal("discarded");
                warn!("session ended while renewing, discarding renewed tokens");
                Err(ApiError::invalid_request("session ended while renewing")
                    .with_kind(ErrorCategory::SessionExpired))
            }
            Ok(response) => {
                if let Some(tokens) = response
                    .json::<Value>()
                    .ok()
                    .as_ref()
                    .and_then(SessionTokens::from_body)
                {
                    self.apply_tokens(&tokens).await;
                }
                let generation = self.credentials.advance();
                metrics::record_session_renewal("success");
                info!(generation, "session renewed");
                Ok(generation)
            }
            Err(failure) => {
                metrics::record_session_renewal("failure");
                let err = failure.into_error(ErrorCategory::SessionExpired);
                warn!(status = ?err.status, error = %err, "session renewal failed");
                Err(err)
            }
        }
    }

    async fn apply_tokens(&self, tokens: &SessionTokens) {
        write_login_cookies(
            &self.jar,
            &self.cookie_url,
            &tokens.access,
            tokens.refresh.as_ref(),
        );
        self.credentials.install(tokens).await;
    }

    /// POST `/auth/login`. On success stores the session cookies and the
    /// user record, and re-arms the redirect guard. Returns the user.
    pub async fn login(&self, email: &str, password: &str) -> Result<Option<Value>> {
        let request =
            ApiRequest::post(LOGIN_PATH).json(json!({ "email": email, "password": password }));
        let response = self.send(request).await?;
        let body: Value = response.json()?;

        if let Some(tokens) = SessionTokens::from_body(&body) {
            self.apply_tokens(&tokens).await;
        }
        let user = user_from_body(&body);
        if let Err(e) = self.durable.set_user(user.clone()).await {
            warn!(error = %e, "failed to persist user");
        }
        let generation = self.credentials.advance();
        self.guard.reset();
        info!(generation, "logged in");
        Ok(user)
    }

    /// POST `/auth/logout`, then clear local state whatever the server said.
    /// The server's error, if any, is still returned.
    pub async fn logout(&self) -> Result<()> {
        let result = self.send(ApiRequest::post(LOGOUT_PATH)).await;
        if let Err(e) = &result {
            warn!(error = %e, "logout request failed, clearing local session anyway");
        }
        self.reset_on_logout().await;
        result.map(|_| ())
    }

    /// Drop every credential the client holds and re-arm the guard.
    pub async fn reset_on_logout(&self) {
        // Discard any renewal in flight before its tokens can land
        let rejected = self.queue.reset(
            ApiError::invalid_request("session ended by logout")
                .with_kind(ErrorCategory::SessionExpired),
        );
        self.fetcher.clear_token().await;
        clear_session_cookies(&self.jar, &self.cookie_url);
        if let Err(e) = self.durable.clear().await {
            warn!(error = %e, "failed to clear persisted session");
        }
        self.credentials.clear().await;
        self.guard.reset();
        info!(rejected, "local session cleared");
    }
}
