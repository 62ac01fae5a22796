//! Session-expiry redirect guard
//!
//! Turns an unrecoverable session failure into at most one navigation to
//! the login page. Concurrent failures race on a single atomic flag; only
//! the winner clears local state and navigates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::{RoleRoute, SessionConfig};
use csrf_token::DurableStore;
use csrf_token::cookies::clear_session_cookies;
use reqwest::Url;
use reqwest::cookie::Jar;
use tracing::{debug, info, warn};

use crate::metrics;

/// Where the application currently is, and how to move it elsewhere.
pub trait Navigator: Send + Sync {
    /// Path of the page being shown, e.g. `/dashboard/jobs`.
    fn current_path(&self) -> String;

    fn navigate(&self, target: &str);
}

/// Navigator with a settable current path that records every navigation.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    current: Mutex<String>,
    visited: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn at(path: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(path.into()),
            visited: Mutex::new(Vec::new()),
        }
    }

    pub fn set_current(&self, path: impl Into<String>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = path.into();
    }

    /// Every target passed to `navigate`, oldest first.
    pub fn visited(&self) -> Vec<String> {
        self.visited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Navigator for RecordingNavigator {
    fn current_path(&self) -> String {
        self.current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn navigate(&self, target: &str) {
        self.visited
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(target.to_string());
        self.set_current(target.split('?').next().unwrap_or(target));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Already on a public page; nothing to do
    PublicPage,
    /// Another failure already triggered the redirect
    AlreadyRedirecting,
    /// Navigated to this target
    Redirected(String),
}

pub struct SessionGuard {
    redirecting: AtomicBool,
    navigator: Arc<dyn Navigator>,
    durable: Arc<DurableStore>,
    jar: Arc<Jar>,
    cookie_url: Url,
    login_path: String,
    public_pages: Vec<String>,
    role_routes: Vec<RoleRoute>,
    delay: Duration,
}

/// `path` equals `prefix` or sits beneath it.
fn under(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_end_matches('/');
    path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

impl SessionGuard {
    pub fn new(
        config: &SessionConfig,
        navigator: Arc<dyn Navigator>,
        durable: Arc<DurableStore>,
        jar: Arc<Jar>,
        cookie_url: Url,
    ) -> Self {
        Self {
            redirecting: AtomicBool::new(false),
            navigator,
            durable,
            jar,
            cookie_url,
            login_path: config.login_path.clone(),
            public_pages: config.public_pages.clone(),
            role_routes: config.role_routes.clone(),
            delay: config.redirect_delay(),
        }
    }

    /// Login pages (the default and every role-specific one) count as public.
    pub fn is_public_page(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        self.public_pages.iter().any(|page| under(path, page))
            || under(path, &self.login_path)
            || self.role_routes.iter().any(|r| under(path, &r.login_path))
    }

    /// Login page for the section of the app `path` belongs to.
    pub fn login_path_for(&self, path: &str) -> &str {
        self.role_routes
            .iter()
            .find(|route| under(path, &route.prefix))
            .map(|route| route.login_path.as_str())
            .unwrap_or(&self.login_path)
    }

    /// Login URL carrying the return location and the redirect reason.
    pub fn redirect_target(&self, path: &str) -> String {
        let login = self.login_path_for(path);
        match serde_urlencoded::to_string([("redirect", path), ("reason", "session_expired")]) {
            Ok(query) => format!("{login}?{query}"),
            Err(e) => {
                warn!(error = %e, "failed to encode redirect query");
                format!("{login}?reason=session_expired")
            }
        }
    }

    pub fn is_redirecting(&self) -> bool {
        self.redirecting.load(Ordering::Acquire)
    }

    /// Re-arm after a successful login or an explicit logout.
    pub fn reset(&self) {
        self.redirecting.store(false, Ordering::Release);
    }

    /// Handle a session failure nothing else could recover.
    pub async fn on_session_expired(&self) -> GuardOutcome {
        let path = self.navigator.current_path();
        if self.is_public_page(&path) {
            debug!(path = %path, "session expired on public page, not redirecting");
            return GuardOutcome::PublicPage;
        }
        if self
            .redirecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("redirect already in progress");
            return GuardOutcome::AlreadyRedirecting;
        }

        clear_session_cookies(&self.jar, &self.cookie_url);
        if let Err(e) = self.durable.set_user(None).await {
            warn!(error = %e, "failed to clear persisted user");
        }

        let target = self.redirect_target(&path);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        metrics::record_redirect();
        info!(from = %path, target = %target, "session expired, redirecting to login");
        self.navigator.navigate(&target);
        GuardOutcome::Redirected(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Config;
    use csrf_token::cookies::read_cookie;

    struct Fixture {
        guard: Arc<SessionGuard>,
        navigator: Arc<RecordingNavigator>,
        durable: Arc<DurableStore>,
        jar: Arc<Jar>,
        url: Url,
        _dir: tempfile::TempDir,
    }

    async fn fixture(current: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let durable = Arc::new(
            DurableStore::load(dir.path().join("session.json"))
                .await
                .unwrap(),
        );
        let mut config = Config::with_base_url("http://localhost:4000/api/v1");
        config.session.redirect_delay_ms = 0;
        let navigator = Arc::new(RecordingNavigator::at(current));
        let jar = Arc::new(Jar::default());
        let url = Url::parse(&config.api.base_url).unwrap();
        let guard = Arc::new(SessionGuard::new(
            &config.session,
            navigator.clone(),
            durable.clone(),
            jar.clone(),
            url.clone(),
        ));
        Fixture {
            guard,
            navigator,
            durable,
            jar,
            url,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn redirects_with_encoded_return_path() {
        let f = fixture("/dashboard/jobs").await;
        let outcome = f.guard.on_session_expired().await;
        let expected = "/login?redirect=%2Fdashboard%2Fjobs&reason=session_expired";
        assert_eq!(outcome, GuardOutcome::Redirected(expected.to_string()));
        assert_eq!(f.navigator.visited(), vec![expected.to_string()]);
        assert!(f.guard.is_redirecting());
    }

    #[tokio::test]
    async fn concurrent_failures_navigate_once() {
        let f = fixture("/dashboard").await;
        let outcomes = futures_util::future::join_all(
            (0..5).map(|_| f.guard.on_session_expired()),
        )
        .await;

        let redirected = outcomes
            .iter()
            .filter(|o| matches!(o, GuardOutcome::Redirected(_)))
            .count();
        assert_eq!(redirected, 1);
        assert_eq!(f.navigator.visited().len(), 1);
    }

    #[tokio::test]
    async fn public_pages_are_never_redirected() {
        for page in ["/login", "/register", "/reset-password/abc", "/admin/login"] {
            let f = fixture(page).await;
            assert_eq!(f.guard.on_session_expired().await, GuardOutcome::PublicPage, "{page}");
            assert!(f.navigator.visited().is_empty());
            assert!(!f.guard.is_redirecting());
        }
    }

    #[tokio::test]
    async fn public_prefix_does_not_match_longer_segment() {
        let f = fixture("/login-history").await;
        assert!(!f.guard.is_public_page("/login-history"));
        assert!(matches!(
            f.guard.on_session_expired().await,
            GuardOutcome::Redirected(_)
        ));
    }

    #[tokio::test]
    async fn role_sections_use_their_own_login_page() {
        let f = fixture("/admin/users").await;
        assert_eq!(f.guard.login_path_for("/employer/jobs/3"), "/employer/login");
        assert_eq!(f.guard.login_path_for("/jobs"), "/login");
        assert_eq!(
            f.guard.on_session_expired().await,
            GuardOutcome::Redirected(
                "/admin/login?redirect=%2Fadmin%2Fusers&reason=session_expired".into()
            )
        );
    }

    #[tokio::test]
    async fn clears_local_session_state() {
        let f = fixture("/dashboard").await;
        f.durable
            .set_user(Some(serde_json::json!({"id": 1})))
            .await
            .unwrap();
        f.jar
            .add_cookie_str("accessToken=abc; Path=/", &f.url);

        f.guard.on_session_expired().await;

        assert!(f.durable.user().await.is_none());
        assert!(read_cookie(&f.jar, &f.url, "accessToken").is_none());
    }

    #[tokio::test]
    async fn reset_rearms_the_guard() {
        let f = fixture("/dashboard").await;
        f.guard.on_session_expired().await;
        assert_eq!(f.guard.on_session_expired().await, GuardOutcome::AlreadyRedirecting);

        f.guard.reset();
        f.navigator.set_current("/dashboard");
        assert!(matches!(
            f.guard.on_session_expired().await,
            GuardOutcome::Redirected(_)
        ));
        assert_eq!(f.navigator.visited().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn navigation_waits_for_the_configured_delay() {
        let f = fixture("/dashboard").await;
        let mut config = Config::with_base_url("http://localhost:4000/api/v1");
        config.session.redirect_delay_ms = 100;
        let guard = SessionGuard::new(
            &config.session,
            f.navigator.clone(),
            f.durable.clone(),
            f.jar.clone(),
            f.url.clone(),
        );

        let start = tokio::time::Instant::now();
        guard.on_session_expired().await;
        assert!(start.elapsed() >= Duration::from_millis(100));
        assert_eq!(f.navigator.visited().len(), 1);
    }
}
