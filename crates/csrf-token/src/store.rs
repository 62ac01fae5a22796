//! In-memory CSRF token cache backed by the durable store
//!
//! The cache answers "what token should go on the next request" without any
//! network access. Every update is mirrored into `DurableStore` so the value
//! outlives the process and can serve as a fallback when fetching fails.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::durable::DurableStore;
use crate::token::{CsrfToken, TokenOrigin};

pub struct TokenStore {
    current: RwLock<Option<CsrfToken>>,
    ttl: Duration,
    durable: Arc<DurableStore>,
}

impl TokenStore {
    pub fn new(ttl: Duration, durable: Arc<DurableStore>) -> Self {
        Self {
            current: RwLock::new(None),
            ttl,
            durable,
        }
    }

    pub fn durable(&self) -> &Arc<DurableStore> {
        &self.durable
    }

    /// Cached token regardless of age.
    pub async fn current(&self) -> Option<CsrfToken> {
        self.current.read().await.clone()
    }

    /// Cached token if it is still within the TTL.
    pub async fn fresh(&self) -> Option<CsrfToken> {
        self.current
            .read()
            .await
            .as_ref()
            .filter(|token| !token.is_stale(self.ttl))
            .cloned()
    }

    /// Overwrite the cached token and timestamp.
    ///
    /// Empty values are ignored. A failed durable write is logged but does
    /// not undo the in-memory update.
    pub async fn update_token(&self, value: String, origin: TokenOrigin) -> Option<CsrfToken> {
        if value.is_empty() {
            debug!("ignoring empty csrf token update");
            return None;
        }
        let token = CsrfToken::new(value.clone(), origin);
        *self.current.write().await = Some(token.clone());
        debug!(?origin, "cached csrf token updated");

        if let Err(e) = self.durable.set_csrf_token(Some(value)).await {
            warn!(error = %e, "failed to persist csrf token");
        }
        Some(token)
    }

    /// Install a prebuilt token without touching the durable store.
    pub async fn install(&self, token: CsrfToken) {
        *self.current.write().await = Some(token);
    }

    /// Wipe cached and durable token state.
    pub async fn clear_token(&self) {
        *self.current.write().await = None;
        if let Err(e) = self.durable.set_csrf_token(None).await {
            warn!(error = %e, "failed to clear persisted csrf token");
        }
        debug!("csrf token cleared");
    }

    /// Last-known token from the durable store, used when fetching fails.
    pub async fn durable_fallback(&self) -> Option<CsrfToken> {
        let value = self.durable.csrf_token().await?;
        if value.is_empty() {
            return None;
        }
        Some(CsrfToken::new(value, TokenOrigin::Durable))
    }
}
