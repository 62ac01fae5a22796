//! Session credentials held by the client
//!
//! Login and `/auth/refresh` both answer with an access token, optionally a
//! refresh token, and on login the user record. Each renewal bumps a
//! generation counter so a 401 raised by a request sent with an older
//! credential can be resubmitted without renewing again.

use std::sync::atomic::{AtomicU64, Ordering};

use common::Secret;
use serde_json::Value;
use tokio::sync::RwLock;

const ACCESS_TOKEN_POINTERS: &[&str] = &["/accessToken", "/data/accessToken", "/token", "/data/token"];
const REFRESH_TOKEN_POINTERS: &[&str] = &["/refreshToken", "/data/refreshToken"];
const USER_POINTERS: &[&str] = &["/user", "/data/user"];

fn first_string(body: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| {
        body.pointer(p)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
    })
}

/// Tokens returned by login or renewal.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access: Secret<String>,
    pub refresh: Option<Secret<String>>,
}

impl SessionTokens {
    /// `None` when the body carries no access token; servers that only set
    /// cookies answer that way.
    pub fn from_body(body: &Value) -> Option<Self> {
        let access = first_string(body, ACCESS_TOKEN_POINTERS)?;
        Some(Self {
            access: Secret::new(access),
            refresh: first_string(body, REFRESH_TOKEN_POINTERS).map(Secret::new),
        })
    }
}

/// User record from a login response, top level or under `data`.
pub fn user_from_body(body: &Value) -> Option<Value> {
    USER_POINTERS
        .iter()
        .find_map(|p| body.pointer(p))
        .filter(|u| u.is_object())
        .cloned()
}

#[derive(Debug, Default)]
pub struct SessionCredentials {
    refresh: RwLock<Option<Secret<String>>>,
    generation: AtomicU64,
}

impl SessionCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generation of the credential currently in use.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Mark a new credential as installed; returns its generation.
    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.refresh.read().await.clone()
    }

    /// Keep the refresh token from `tokens`; a response without one leaves
    /// the previous token in place.
    pub async fn install(&self, tokens: &SessionTokens) {
        if let Some(refresh) = &tokens.refresh {
            *self.refresh.write().await = Some(refresh.clone());
        }
    }

    pub async fn clear(&self) {
        *self.refresh.write().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tokens_at_top_level() {
        let tokens = SessionTokens::from_body(&json!({
            "accessToken": "acc",
            "refreshToken": "ref"
        }))
        .unwrap();
        assert_eq!(tokens.access.expose(), "acc");
        assert_eq!(tokens.refresh.unwrap().expose(), "ref");
    }

    #[test]
    fn tokens_nested_under_data() {
        let tokens = SessionTokens::from_body(&json!({
            "success": true,
            "data": {"accessToken": "acc", "user": {"id": 1}}
        }))
        .unwrap();
        assert_eq!(tokens.access.expose(), "acc");
        assert!(tokens.refresh.is_none());
    }

    #[test]
    fn token_alias_is_accepted() {
        let tokens = SessionTokens::from_body(&json!({"token": "acc"})).unwrap();
        assert_eq!(tokens.access.expose(), "acc");
    }

    #[test]
    fn cookie_only_response_has_no_tokens() {
        assert!(SessionTokens::from_body(&json!({"message": "ok"})).is_none());
        assert!(SessionTokens::from_body(&json!({"accessToken": "  "})).is_none());
        assert!(SessionTokens::from_body(&Value::Null).is_none());
    }

    #[test]
    fn user_lookup() {
        assert_eq!(
            user_from_body(&json!({"user": {"id": 1}})),
            Some(json!({"id": 1}))
        );
        assert_eq!(
            user_from_body(&json!({"data": {"user": {"id": 2}}})),
            Some(json!({"id": 2}))
        );
        assert_eq!(user_from_body(&json!({"user": "nope"})), None);
    }

    #[test]
    fn generation_advances() {
        let credentials = SessionCredentials::new();
        assert_eq!(credentials.generation(), 0);
        assert_eq!(credentials.advance(), 1);
        assert_eq!(credentials.advance(), 2);
        assert_eq!(credentials.generation(), 2);
    }

    #[tokio::test]
    async fn refresh_token_survives_responses_without_one() {
        let credentials = SessionCredentials::new();
        credentials
            .install(&SessionTokens::from_body(&json!({"accessToken": "a", "refreshToken": "r1"})).unwrap())
            .await;
        credentials
            .install(&SessionTokens::from_body(&json!({"accessToken": "b"})).unwrap())
            .await;
        assert_eq!(credentials.refresh_token().await.unwrap().expose(), "r1");

        credentials.clear().await;
        assert!(credentials.refresh_token().await.is_none());
    }
}
