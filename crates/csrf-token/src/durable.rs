//! Durable client-side session storage
//!
//! Persists the last-known CSRF token and the cached user profile to a JSON
//! file so a restarted client still has a fallback token when the token
//! endpoint is unreachable. All writes use atomic temp-file + rename, and a
//! tokio Mutex serializes writers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// On-disk shape of the session file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csrf_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<serde_json::Value>,
}

/// File-backed store for the fallback token and cached user.
pub struct DurableStore {
    path: PathBuf,
    state: Mutex<PersistedSession>,
}

impl DurableStore {
    /// Load the session file, creating an empty one if it doesn't exist.
    ///
    /// A file that no longer parses is replaced with an empty session; it
    /// only ever holds fallback state.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| Error::Io(format!("reading session file: {e}")))?;
            match serde_json::from_str::<PersistedSession>(&contents) {
                Ok(session) => {
                    info!(
                        path = %path.display(),
                        has_token = session.csrf_token.is_some(),
                        has_user = session.user.is_some(),
                        "loaded session file"
                    );
                    session
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "session file is corrupt, starting empty");
                    let session = PersistedSession::default();
                    write_atomic(&path, &session).await?;
                    session
                }
            }
        } else {
            info!(path = %path.display(), "session file not found, starting empty");
            let session = PersistedSession::default();
            write_atomic(&path, &session).await?;
            session
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub async fn snapshot(&self) -> PersistedSession {
        self.state.lock().await.clone()
    }

    pub async fn csrf_token(&self) -> Option<String> {
        self.state.lock().await.csrf_token.clone()
    }

    /// Replace the fallback token. Skips the write when nothing changed,
    /// since rotated headers arrive on every response.
    pub async fn set_csrf_token(&self, token: Option<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.csrf_token == token {
            return Ok(());
        }
        state.csrf_token = token;
        write_atomic(&self.path, &state).await
    }

    pub async fn user(&self) -> Option<serde_json::Value> {
        self.state.lock().await.user.clone()
    }

    pub async fn set_user(&self, user: Option<serde_json::Value>) -> Result<()> {
        let mut state = self.state.lock().await;
        state.user = user;
        debug!(cached = state.user.is_some(), "updated cached user");
        write_atomic(&self.path, &state).await
    }

    /// Wipe token and user.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        *state = PersistedSession::default();
        write_atomic(&self.path, &state).await
    }
}

/// Write the session atomically with 0600 permissions (unix only).
async fn write_atomic(path: &Path, data: &PersistedSession) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::StoreParse(format!("serializing session: {e}")))?;

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let tmp_path = dir.join(format!(".recruit-session.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Io(format!("writing temp session file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Io(format!("setting session file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Io(format!("renaming temp session file: {e}")))?;

    debug!(path = %path.display(), "persisted session");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn cold_start_creates_empty_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = DurableStore::load(path.clone()).await.unwrap();
        assert_eq!(store.snapshot().await, PersistedSession::default());
        assert!(path.exists());

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(contents.trim(), "{}");
    }

    #[tokio::test]
    async fn token_and_user_survive_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = DurableStore::load(path.clone()).await.unwrap();
        store.set_csrf_token(Some("tok-1".into())).await.unwrap();
        store
            .set_user(Some(json!({"id": 7, "role": "candidate"})))
            .await
            .unwrap();

        let reloaded = DurableStore::load(path.clone()).await.unwrap();
        assert_eq!(reloaded.csrf_token().await.as_deref(), Some("tok-1"));
        assert_eq!(reloaded.user().await, Some(json!({"id": 7, "role": "candidate"})));

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(raw.contains("\"csrfToken\""), "camelCase keys on disk: {raw}");
    }

    #[tokio::test]
    async fn clear_wipes_everything() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = DurableStore::load(path.clone()).await.unwrap();
        store.set_csrf_token(Some("tok".into())).await.unwrap();
        store.set_user(Some(json!({"id": 1}))).await.unwrap();
        store.clear().await.unwrap();

        assert_eq!(store.snapshot().await, PersistedSession::default());
        let reloaded = DurableStore::load(path).await.unwrap();
        assert!(reloaded.csrf_token().await.is_none());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        tokio::fs::write(&path, "{not json").await.unwrap();

        let store = DurableStore::load(path.clone()).await.unwrap();
        assert_eq!(store.snapshot().await, PersistedSession::default());

        // The corrupt file was overwritten, so the next load is clean too
        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let on_disk: PersistedSession = serde_json::from_str(&contents).unwrap();
        assert_eq!(on_disk, PersistedSession::default());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn file_permissions_are_0600() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = DurableStore::load(path.clone()).await.unwrap();
        store.set_csrf_token(Some("tok".into())).await.unwrap();

        let mode = tokio::fs::metadata(&path).await.unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600, "session file must be 0600, got {mode:o}");
    }
}
