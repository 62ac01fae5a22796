//! Client configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Only `api.base_url` is required; every other section falls back to the
//! values the platform backend is deployed with.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Config file looked up when neither `--config` nor `CONFIG_PATH` is given.
pub const DEFAULT_CONFIG_FILE: &str = "recruit-client.toml";

/// Root configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub csrf: CsrfConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend API settings
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL every request path is joined onto, e.g. `https://host/api/v1`
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// CSRF token lifecycle settings
#[derive(Debug, Clone, Deserialize)]
pub struct CsrfConfig {
    /// Client-side token lifetime. Kept below the server's 60 minute expiry.
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

/// Session expiry and renewal settings
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Renew the session through `/auth/refresh` before giving up and
    /// redirecting. When false a 401 redirects immediately.
    #[serde(default = "default_true")]
    pub refresh_enabled: bool,
    /// Pause before navigating so persisted credentials settle.
    #[serde(default = "default_redirect_delay")]
    pub redirect_delay_ms: u64,
    #[serde(default = "default_login_path")]
    pub login_path: String,
    /// Pages that legitimately see 401s; a session expiry there never redirects.
    #[serde(default = "default_public_pages")]
    pub public_pages: Vec<String>,
    #[serde(default = "default_role_routes")]
    pub role_routes: Vec<RoleRoute>,
}

/// Restricted section with its own login page
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RoleRoute {
    pub prefix: String,
    pub login_path: String,
}

/// Durable client-side storage
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

fn default_timeout() -> u64 {
    30
}

/// Client-side CSRF token lifetime; the server expires tokens after 60 minutes.
fn default_ttl() -> u64 {
    50 * 60
}

fn default_fetch_timeout() -> u64 {
    5
}

fn default_true() -> bool {
    true
}

fn default_redirect_delay() -> u64 {
    100
}

fn default_login_path() -> String {
    "/login".into()
}

fn default_public_pages() -> Vec<String> {
    [
        "/login",
        "/register",
        "/forgot-password",
        "/reset-password",
        "/verify-email",
    ]
    .iter()
    .map(|p| p.to_string())
    .collect()
}

fn default_role_routes() -> Vec<RoleRoute> {
    vec![
        RoleRoute {
            prefix: "/admin".into(),
            login_path: "/admin/login".into(),
        },
        RoleRoute {
            prefix: "/employer".into(),
            login_path: "/employer/login".into(),
        },
    ]
}

fn default_storage_path() -> PathBuf {
    PathBuf::from(".recruit-session.json")
}

impl Default for CsrfConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

impl SessionConfig {
    pub fn redirect_delay(&self) -> Duration {
        Duration::from_millis(self.redirect_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_enabled: default_true(),
            redirect_delay_ms: default_redirect_delay(),
            login_path: default_login_path(),
            public_pages: default_public_pages(),
            role_routes: default_role_routes(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

impl Config {
    /// Defaults for everything except the API base URL.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            api: ApiConfig {
                base_url: base_url.into(),
                timeout_secs: default_timeout(),
            },
            csrf: CsrfConfig::default(),
            session: SessionConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    /// Load configuration from a TOML file, then overlay environment variables.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse TOML text, apply `RECRUIT_API_URL`, and validate.
    pub fn parse(contents: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(contents)?;

        if let Ok(url) = std::env::var("RECRUIT_API_URL") {
            config.api.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(Error::Config(
                "api.timeout_secs must be greater than 0".into(),
            ));
        }

        if self.csrf.ttl_secs == 0 {
            return Err(Error::Config("csrf.ttl_secs must be greater than 0".into()));
        }

        if self.csrf.fetch_timeout_secs == 0 {
            return Err(Error::Config(
                "csrf.fetch_timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.session.login_path.starts_with('/') {
            return Err(Error::Config(format!(
                "session.login_path must be an absolute path, got: {:?}",
                self.session.login_path
            )));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from(DEFAULT_CONFIG_FILE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_secs)
    }

    pub fn csrf_ttl(&self) -> Duration {
        Duration::from_secs(self.csrf.ttl_secs)
    }

    pub fn csrf_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.csrf.fetch_timeout_secs)
    }
}
