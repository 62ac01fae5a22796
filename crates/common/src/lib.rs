//! Shared types for the recruit platform client
//!
//! Holds the pieces every other crate leans on: the redacting `Secret`
//! wrapper for tokens, the TOML configuration model, and the error type for
//! loading it.

mod config;
mod error;
mod secret;

pub use config::{
    ApiConfig, Config, CsrfConfig, RoleRoute, SessionConfig, StorageConfig, DEFAULT_CONFIG_FILE,
};
pub use error::{Error, Result};
pub use secret::Secret;
