use std::path::PathBuf;

use thiserror::Error;

use crate::constants::DEFAULT_BASE_URL;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
}

/// Application configuration loaded from environment variables.
///
/// Passed explicitly into the components that need it; there is no ambient
/// process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Remote API
    pub base_url: String,
    pub session_id: String,

    // Database
    pub database_path: PathBuf,

    // File storage
    pub storage_dir: PathBuf,
    pub work_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_or_default("FANTIA_BASE_URL", DEFAULT_BASE_URL),
            session_id: required_env("FANTIA_SESSION_ID")?,
            database_path: PathBuf::from(env_or_default(
                "DATABASE_PATH",
                "./data/archive.sqlite",
            )),
            storage_dir: PathBuf::from(env_or_default("STORAGE_DIR", "./data/files")),
            work_dir: PathBuf::from(env_or_default("WORK_DIR", "./data/tmp")),
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_id.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "FANTIA_SESSION_ID".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.base_url.is_empty() || !self.base_url.starts_with("http") {
            return Err(ConfigError::InvalidValue {
                name: "FANTIA_BASE_URL".to_string(),
                message: format!("must be an http(s) URL, got '{}'", self.base_url),
            });
        }
        Ok(())
    }

    /// A configuration suitable for tests; paths point into `./data` and are
    /// expected to be overridden per test.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            session_id: "test-session".to_string(),
            database_path: PathBuf::from("./data/test.sqlite"),
            storage_dir: PathBuf::from("./data/files"),
            work_dir: PathBuf::from("./data/tmp"),
        }
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}
