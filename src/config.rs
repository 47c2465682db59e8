//! Client configuration

use crate::error::{HttpError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the REST API; relative resource paths are joined onto it
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Batch endpoint, relative to `rest_url`
    #[serde(default = "default_batch_path")]
    pub batch_path: String,

    /// Schema document endpoint, relative to `rest_url`
    #[serde(default = "default_meta_api_path")]
    pub meta_api_path: String,

    #[serde(default)]
    pub no_fork: NoForkConfig,
}

/// Retry settings of the no-fork version protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoForkConfig {
    /// Total POST attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backoff base in milliseconds
    #[serde(default = "default_base_wait_ms")]
    pub base_wait_ms: u64,

    /// Relative jitter applied to every wait
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for NoForkConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_wait_ms: default_base_wait_ms(),
            jitter: default_jitter(),
        }
    }
}

// Defaults
fn default_rest_url() -> String { "http://localhost:6541".to_string() }
fn default_timeout_secs() -> u64 { 30 }
fn default_batch_path() -> String { "batch".to_string() }
fn default_meta_api_path() -> String { "meta_api".to_string() }
fn default_max_attempts() -> u32 { 5 }
fn default_base_wait_ms() -> u64 { 250 }
fn default_jitter() -> f64 { 0.25 }

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            rest_url: default_rest_url(),
            timeout_secs: default_timeout_secs(),
            batch_path: default_batch_path(),
            meta_api_path: default_meta_api_path(),
            no_fork: NoForkConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn with_rest_url(mut self, rest_url: impl Into<String>) -> Self {
        self.rest_url = rest_url.into();
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| HttpError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rest_url.is_empty() {
            return Err(HttpError::Config("rest_url must not be empty".into()));
        }
        if self.no_fork.max_attempts == 0 {
            return Err(HttpError::Config("no_fork.max_attempts must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.no_fork.jitter) {
            return Err(HttpError::Config("no_fork.jitter must be in [0, 1)".into()));
        }
        Ok(())
    }

    /// Absolute URL for `path`; absolute URLs are returned unchanged.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.rest_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub fn batch_url(&self) -> String {
        self.url(&self.batch_path)
    }

    pub fn meta_api_url(&self) -> String {
        self.url(&self.meta_api_path)
    }
}
