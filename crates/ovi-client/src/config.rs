//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so the demo binary can start with zero
//! configuration against the in-process backend.

use std::path::PathBuf;
use std::time::Duration;

use ovi_backend::HttpConfig;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the hosted backend.
    /// Env: `OVI_API_URL`
    /// Default: `http://127.0.0.1:54321`
    pub api_url: String,

    /// Public API key sent with every backend request.
    /// Env: `OVI_API_KEY`
    /// Default: empty (local development).
    pub api_key: String,

    /// Where the persisted session lives. `None` picks the platform
    /// data directory.
    /// Env: `OVI_SESSION_FILE`
    /// Default: `None`
    pub session_file: Option<PathBuf>,

    /// Per-request timeout.
    /// Env: `OVI_REQUEST_TIMEOUT_SECS`
    /// Default: 10 seconds.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:54321".to_string(),
            api_key: String::new(),
            session_file: None,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("OVI_API_URL") {
            config.api_url = url;
        }

        if let Ok(key) = std::env::var("OVI_API_KEY") {
            config.api_key = key;
        }

        if let Ok(path) = std::env::var("OVI_SESSION_FILE") {
            if !path.is_empty() {
                config.session_file = Some(PathBuf::from(path));
            }
        }

        if let Ok(val) = std::env::var("OVI_REQUEST_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                config.request_timeout = Duration::from_secs(secs);
            } else {
                tracing::warn!(
                    value = %val,
                    "Invalid OVI_REQUEST_TIMEOUT_SECS, using default"
                );
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's
        // EnvFilter, so we do not store it here.

        config
    }

    /// The backend settings this configuration describes.
    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            base_url: self.api_url.trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
            session_file: self.session_file.clone(),
            request_timeout: self.request_timeout,
        }
    }
}
