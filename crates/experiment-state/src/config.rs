//! Experiments API configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default backend address used when `EXPERIMENTS_API_URL` is unset
pub const DEFAULT_API_URL: &str = "http://localhost:5174";
/// Default path prefix in front of every endpoint
pub const DEFAULT_API_PREFIX: &str = "/api";
/// Default per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for `HttpRemoteClient`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Backend base URL, without trailing slash
    pub base_url: String,
    /// Prefix joined between base URL and endpoint path
    pub api_prefix: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// User-Agent header
    pub user_agent: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            base_url: DEFAULT_API_URL.to_string(),
            api_prefix: DEFAULT_API_PREFIX.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: format!("experiment-state/{}", crate::VERSION),
        }
    }
}

impl ApiConfig {
    /// Create config from environment variables
    ///
    /// - EXPERIMENTS_API_URL (optional, default: "http://localhost:5174")
    /// - EXPERIMENTS_API_PREFIX (optional, default: "/api")
    /// - EXPERIMENTS_API_TIMEOUT_SECS (optional, default: 30; unparsable values fall back)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("EXPERIMENTS_API_URL").unwrap_or(defaults.base_url);
        let api_prefix = std::env::var("EXPERIMENTS_API_PREFIX").unwrap_or(defaults.api_prefix);
        let timeout = std::env::var("EXPERIMENTS_API_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        ApiConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_prefix,
            timeout,
            user_agent: defaults.user_agent,
        }
    }

    /// Create config for a specific server
    pub fn new(base_url: &str) -> Self {
        ApiConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }

    /// Set the path prefix (use "" for none)
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.api_prefix = prefix.to_string();
        self
    }

    /// Set the per-request timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL for an endpoint path such as `/experiments/3`
    pub fn url_for(&self, path: &str) -> String {
        let prefix = self.api_prefix.trim_end_matches('/');
        let prefix = if prefix.is_empty() || prefix.starts_with('/') {
            prefix.to_string()
        } else {
            format!("/{}", prefix)
        };
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };
        format!("{}{}{}", self.base_url, prefix, path)
    }
}
