//! Client configuration.
//!
//! [`ClientConfig`] can be built in code, read from a JSON file, or taken from
//! `STOREFRONT_API_*` environment variables. Every source is validated the
//! same way before a client is constructed from it.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use storefront_protocol::endpoints;
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

pub const ENV_BASE_URL: &str = "STOREFRONT_API_BASE_URL";
pub const ENV_TIMEOUT_MS: &str = "STOREFRONT_API_TIMEOUT_MS";
pub const ENV_LOGIN_ROUTE: &str = "STOREFRONT_API_LOGIN_ROUTE";

/// Settings for [`SessionClient`](crate::SessionClient) and its HTTP transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Base URL every request path is appended to, e.g. `http://host/api`.
    pub base_url: String,
    /// Per-request timeout enforced by the transport.
    pub timeout_ms: u64,
    /// UI route the navigator is sent to when the session cannot be recovered.
    pub login_route: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            login_route: endpoints::LOGIN_ROUTE.to_string(),
            user_agent: None,
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_login_route(mut self, route: impl Into<String>) -> Self {
        self.login_route = route.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Loads a JSON config file; missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads overrides from the process environment on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(base_url) = lookup(ENV_BASE_URL) {
            config.base_url = base_url;
        }
        if let Some(timeout) = lookup(ENV_TIMEOUT_MS) {
            config.timeout_ms = timeout
                .trim()
                .parse()
                .map_err(|_| Error::Config(format!("{ENV_TIMEOUT_MS} must be an integer, got {timeout:?}")))?;
        }
        if let Some(route) = lookup(ENV_LOGIN_ROUTE) {
            config.login_route = route;
        }
        config.validate()?;
        Ok(config)
    }

    /// Checks the base URL is absolute http(s), and the timeout and login route are usable.
    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid base URL {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(format!(
                "base URL must use http or https, got {}",
                url.scheme()
            )));
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout must be greater than zero".into()));
        }
        if !self.login_route.starts_with('/') {
            return Err(Error::Config(format!(
                "login route must be an absolute path, got {:?}",
                self.login_route
            )));
        }
        Ok(())
    }

    /// Joins `path` onto the base URL, keeping the base path prefix.
    pub fn endpoint_url(&self, path: &str) -> String {
        let base = self.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }
}
