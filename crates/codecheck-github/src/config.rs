//! GitHub client configuration

use std::time::Duration;

use crate::error::{GitHubError, Result};

/// Public GitHub REST API.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Per-request transport timeout, independent of the orchestrator's
/// per-attempt budget.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the GitHub REST API.
#[derive(Clone)]
pub struct GitHubConfig {
    /// API root, e.g. `https://api.github.com` or `https://ghe.example/api/v3`
    pub api_base_url: String,
    /// Token with permission to create and delete repositories
    pub token: String,
    /// Account that owns the ephemeral repositories
    pub owner: String,
    pub user_agent: String,
    pub request_timeout: Duration,
}

impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("api_base_url", &self.api_base_url)
            .field("token", &"<redacted>")
            .field("owner", &self.owner)
            .field("user_agent", &self.user_agent)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl GitHubConfig {
    /// Config for the public API.
    pub fn new(token: impl Into<String>, owner: impl Into<String>) -> Self {
        GitHubConfig {
            api_base_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            owner: owner.into(),
            user_agent: concat!("codecheck/", env!("CARGO_PKG_VERSION")).to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Point at a different API root (GitHub Enterprise, test servers).
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Reject configs that can never authenticate.
    pub fn validate(&self) -> Result<()> {
        if self.token.trim().is_empty() {
            return Err(GitHubError::MissingSetting("GITHUB_TOKEN"));
        }
        if self.owner.trim().is_empty() {
            return Err(GitHubError::MissingSetting("GITHUB_USERNAME"));
        }
        Ok(())
    }
}
