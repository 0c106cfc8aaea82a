//! Error types for codecheck-github

use thiserror::Error;

/// Errors raised while setting up the GitHub client. Failures of individual
/// API calls are reported as [`codecheck_core::ProvisionError`] instead.
#[derive(Error, Debug)]
pub enum GitHubError {
    /// A required credential or setting is missing
    #[error("GitHub setting {0} is not configured")]
    MissingSetting(&'static str),

    /// The API base URL cannot be used
    #[error("Invalid GitHub API URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// The HTTP client could not be built
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for client setup
pub type Result<T> = std::result::Result<T, GitHubError>;
