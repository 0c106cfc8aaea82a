//! Error types for remote provisioning.

use thiserror::Error;

/// Why a provider call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderFailure {
    /// A repository with the requested name already exists.
    #[error("name already taken")]
    NameConflict,

    /// Rate limit or account quota exhausted.
    #[error("quota or rate limit exceeded")]
    QuotaExceeded,

    /// Token missing, expired or lacking scope.
    #[error("authentication failed")]
    Unauthorized,

    /// The addressed resource does not exist.
    #[error("resource not found")]
    NotFound,

    /// Transport-level failure.
    #[error("network error: {0}")]
    Network(String),

    /// The attempt did not finish within its time budget.
    #[error("timed out after {limit_ms}ms")]
    Timeout { limit_ms: u64 },

    /// Any other non-success response.
    #[error("provider returned {status}: {message}")]
    Api { status: u16, message: String },

    /// Content could not be encoded for transmission.
    #[error("encoding failed: {0}")]
    Encoding(String),
}

impl ProviderFailure {
    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderFailure::Network(_)
            | ProviderFailure::Timeout { .. }
            | ProviderFailure::QuotaExceeded => true,
            ProviderFailure::Api { status, .. } => *status >= 500,
            ProviderFailure::NameConflict
            | ProviderFailure::Unauthorized
            | ProviderFailure::NotFound
            | ProviderFailure::Encoding(_) => false,
        }
    }

    /// Whether the provider may have carried out the call even though it
    /// reported a failure, e.g. a response lost to a timeout.
    pub fn may_have_applied(&self) -> bool {
        match self {
            ProviderFailure::Network(_) | ProviderFailure::Timeout { .. } => true,
            ProviderFailure::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Errors from the remote provisioner, one variant per failure domain.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// Repository creation failed.
    #[error("failed to create repository {repo}: {cause}")]
    Provision { repo: String, cause: ProviderFailure },

    /// A file commit failed.
    #[error("failed to commit {path} to {repo}: {cause}")]
    Commit {
        repo: String,
        path: String,
        cause: ProviderFailure,
    },

    /// Repository deletion failed.
    #[error("failed to delete repository {repo}: {cause}")]
    Teardown { repo: String, cause: ProviderFailure },

    /// Pipeline run status could not be read.
    #[error("failed to read pipeline runs of {repo}: {cause}")]
    Probe { repo: String, cause: ProviderFailure },
}

impl ProvisionError {
    pub fn cause(&self) -> &ProviderFailure {
        match self {
            ProvisionError::Provision { cause, .. }
            | ProvisionError::Commit { cause, .. }
            | ProvisionError::Teardown { cause, .. }
            | ProvisionError::Probe { cause, .. } => cause,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.cause().is_retryable()
    }
}

/// Result type for provisioner operations.
pub type ProvisionResult<T> = std::result::Result<T, ProvisionError>;
