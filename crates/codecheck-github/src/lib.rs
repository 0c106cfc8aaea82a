//! GitHub integration for Codecheck
//!
//! Provides the production [`RemoteProvisioner`](codecheck_core::RemoteProvisioner)
//! and [`PipelineRunProbe`](codecheck_core::PipelineRunProbe): ephemeral
//! private repositories on GitHub, populated through the contents API and
//! observed through the Actions workflow runs API.

pub mod client;
pub mod config;
pub mod error;
mod wire;

pub use client::GitHubClient;
pub use config::{GitHubConfig, DEFAULT_API_URL, DEFAULT_REQUEST_TIMEOUT};
pub use error::{GitHubError, Result};
