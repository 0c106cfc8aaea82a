//! Remote provisioning of ephemeral check repositories.
//!
//! Each check gets its own repository, named after the check id. The
//! repository is created, populated with the submitted file and a pipeline
//! definition, and deleted once the check is finalized.
//!
//! The remote API has no multi-file commit, so the sequence is strictly
//! ordered: create, commit source, install pipeline.

mod error;
pub mod fakes;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::CheckId;
use crate::pipeline::{PipelineDefinition, PIPELINE_COMMIT_MESSAGE, PIPELINE_PATH};

pub use error::{ProviderFailure, ProvisionError, ProvisionResult};

/// Name of the ephemeral repository owned by one check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoName(String);

impl RepoName {
    /// Deterministic, collision-free as long as check ids are unique.
    pub fn for_check(id: &CheckId) -> Self {
        RepoName(format!("code-check-{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RepoName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A created remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoHandle {
    /// Repository name.
    pub name: String,
    /// Account that owns the repository.
    pub owner: String,
    /// Browser URL, when the provider reports one.
    pub html_url: Option<String>,
}

impl RepoHandle {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Commit message used for the submitted source file.
pub fn source_commit_message(file_name: &str) -> String {
    format!("Add {file_name} for CI/CD check")
}

/// Creates, populates and deletes ephemeral repositories.
///
/// Implementations hold no per-check state; every repository belongs to
/// exactly one check.
#[async_trait]
pub trait RemoteProvisioner: Send + Sync {
    /// Create an empty private repository.
    async fn create_repository(&self, name: &RepoName) -> ProvisionResult<RepoHandle>;

    /// Handle of the repository `name` under the provisioner's account,
    /// built without contacting the provider. Used to clean up or adopt a
    /// repository whose creation was not confirmed.
    fn repo_handle(&self, name: &RepoName) -> RepoHandle;

    /// Commit a single file on the default branch.
    async fn commit_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> ProvisionResult<()>;

    /// Commit the pipeline definition generated for `file_name`.
    async fn install_pipeline_definition(
        &self,
        repo: &RepoHandle,
        file_name: &str,
    ) -> ProvisionResult<()> {
        let document = PipelineDefinition::for_file(file_name)
            .to_yaml()
            .map_err(|e| ProvisionError::Commit {
                repo: repo.name.clone(),
                path: PIPELINE_PATH.to_string(),
                cause: ProviderFailure::Encoding(e.to_string()),
            })?;
        self.commit_file(repo, PIPELINE_PATH, document.as_bytes(), PIPELINE_COMMIT_MESSAGE)
            .await
    }

    /// Delete the repository.
    async fn delete_repository(&self, repo: &RepoHandle) -> ProvisionResult<()>;
}

/// Lifecycle state of a pipeline run on the CI platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Queued,
    InProgress,
    Completed,
}

/// Latest observed pipeline run of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: u64,
    pub state: RunState,
    /// Set once `state` is `Completed` (e.g. `success`, `failure`).
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
}

impl PipelineRun {
    pub fn is_finished(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn succeeded(&self) -> bool {
        self.is_finished() && self.conclusion.as_deref() == Some("success")
    }
}

/// Reads pipeline run status from the CI platform.
#[async_trait]
pub trait PipelineRunProbe: Send + Sync {
    /// The most recent run for the repository, if one has been queued.
    async fn latest_run(&self, repo: &RepoHandle) -> ProvisionResult<Option<PipelineRun>>;
}
