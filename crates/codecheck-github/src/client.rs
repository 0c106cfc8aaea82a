//! GitHub REST client
//!
//! Implements the repository provisioner and the workflow run probe on top
//! of four endpoints: create repository, put file contents, delete
//! repository and list workflow runs.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use codecheck_core::pipeline::DEFAULT_BRANCH;
use codecheck_core::{
    PipelineRun, PipelineRunProbe, ProviderFailure, ProvisionError, ProvisionResult,
    RemoteProvisioner, RepoHandle, RepoName,
};
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response, StatusCode, Url};
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::error::{GitHubError, Result};
use crate::wire::{CreateRepository, ErrorBody, PutContents, Repository, WorkflowRuns};

const API_VERSION: &str = "2022-11-28";
const REPO_DESCRIPTION: &str = "Ephemeral repository for an automated code check";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// GitHub client for ephemeral check repositories
pub struct GitHubClient {
    config: GitHubConfig,
    base: Url,
    http: reqwest::Client,
}

impl GitHubClient {
    /// Create a new client. Fails on blank credentials or an unusable base URL.
    pub fn new(config: GitHubConfig) -> Result<Self> {
        config.validate()?;
        let base = Url::parse(&config.api_base_url).map_err(|e| GitHubError::InvalidBaseUrl {
            url: config.api_base_url.clone(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(GitHubError::InvalidBaseUrl {
                url: config.api_base_url.clone(),
                reason: "not a hierarchical URL".to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.request_timeout)
            .build()?;

        Ok(GitHubClient { config, base, http })
    }

    pub fn config(&self) -> &GitHubConfig {
        &self.config
    }

    /// Base URL extended with percent-encoded path segments.
    pub(crate) fn endpoint<'a>(&self, segments: impl IntoIterator<Item = &'a str>) -> Url {
        let mut url = self.base.clone();
        // `new` rejected cannot-be-a-base URLs
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub(crate) fn contents_endpoint(&self, repo: &RepoHandle, path: &str) -> Url {
        let segments = ["repos", repo.owner.as_str(), repo.name.as_str(), "contents"]
            .into_iter()
            .chain(path.split('/'));
        self.endpoint(segments)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .bearer_auth(&self.config.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
    }

    async fn send(
        &self,
        builder: RequestBuilder,
    ) -> std::result::Result<Response, ProviderFailure> {
        let response = builder
            .send()
            .await
            .map_err(|e| self.transport_failure(e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let remaining = response
            .headers()
            .get(RATE_LIMIT_REMAINING)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        Err(classify(status, remaining.as_deref(), &body))
    }

    fn transport_failure(&self, err: reqwest::Error) -> ProviderFailure {
        if err.is_timeout() {
            ProviderFailure::Timeout {
                limit_ms: self.config.request_timeout.as_millis() as u64,
            }
        } else {
            ProviderFailure::Network(err.to_string())
        }
    }
}

/// Map a non-success response onto a provider failure.
pub(crate) fn classify(
    status: StatusCode,
    rate_limit_remaining: Option<&str>,
    body: &str,
) -> ProviderFailure {
    let message = error_message(body);
    match status {
        StatusCode::UNAUTHORIZED => ProviderFailure::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => ProviderFailure::QuotaExceeded,
        StatusCode::FORBIDDEN
            if rate_limit_remaining == Some("0")
                || message.to_ascii_lowercase().contains("rate limit") =>
        {
            ProviderFailure::QuotaExceeded
        }
        StatusCode::FORBIDDEN => ProviderFailure::Unauthorized,
        StatusCode::NOT_FOUND => ProviderFailure::NotFound,
        _ => ProviderFailure::Api {
            status: status.as_u16(),
            message,
        },
    }
}

fn error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.message,
        Err(_) => body.chars().take(200).collect(),
    }
}

/// On repository creation a 422 means the name is taken.
fn creation_failure(cause: ProviderFailure) -> ProviderFailure {
    match cause {
        ProviderFailure::Api { status: 422, .. } => ProviderFailure::NameConflict,
        other => other,
    }
}

#[async_trait]
impl RemoteProvisioner for GitHubClient {
    async fn create_repository(&self, name: &RepoName) -> ProvisionResult<RepoHandle> {
        let failed = |cause| ProvisionError::Provision {
            repo: name.to_string(),
            cause,
        };

        info!(repo = %name, "Creating repository");
        let body = CreateRepository {
            name: name.as_str(),
            description: REPO_DESCRIPTION,
            private: true,
            auto_init: false,
        };
        let response = self
            .send(self.request(Method::POST, self.endpoint(["user", "repos"])).json(&body))
            .await
            .map_err(|cause| failed(creation_failure(cause)))?;
        let created: Repository = response
            .json()
            .await
            .map_err(|e| failed(ProviderFailure::Encoding(e.to_string())))?;

        if created.owner.login != self.config.owner {
            warn!(
                repo = %created.name,
                owner = %created.owner.login,
                configured = %self.config.owner,
                "Repository created under a different owner than configured"
            );
        }

        Ok(RepoHandle {
            name: created.name,
            owner: created.owner.login,
            html_url: created.html_url,
        })
    }

    fn repo_handle(&self, name: &RepoName) -> RepoHandle {
        RepoHandle {
            name: name.as_str().to_string(),
            owner: self.config.owner.clone(),
            html_url: None,
        }
    }

    async fn commit_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> ProvisionResult<()> {
        debug!(repo = %repo.full_name(), path = %path, bytes = content.len(), "Committing file");
        let body = PutContents {
            message,
            content: STANDARD.encode(content),
            branch: DEFAULT_BRANCH,
        };
        self.send(
            self.request(Method::PUT, self.contents_endpoint(repo, path))
                .json(&body),
        )
        .await
        .map_err(|cause| ProvisionError::Commit {
            repo: repo.name.clone(),
            path: path.to_string(),
            cause,
        })?;
        Ok(())
    }

    async fn delete_repository(&self, repo: &RepoHandle) -> ProvisionResult<()> {
        let url = self.endpoint(["repos", repo.owner.as_str(), repo.name.as_str()]);
        match self.send(self.request(Method::DELETE, url)).await {
            Ok(_) => {
                info!(repo = %repo.full_name(), "Deleted repository");
                Ok(())
            }
            Err(ProviderFailure::NotFound) => {
                debug!(repo = %repo.full_name(), "Repository already gone");
                Ok(())
            }
            Err(cause) => Err(ProvisionError::Teardown {
                repo: repo.name.clone(),
                cause,
            }),
        }
    }
}

#[async_trait]
impl PipelineRunProbe for GitHubClient {
    async fn latest_run(&self, repo: &RepoHandle) -> ProvisionResult<Option<PipelineRun>> {
        let failed = |cause| ProvisionError::Probe {
            repo: repo.name.clone(),
            cause,
        };

        let mut url = self.endpoint([
            "repos",
            repo.owner.as_str(),
            repo.name.as_str(),
            "actions",
            "runs",
        ]);
        url.query_pairs_mut()
            .append_pair("branch", DEFAULT_BRANCH)
            .append_pair("per_page", "1");

        let response = match self.send(self.request(Method::GET, url)).await {
            Ok(response) => response,
            // Actions may not be set up yet right after the first push
            Err(ProviderFailure::NotFound) => return Ok(None),
            Err(cause) => return Err(failed(cause)),
        };
        let runs: WorkflowRuns = response
            .json()
            .await
            .map_err(|e| failed(ProviderFailure::Encoding(e.to_string())))?;
        Ok(runs.workflow_runs.into_iter().next().map(PipelineRun::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codecheck_core::CheckId;

    fn client(base: &str) -> GitHubClient {
        GitHubClient::new(GitHubConfig::new("token", "bot").with_api_base_url(base)).unwrap()
    }

    fn handle() -> RepoHandle {
        RepoHandle {
            name: "code-check-abc".into(),
            owner: "bot".into(),
            html_url: None,
        }
    }

    #[test]
    fn test_new_rejects_bad_base_url() {
        let err = GitHubClient::new(GitHubConfig::new("t", "bot").with_api_base_url("not a url"));
        assert!(matches!(err, Err(GitHubError::InvalidBaseUrl { .. })));

        let err = GitHubClient::new(GitHubConfig::new("t", "bot").with_api_base_url("mailto:x@y"));
        assert!(matches!(err, Err(GitHubError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_new_rejects_blank_token() {
        let err = GitHubClient::new(GitHubConfig::new("", "bot"));
        assert!(matches!(err, Err(GitHubError::MissingSetting("GITHUB_TOKEN"))));
    }

    #[test]
    fn test_repo_handle_uses_configured_owner() {
        let c = client("https://api.github.com");
        let name = RepoName::for_check(&CheckId::from_external("abc"));
        assert_eq!(c.repo_handle(&name), handle());
    }

    #[test]
    fn test_endpoint_public_api() {
        let c = client("https://api.github.com");
        assert_eq!(
            c.endpoint(["user", "repos"]).as_str(),
            "https://api.github.com/user/repos"
        );
    }

    #[test]
    fn test_endpoint_keeps_enterprise_prefix() {
        let c = client("https://ghe.example/api/v3/");
        assert_eq!(
            c.endpoint(["repos", "bot", "r"]).as_str(),
            "https://ghe.example/api/v3/repos/bot/r"
        );
    }

    #[test]
    fn test_contents_endpoint_nested_path() {
        let c = client("https://api.github.com");
        assert_eq!(
            c.contents_endpoint(&handle(), ".github/workflows/code-check.yml")
                .as_str(),
            "https://api.github.com/repos/bot/code-check-abc/contents/.github/workflows/code-check.yml"
        );
    }

    #[test]
    fn test_classify_statuses() {
        assert_eq!(
            classify(StatusCode::UNAUTHORIZED, None, ""),
            ProviderFailure::Unauthorized
        );
        assert_eq!(
            classify(StatusCode::FORBIDDEN, Some("0"), "{}"),
            ProviderFailure::QuotaExceeded
        );
        assert_eq!(
            classify(
                StatusCode::FORBIDDEN,
                Some("12"),
                r#"{"message": "You have exceeded a secondary rate limit"}"#
            ),
            ProviderFailure::QuotaExceeded
        );
        assert_eq!(
            classify(
                StatusCode::FORBIDDEN,
                Some("4999"),
                r#"{"message": "Resource not accessible"}"#
            ),
            ProviderFailure::Unauthorized
        );
        assert_eq!(
            classify(StatusCode::TOO_MANY_REQUESTS, None, ""),
            ProviderFailure::QuotaExceeded
        );
        assert_eq!(classify(StatusCode::NOT_FOUND, None, ""), ProviderFailure::NotFound);
        assert_eq!(
            classify(
                StatusCode::BAD_GATEWAY,
                None,
                r#"{"message": "Server Error"}"#
            ),
            ProviderFailure::Api {
                status: 502,
                message: "Server Error".into()
            }
        );
    }

    #[test]
    fn test_classify_non_json_body() {
        let body = "x".repeat(500);
        match classify(StatusCode::INTERNAL_SERVER_ERROR, None, &body) {
            ProviderFailure::Api { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message.len(), 200);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_creation_conflict() {
        let cause = ProviderFailure::Api {
            status: 422,
            message: "Repository creation failed.".into(),
        };
        assert_eq!(creation_failure(cause), ProviderFailure::NameConflict);
        assert_eq!(
            creation_failure(ProviderFailure::Unauthorized),
            ProviderFailure::Unauthorized
        );
    }
}
