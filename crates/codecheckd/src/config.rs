//! Daemon configuration.
//!
//! Every flag can also be supplied through its environment variable.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use codecheck_core::{
    OrchestratorConfig, PipelinePolling, RetryPolicy, Stager, UploadPolicy,
    DEFAULT_MAX_INFLIGHT_PROVISIONS, DEFAULT_MAX_UPLOAD_BYTES,
};
use codecheck_github::{GitHubConfig, DEFAULT_API_URL};

/// How a scheduled check decides it is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CompletionMode {
    /// Fixed delay, synthetic pass result
    Simulated,
    /// Follow the workflow run on the CI platform
    Pipeline,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "codecheckd")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(
    about = "Codecheck daemon: accepts source files and tracks their CI checks",
    long_about = None
)]
pub struct Config {
    /// Listening port
    #[arg(long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    /// Listening address
    #[arg(long, env = "CODECHECK_BIND_ADDR", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind_addr: IpAddr,

    /// Token used to create and delete check repositories
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// Account that owns the check repositories
    #[arg(long, env = "GITHUB_USERNAME")]
    pub github_owner: Option<String>,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_API_URL)]
    pub github_api_url: String,

    #[arg(
        long,
        env = "CODECHECK_COMPLETION_MODE",
        value_enum,
        default_value_t = CompletionMode::Simulated
    )]
    pub completion_mode: CompletionMode,

    /// Delay of the simulated completion source
    #[arg(long, env = "CODECHECK_COMPLETION_DELAY_SECS", default_value_t = 8)]
    pub completion_delay_secs: u64,

    #[arg(long, env = "CODECHECK_PIPELINE_POLL_INTERVAL_SECS", default_value_t = 10)]
    pub pipeline_poll_interval_secs: u64,

    #[arg(long, env = "CODECHECK_PIPELINE_DEADLINE_SECS", default_value_t = 900)]
    pub pipeline_deadline_secs: u64,

    /// Where uploads are staged (default: OS temp dir)
    #[arg(long, env = "CODECHECK_STAGING_DIR")]
    pub staging_dir: Option<PathBuf>,

    #[arg(long, env = "CODECHECK_MAX_UPLOAD_BYTES", default_value_t = DEFAULT_MAX_UPLOAD_BYTES)]
    pub max_upload_bytes: u64,

    /// Records retained in the registry; oldest finished checks go first
    #[arg(long, env = "CODECHECK_REGISTRY_CAPACITY", default_value_t = 1000)]
    pub registry_capacity: usize,

    #[arg(
        long,
        env = "CODECHECK_MAX_INFLIGHT_PROVISIONS",
        default_value_t = DEFAULT_MAX_INFLIGHT_PROVISIONS
    )]
    pub max_inflight_provisions: usize,

    /// Per-attempt timeout of a provider call
    #[arg(long, env = "CODECHECK_PROVIDER_TIMEOUT_MS", default_value_t = 30_000)]
    pub provider_timeout_ms: u64,

    #[arg(long, env = "CODECHECK_PROVIDER_MAX_RETRIES", default_value_t = 2)]
    pub provider_max_retries: u32,

    #[arg(long, env = "CODECHECK_PROVIDER_BACKOFF_MS", default_value_t = 500)]
    pub provider_backoff_ms: u64,

    /// Emit JSON-formatted log lines
    #[arg(long, env = "CODECHECK_LOG_JSON")]
    pub log_json: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_upload_bytes == 0 {
            bail!("--max-upload-bytes must be positive");
        }
        if self.max_inflight_provisions == 0 {
            bail!("--max-inflight-provisions must be positive");
        }
        if self.registry_capacity == 0 {
            bail!("--registry-capacity must be positive");
        }
        if self.provider_timeout_ms == 0 {
            bail!("--provider-timeout-ms must be positive");
        }
        if self.completion_mode == CompletionMode::Pipeline
            && self.pipeline_poll_interval_secs == 0
        {
            bail!("--pipeline-poll-interval-secs must be positive");
        }
        Ok(())
    }

    pub fn github(&self) -> Result<GitHubConfig> {
        let Some(token) = self.github_token.as_deref().filter(|t| !t.trim().is_empty()) else {
            bail!("GITHUB_TOKEN is required");
        };
        let Some(owner) = self.github_owner.as_deref().filter(|o| !o.trim().is_empty()) else {
            bail!("GITHUB_USERNAME is required");
        };
        Ok(GitHubConfig::new(token, owner).with_api_base_url(self.github_api_url.clone()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            timeout_ms: self.provider_timeout_ms,
            max_retries: self.provider_max_retries,
            backoff_base_ms: self.provider_backoff_ms,
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            retry: self.retry_policy(),
            max_inflight_provisions: self.max_inflight_provisions,
        }
    }

    pub fn upload_policy(&self) -> UploadPolicy {
        UploadPolicy::default().with_max_bytes(self.max_upload_bytes)
    }

    pub fn stager(&self) -> Stager {
        match &self.staging_dir {
            Some(dir) => Stager::new(dir),
            None => Stager::default(),
        }
    }

    pub fn completion_delay(&self) -> Duration {
        Duration::from_secs(self.completion_delay_secs)
    }

    pub fn pipeline_polling(&self) -> PipelinePolling {
        PipelinePolling {
            interval: Duration::from_secs(self.pipeline_poll_interval_secs),
            deadline: Duration::from_secs(self.pipeline_deadline_secs),
            ..PipelinePolling::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        let mut argv = vec!["codecheckd"];
        argv.extend_from_slice(args);
        Config::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&["--github-token", "t", "--github-owner", "bot"]);
        assert_eq!(config.completion_mode, CompletionMode::Simulated);
        assert_eq!(config.completion_delay(), Duration::from_secs(8));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.orchestrator().max_inflight_provisions, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides() {
        let config = parse(&[
            "--port",
            "8080",
            "--completion-mode",
            "pipeline",
            "--pipeline-poll-interval-secs",
            "3",
            "--provider-max-retries",
            "0",
        ]);
        assert_eq!(config.socket_addr().port(), 8080);
        assert_eq!(config.completion_mode, CompletionMode::Pipeline);
        assert_eq!(config.pipeline_polling().interval, Duration::from_secs(3));
        assert_eq!(config.retry_policy().max_retries, 0);
    }

    #[test]
    fn test_github_requires_credentials() {
        let config = parse(&["--github-token", "t", "--github-owner", ""]);
        let err = config.github().unwrap_err();
        assert!(err.to_string().contains("GITHUB_USERNAME"));

        let config = parse(&["--github-token", "t", "--github-owner", "bot"]);
        let github = config.github().unwrap();
        assert_eq!(github.owner, "bot");
        assert_eq!(github.api_base_url, DEFAULT_API_URL);
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let config = parse(&["--max-inflight-provisions", "0"]);
        assert!(config.validate().is_err());
        let config = parse(&["--registry-capacity", "0"]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_completion_mode_rejected() {
        assert!(Config::try_parse_from(["codecheckd", "--completion-mode", "magic"]).is_err());
    }
}
