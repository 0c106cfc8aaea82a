//! Check orchestration: the path from an accepted upload to a terminal
//! check record.
//!
//! `submit` runs up to the point where completion is armed:
//!
//! 1. create the `processing` record
//! 2. wait for a provisioning slot
//! 3. create the repository, commit the source, install the pipeline
//! 4. spawn the completion task and return the check id
//!
//! Steps 2 to 4 run on their own task, so a caller that stops waiting does
//! not stop them. The completion task resolves the check through a
//! [`CompletionSource`], finalizes the record, deletes the repository and
//! releases the staged upload. A provisioning failure finalizes the record
//! as `failed` and cleans up whatever may have been created before
//! returning the error.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn, Instrument};

use crate::completion::{CompletionReport, CompletionRequest, CompletionSource};
use crate::domain::{CheckId, CheckOutcome, LogEntry, LogLevel, RegistryError};
use crate::ingest::StagedFile;
use crate::obs;
use crate::pipeline::PIPELINE_PATH;
use crate::provision::{
    source_commit_message, ProviderFailure, ProvisionError, RemoteProvisioner, RepoHandle,
    RepoName,
};
use crate::registry::CheckRegistry;
use crate::retry::{with_retry, RetryPolicy};

/// Default cap on concurrent provisioning sequences.
pub const DEFAULT_MAX_INFLIGHT_PROVISIONS: usize = 8;

/// Where a client polls for the status of a check.
pub fn status_url(check_id: &CheckId) -> String {
    format!("/api/check/{check_id}")
}

/// Tuning for an [`Orchestrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Timeout and retry budget applied to every provider call.
    pub retry: RetryPolicy,
    /// Submissions beyond this many wait before provisioning starts.
    pub max_inflight_provisions: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            max_inflight_provisions: DEFAULT_MAX_INFLIGHT_PROVISIONS,
        }
    }
}

/// Stages reported through `check.stage` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStage {
    Received,
    Provisioning,
    Scheduled,
    Completed,
    Failed,
}

impl SubmissionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionStage::Received => "received",
            SubmissionStage::Provisioning => "provisioning",
            SubmissionStage::Scheduled => "scheduled",
            SubmissionStage::Completed => "completed",
            SubmissionStage::Failed => "failed",
        }
    }
}

/// Returned to the client once completion is armed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub check_id: CheckId,
    pub file_name: String,
    pub status_url: String,
}

impl Submission {
    fn new(check_id: CheckId, file_name: &str) -> Self {
        Self {
            status_url: status_url(&check_id),
            check_id,
            file_name: file_name.to_string(),
        }
    }
}

/// Why a submission did not reach the scheduled stage. The record named by
/// `check_id` is already `failed` when this is returned.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("provisioning failed for check {check_id}: {source}")]
    Provisioning {
        check_id: CheckId,
        #[source]
        source: ProvisionError,
    },

    #[error("staged upload for check {check_id} is unreadable: {source}")]
    Staging {
        check_id: CheckId,
        #[source]
        source: std::io::Error,
    },

    #[error("orchestrator is shut down, check {check_id} was not provisioned")]
    Closed { check_id: CheckId },

    #[error("submission task for check {check_id} did not finish: {reason}")]
    Interrupted { check_id: CheckId, reason: String },
}

impl OrchestratorError {
    pub fn check_id(&self) -> &CheckId {
        match self {
            OrchestratorError::Provisioning { check_id, .. }
            | OrchestratorError::Staging { check_id, .. }
            | OrchestratorError::Closed { check_id }
            | OrchestratorError::Interrupted { check_id, .. } => check_id,
        }
    }

    /// Summary stored on the failed record.
    pub fn summary(&self) -> String {
        match self {
            OrchestratorError::Provisioning { source, .. } => {
                format!("Provisioning failed: {source}")
            }
            OrchestratorError::Staging { source, .. } => {
                format!("Uploaded file could not be read: {source}")
            }
            OrchestratorError::Closed { .. } => "Service is shutting down".to_string(),
            OrchestratorError::Interrupted { .. } => "Submission was interrupted".to_string(),
        }
    }
}

/// Point-in-time load of an [`Orchestrator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorStats {
    /// Checks whose provisioning or completion task is still running.
    pub inflight_checks: usize,
    /// Provisioning slots free right now.
    pub available_provision_slots: usize,
}

/// Provisioning stopped part way; `repo` is set if one may exist.
struct Aborted {
    repo: Option<RepoHandle>,
    error: OrchestratorError,
}

/// Counts live check tasks and wakes `wait_idle` callers at zero.
#[derive(Debug, Default)]
struct TaskTracker {
    live: AtomicUsize,
    idle: Notify,
}

struct TrackerGuard(Arc<TaskTracker>);

impl TaskTracker {
    fn enter(self: &Arc<Self>) -> TrackerGuard {
        self.live.fetch_add(1, Ordering::SeqCst);
        TrackerGuard(Arc::clone(self))
    }
}

impl Drop for TrackerGuard {
    fn drop(&mut self) {
        if self.0.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

/// Drives checks from submission to a terminal record.
pub struct Orchestrator {
    shared: Arc<Shared>,
}

/// Everything the detached submission and completion tasks need.
struct Shared {
    registry: Arc<dyn CheckRegistry>,
    provisioner: Arc<dyn RemoteProvisioner>,
    completion: Arc<dyn CompletionSource>,
    config: OrchestratorConfig,
    admission: Semaphore,
    tracker: Arc<TaskTracker>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<dyn CheckRegistry>,
        provisioner: Arc<dyn RemoteProvisioner>,
        completion: Arc<dyn CompletionSource>,
        config: OrchestratorConfig,
    ) -> Self {
        let permits = config.max_inflight_provisions.max(1);
        Self {
            shared: Arc::new(Shared {
                registry,
                provisioner,
                completion,
                admission: Semaphore::new(permits),
                tracker: Arc::new(TaskTracker::default()),
                config,
            }),
        }
    }

    pub fn registry(&self) -> &Arc<dyn CheckRegistry> {
        &self.shared.registry
    }

    pub fn stats(&self) -> OrchestratorStats {
        OrchestratorStats {
            inflight_checks: self.inflight_checks(),
            available_provision_slots: self.shared.admission.available_permits(),
        }
    }

    /// Checks whose provisioning or completion task is still running.
    pub fn inflight_checks(&self) -> usize {
        self.shared.tracker.live.load(Ordering::SeqCst)
    }

    /// Wait until every submission and completion task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.tracker.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.inflight_checks() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop admitting new provisioning work. Submissions waiting for a slot
    /// fail with [`OrchestratorError::Closed`]; armed checks still complete.
    pub fn close(&self) {
        self.shared.admission.close();
    }

    /// Submit a validated, staged upload.
    ///
    /// On success the record is `processing` and completion is armed. On
    /// error the record is already `failed` and nothing remote is left
    /// behind, except when teardown itself fails (logged). Dropping the
    /// returned future does not abandon the check: provisioning carries on
    /// and the record still reaches a terminal status.
    pub async fn submit(&self, staged: StagedFile) -> Result<Submission, OrchestratorError> {
        let shared = &self.shared;
        let check_id = shared.registry.create(staged.file_name()).await;
        obs::emit_check_created(&check_id, staged.file_name(), staged.size(), staged.digest());

        let span = obs::check_span(&check_id);
        let guard = shared.tracker.enter();
        let task = tokio::spawn({
            let shared = Arc::clone(shared);
            let check_id = check_id.clone();
            async move {
                let submitted = shared.run_submission(check_id, staged).await;
                drop(guard);
                submitted
            }
            .instrument(span)
        });

        match task.await {
            Ok(submitted) => submitted,
            Err(join_error) => {
                let error = OrchestratorError::Interrupted {
                    check_id: check_id.clone(),
                    reason: join_error.to_string(),
                };
                let logs = vec![LogEntry::new(LogLevel::Error, error.to_string())];
                let outcome = CheckOutcome::failed(error.summary());
                record_outcome(shared.registry.as_ref(), &check_id, logs, outcome).await;
                Err(error)
            }
        }
    }
}

impl Shared {
    async fn run_submission(
        self: &Arc<Self>,
        check_id: CheckId,
        staged: StagedFile,
    ) -> Result<Submission, OrchestratorError> {
        obs::emit_stage(&check_id, SubmissionStage::Received.as_str());

        let provisioned = match self.admission.acquire().await {
            Ok(_permit) => {
                obs::emit_stage(&check_id, SubmissionStage::Provisioning.as_str());
                self.provision(&check_id, &staged).await
            }
            Err(_closed) => Err(Aborted {
                repo: None,
                error: OrchestratorError::Closed {
                    check_id: check_id.clone(),
                },
            }),
        };

        match provisioned {
            Ok(repo) => {
                let submission = Submission::new(check_id.clone(), staged.file_name());
                self.schedule(check_id, repo, staged);
                Ok(submission)
            }
            Err(aborted) => Err(self.abort(check_id, staged, aborted).await),
        }
    }

    async fn provision(
        &self,
        check_id: &CheckId,
        staged: &StagedFile,
    ) -> Result<RepoHandle, Aborted> {
        let policy = &self.config.retry;
        let name = RepoName::for_check(check_id);
        let file_name = staged.file_name();
        let provisioning_failed = |repo: Option<RepoHandle>| {
            move |source: ProvisionError| Aborted {
                repo,
                error: OrchestratorError::Provisioning {
                    check_id: check_id.clone(),
                    source,
                },
            }
        };

        let started = Instant::now();
        let created = with_retry(
            policy,
            "create_repository",
            || self.provisioner.create_repository(&name),
            |cause| ProvisionError::Provision {
                repo: name.to_string(),
                cause,
            },
        )
        .await;
        let repo = match created {
            Ok(repo) => repo,
            // The name embeds the check id, so it can only be taken by an
            // earlier attempt of this check that timed out after creating.
            Err(err) if err.cause() == &ProviderFailure::NameConflict => {
                let repo = self.provisioner.repo_handle(&name);
                warn!(repo = %repo.full_name(), "Adopting repository from an earlier attempt");
                repo
            }
            Err(err) => {
                let maybe_created = err
                    .cause()
                    .may_have_applied()
                    .then(|| self.provisioner.repo_handle(&name));
                return Err(provisioning_failed(maybe_created)(err));
            }
        };
        obs::emit_provision_step(&repo.name, "create_repository", elapsed_ms(started));

        let content = staged.read().await.map_err(|source| Aborted {
            repo: Some(repo.clone()),
            error: OrchestratorError::Staging {
                check_id: check_id.clone(),
                source,
            },
        })?;

        let started = Instant::now();
        let message = source_commit_message(file_name);
        with_retry(
            policy,
            "commit_source",
            || self.provisioner.commit_file(&repo, file_name, &content, &message),
            |cause| ProvisionError::Commit {
                repo: repo.name.clone(),
                path: file_name.to_string(),
                cause,
            },
        )
        .await
        .map_err(provisioning_failed(Some(repo.clone())))?;
        obs::emit_provision_step(&repo.name, "commit_source", elapsed_ms(started));

        let started = Instant::now();
        with_retry(
            policy,
            "install_pipeline",
            || self.provisioner.install_pipeline_definition(&repo, file_name),
            |cause| ProvisionError::Commit {
                repo: repo.name.clone(),
                path: PIPELINE_PATH.to_string(),
                cause,
            },
        )
        .await
        .map_err(provisioning_failed(Some(repo.clone())))?;
        obs::emit_provision_step(&repo.name, "install_pipeline", elapsed_ms(started));

        Ok(repo)
    }

    fn schedule(self: &Arc<Self>, check_id: CheckId, repo: RepoHandle, staged: StagedFile) {
        obs::emit_check_scheduled(&check_id, &repo.name, self.completion.name());
        obs::emit_stage(&check_id, SubmissionStage::Scheduled.as_str());

        let shared = Arc::clone(self);
        let guard = self.tracker.enter();
        let span = obs::check_span(&check_id);

        tokio::spawn(
            async move {
                let _guard = guard;
                let request = CompletionRequest {
                    check_id,
                    file_name: staged.file_name().to_string(),
                    repo,
                };
                let report = shared.completion.resolve(&request).await;
                complete_check(
                    shared.registry.as_ref(),
                    shared.provisioner.as_ref(),
                    &shared.config.retry,
                    request,
                    report,
                    staged,
                )
                .await;
            }
            .instrument(span),
        );
    }

    async fn abort(
        &self,
        check_id: CheckId,
        staged: StagedFile,
        aborted: Aborted,
    ) -> OrchestratorError {
        let Aborted { repo, error } = aborted;
        obs::emit_stage(&check_id, SubmissionStage::Failed.as_str());

        let outcome = CheckOutcome::failed(error.summary());
        let logs = vec![LogEntry::new(LogLevel::Error, error.to_string())];
        record_outcome(self.registry.as_ref(), &check_id, logs, outcome).await;

        if let Some(repo) = repo {
            teardown(self.provisioner.as_ref(), &self.config.retry, &check_id, &repo).await;
        }
        release_staged(&check_id, staged);
        error
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Finalize a resolved check, then clean up its repository and upload.
async fn complete_check(
    registry: &dyn CheckRegistry,
    provisioner: &dyn RemoteProvisioner,
    policy: &RetryPolicy,
    request: CompletionRequest,
    report: CompletionReport,
    staged: StagedFile,
) {
    let CompletionRequest { check_id, repo, .. } = request;
    let stage = match report.outcome {
        CheckOutcome::Completed(_) => SubmissionStage::Completed,
        CheckOutcome::Failed(_) => SubmissionStage::Failed,
    };
    obs::emit_stage(&check_id, stage.as_str());

    record_outcome(registry, &check_id, report.logs, report.outcome).await;
    teardown(provisioner, policy, &check_id, &repo).await;
    release_staged(&check_id, staged);
}

/// Append logs and write the terminal outcome. A record that is no longer
/// retained is skipped.
async fn record_outcome(
    registry: &dyn CheckRegistry,
    check_id: &CheckId,
    logs: Vec<LogEntry>,
    outcome: CheckOutcome,
) {
    if !logs.is_empty() {
        if let Err(err) = registry.append_logs(check_id, logs).await {
            debug!(check_id = %check_id, error = %err, "could not attach check logs");
        }
    }

    match registry.finalize(check_id, outcome).await {
        Ok(check) => {
            let passed = check.result.as_ref().is_some_and(|r| r.passed);
            obs::emit_check_finalized(check_id, check.status, passed);
        }
        Err(RegistryError::NotFound { .. }) => {
            debug!(check_id = %check_id, "check record gone before finalization");
        }
        Err(err) => {
            warn!(check_id = %check_id, error = %err, "failed to finalize check");
        }
    }
}

async fn teardown(
    provisioner: &dyn RemoteProvisioner,
    policy: &RetryPolicy,
    check_id: &CheckId,
    repo: &RepoHandle,
) {
    let result = with_retry(
        policy,
        "delete_repository",
        || provisioner.delete_repository(repo),
        |cause| ProvisionError::Teardown {
            repo: repo.name.clone(),
            cause,
        },
    )
    .await;
    if let Err(err) = result {
        obs::emit_teardown_failed(check_id, &err);
    }
}

fn release_staged(check_id: &CheckId, staged: StagedFile) {
    if let Err(err) = staged.release() {
        obs::emit_staging_release_failed(check_id, &err);
    }
}
