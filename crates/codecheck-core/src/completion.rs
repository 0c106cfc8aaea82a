//! Completion sources: what decides that a scheduled check is done.
//!
//! - [`SimulatedCompletion`] waits a fixed delay and reports a synthetic
//!   pass. It never looks at the CI platform.
//! - [`PipelineCompletion`] polls the CI platform for the run started by
//!   the installed pipeline and reports its conclusion.
//!
//! Both always produce a terminal outcome, so a scheduled check can never
//! be left in `processing`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{
    CategoryStatus, CategoryStatuses, CheckId, CheckOutcome, CheckResult, LogEntry,
};
use crate::provision::{PipelineRun, PipelineRunProbe, RepoHandle, RunState};

/// Fixed delay used by the simulated source unless configured otherwise.
pub const DEFAULT_COMPLETION_DELAY: Duration = Duration::from_secs(8);

/// What a completion source is asked to resolve.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub check_id: CheckId,
    pub file_name: String,
    pub repo: RepoHandle,
}

/// Terminal outcome plus diagnostics gathered while waiting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub outcome: CheckOutcome,
    pub logs: Vec<LogEntry>,
}

impl CompletionReport {
    pub fn new(outcome: CheckOutcome) -> Self {
        Self {
            outcome,
            logs: Vec::new(),
        }
    }
}

/// Decides when and how a scheduled check finishes.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Wait for the check to finish and return its outcome. Must always
    /// return; a source that cannot observe a result reports a failure.
    async fn resolve(&self, request: &CompletionRequest) -> CompletionReport;
}

/// Fixed-delay source reporting the synthetic pass result.
#[derive(Debug, Clone)]
pub struct SimulatedCompletion {
    delay: Duration,
}

impl Default for SimulatedCompletion {
    fn default() -> Self {
        Self::new(DEFAULT_COMPLETION_DELAY)
    }
}

impl SimulatedCompletion {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl CompletionSource for SimulatedCompletion {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn resolve(&self, _request: &CompletionRequest) -> CompletionReport {
        tokio::time::sleep(self.delay).await;
        CompletionReport::new(CheckOutcome::Completed(CheckResult::synthetic_pass()))
    }
}

/// Polling settings for [`PipelineCompletion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePolling {
    pub interval: Duration,
    pub deadline: Duration,
    /// Consecutive probe errors tolerated before giving up.
    pub max_probe_errors: u32,
}

impl Default for PipelinePolling {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            deadline: Duration::from_secs(15 * 60),
            max_probe_errors: 5,
        }
    }
}

/// Source driven by the real pipeline run on the CI platform.
pub struct PipelineCompletion {
    probe: Arc<dyn PipelineRunProbe>,
    polling: PipelinePolling,
}

impl PipelineCompletion {
    pub fn new(probe: Arc<dyn PipelineRunProbe>, polling: PipelinePolling) -> Self {
        Self { probe, polling }
    }
}

fn outcome_for_run(run: &PipelineRun) -> CheckOutcome {
    if run.succeeded() {
        return CheckOutcome::Completed(CheckResult::synthetic_pass());
    }
    let conclusion = run.conclusion.as_deref().unwrap_or("unknown");
    let mut recommendations = Vec::new();
    if let Some(url) = &run.html_url {
        recommendations.push(format!("Inspect the pipeline run at {url}"));
    }
    CheckOutcome::Completed(CheckResult {
        passed: false,
        summary: format!("Pipeline concluded with {conclusion}"),
        details: CategoryStatuses::uniform(CategoryStatus::Unknown),
        recommendations,
    })
}

#[async_trait]
impl CompletionSource for PipelineCompletion {
    fn name(&self) -> &'static str {
        "pipeline"
    }

    async fn resolve(&self, request: &CompletionRequest) -> CompletionReport {
        let started = Instant::now();
        let mut logs = Vec::new();
        let mut probe_errors = 0u32;
        let mut last_state: Option<RunState> = None;

        loop {
            tokio::time::sleep(self.polling.interval).await;

            match self.probe.latest_run(&request.repo).await {
                Ok(Some(run)) => {
                    probe_errors = 0;
                    if last_state != Some(run.state) {
                        logs.push(LogEntry::info(format!(
                            "pipeline run {} is {:?}",
                            run.id, run.state
                        )));
                        last_state = Some(run.state);
                    }
                    if run.is_finished() {
                        return CompletionReport {
                            outcome: outcome_for_run(&run),
                            logs,
                        };
                    }
                }
                Ok(None) => probe_errors = 0,
                Err(err) => {
                    probe_errors += 1;
                    logs.push(LogEntry::warn(err.to_string()));
                    if probe_errors >= self.polling.max_probe_errors {
                        return CompletionReport {
                            outcome: CheckOutcome::failed(format!(
                                "Could not read pipeline status: {err}"
                            )),
                            logs,
                        };
                    }
                }
            }

            if started.elapsed() >= self.polling.deadline {
                return CompletionReport {
                    outcome: CheckOutcome::failed(format!(
                        "Pipeline did not finish within {}s",
                        self.polling.deadline.as_secs()
                    )),
                    logs,
                };
            }
        }
    }
}
