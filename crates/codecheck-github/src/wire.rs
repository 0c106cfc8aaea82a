//! Request and response bodies of the GitHub REST endpoints in use.

use codecheck_core::{PipelineRun, RunState};
use serde::{Deserialize, Serialize};

/// `POST /user/repos`
#[derive(Debug, Serialize)]
pub(crate) struct CreateRepository<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub private: bool,
    pub auto_init: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Owner {
    pub login: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Repository {
    pub name: String,
    pub owner: Owner,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// `PUT /repos/{owner}/{repo}/contents/{path}`
#[derive(Debug, Serialize)]
pub(crate) struct PutContents<'a> {
    pub message: &'a str,
    /// Base64 of the file bytes
    pub content: String,
    pub branch: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowRuns {
    #[serde(default)]
    pub workflow_runs: Vec<WorkflowRun>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkflowRun {
    pub id: u64,
    pub status: Option<String>,
    pub conclusion: Option<String>,
    pub html_url: Option<String>,
}

impl From<WorkflowRun> for PipelineRun {
    fn from(run: WorkflowRun) -> Self {
        // queued, requested, waiting and pending all mean not started yet
        let state = match run.status.as_deref() {
            Some("completed") => RunState::Completed,
            Some("in_progress") => RunState::InProgress,
            _ => RunState::Queued,
        };
        PipelineRun {
            id: run.id,
            state,
            conclusion: run.conclusion,
            html_url: run.html_url,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}
