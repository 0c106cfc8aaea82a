//! In-memory fakes for the provisioning traits (testing only)
//!
//! `MemoryProvisioner` keeps repositories in a map and can be scripted to
//! fail specific operations; `ScriptedRunProbe` replays a fixed sequence of
//! pipeline run observations.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::*;

/// Provisioner operation, used to target scripted failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateRepository,
    CommitFile,
    DeleteRepository,
}

/// A recorded provisioner call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProvisionCall {
    Create { repo: String },
    Commit { repo: String, path: String, message: String },
    Delete { repo: String },
}

#[derive(Debug, Default)]
struct State {
    repos: HashMap<String, BTreeMap<String, Vec<u8>>>,
    deleted: Vec<String>,
    calls: Vec<ProvisionCall>,
    failures: HashMap<Operation, VecDeque<ProviderFailure>>,
    stalls: HashMap<Operation, VecDeque<Duration>>,
}

/// In-memory provisioner backed by a `HashMap<repo, files>`.
#[derive(Debug)]
pub struct MemoryProvisioner {
    owner: String,
    latency: Duration,
    state: Mutex<State>,
}

impl Default for MemoryProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvisioner {
    pub fn new() -> Self {
        Self {
            owner: "codecheck-bot".to_string(),
            latency: Duration::ZERO,
            state: Mutex::new(State::default()),
        }
    }

    /// Every call sleeps for `latency` before taking effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make the next call of `op` fail with `failure`. Queued failures are
    /// consumed in order.
    pub fn fail_next(&self, op: Operation, failure: ProviderFailure) {
        let mut state = self.state.lock().unwrap();
        state.failures.entry(op).or_default().push_back(failure);
    }

    /// Make the next call of `op` take effect immediately but answer only
    /// after `delay`, like a provider whose response is slow.
    pub fn stall_next(&self, op: Operation, delay: Duration) {
        let mut state = self.state.lock().unwrap();
        state.stalls.entry(op).or_default().push_back(delay);
    }

    /// Names of repositories that currently exist.
    pub fn repositories(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        let mut names: Vec<String> = state.repos.keys().cloned().collect();
        names.sort();
        names
    }

    /// Files committed to a live repository.
    pub fn files(&self, repo: &str) -> Option<BTreeMap<String, Vec<u8>>> {
        let state = self.state.lock().unwrap();
        state.repos.get(repo).cloned()
    }

    /// Repositories deleted so far, in order.
    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Every call received, in order.
    pub fn calls(&self) -> Vec<ProvisionCall> {
        self.state.lock().unwrap().calls.clone()
    }

    fn take_failure(&self, op: Operation) -> Option<ProviderFailure> {
        let mut state = self.state.lock().unwrap();
        state.failures.get_mut(&op).and_then(VecDeque::pop_front)
    }

    async fn answer_late(&self, op: Operation) {
        let stall = {
            let mut state = self.state.lock().unwrap();
            state.stalls.get_mut(&op).and_then(VecDeque::pop_front)
        };
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }
    }

    async fn pause(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

#[async_trait]
impl RemoteProvisioner for MemoryProvisioner {
    async fn create_repository(&self, name: &RepoName) -> ProvisionResult<RepoHandle> {
        self.pause().await;
        let repo = name.as_str().to_string();
        self.state
            .lock()
            .unwrap()
            .calls
            .push(ProvisionCall::Create { repo: repo.clone() });

        if let Some(cause) = self.take_failure(Operation::CreateRepository) {
            return Err(ProvisionError::Provision { repo, cause });
        }

        {
            let mut state = self.state.lock().unwrap();
            if state.repos.contains_key(&repo) {
                return Err(ProvisionError::Provision {
                    repo,
                    cause: ProviderFailure::NameConflict,
                });
            }
            state.repos.insert(repo.clone(), BTreeMap::new());
        }
        self.answer_late(Operation::CreateRepository).await;
        Ok(self.repo_handle(name))
    }

    fn repo_handle(&self, name: &RepoName) -> RepoHandle {
        RepoHandle {
            name: name.as_str().to_string(),
            owner: self.owner.clone(),
            html_url: Some(format!("https://example.invalid/{}/{}", self.owner, name)),
        }
    }

    async fn commit_file(
        &self,
        repo: &RepoHandle,
        path: &str,
        content: &[u8],
        message: &str,
    ) -> ProvisionResult<()> {
        self.pause().await;
        self.state.lock().unwrap().calls.push(ProvisionCall::Commit {
            repo: repo.name.clone(),
            path: path.to_string(),
            message: message.to_string(),
        });

        if let Some(cause) = self.take_failure(Operation::CommitFile) {
            return Err(ProvisionError::Commit {
                repo: repo.name.clone(),
                path: path.to_string(),
                cause,
            });
        }

        let mut state = self.state.lock().unwrap();
        let files = state
            .repos
            .get_mut(&repo.name)
            .ok_or_else(|| ProvisionError::Commit {
                repo: repo.name.clone(),
                path: path.to_string(),
                cause: ProviderFailure::NotFound,
            })?;
        files.insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn delete_repository(&self, repo: &RepoHandle) -> ProvisionResult<()> {
        self.pause().await;
        self.state.lock().unwrap().calls.push(ProvisionCall::Delete {
            repo: repo.name.clone(),
        });

        if let Some(cause) = self.take_failure(Operation::DeleteRepository) {
            return Err(ProvisionError::Teardown {
                repo: repo.name.clone(),
                cause,
            });
        }

        let mut state = self.state.lock().unwrap();
        if state.repos.remove(&repo.name).is_none() {
            return Err(ProvisionError::Teardown {
                repo: repo.name.clone(),
                cause: ProviderFailure::NotFound,
            });
        }
        state.deleted.push(repo.name.clone());
        Ok(())
    }
}

/// Probe that replays scripted observations; the last one repeats forever.
#[derive(Debug, Default)]
pub struct ScriptedRunProbe {
    script: Mutex<VecDeque<ProvisionResult<Option<PipelineRun>>>>,
    polls: Mutex<u32>,
}

impl ScriptedRunProbe {
    pub fn new(script: Vec<ProvisionResult<Option<PipelineRun>>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            polls: Mutex::new(0),
        }
    }

    /// Number of `latest_run` calls served.
    pub fn polls(&self) -> u32 {
        *self.polls.lock().unwrap()
    }
}

#[async_trait]
impl PipelineRunProbe for ScriptedRunProbe {
    async fn latest_run(&self, _repo: &RepoHandle) -> ProvisionResult<Option<PipelineRun>> {
        *self.polls.lock().unwrap() += 1;
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap_or(Ok(None))
        } else {
            script.front().cloned().unwrap_or(Ok(None))
        }
    }
}
