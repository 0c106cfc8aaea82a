//! Codecheck Core Library
//!
//! Lifecycle of a code check: the registry of check records, the remote
//! provisioning contract, the completion sources and the orchestrator that
//! ties them together.

pub mod completion;
pub mod domain;
pub mod ingest;
pub mod obs;
pub mod orchestrator;
pub mod pipeline;
pub mod provision;
pub mod registry;
pub mod retry;
pub mod telemetry;

pub use completion::{
    CompletionReport, CompletionRequest, CompletionSource, PipelineCompletion, PipelinePolling,
    SimulatedCompletion, DEFAULT_COMPLETION_DELAY,
};

pub use domain::{
    CategoryStatus, CategoryStatuses, Check, CheckId, CheckOutcome, CheckResult, CheckStatus,
    LogEntry, LogLevel, RegistryError, RegistryResult, ValidationError,
};

pub use ingest::{StagedFile, Stager, UploadPolicy, DEFAULT_MAX_UPLOAD_BYTES};

pub use orchestrator::{
    status_url, Orchestrator, OrchestratorConfig, OrchestratorError, OrchestratorStats,
    Submission, SubmissionStage, DEFAULT_MAX_INFLIGHT_PROVISIONS,
};

pub use pipeline::{PipelineDefinition, SyntaxCheck, PIPELINE_PATH};

pub use provision::{
    PipelineRun, PipelineRunProbe, ProviderFailure, ProvisionError, ProvisionResult,
    RemoteProvisioner, RepoHandle, RepoName, RunState,
};

pub use registry::{CheckRegistry, MemoryCheckRegistry};

pub use retry::{with_retry, RetryPolicy};
