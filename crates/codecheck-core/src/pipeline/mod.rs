//! Pipeline definition builder.
//!
//! - [`language`]   - `SyntaxCheck`, the extension-keyed tool table
//! - [`definition`] - `PipelineDefinition` and its typed steps

pub mod definition;
pub mod language;

pub use definition::{
    Job, PipelineDefinition, PushTrigger, Step, StepAction, Trigger, DEFAULT_BRANCH,
    FILE_ENV_VAR, PIPELINE_COMMIT_MESSAGE, PIPELINE_PATH, REPORT_ARTIFACT, REPORT_PATH,
};
pub use language::SyntaxCheck;
