//! Check record and its terminal outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier handed to clients when a file is submitted.
///
/// Rendered as 32 lower-case hex characters so it can be embedded in
/// repository names and URLs without escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckId(String);

impl CheckId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        CheckId(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Wrap an id received from a client. No validation is performed; an
    /// unknown id simply fails lookup.
    pub fn from_external(raw: impl Into<String>) -> Self {
        CheckId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CheckId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CheckId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a check. Moves from `Processing` to exactly one
/// terminal status and never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Processing,
    Completed,
    Failed,
}

impl CheckStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, CheckStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckStatus::Processing => "processing",
            CheckStatus::Completed => "completed",
            CheckStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verdict for a single analysis category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CategoryStatus {
    Ok,
    Warning,
    Failed,
    Unknown,
}

/// Per-category verdicts reported with every result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStatuses {
    pub syntax: CategoryStatus,
    pub security: CategoryStatus,
    pub structure: CategoryStatus,
    pub performance: CategoryStatus,
}

impl CategoryStatuses {
    /// Every category set to the same verdict.
    pub fn uniform(status: CategoryStatus) -> Self {
        Self {
            syntax: status,
            security: status,
            structure: status,
            performance: status,
        }
    }
}

/// Structured outcome attached to a check when it reaches a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Whether the submitted file passed every category.
    pub passed: bool,
    /// One-line human-readable summary.
    pub summary: String,
    /// Per-category verdicts.
    pub details: CategoryStatuses,
    /// Generic follow-up advice for the submitter.
    pub recommendations: Vec<String>,
}

impl CheckResult {
    /// The fixed result reported by the simulated completion source.
    pub fn synthetic_pass() -> Self {
        Self {
            passed: true,
            summary: "All checks passed".to_string(),
            details: CategoryStatuses::uniform(CategoryStatus::Ok),
            recommendations: vec![
                "Consider adding more comments".to_string(),
                "Follow naming conventions".to_string(),
                "Add unit tests".to_string(),
            ],
        }
    }

    /// Result for a check that could not be carried out.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            passed: false,
            summary: summary.into(),
            details: CategoryStatuses::uniform(CategoryStatus::Unknown),
            recommendations: Vec::new(),
        }
    }
}

/// Severity of a check log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// A single diagnostic line attached to a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

impl LogEntry {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }
}

/// One tracked request to validate a submitted file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Check {
    pub id: CheckId,
    pub file_name: String,
    pub status: CheckStatus,
    pub created_at: DateTime<Utc>,
    /// Present if and only if `status` is terminal.
    pub result: Option<CheckResult>,
    /// Append-only diagnostics.
    pub logs: Vec<LogEntry>,
}

impl Check {
    /// A fresh record in the `Processing` state.
    pub fn new(id: CheckId, file_name: impl Into<String>) -> Self {
        Self {
            id,
            file_name: file_name.into(),
            status: CheckStatus::Processing,
            created_at: Utc::now(),
            result: None,
            logs: Vec::new(),
        }
    }
}

/// Terminal outcome written by [`crate::registry::CheckRegistry::finalize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The check ran to the end; `result.passed` carries the verdict.
    Completed(CheckResult),
    /// The check could not be carried out.
    Failed(CheckResult),
}

impl CheckOutcome {
    /// Shorthand for a failed outcome with an error summary.
    pub fn failed(summary: impl Into<String>) -> Self {
        CheckOutcome::Failed(CheckResult::error(summary))
    }

    pub fn status(&self) -> CheckStatus {
        match self {
            CheckOutcome::Completed(_) => CheckStatus::Completed,
            CheckOutcome::Failed(_) => CheckStatus::Failed,
        }
    }

    pub fn result(&self) -> &CheckResult {
        match self {
            CheckOutcome::Completed(r) | CheckOutcome::Failed(r) => r,
        }
    }

    pub fn into_parts(self) -> (CheckStatus, CheckResult) {
        let status = self.status();
        match self {
            CheckOutcome::Completed(r) | CheckOutcome::Failed(r) => (status, r),
        }
    }
}
