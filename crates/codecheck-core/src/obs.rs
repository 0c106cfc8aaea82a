//! Structured observability hooks for the check lifecycle.
//!
//! This module provides:
//! - A check-scoped tracing span via [`check_span`]
//! - Emission functions for key lifecycle events: creation, stage changes,
//!   provider retries, scheduling, finalization, teardown
//!
//! Events are emitted at `info!` level unless noted. For JSON output start
//! the daemon with `--log-json`.

use std::time::Duration;

use tracing::{info, warn, Span};

use crate::domain::{CheckId, CheckStatus};

/// Span tagged with the check id. Attach with `tracing::Instrument` so it
/// follows the check across `.await` points and spawned tasks.
///
/// # Example
///
/// ```ignore
/// async { /* provisioning */ }.instrument(check_span(&id)).await;
/// ```
pub fn check_span(check_id: &CheckId) -> Span {
    tracing::info_span!("codecheck.check", check_id = %check_id)
}

/// Emit event: a check record was created.
pub fn emit_check_created(check_id: &CheckId, file_name: &str, size: u64, digest: &str) {
    info!(
        event = "check.created",
        check_id = %check_id,
        file_name = %file_name,
        size = size,
        sha256 = %digest,
    );
}

/// Emit event: orchestration moved to a new stage.
pub fn emit_stage(check_id: &CheckId, stage: &str) {
    info!(event = "check.stage", check_id = %check_id, stage = %stage);
}

/// Emit event: one provisioning step finished.
pub fn emit_provision_step(repo: &str, step: &str, duration_ms: u64) {
    info!(event = "provision.step", repo = %repo, step = %step, duration_ms = duration_ms);
}

/// Emit event: a provider call is being retried (warning level).
pub fn emit_provision_retry(
    operation: &str,
    attempt: u32,
    delay: Duration,
    error: &dyn std::fmt::Display,
) {
    warn!(
        event = "provision.retry",
        operation = %operation,
        attempt = attempt,
        delay_ms = delay.as_millis() as u64,
        error = %error,
    );
}

/// Emit event: completion has been armed for a check.
pub fn emit_check_scheduled(check_id: &CheckId, repo: &str, source: &str) {
    info!(event = "check.scheduled", check_id = %check_id, repo = %repo, source = %source);
}

/// Emit event: check reached a terminal status.
pub fn emit_check_finalized(check_id: &CheckId, status: CheckStatus, passed: bool) {
    info!(
        event = "check.finalized",
        check_id = %check_id,
        status = %status,
        passed = passed,
    );
}

/// Emit event: repository teardown failed (warning level). Never surfaced
/// to clients.
pub fn emit_teardown_failed(check_id: &CheckId, error: &dyn std::fmt::Display) {
    warn!(event = "teardown.failed", check_id = %check_id, error = %error);
}

/// Emit event: the staged upload could not be removed (warning level).
pub fn emit_staging_release_failed(check_id: &CheckId, error: &dyn std::fmt::Display) {
    warn!(event = "staging.release_failed", check_id = %check_id, error = %error);
}
