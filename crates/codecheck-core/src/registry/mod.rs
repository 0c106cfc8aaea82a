//! Check registry: the authoritative store of check records.
//!
//! The registry is process-local. Records are lost on restart.
//!
//! - `CheckRegistry`: async store abstraction (create/get/update/list)
//! - `MemoryCheckRegistry`: in-memory implementation with optional capacity
//!
//! Every write goes through [`validate_transition`], so no mutator can break
//! the record invariants: status is monotonic, `result` is written once
//! together with the terminal status, and `logs` only grow.

mod memory;

use async_trait::async_trait;

use crate::domain::{Check, CheckId, CheckOutcome, LogEntry, RegistryError, RegistryResult};

pub use memory::MemoryCheckRegistry;

/// Mutation applied to a copy of a record by [`CheckRegistry::update`].
pub type CheckMutator = Box<dyn FnOnce(&mut Check) + Send>;

/// Store of check records keyed by [`CheckId`].
///
/// Guarantees:
/// - `create` inserts a `Processing` record before returning its id.
/// - `update` is atomic per record: readers observe either the old or the
///   new record, never a partial write.
/// - `list` is ordered most-recent-first by insertion order.
#[async_trait]
pub trait CheckRegistry: Send + Sync {
    /// Insert a fresh `Processing` record and return its id. Never fails.
    async fn create(&self, file_name: &str) -> CheckId;

    /// Point lookup.
    async fn get(&self, id: &CheckId) -> RegistryResult<Check>;

    /// Apply `mutator` to the record and commit it if the transition is valid.
    /// Returns the committed record.
    async fn update(&self, id: &CheckId, mutator: CheckMutator) -> RegistryResult<Check>;

    /// Snapshot of all retained records, most recent first.
    async fn list(&self) -> Vec<Check>;

    /// The `limit` most recent records, most recent first.
    async fn list_recent(&self, limit: usize) -> Vec<Check> {
        let mut checks = self.list().await;
        checks.truncate(limit);
        checks
    }

    /// Move a record to its terminal status and attach the result in one
    /// write. Both the success and the failure paths end here.
    async fn finalize(&self, id: &CheckId, outcome: CheckOutcome) -> RegistryResult<Check> {
        let (status, result) = outcome.into_parts();
        self.update(
            id,
            Box::new(move |check: &mut Check| {
                check.status = status;
                check.result = Some(result);
            }),
        )
        .await
    }

    /// Append diagnostic entries to a record.
    async fn append_logs(&self, id: &CheckId, entries: Vec<LogEntry>) -> RegistryResult<Check> {
        self.update(
            id,
            Box::new(move |check: &mut Check| check.logs.extend(entries)),
        )
        .await
    }
}

/// Check that `after` is a legal successor of `before`.
pub fn validate_transition(before: &Check, after: &Check) -> RegistryResult<()> {
    let id = &before.id;
    if after.id != before.id {
        return Err(RegistryError::ImmutableField {
            id: id.clone(),
            field: "id",
        });
    }
    if after.file_name != before.file_name {
        return Err(RegistryError::ImmutableField {
            id: id.clone(),
            field: "fileName",
        });
    }
    if after.created_at != before.created_at {
        return Err(RegistryError::ImmutableField {
            id: id.clone(),
            field: "createdAt",
        });
    }
    if before.status.is_terminal() && after.status != before.status {
        return Err(RegistryError::InvalidTransition {
            id: id.clone(),
            from: before.status,
            to: after.status,
        });
    }
    if before.result.is_some() && after.result != before.result {
        return Err(RegistryError::ResultAlreadySet { id: id.clone() });
    }
    if after.result.is_some() != after.status.is_terminal() {
        return Err(RegistryError::ResultStatusMismatch {
            id: id.clone(),
            status: after.status,
        });
    }
    if !after.logs.starts_with(&before.logs) {
        return Err(RegistryError::LogsRewritten { id: id.clone() });
    }
    Ok(())
}
