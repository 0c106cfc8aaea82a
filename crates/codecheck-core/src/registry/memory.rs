//! In-memory check registry.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{validate_transition, CheckMutator, CheckRegistry};
use crate::domain::{Check, CheckId, RegistryError, RegistryResult};

#[derive(Debug)]
struct Slot {
    /// Insertion order; timestamps can tie under concurrent creates.
    seq: u64,
    check: Check,
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<CheckId, Slot>,
    next_seq: u64,
}

/// In-memory registry backed by a `HashMap<CheckId, Check>` behind a
/// `tokio::sync::RwLock`.
///
/// With a capacity set, inserting past it evicts the oldest terminal
/// records. `Processing` records are never evicted, so the registry may
/// temporarily exceed its capacity while many checks are in flight.
#[derive(Debug, Default)]
pub struct MemoryCheckRegistry {
    inner: RwLock<Inner>,
    capacity: Option<usize>,
}

impl MemoryCheckRegistry {
    /// Unbounded registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry retaining at most `capacity` terminal-or-newer records.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            capacity: Some(capacity),
        }
    }

    /// Number of records currently retained.
    pub async fn len(&self) -> usize {
        self.inner.read().await.slots.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn evict_terminal(inner: &mut Inner, capacity: usize) {
    let excess = inner.slots.len().saturating_sub(capacity);
    if excess == 0 {
        return;
    }
    let mut terminal: Vec<(u64, CheckId)> = inner
        .slots
        .iter()
        .filter(|(_, slot)| slot.check.status.is_terminal())
        .map(|(id, slot)| (slot.seq, id.clone()))
        .collect();
    terminal.sort_unstable_by_key(|(seq, _)| *seq);
    for (_, id) in terminal.into_iter().take(excess) {
        inner.slots.remove(&id);
        tracing::debug!(check_id = %id, "evicted terminal check from registry");
    }
}

#[async_trait]
impl CheckRegistry for MemoryCheckRegistry {
    async fn create(&self, file_name: &str) -> CheckId {
        let id = CheckId::new();
        let mut inner = self.inner.write().await;
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.slots.insert(
            id.clone(),
            Slot {
                seq,
                check: Check::new(id.clone(), file_name),
            },
        );
        if let Some(capacity) = self.capacity {
            evict_terminal(&mut inner, capacity);
        }
        id
    }

    async fn get(&self, id: &CheckId) -> RegistryResult<Check> {
        let inner = self.inner.read().await;
        inner
            .slots
            .get(id)
            .map(|slot| slot.check.clone())
            .ok_or_else(|| RegistryError::NotFound { id: id.clone() })
    }

    async fn update(&self, id: &CheckId, mutator: CheckMutator) -> RegistryResult<Check> {
        let mut inner = self.inner.write().await;
        let slot = inner
            .slots
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound { id: id.clone() })?;

        let mut next = slot.check.clone();
        mutator(&mut next);
        validate_transition(&slot.check, &next)?;
        slot.check = next;
        Ok(slot.check.clone())
    }

    async fn list(&self) -> Vec<Check> {
        let inner = self.inner.read().await;
        let mut slots: Vec<&Slot> = inner.slots.values().collect();
        slots.sort_unstable_by(|a, b| b.seq.cmp(&a.seq));
        slots.into_iter().map(|slot| slot.check.clone()).collect()
    }
}
