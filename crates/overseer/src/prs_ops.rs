//! Per-replica state operation batches
//!
//! Built when a collection switches per-replica state on or off, and persisted
//! by the committer together with the collection document.

use tracing::debug;

use crate::metadata::{Collection, PerReplicaStates, PrsState};
use crate::storage::StoreError;

/// One child-entry operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrsOp {
    /// Create the entry
    Add(PrsState),
    /// Remove the entry
    Delete(PrsState),
}

/// Ordered batch of per-replica state operations for one collection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerReplicaStatesOps {
    path: String,
    ops: Vec<PrsOp>,
}

impl PerReplicaStatesOps {
    /// Operations that move every replica's state out of the collection document
    ///
    /// Existing entries (and their duplicates) are deleted before the new entry
    /// is added, and the new entry gets a version above any existing one. An
    /// existing entry already at the highest version makes the record corrupt.
    pub fn enable(collection: &Collection, prs: &PerReplicaStates) -> Result<Self, StoreError> {
        let mut ops = Vec::new();
        for replica in collection.replicas() {
            let mut version = 0;
            if let Some(existing) = prs.get(replica.name()) {
                version = existing
                    .version
                    .checked_add(1)
                    .ok_or_else(|| StoreError::Corrupt(existing.as_entry()))?;
                ops.push(PrsOp::Delete(existing.clone()));
            }
            ops.extend(prs.duplicates_of(replica.name()).cloned().map(PrsOp::Delete));
            ops.push(PrsOp::Add(PrsState::new(
                replica.name(),
                version,
                replica.state(),
                replica.is_leader(),
            )));
        }
        debug!(
            "Enable per-replica state for {}: {} ops",
            collection.name(),
            ops.len()
        );
        Ok(Self {
            path: prs.path.clone(),
            ops,
        })
    }

    /// Operations that delete every per-replica entry
    pub fn disable(prs: &PerReplicaStates) -> Self {
        let ops: Vec<PrsOp> = prs
            .states()
            .chain(prs.duplicates().iter())
            .cloned()
            .map(PrsOp::Delete)
            .collect();
        debug!("Disable per-replica state at {}: {} ops", prs.path, ops.len());
        Self {
            path: prs.path.clone(),
            ops,
        }
    }

    /// State path the operations apply under
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn ops(&self) -> &[PrsOp] {
        &self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}
