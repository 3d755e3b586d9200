//! Per-replica state store access
//!
//! The durable store is owned by the caller; the mutators only read the
//! per-replica record of one collection through [`PerReplicaStatesFetcher`].

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::debug;

use crate::metadata::{PerReplicaStates, PrsState};
use crate::prs_ops::{PerReplicaStatesOps, PrsOp};

/// Storage error
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Node not found: {0}")]
    NotFound(String),
    #[error("Corrupt per-replica state entry: {0}")]
    Corrupt(String),
}

/// Reads the per-replica state record stored under a collection's state path
pub trait PerReplicaStatesFetcher: Send + Sync {
    fn fetch(&self, path: &str) -> Result<PerReplicaStates, StoreError>;
}

#[derive(Debug, Default)]
struct PrsNode {
    cversion: i32,
    entries: Vec<String>,
}

/// In-memory per-replica state store
///
/// Keeps the encoded child entries of every state path, the way the durable
/// store lays them out. Unknown paths read as an empty record.
#[derive(Debug, Default)]
pub struct MemoryPrsStore {
    nodes: RwLock<HashMap<String, PrsNode>>,
}

impl MemoryPrsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the entries under `path`
    pub fn put_states(&self, path: &str, states: &[PrsState]) {
        let mut nodes = self.nodes.write();
        let node = nodes.entry(path.to_string()).or_default();
        node.entries = states.iter().map(PrsState::as_entry).collect();
        node.cversion += 1;
    }

    /// Apply an operation batch under `path`
    pub fn apply_ops(&self, path: &str, ops: &PerReplicaStatesOps) {
        let mut nodes = self.nodes.write();
        let node = nodes.entry(path.to_string()).or_default();
        for op in ops.ops() {
            match op {
                PrsOp::Add(state) => node.entries.push(state.as_entry()),
                PrsOp::Delete(state) => {
                    let entry = state.as_entry();
                    node.entries.retain(|e| *e != entry);
                }
            }
            node.cversion += 1;
        }
        debug!("Applied {} per-replica ops under {}", ops.len(), path);
    }

    /// Raw entries under `path`
    pub fn entries(&self, path: &str) -> Vec<String> {
        self.nodes
            .read()
            .get(path)
            .map(|n| n.entries.clone())
            .unwrap_or_default()
    }
}

impl PerReplicaStatesFetcher for MemoryPrsStore {
    fn fetch(&self, path: &str) -> Result<PerReplicaStates, StoreError> {
        let nodes = self.nodes.read();
        match nodes.get(path) {
            Some(node) => {
                PerReplicaStates::from_entries(path, node.cversion, node.entries.iter().map(String::as_str))
            }
            None => Ok(PerReplicaStates::empty(path)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ReplicaState;

    const PATH: &str = "/collections/films/state.json";

    #[test]
    fn test_unknown_path_is_empty() {
        let store = MemoryPrsStore::new();
        let record = store.fetch(PATH).unwrap();
        assert!(record.is_empty());
        assert_eq!(record.path, PATH);
    }

    #[test]
    fn test_put_and_fetch() {
        let store = MemoryPrsStore::new();
        store.put_states(
            PATH,
            &[
                PrsState::new("core_node1", 0, ReplicaState::Active, true),
                PrsState::new("core_node2", 1, ReplicaState::Down, false),
            ],
        );

        let record = store.fetch(PATH).unwrap();
        assert_eq!(record.len(), 2);
        assert_eq!(record.cversion, 1);
        assert!(record.get("core_node1").unwrap().leader);
        assert_eq!(store.entries(PATH), vec!["core_node1:0:A:L", "core_node2:1:D"]);
    }

    #[test]
    fn test_corrupt_entry_fails_fetch() {
        let store = MemoryPrsStore::new();
        store.nodes.write().insert(
            PATH.to_string(),
            PrsNode {
                cversion: 1,
                entries: vec!["core_node1:zero:A".to_string()],
            },
        );
        assert!(matches!(store.fetch(PATH), Err(StoreError::Corrupt(_))));
    }
}
