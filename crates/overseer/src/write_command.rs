//! Write command: the result of one mutation

use std::sync::Arc;

use crate::metadata::Collection;
use crate::prs_ops::PerReplicaStatesOps;

/// Collection write handed to the committer
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionWrite {
    /// Target collection
    pub name: String,
    /// New collection value
    pub collection: Arc<Collection>,
    /// Per-replica state operations to persist with the document
    pub ops: Option<PerReplicaStatesOps>,
    /// Set when per-replica state mode itself is being switched
    pub persist_collection_state: bool,
}

/// Mutation result
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCommand {
    /// Nothing to persist
    NoOp,
    Write(CollectionWrite),
}

impl WriteCommand {
    /// Replace a collection
    pub fn new(name: impl Into<String>, collection: Collection) -> Self {
        Self::Write(CollectionWrite {
            name: name.into(),
            collection: Arc::new(collection),
            ops: None,
            persist_collection_state: false,
        })
    }

    /// Replace a collection and persist per-replica state operations with it
    pub fn with_ops(name: impl Into<String>, collection: Collection, ops: PerReplicaStatesOps) -> Self {
        Self::Write(CollectionWrite {
            name: name.into(),
            collection: Arc::new(collection),
            ops: Some(ops),
            persist_collection_state: true,
        })
    }

    pub fn is_noop(&self) -> bool {
        matches!(self, WriteCommand::NoOp)
    }

    pub fn as_write(&self) -> Option<&CollectionWrite> {
        match self {
            WriteCommand::NoOp => None,
            WriteCommand::Write(write) => Some(write),
        }
    }

    /// Target collection name
    pub fn name(&self) -> Option<&str> {
        self.as_write().map(|w| w.name.as_str())
    }

    /// New collection value
    pub fn collection(&self) -> Option<&Arc<Collection>> {
        self.as_write().map(|w| &w.collection)
    }

    pub fn ops(&self) -> Option<&PerReplicaStatesOps> {
        self.as_write().and_then(|w| w.ops.as_ref())
    }
}
