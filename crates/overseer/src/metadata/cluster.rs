//! Cluster topology snapshot

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};

use super::collection::{Collection, CollectionDoc};
use crate::write_command::WriteCommand;

/// Cluster topology
///
/// Immutable root of the collection → shard → replica tree. A new snapshot
/// is produced for every accepted write; collections that the write does not
/// name are shared with the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterTopology {
    collections: IndexMap<String, Arc<Collection>>,
}

impl ClusterTopology {
    /// Create empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a collection (builder)
    pub fn with_collection(mut self, collection: Collection) -> Self {
        self.collections
            .insert(collection.name().to_string(), Arc::new(collection));
        self
    }

    pub fn collection(&self, name: &str) -> Option<&Arc<Collection>> {
        self.collections.get(name)
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collections(&self) -> &IndexMap<String, Arc<Collection>> {
        &self.collections
    }

    /// Materialize the snapshot that results from committing `cmd`
    ///
    /// No version check happens here; that belongs to whoever persists the
    /// write.
    pub fn apply(&self, cmd: &WriteCommand) -> ClusterTopology {
        let Some(write) = cmd.as_write() else {
            return self.clone();
        };
        let mut collections = self.collections.clone();
        collections.insert(write.name.clone(), Arc::clone(&write.collection));
        ClusterTopology { collections }
    }
}

impl Serialize for ClusterTopology {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.collections.len()))?;
        for (name, collection) in &self.collections {
            map.serialize_entry(name, &collection.to_doc())?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ClusterTopology {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let docs = IndexMap::<String, CollectionDoc>::deserialize(deserializer)?;
        let collections = docs
            .into_iter()
            .map(|(name, doc)| {
                let collection = Collection::from_doc(name.clone(), doc);
                (name, Arc::new(collection))
            })
            .collect();
        Ok(Self { collections })
    }
}
