//! Shard definitions

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::replica::{Replica, ReplicaDoc};

/// Shard ID
///
/// Unique within its collection (it is the key of the collection's shard map).
pub type ShardId = String;

/// Hash range [min, max], both inclusive
///
/// Written as two 8-digit hex words, e.g. `80000000-ffffffff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HashRange {
    /// Lower bound (inclusive)
    pub min: i32,
    /// Upper bound (inclusive)
    pub max: i32,
}

impl HashRange {
    pub fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }
}

impl std::fmt::Display for HashRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08x}-{:08x}", self.min as u32, self.max as u32)
    }
}

impl std::str::FromStr for HashRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (min, max) = s
            .trim()
            .split_once('-')
            .ok_or_else(|| format!("Invalid hash range: {}", s))?;
        let min = u32::from_str_radix(min, 16).map_err(|e| format!("Invalid hash range {}: {}", s, e))?;
        let max = u32::from_str_radix(max, 16).map_err(|e| format!("Invalid hash range {}: {}", s, e))?;
        let range = HashRange::new(min as i32, max as i32);
        if range.min > range.max {
            return Err(format!("Invalid hash range {}: min is greater than max", s));
        }
        Ok(range)
    }
}

impl TryFrom<String> for HashRange {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<HashRange> for String {
    fn from(range: HashRange) -> Self {
        range.to_string()
    }
}

/// Shard lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardState {
    /// Serving its hash range
    Active,
    /// Retired, e.g. the parent after a split
    Inactive,
    /// Being built by a split or migration
    Construction,
    /// Sub-shard replaying buffered updates
    Recovery,
    /// Recovery gave up
    RecoveryFailed,
}

impl Default for ShardState {
    fn default() -> Self {
        Self::Active
    }
}

impl std::fmt::Display for ShardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShardState::Active => write!(f, "active"),
            ShardState::Inactive => write!(f, "inactive"),
            ShardState::Construction => write!(f, "construction"),
            ShardState::Recovery => write!(f, "recovery"),
            ShardState::RecoveryFailed => write!(f, "recovery_failed"),
        }
    }
}

impl std::str::FromStr for ShardState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(ShardState::Active),
            "inactive" => Ok(ShardState::Inactive),
            "construction" => Ok(ShardState::Construction),
            "recovery" => Ok(ShardState::Recovery),
            "recovery_failed" => Ok(ShardState::RecoveryFailed),
            other => Err(format!("Unknown shard state: {}", other)),
        }
    }
}

/// Shard properties
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShardProps {
    /// Responsible hash range
    pub range: Option<HashRange>,
    /// Lifecycle state
    pub state: ShardState,
    /// Parent shard (split-originated shards only)
    pub parent: Option<ShardId>,
    /// Coordination session of the parent's leader at split time
    pub parent_zk_session: Option<String>,
    /// Node hosting the parent's leader at split time
    pub parent_node: Option<String>,
    /// Any other property carried by the state document
    pub extra: IndexMap<String, Value>,
}

/// Shard information
///
/// Replicas are shared by `Arc`, so cloning a shard copies only the map.
#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    name: ShardId,
    collection: String,
    replicas: IndexMap<String, Arc<Replica>>,
    props: ShardProps,
}

impl Shard {
    /// Create new shard
    pub fn new(
        name: impl Into<ShardId>,
        collection: impl Into<String>,
        replicas: IndexMap<String, Arc<Replica>>,
        props: ShardProps,
    ) -> Self {
        Self {
            name: name.into(),
            collection: collection.into(),
            replicas,
            props,
        }
    }

    pub fn name(&self) -> &ShardId {
        &self.name
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn props(&self) -> &ShardProps {
        &self.props
    }

    pub fn range(&self) -> Option<HashRange> {
        self.props.range
    }

    pub fn state(&self) -> ShardState {
        self.props.state
    }

    pub fn parent(&self) -> Option<&ShardId> {
        self.props.parent.as_ref()
    }

    pub fn replicas(&self) -> &IndexMap<String, Arc<Replica>> {
        &self.replicas
    }

    pub fn replica(&self, name: &str) -> Option<&Arc<Replica>> {
        self.replicas.get(name)
    }

    /// Current leader, if any replica carries the leader flag
    pub fn leader(&self) -> Option<&Arc<Replica>> {
        self.replicas.values().find(|r| r.is_leader())
    }

    /// New shard with one replica inserted or replaced by name
    pub fn copy_with(&self, replica: Replica) -> Shard {
        let mut shard = self.clone();
        shard.put_replica(replica);
        shard
    }

    /// Replace a replica in a shard that has not been shared yet
    pub(crate) fn put_replica(&mut self, replica: Replica) {
        self.replicas.insert(replica.name.clone(), Arc::new(replica));
    }

    pub(crate) fn to_doc(&self) -> ShardDoc {
        ShardDoc {
            range: self.props.range,
            state: self.props.state,
            parent: self.props.parent.clone(),
            shard_parent_zk_session: self.props.parent_zk_session.clone(),
            shard_parent_node: self.props.parent_node.clone(),
            replicas: self
                .replicas
                .iter()
                .map(|(name, replica)| (name.clone(), replica.to_doc()))
                .collect(),
            extra: self.props.extra.clone(),
        }
    }

    pub(crate) fn from_doc(name: ShardId, collection: &str, doc: ShardDoc) -> Self {
        let replicas = doc
            .replicas
            .into_iter()
            .map(|(replica_name, replica)| {
                let replica = Replica::from_doc(
                    replica_name.clone(),
                    name.clone(),
                    collection.to_string(),
                    replica,
                );
                (replica_name, Arc::new(replica))
            })
            .collect();
        let props = ShardProps {
            range: doc.range,
            state: doc.state,
            parent: doc.parent,
            parent_zk_session: doc.shard_parent_zk_session,
            parent_node: doc.shard_parent_node,
            extra: doc.extra,
        };
        Self::new(name, collection, replicas, props)
    }
}

/// Shard entry as stored in a collection state document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ShardDoc {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<HashRange>,
    #[serde(default)]
    pub state: ShardState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<ShardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_parent_zk_session: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard_parent_node: Option<String>,
    #[serde(default)]
    pub replicas: IndexMap<String, ReplicaDoc>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_range_parse_and_display() {
        let range: HashRange = "80000000-ffffffff".parse().unwrap();
        assert_eq!(range.min, i32::MIN);
        assert_eq!(range.max, -1);
        assert_eq!(range.to_string(), "80000000-ffffffff");
        assert_eq!(HashRange::new(i32::MIN, i32::MAX).to_string(), "80000000-7fffffff");
    }

    #[test]
    fn test_hash_range_rejects_garbage() {
        assert!("80000000".parse::<HashRange>().is_err());
        assert!("zz-ffffffff".parse::<HashRange>().is_err());
        // 0x00000000 is above 0xffffffff in signed order
        assert!("00000000-ffffffff".parse::<HashRange>().is_err());
    }

    #[test]
    fn test_copy_with_leaves_original() {
        let shard = Shard::new("shard1", "films", IndexMap::new(), ShardProps::default());
        let replica = Replica::new("core_node1", "shard1", "films", "n1", "films_shard1_replica_n1");

        let updated = shard.copy_with(replica);

        assert!(shard.replicas().is_empty());
        assert_eq!(updated.replicas().len(), 1);
        assert!(updated.replica("core_node1").is_some());
        assert!(updated.leader().is_none());
    }
}
