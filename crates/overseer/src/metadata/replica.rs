//! Replica definitions

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::ShardId;

/// Replica lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaState {
    /// Serving requests
    Active,
    /// Not serving, node gone or core closed
    Down,
    /// Catching up from the leader
    Recovering,
    /// Recovery gave up
    RecoveryFailed,
}

impl ReplicaState {
    /// Single-letter code used in per-replica state entries
    pub fn short_code(&self) -> &'static str {
        match self {
            ReplicaState::Active => "A",
            ReplicaState::Down => "D",
            ReplicaState::Recovering => "R",
            ReplicaState::RecoveryFailed => "F",
        }
    }

    /// Parse the single-letter code
    pub fn from_short_code(code: &str) -> Option<Self> {
        match code {
            "A" => Some(ReplicaState::Active),
            "D" => Some(ReplicaState::Down),
            "R" => Some(ReplicaState::Recovering),
            "F" => Some(ReplicaState::RecoveryFailed),
            _ => None,
        }
    }
}

impl Default for ReplicaState {
    fn default() -> Self {
        Self::Down
    }
}

impl std::fmt::Display for ReplicaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicaState::Active => write!(f, "active"),
            ReplicaState::Down => write!(f, "down"),
            ReplicaState::Recovering => write!(f, "recovering"),
            ReplicaState::RecoveryFailed => write!(f, "recovery_failed"),
        }
    }
}

impl std::str::FromStr for ReplicaState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(ReplicaState::Active),
            "down" => Ok(ReplicaState::Down),
            "recovering" => Ok(ReplicaState::Recovering),
            "recovery_failed" => Ok(ReplicaState::RecoveryFailed),
            other => Err(format!("Unknown replica state: {}", other)),
        }
    }
}

/// Replica type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicaType {
    /// Near-real-time: indexes locally, can become leader
    Nrt,
    /// Transaction log only, can become leader
    Tlog,
    /// Pulls the index from the leader, never leader
    Pull,
}

impl Default for ReplicaType {
    fn default() -> Self {
        Self::Nrt
    }
}

impl std::fmt::Display for ReplicaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicaType::Nrt => write!(f, "NRT"),
            ReplicaType::Tlog => write!(f, "TLOG"),
            ReplicaType::Pull => write!(f, "PULL"),
        }
    }
}

/// One physical copy of a shard
///
/// Owned by its shard through an `Arc`; never changed after construction.
/// New values come from the elementary mutators in `crate::mutator::replica`.
#[derive(Debug, Clone, PartialEq)]
pub struct Replica {
    pub(crate) name: String,
    pub(crate) shard: ShardId,
    pub(crate) collection: String,
    pub(crate) state: ReplicaState,
    pub(crate) leader: bool,
    pub(crate) node_name: String,
    pub(crate) core: String,
    pub(crate) replica_type: ReplicaType,
    pub(crate) properties: IndexMap<String, Value>,
}

impl Replica {
    /// Create a down, non-leader NRT replica
    pub fn new(
        name: impl Into<String>,
        shard: impl Into<ShardId>,
        collection: impl Into<String>,
        node_name: impl Into<String>,
        core: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            shard: shard.into(),
            collection: collection.into(),
            state: ReplicaState::Down,
            leader: false,
            node_name: node_name.into(),
            core: core.into(),
            replica_type: ReplicaType::Nrt,
            properties: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shard(&self) -> &ShardId {
        &self.shard
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn state(&self) -> ReplicaState {
        self.state
    }

    pub fn is_leader(&self) -> bool {
        self.leader
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn core(&self) -> &str {
        &self.core
    }

    pub fn replica_type(&self) -> ReplicaType {
        self.replica_type
    }

    /// Extra core-level properties
    pub fn properties(&self) -> &IndexMap<String, Value> {
        &self.properties
    }

    pub(crate) fn to_doc(&self) -> ReplicaDoc {
        ReplicaDoc {
            core: self.core.clone(),
            node_name: self.node_name.clone(),
            state: self.state,
            replica_type: self.replica_type,
            leader: self.leader,
            properties: self.properties.clone(),
        }
    }

    pub(crate) fn from_doc(name: String, shard: ShardId, collection: String, doc: ReplicaDoc) -> Self {
        Self {
            name,
            shard,
            collection,
            state: doc.state,
            leader: doc.leader,
            node_name: doc.node_name,
            core: doc.core,
            replica_type: doc.replica_type,
            properties: doc.properties,
        }
    }
}

/// Replica entry as stored in a collection state document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ReplicaDoc {
    pub core: String,
    pub node_name: String,
    #[serde(default)]
    pub state: ReplicaState,
    #[serde(rename = "type", default)]
    pub replica_type: ReplicaType,
    #[serde(default, skip_serializing_if = "is_false", deserialize_with = "leader_flag")]
    pub leader: bool,
    #[serde(flatten)]
    pub properties: IndexMap<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Older documents store the flag as the string `"true"`
fn leader_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}
