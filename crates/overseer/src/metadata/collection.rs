//! Collection definitions

use std::sync::Arc;

use indexmap::IndexMap;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::replica::Replica;
use super::shard::{Shard, ShardDoc, ShardId};

/// Prefix of free-form collection properties
pub const PROPERTY_PREFIX: &str = "property.";

/// Document routing strategy reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Router {
    /// Router name, e.g. `compositeId` or `implicit`
    pub name: String,
    /// Routing field (implicit router only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            name: "compositeId".to_string(),
            field: None,
        }
    }
}

/// Collection-level properties
///
/// Replication factor and NRT replica count are private: the only setter
/// writes both, so they cannot drift apart.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectionProps {
    /// Name of the configset
    pub config_name: Option<String>,
    replication_factor: Option<u32>,
    nrt_replicas: Option<u32>,
    pub tlog_replicas: Option<u32>,
    pub pull_replicas: Option<u32>,
    /// Replica states live in per-replica records instead of the state document
    pub per_replica_state: bool,
    pub read_only: Option<bool>,
    /// `property.*` entries
    pub aux: IndexMap<String, Value>,
    /// Unrecognized entries, kept for round trips
    pub other: IndexMap<String, Value>,
}

impl CollectionProps {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replication_factor(&self) -> Option<u32> {
        self.replication_factor
    }

    pub fn nrt_replicas(&self) -> Option<u32> {
        self.nrt_replicas
    }

    /// Set (or clear) replication factor and NRT replica count together
    pub fn set_replication_factor(&mut self, value: Option<u32>) {
        self.replication_factor = value;
        self.nrt_replicas = value;
    }

    /// Set replication factor (builder)
    pub fn with_replication_factor(mut self, value: u32) -> Self {
        self.set_replication_factor(Some(value));
        self
    }

    /// Set configset name (builder)
    pub fn with_config_name(mut self, name: impl Into<String>) -> Self {
        self.config_name = Some(name.into());
        self
    }

    /// Enable per-replica state (builder)
    pub fn with_per_replica_state(mut self, enabled: bool) -> Self {
        self.per_replica_state = enabled;
        self
    }
}

/// Collection
///
/// Shards are shared by `Arc`; every `copy_with_*` call copies one level of
/// the tree and reuses everything below it.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    name: String,
    shards: IndexMap<ShardId, Arc<Shard>>,
    props: CollectionProps,
    router: Router,
    znode_version: i32,
}

impl Collection {
    /// Create collection
    pub fn new(
        name: impl Into<String>,
        shards: IndexMap<ShardId, Arc<Shard>>,
        props: CollectionProps,
        router: Router,
        znode_version: i32,
    ) -> Self {
        Self {
            name: name.into(),
            shards,
            props,
            router,
            znode_version,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shards(&self) -> &IndexMap<ShardId, Arc<Shard>> {
        &self.shards
    }

    pub fn shard(&self, id: &str) -> Option<&Arc<Shard>> {
        self.shards.get(id)
    }

    pub fn props(&self) -> &CollectionProps {
        &self.props
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Version of the stored state document this value was read at
    pub fn znode_version(&self) -> i32 {
        self.znode_version
    }

    pub fn is_per_replica_state(&self) -> bool {
        self.props.per_replica_state
    }

    /// Iterate every replica of every shard, shard order first
    pub fn replicas(&self) -> impl Iterator<Item = &Arc<Replica>> {
        self.shards.values().flat_map(|s| s.replicas().values())
    }

    /// Find replica by name in any shard
    pub fn replica(&self, name: &str) -> Option<&Arc<Replica>> {
        self.shards.values().find_map(|s| s.replica(name))
    }

    /// Leader of a shard
    pub fn leader(&self, shard: &str) -> Option<&Arc<Replica>> {
        self.shard(shard).and_then(|s| s.leader())
    }

    /// New collection with a different shard map
    pub fn copy_with_shards(&self, shards: IndexMap<ShardId, Arc<Shard>>) -> Collection {
        Collection {
            name: self.name.clone(),
            shards,
            props: self.props.clone(),
            router: self.router.clone(),
            znode_version: self.znode_version,
        }
    }

    /// New collection with different properties
    pub fn copy_with_props(&self, props: CollectionProps) -> Collection {
        Collection {
            name: self.name.clone(),
            shards: self.shards.clone(),
            props,
            router: self.router.clone(),
            znode_version: self.znode_version,
        }
    }

    /// New collection at another document version (used by the committer)
    pub fn with_znode_version(&self, znode_version: i32) -> Collection {
        Collection {
            znode_version,
            ..self.clone()
        }
    }

    pub(crate) fn to_doc(&self) -> CollectionDoc {
        let mut extra = self.props.other.clone();
        extra.extend(self.props.aux.iter().map(|(k, v)| (k.clone(), v.clone())));
        CollectionDoc {
            shards: self
                .shards
                .iter()
                .map(|(id, shard)| (id.clone(), shard.to_doc()))
                .collect(),
            router: self.router.clone(),
            config_name: self.props.config_name.clone(),
            replication_factor: self.props.replication_factor,
            nrt_replicas: self.props.nrt_replicas,
            tlog_replicas: self.props.tlog_replicas,
            pull_replicas: self.props.pull_replicas,
            per_replica_state: self.props.per_replica_state,
            read_only: self.props.read_only,
            znode_version: self.znode_version,
            extra,
        }
    }

    pub(crate) fn from_doc(name: String, doc: CollectionDoc) -> Self {
        let shards = doc
            .shards
            .into_iter()
            .map(|(id, shard)| {
                let shard = Shard::from_doc(id.clone(), &name, shard);
                (id, Arc::new(shard))
            })
            .collect();
        let (aux, other): (IndexMap<String, Value>, IndexMap<String, Value>) = doc
            .extra
            .into_iter()
            .partition(|(key, _)| key.starts_with(PROPERTY_PREFIX));
        let props = CollectionProps {
            config_name: doc.config_name,
            replication_factor: doc.replication_factor,
            nrt_replicas: doc.nrt_replicas,
            tlog_replicas: doc.tlog_replicas,
            pull_replicas: doc.pull_replicas,
            per_replica_state: doc.per_replica_state,
            read_only: doc.read_only,
            aux,
            other,
        };
        Self::new(name, shards, props, doc.router, doc.znode_version)
    }
}

/// Collection state document (`state.json` body)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CollectionDoc {
    #[serde(default)]
    pub shards: IndexMap<ShardId, ShardDoc>,
    #[serde(default)]
    pub router: Router,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "count")]
    pub replication_factor: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "count")]
    pub nrt_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "count")]
    pub tlog_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "count")]
    pub pull_replicas: Option<u32>,
    #[serde(default, deserialize_with = "required_flag")]
    pub per_replica_state: bool,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "flag")]
    pub read_only: Option<bool>,
    #[serde(default)]
    pub znode_version: i32,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

// Stored documents often carry counts and flags as strings ("2", "false")

fn count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid replica count: {}", n))),
        Value::String(s) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("invalid replica count: {:?}", s))),
        other => Err(D::Error::custom(format!("invalid replica count: {}", other))),
    }
}

fn flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<bool>, D::Error> {
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b)),
        Value::String(s) if s.trim().eq_ignore_ascii_case("true") => Ok(Some(true)),
        Value::String(s) if s.trim().eq_ignore_ascii_case("false") => Ok(Some(false)),
        other => Err(D::Error::custom(format!("invalid flag: {}", other))),
    }
}

fn required_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(flag(deserializer)?.unwrap_or(false))
}
