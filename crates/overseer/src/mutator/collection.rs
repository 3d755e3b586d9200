//! Collection-level mutations
//!
//! Every operation reads one collection from the snapshot and returns the
//! write that would produce the next one. Nothing here touches the store
//! except the per-replica state read when that mode is switched.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::ClusterConfig;
use crate::error::Result;
use crate::message::{
    check_collection_key_existence, check_key_existence, Message, COLLECTION_PROP,
    SHARD_ID_PROP, SHARD_PARENT_NODE_PROP, SHARD_PARENT_PROP, SHARD_PARENT_ZK_SESSION_PROP,
    SHARD_RANGE_PROP, SHARD_STATE_PROP,
};
use crate::metadata::{
    ClusterTopology, Collection, CollectionProps, HashRange, PerReplicaStates, Replica, Shard,
    ShardId, ShardProps, ShardState, PROPERTY_PREFIX,
};
use crate::mutator::replica;
use crate::prs_ops::PerReplicaStatesOps;
use crate::storage::PerReplicaStatesFetcher;
use crate::write_command::WriteCommand;

/// Collection properties a `modifycollection` message may change, in the order
/// they are processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifiableProperty {
    ReplicationFactor,
    /// Stored as `configName`
    ConfigName,
    PerReplicaState,
    ReadOnly,
}

impl ModifiableProperty {
    pub const ALL: [ModifiableProperty; 4] = [
        ModifiableProperty::ReplicationFactor,
        ModifiableProperty::ConfigName,
        ModifiableProperty::PerReplicaState,
        ModifiableProperty::ReadOnly,
    ];

    /// Message key
    pub fn key(&self) -> &'static str {
        match self {
            ModifiableProperty::ReplicationFactor => "replicationFactor",
            ModifiableProperty::ConfigName => "collection.configName",
            ModifiableProperty::PerReplicaState => "perReplicaState",
            ModifiableProperty::ReadOnly => "readOnly",
        }
    }
}

/// Collection mutator
pub struct CollectionMutator {
    cluster: ClusterConfig,
    fetcher: Arc<dyn PerReplicaStatesFetcher>,
}

impl CollectionMutator {
    pub fn new(cluster: ClusterConfig, fetcher: Arc<dyn PerReplicaStatesFetcher>) -> Self {
        Self { cluster, fetcher }
    }

    /// Add an empty shard
    ///
    /// Rejected (no-op) when the shard id is already taken.
    pub fn create_shard(&self, topology: &ClusterTopology, message: &Message) -> WriteCommand {
        let Some(collection) = collection_for(topology, message) else {
            return WriteCommand::NoOp;
        };
        let Some(shard_id) = required_str(message, SHARD_ID_PROP) else {
            return WriteCommand::NoOp;
        };

        if collection.shard(&shard_id).is_some() {
            error!(
                "Unable to create Shard: {} because it already exists in collection: {}",
                shard_id,
                collection.name()
            );
            return WriteCommand::NoOp;
        }

        let props = match shard_props(message) {
            Ok(props) => props,
            Err(reason) => {
                error!(
                    "Unable to create Shard: {} in collection: {}: {}",
                    shard_id,
                    collection.name(),
                    reason
                );
                return WriteCommand::NoOp;
            }
        };

        info!(
            "Creating shard {} in collection {} (range={:?}, state={})",
            shard_id,
            collection.name(),
            props.range.map(|r| r.to_string()),
            props.state
        );
        let shard = Shard::new(shard_id, collection.name(), IndexMap::new(), props);
        let updated = Self::update_slice(collection.name(), collection, shard);
        WriteCommand::new(collection.name(), updated)
    }

    /// Remove a shard
    ///
    /// Removing an id the collection does not have still yields a write.
    pub fn delete_shard(&self, topology: &ClusterTopology, message: &Message) -> WriteCommand {
        let Some(collection) = collection_for(topology, message) else {
            return WriteCommand::NoOp;
        };
        let Some(shard_id) = required_str(message, SHARD_ID_PROP) else {
            return WriteCommand::NoOp;
        };

        info!(
            "Removing collection: {} shard: {} from cluster state",
            collection.name(),
            shard_id
        );

        let mut shards = collection.shards().clone();
        shards.shift_remove(&shard_id);
        WriteCommand::new(collection.name(), collection.copy_with_shards(shards))
    }

    /// Change collection properties
    ///
    /// Fails only when the per-replica state record cannot be read.
    pub fn modify_collection(&self, topology: &ClusterTopology, message: &Message) -> Result<WriteCommand> {
        let Some(original) = collection_for(topology, message) else {
            return Ok(WriteCommand::NoOp);
        };
        let mut coll = Arc::clone(original);
        let mut props = coll.props().clone();
        let mut has_any_ops = false;
        let mut replica_ops = None;

        for prop in ModifiableProperty::ALL {
            let Some(value) = message.get(prop.key()) else {
                continue;
            };

            if prop == ModifiableProperty::PerReplicaState {
                if value.is_null() {
                    continue;
                }
                let enable = parse_bool(value);
                if enable == coll.is_per_replica_state() {
                    error!(
                        "trying to set perReplicaState to {} from {}",
                        enable,
                        coll.is_per_replica_state()
                    );
                    continue;
                }

                let prs = self.fetcher.fetch(&self.cluster.state_path(coll.name()))?;
                if enable {
                    replica_ops = Some(PerReplicaStatesOps::enable(&coll, &prs)?);
                } else {
                    coll = Self::update_replicas(&coll, &prs);
                    replica_ops = Some(PerReplicaStatesOps::disable(&prs));
                }
                props.per_replica_state = enable;
                has_any_ops = true;
                continue;
            }

            if apply_property(&mut props, prop, value) {
                has_any_ops = true;
            } else {
                error!(
                    "Ignoring invalid value {} for {} in collection {}",
                    value,
                    prop.key(),
                    coll.name()
                );
            }
        }

        // Free-form properties are modifiable too
        for (key, value) in message.iter() {
            if !key.starts_with(PROPERTY_PREFIX) {
                continue;
            }
            has_any_ops = true;
            if value.is_null() {
                props.aux.shift_remove(key);
            } else {
                props.aux.insert(key.clone(), value.clone());
            }
        }

        if !has_any_ops {
            debug!("Nothing to modify in collection {}", coll.name());
            return Ok(WriteCommand::NoOp);
        }

        let name = coll.name().to_string();
        let collection = coll.copy_with_props(props);
        info!("Modified collection {}", name);
        Ok(match replica_ops {
            Some(ops) => WriteCommand::with_ops(name, collection, ops),
            None => WriteCommand::new(name, collection),
        })
    }

    /// Bring embedded replica states in line with a per-replica state record
    ///
    /// Pass one stages changed shards (each shard copied once, on first
    /// touch); pass two merges them into a single new collection. Replicas
    /// without a record entry are left alone. Returns `collection` itself when
    /// nothing differs.
    pub fn update_replicas(collection: &Arc<Collection>, prs: &PerReplicaStates) -> Arc<Collection> {
        let mut staged: IndexMap<ShardId, Shard> = IndexMap::new();

        for (shard_id, shard) in collection.shards() {
            for current in shard.replicas().values() {
                let Some(prs_state) = prs.get(current.name()) else {
                    continue;
                };

                let mut updated: Option<Replica> = None;
                if prs_state.state != current.state() {
                    updated = Some(replica::set_state(current, prs_state.state));
                }
                if prs_state.leader != current.is_leader() {
                    let base = updated.as_ref().unwrap_or(current.as_ref());
                    let next = if prs_state.leader {
                        replica::set_leader(base)
                    } else {
                        replica::unset_leader(base)
                    };
                    updated = Some(next);
                }

                if let Some(replica) = updated {
                    debug!(
                        "Replica {} of {}/{}: state={} leader={}",
                        replica.name(),
                        collection.name(),
                        shard_id,
                        replica.state(),
                        replica.is_leader()
                    );
                    staged
                        .entry(shard_id.clone())
                        .or_insert_with(|| (**shard).clone())
                        .put_replica(replica);
                }
            }
        }

        if staged.is_empty() {
            return Arc::clone(collection);
        }

        let mut shards = collection.shards().clone();
        for (shard_id, shard) in staged {
            shards.insert(shard_id, Arc::new(shard));
        }
        Arc::new(collection.copy_with_shards(shards))
    }

    /// Insert or replace one shard by id
    pub fn update_slice(collection_name: &str, collection: &Collection, shard: Shard) -> Collection {
        debug!("Updating shard {} of collection {}", shard.name(), collection_name);
        let mut shards = collection.shards().clone();
        shards.insert(shard.name().clone(), Arc::new(shard));
        collection.copy_with_shards(shards)
    }
}

/// Value of a key that must be present and not blank
fn required_str(message: &Message, key: &str) -> Option<String> {
    if !check_key_existence(message, key) {
        return None;
    }
    message.get_str(key)
}

/// Collection named by the message
fn collection_for<'a>(topology: &'a ClusterTopology, message: &Message) -> Option<&'a Arc<Collection>> {
    if !check_collection_key_existence(message) {
        return None;
    }
    let name = message.get_str(COLLECTION_PROP)?;
    let collection = topology.collection(&name);
    if collection.is_none() {
        error!("Collection {} does not exist, skipping message '{}'", name, message);
    }
    collection
}

fn shard_props(message: &Message) -> std::result::Result<ShardProps, String> {
    let range = message
        .get_str(SHARD_RANGE_PROP)
        .map(|r| r.parse::<HashRange>())
        .transpose()?;
    let state = message
        .get_str(SHARD_STATE_PROP)
        .map(|s| s.parse::<ShardState>())
        .transpose()?
        .unwrap_or_default();
    Ok(ShardProps {
        range,
        state,
        parent: message.get_str(SHARD_PARENT_PROP),
        parent_zk_session: message.get_str(SHARD_PARENT_ZK_SESSION_PROP),
        parent_node: message.get_str(SHARD_PARENT_NODE_PROP),
        extra: IndexMap::new(),
    })
}

/// Apply one non-PRS property; false if the value does not fit the property
fn apply_property(props: &mut CollectionProps, prop: ModifiableProperty, value: &Value) -> bool {
    match prop {
        ModifiableProperty::ReplicationFactor => {
            if value.is_null() {
                props.set_replication_factor(None);
                return true;
            }
            match parse_count(value) {
                Some(count) => {
                    props.set_replication_factor(Some(count));
                    true
                }
                None => false,
            }
        }
        ModifiableProperty::ConfigName => match value {
            Value::Null => {
                props.config_name = None;
                true
            }
            Value::String(name) => {
                props.config_name = Some(name.clone());
                true
            }
            _ => false,
        },
        ModifiableProperty::ReadOnly => {
            props.read_only = if value.is_null() {
                None
            } else {
                Some(parse_bool(value))
            };
            true
        }
        ModifiableProperty::PerReplicaState => false,
    }
}

/// Anything but a literal `true` reads as false
fn parse_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

fn parse_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{PrsState, ReplicaState, Router};
    use crate::message::OverseerAction;
    use crate::prs_ops::PrsOp;
    use crate::storage::{MemoryPrsStore, StoreError};

    const FILMS_PATH: &str = "/collections/films/state.json";

    fn replica(name: &str, shard: &str, state: ReplicaState, leader: bool) -> Replica {
        let replica = Replica::new(
            name,
            shard,
            "films",
            format!("{}:8983_solr", name),
            format!("films_{}_{}", shard, name),
        );
        let replica = replica::set_state(&replica, state);
        if leader {
            replica::set_leader(&replica)
        } else {
            replica
        }
    }

    fn shard(id: &str, range: &str, replicas: Vec<Replica>) -> Shard {
        let props = ShardProps {
            range: Some(range.parse().unwrap()),
            ..Default::default()
        };
        replicas
            .into_iter()
            .fold(Shard::new(id, "films", IndexMap::new(), props), |s, r| s.copy_with(r))
    }

    fn films(per_replica_state: bool) -> Collection {
        let mut shards = IndexMap::new();
        shards.insert(
            "shard1".to_string(),
            Arc::new(shard(
                "shard1",
                "80000000-ffffffff",
                vec![
                    replica("core_node1", "shard1", ReplicaState::Down, false),
                    replica("core_node2", "shard1", ReplicaState::Active, true),
                ],
            )),
        );
        shards.insert(
            "shard2".to_string(),
            Arc::new(shard(
                "shard2",
                "00000000-7fffffff",
                vec![replica("core_node3", "shard2", ReplicaState::Active, true)],
            )),
        );
        let props = CollectionProps::new()
            .with_replication_factor(2)
            .with_config_name("films_conf")
            .with_per_replica_state(per_replica_state);
        Collection::new("films", shards, props, Router::default(), 12)
    }

    fn topology() -> ClusterTopology {
        ClusterTopology::new().with_collection(films(false))
    }

    fn mutator() -> (CollectionMutator, Arc<MemoryPrsStore>) {
        let store = Arc::new(MemoryPrsStore::new());
        let mutator = CollectionMutator::new(ClusterConfig::default(), store.clone());
        (mutator, store)
    }

    fn message(collection: &str) -> Message {
        Message::new().with(COLLECTION_PROP, collection)
    }

    struct FailingFetcher;

    impl PerReplicaStatesFetcher for FailingFetcher {
        fn fetch(&self, path: &str) -> std::result::Result<PerReplicaStates, StoreError> {
            Err(StoreError::Unavailable(format!("session expired reading {}", path)))
        }
    }

    // ==================== createshard ====================

    #[test]
    fn test_create_shard_on_empty_collection() {
        let (mutator, _) = mutator();
        let empty = Collection::new("films", IndexMap::new(), CollectionProps::new(), Router::default(), 0);
        let topology = ClusterTopology::new().with_collection(empty);
        let msg = Message::for_action(OverseerAction::CreateShard)
            .with(COLLECTION_PROP, "films")
            .with(SHARD_ID_PROP, "shard1")
            .with(SHARD_RANGE_PROP, "80000000-ffffffff")
            .with(SHARD_STATE_PROP, "active");

        let cmd = mutator.create_shard(&topology, &msg);

        assert_eq!(cmd.name(), Some("films"));
        assert!(cmd.ops().is_none());
        let shard = cmd.collection().unwrap().shard("shard1").unwrap();
        assert_eq!(shard.range().unwrap().to_string(), "80000000-ffffffff");
        assert_eq!(shard.state(), ShardState::Active);
        assert!(shard.replicas().is_empty());
        assert!(shard.parent().is_none());
        assert_eq!(shard.collection(), "films");
    }

    #[test]
    fn test_create_shard_with_parent_linkage() {
        let (mutator, _) = mutator();
        let msg = message("films")
            .with(SHARD_ID_PROP, "shard1_0")
            .with(SHARD_RANGE_PROP, "80000000-bfffffff")
            .with(SHARD_STATE_PROP, "construction")
            .with(SHARD_PARENT_PROP, "shard1")
            .with(SHARD_PARENT_ZK_SESSION_PROP, "72057594037927936")
            .with(SHARD_PARENT_NODE_PROP, "core_node2:8983_solr");

        let cmd = mutator.create_shard(&topology(), &msg);

        let coll = cmd.collection().unwrap();
        let ids: Vec<_> = coll.shards().keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["shard1", "shard2", "shard1_0"]);
        let created = coll.shard("shard1_0").unwrap();
        assert_eq!(created.state(), ShardState::Construction);
        assert_eq!(created.props().parent.as_deref(), Some("shard1"));
        assert_eq!(created.props().parent_zk_session.as_deref(), Some("72057594037927936"));
        assert_eq!(created.props().parent_node.as_deref(), Some("core_node2:8983_solr"));
        // untouched shards are shared with the snapshot
        let before = topology();
        assert_eq!(coll.shard("shard1"), before.collection("films").unwrap().shard("shard1"));
    }

    #[test]
    fn test_create_shard_defaults_state_to_active() {
        let (mutator, _) = mutator();
        let msg = message("films").with(SHARD_ID_PROP, "shard3");

        let cmd = mutator.create_shard(&topology(), &msg);

        let created = cmd.collection().unwrap().shard("shard3").unwrap();
        assert_eq!(created.state(), ShardState::Active);
        assert!(created.range().is_none());
    }

    #[test]
    fn test_create_existing_shard_is_rejected() {
        let (mutator, _) = mutator();
        let topology = topology();
        let before = serde_json::to_string(&topology).unwrap();
        let msg = message("films")
            .with(SHARD_ID_PROP, "shard1")
            .with(SHARD_RANGE_PROP, "80000000-ffffffff")
            .with(SHARD_STATE_PROP, "active");

        let cmd = mutator.create_shard(&topology, &msg);

        assert!(cmd.is_noop());
        assert_eq!(serde_json::to_string(&topology.apply(&cmd)).unwrap(), before);
    }

    #[test]
    fn test_create_shard_rejects_malformed_fields() {
        let (mutator, _) = mutator();
        let topology = topology();

        let missing_id = message("films").with(SHARD_RANGE_PROP, "80000000-ffffffff");
        assert!(mutator.create_shard(&topology, &missing_id).is_noop());

        let bad_range = message("films").with(SHARD_ID_PROP, "shard3").with(SHARD_RANGE_PROP, "north-south");
        assert!(mutator.create_shard(&topology, &bad_range).is_noop());

        let bad_state = message("films").with(SHARD_ID_PROP, "shard3").with(SHARD_STATE_PROP, "sleeping");
        assert!(mutator.create_shard(&topology, &bad_state).is_noop());
    }

    // ==================== collection validation ====================

    #[test]
    fn test_blank_collection_is_noop_for_every_operation() {
        let (mutator, _) = mutator();
        let topology = topology();
        for msg in [
            Message::new().with(COLLECTION_PROP, "").with(SHARD_ID_PROP, "shard9"),
            Message::new().with(SHARD_ID_PROP, "shard9"),
            Message::new().with(COLLECTION_PROP, "  ").with("replicationFactor", 3),
        ] {
            assert!(mutator.create_shard(&topology, &msg).is_noop());
            assert!(mutator.delete_shard(&topology, &msg).is_noop());
            assert!(mutator.modify_collection(&topology, &msg).unwrap().is_noop());
        }
    }

    #[test]
    fn test_unknown_collection_is_noop() {
        let (mutator, _) = mutator();
        let msg = message("books").with(SHARD_ID_PROP, "shard1").with("replicationFactor", 3);

        assert!(mutator.create_shard(&topology(), &msg).is_noop());
        assert!(mutator.delete_shard(&topology(), &msg).is_noop());
        assert!(mutator.modify_collection(&topology(), &msg).unwrap().is_noop());
    }

    // ==================== deleteshard ====================

    #[test]
    fn test_delete_shard() {
        let (mutator, _) = mutator();
        let msg = message("films").with(SHARD_ID_PROP, "shard1");

        let cmd = mutator.delete_shard(&topology(), &msg);

        let coll = cmd.collection().unwrap();
        assert!(coll.shard("shard1").is_none());
        assert!(coll.shard("shard2").is_some());
        assert_eq!(coll.znode_version(), 12);
        assert_eq!(coll.props(), topology().collection("films").unwrap().props());
    }

    #[test]
    fn test_delete_missing_shard_is_idempotent() {
        let (mutator, _) = mutator();
        let msg = message("films").with(SHARD_ID_PROP, "shard9");

        let once = topology().apply(&mutator.delete_shard(&topology(), &msg));
        let cmd = mutator.delete_shard(&once, &msg);
        assert!(!cmd.is_noop());
        let twice = once.apply(&cmd);

        assert_eq!(once.collection("films"), twice.collection("films"));
        assert_eq!(once.collection("films"), topology().collection("films"));
    }

    // ==================== modifycollection ====================

    #[test]
    fn test_replication_factor_keeps_nrt_replicas_in_sync() {
        let (mutator, _) = mutator();
        let topology = topology();
        let values = [Value::from(1), Value::from(3), Value::from("5"), Value::from(" 7 ")];
        for (value, expected) in values.into_iter().zip([1, 3, 5, 7]) {
            let msg = message("films").with("replicationFactor", value);
            let cmd = mutator.modify_collection(&topology, &msg).unwrap();
            let props = cmd.collection().unwrap().props();
            assert_eq!(props.replication_factor(), Some(expected));
            assert_eq!(props.nrt_replicas(), Some(expected));
        }
    }

    #[test]
    fn test_null_replication_factor_clears_both() {
        let (mutator, _) = mutator();
        let msg = message("films").with_null("replicationFactor");

        let cmd = mutator.modify_collection(&topology(), &msg).unwrap();

        let props = cmd.collection().unwrap().props();
        assert_eq!(props.replication_factor(), None);
        assert_eq!(props.nrt_replicas(), None);
    }

    #[test]
    fn test_invalid_replication_factor_is_skipped() {
        let (mutator, _) = mutator();
        let msg = message("films").with("replicationFactor", "three");
        assert!(mutator.modify_collection(&topology(), &msg).unwrap().is_noop());

        let msg = message("films").with("replicationFactor", -1).with("readOnly", true);
        let cmd = mutator.modify_collection(&topology(), &msg).unwrap();
        let props = cmd.collection().unwrap().props();
        assert_eq!(props.replication_factor(), Some(2));
        assert_eq!(props.read_only, Some(true));
    }

    #[test]
    fn test_config_name_is_renamed() {
        let (mutator, _) = mutator();
        let msg = message("films").with("collection.configName", "films_conf_v2");

        let cmd = mutator.modify_collection(&topology(), &msg).unwrap();
        let props = cmd.collection().unwrap().props();
        assert_eq!(props.config_name.as_deref(), Some("films_conf_v2"));
        assert!(props.aux.is_empty());
        assert!(props.other.is_empty());

        let json = serde_json::to_value(topology().apply(&cmd)).unwrap();
        assert_eq!(json["films"]["configName"], "films_conf_v2");
        assert!(json["films"].get("collection.configName").is_none());
    }

    #[test]
    fn test_null_removes_properties() {
        let (mutator, _) = mutator();
        let msg = message("films").with_null("collection.configName").with_null("readOnly");

        let cmd = mutator.modify_collection(&topology(), &msg).unwrap();

        let props = cmd.collection().unwrap().props();
        assert_eq!(props.config_name, None);
        assert_eq!(props.read_only, None);
    }

    #[test]
    fn test_aux_properties_add_and_remove() {
        let (mutator, _) = mutator();
        let added = mutator
            .modify_collection(&topology(), &message("films").with("property.owner", "catalog"))
            .unwrap();
        let topology = topology().apply(&added);
        assert_eq!(
            topology.collection("films").unwrap().props().aux.get("property.owner"),
            Some(&Value::from("catalog"))
        );

        let removed = mutator
            .modify_collection(&topology, &message("films").with_null("property.owner"))
            .unwrap();
        assert!(removed.collection().unwrap().props().aux.is_empty());
    }

    #[test]
    fn test_modify_preserves_shards_router_and_version() {
        let (mutator, _) = mutator();
        let msg = message("films").with("readOnly", "true");

        let cmd = mutator.modify_collection(&topology(), &msg).unwrap();

        let coll = cmd.collection().unwrap();
        let before = topology();
        let original = before.collection("films").unwrap();
        assert_eq!(coll.shards(), original.shards());
        assert_eq!(coll.router(), original.router());
        assert_eq!(coll.znode_version(), original.znode_version());
        assert_eq!(coll.props().read_only, Some(true));
    }

    #[test]
    fn test_modify_without_properties_is_noop() {
        let (mutator, _) = mutator();
        let msg = message("films").with("maxShardsPerNode", 4).with(SHARD_ID_PROP, "shard1");
        assert!(mutator.modify_collection(&topology(), &msg).unwrap().is_noop());
    }

    // ==================== per-replica state ====================

    #[test]
    fn test_enable_prs_when_already_enabled() {
        let (mutator, store) = mutator();
        let topology = ClusterTopology::new().with_collection(films(true));

        let only_prs = message("films").with("perReplicaState", "true");
        assert!(mutator.modify_collection(&topology, &only_prs).unwrap().is_noop());

        let with_rf = message("films").with("perReplicaState", true).with("replicationFactor", 3);
        let cmd = mutator.modify_collection(&topology, &with_rf).unwrap();
        let write = cmd.as_write().unwrap();
        assert!(write.ops.is_none());
        assert!(!write.persist_collection_state);
        assert!(cmd.collection().unwrap().is_per_replica_state());
        assert_eq!(cmd.collection().unwrap().props().replication_factor(), Some(3));
        assert!(store.entries(FILMS_PATH).is_empty());
    }

    #[test]
    fn test_enable_prs() {
        let (mutator, _) = mutator();
        let msg = message("films").with("perReplicaState", "true");

        let cmd = mutator.modify_collection(&topology(), &msg).unwrap();

        let write = cmd.as_write().unwrap();
        assert!(write.persist_collection_state);
        let ops = write.ops.as_ref().unwrap();
        assert_eq!(ops.path(), FILMS_PATH);
        assert_eq!(ops.len(), 3);
        assert_eq!(
            ops.ops()[1],
            PrsOp::Add(PrsState::new("core_node2", 0, ReplicaState::Active, true))
        );
        assert!(cmd.collection().unwrap().is_per_replica_state());
    }

    #[test]
    fn test_disable_prs_reconciles_replicas() {
        let (mutator, store) = mutator();
        let topology = ClusterTopology::new().with_collection(films(true));
        store.put_states(
            FILMS_PATH,
            &[
                PrsState::new("core_node1", 4, ReplicaState::Active, true),
                PrsState::new("core_node2", 2, ReplicaState::Recovering, false),
                PrsState::new("core_node3", 1, ReplicaState::Active, true),
            ],
        );
        let msg = message("films").with("perReplicaState", false);

        let cmd = mutator.modify_collection(&topology, &msg).unwrap();

        let coll = cmd.collection().unwrap();
        assert!(!coll.is_per_replica_state());
        let node1 = coll.replica("core_node1").unwrap();
        assert_eq!(node1.state(), ReplicaState::Active);
        assert!(node1.is_leader());
        let node2 = coll.replica("core_node2").unwrap();
        assert_eq!(node2.state(), ReplicaState::Recovering);
        assert!(!node2.is_leader());
        // shard2 already matched
        assert!(Arc::ptr_eq(
            coll.shard("shard2").unwrap(),
            topology.collection("films").unwrap().shard("shard2").unwrap()
        ));

        let write = cmd.as_write().unwrap();
        assert!(write.persist_collection_state);
        let ops = write.ops.as_ref().unwrap();
        assert_eq!(ops.len(), 3);
        assert!(ops.ops().iter().all(|op| matches!(op, PrsOp::Delete(_))));
    }

    #[test]
    fn test_prs_fetch_error_propagates() {
        let mutator = CollectionMutator::new(ClusterConfig::default(), Arc::new(FailingFetcher));
        let msg = message("films").with("perReplicaState", true);

        let result = mutator.modify_collection(&topology(), &msg);

        assert!(matches!(
            result,
            Err(crate::error::OverseerError::Store(StoreError::Unavailable(_)))
        ));
    }

    #[test]
    fn test_enable_prs_with_exhausted_version_fails() {
        let (mutator, store) = mutator();
        store.put_states(
            FILMS_PATH,
            &[PrsState::new("core_node1", i32::MAX, ReplicaState::Active, false)],
        );
        let msg = message("films").with("perReplicaState", true);

        let result = mutator.modify_collection(&topology(), &msg);

        assert!(matches!(
            result,
            Err(crate::error::OverseerError::Store(StoreError::Corrupt(_)))
        ));
    }

    #[test]
    fn test_fetch_uses_configured_state_path() {
        let store = Arc::new(MemoryPrsStore::new());
        let cluster = ClusterConfig {
            collections_root: "/solr/collections".to_string(),
            ..Default::default()
        };
        let mutator = CollectionMutator::new(cluster, store);

        let cmd = mutator
            .modify_collection(&topology(), &message("films").with("perReplicaState", true))
            .unwrap();

        assert_eq!(cmd.ops().unwrap().path(), "/solr/collections/films/state.json");
    }

    // ==================== updateReplicas / updateSlice ====================

    #[test]
    fn test_update_replicas_touches_only_mismatched_replica() {
        let coll = Arc::new(films(true));
        let prs = PerReplicaStates::from_entries(
            FILMS_PATH,
            1,
            ["core_node1:3:A:L", "core_node2:1:A:L", "core_node3:0:A:L"],
        )
        .unwrap();

        let updated = CollectionMutator::update_replicas(&coll, &prs);

        assert!(!Arc::ptr_eq(&updated, &coll));
        let node1 = updated.replica("core_node1").unwrap();
        assert_eq!(node1.state(), ReplicaState::Active);
        assert!(node1.is_leader());
        assert!(Arc::ptr_eq(
            updated.replica("core_node2").unwrap(),
            coll.replica("core_node2").unwrap()
        ));
        assert!(Arc::ptr_eq(updated.shard("shard2").unwrap(), coll.shard("shard2").unwrap()));
        assert_eq!(coll.replica("core_node1").unwrap().state(), ReplicaState::Down);
    }

    #[test]
    fn test_update_replicas_stages_shard_once() {
        let coll = Arc::new(films(true));
        let prs = PerReplicaStates::from_entries(FILMS_PATH, 1, ["core_node1:3:R", "core_node2:5:D"]).unwrap();

        let updated = CollectionMutator::update_replicas(&coll, &prs);

        let shard1 = updated.shard("shard1").unwrap();
        assert_eq!(shard1.replicas().len(), 2);
        assert_eq!(shard1.replica("core_node1").unwrap().state(), ReplicaState::Recovering);
        let node2 = shard1.replica("core_node2").unwrap();
        assert_eq!(node2.state(), ReplicaState::Down);
        assert!(!node2.is_leader());
        assert!(shard1.leader().is_none());
    }

    #[test]
    fn test_update_replicas_without_changes_returns_same_collection() {
        let coll = Arc::new(films(true));
        let prs = PerReplicaStates::from_entries(FILMS_PATH, 1, ["core_node2:1:A:L", "core_node9:0:A"]).unwrap();

        let updated = CollectionMutator::update_replicas(&coll, &prs);

        assert!(Arc::ptr_eq(&updated, &coll));
    }

    #[test]
    fn test_update_slice_round_trip() {
        let coll = films(false);
        let new_shard = shard(
            "shard1",
            "80000000-ffffffff",
            vec![replica("core_node7", "shard1", ReplicaState::Recovering, false)],
        );

        let updated = CollectionMutator::update_slice("films", &coll, new_shard.clone());

        assert_eq!(updated.shard("shard1").map(|s| s.as_ref()), Some(&new_shard));
        assert_eq!(updated.shards().get_index_of("shard1"), Some(0));
        assert_eq!(coll.shard("shard1").unwrap().replicas().len(), 2);
    }
}
