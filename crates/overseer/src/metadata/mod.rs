//! Cluster topology definitions
//!
//! Immutable value types for the collection → shard → replica tree, plus the
//! per-replica state records kept outside the collection document

mod cluster;
mod collection;
mod per_replica;
mod replica;
mod shard;

pub use cluster::ClusterTopology;
pub use collection::{Collection, CollectionProps, Router, PROPERTY_PREFIX};
pub use per_replica::{PerReplicaStates, PrsState};
pub use replica::{Replica, ReplicaState, ReplicaType};
pub use shard::{HashRange, Shard, ShardId, ShardProps, ShardState};
