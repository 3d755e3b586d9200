//! Overseer - cluster state mutation engine
//!
//! Turns one command message, applied to an immutable cluster topology
//! snapshot, into the write that produces the next snapshot (or a no-op).
//!
//! # Features
//! - Shard creation and removal
//! - Collection property changes (replication factor, configset, read-only,
//!   free-form `property.*` keys)
//! - Switching per-replica state mode on and off
//!
//! Persisting the write (version check, retry on conflict) is left to the
//! caller.
//!
//! # Usage Example
//! ```ignore
//! use overseer::{Overseer, OverseerConfig, MemoryPrsStore};
//!
//! let overseer = Overseer::new(OverseerConfig::default(), Arc::new(MemoryPrsStore::new()));
//! let cmd = overseer.process_message(&topology, &message)?;
//! let next = topology.apply(&cmd);
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod metadata;
pub mod mutator;
pub mod prs_ops;
pub mod storage;
pub mod write_command;

// Re-export commonly used types
pub use config::{ClusterConfig, ConfigError, LogConfig, OverseerConfig};
pub use error::{OverseerError, Result};
pub use message::{Message, OverseerAction};
pub use metadata::ClusterTopology;
pub use mutator::CollectionMutator;
pub use storage::{MemoryPrsStore, PerReplicaStatesFetcher, StoreError};
pub use write_command::{CollectionWrite, WriteCommand};

use std::sync::Arc;

use tracing::{debug, info};

/// Command dispatcher
///
/// Stateless apart from its configuration and store handle, so one instance
/// can serve several collections concurrently.
pub struct Overseer {
    config: OverseerConfig,
    collection_mutator: CollectionMutator,
}

impl Overseer {
    /// Create overseer
    pub fn new(config: OverseerConfig, fetcher: Arc<dyn PerReplicaStatesFetcher>) -> Self {
        let collection_mutator = CollectionMutator::new(config.cluster.clone(), fetcher);
        info!(
            "Overseer initialized: collections_root={}",
            config.cluster.collections_root
        );
        Self {
            config,
            collection_mutator,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &OverseerConfig {
        &self.config
    }

    /// Get collection mutator
    pub fn collection_mutator(&self) -> &CollectionMutator {
        &self.collection_mutator
    }

    /// Compute the write for one message
    ///
    /// A missing or unrecognized `operation` is an error; everything wrong
    /// with the rest of the message degrades to `WriteCommand::NoOp`.
    pub fn process_message(&self, topology: &ClusterTopology, message: &Message) -> Result<WriteCommand> {
        let action = match message.action() {
            Some(Ok(action)) => action,
            Some(Err(op)) => return Err(OverseerError::UnknownOperation(op)),
            None => return Err(OverseerError::UnknownOperation(String::new())),
        };

        let cmd = match action {
            OverseerAction::CreateShard => self.collection_mutator.create_shard(topology, message),
            OverseerAction::DeleteShard => self.collection_mutator.delete_shard(topology, message),
            OverseerAction::ModifyCollection => {
                self.collection_mutator.modify_collection(topology, message)?
            }
        };

        match cmd.name() {
            Some(name) => debug!("{} produced a write for collection {}", action, name),
            None => info!("{} ignored: {}", action, message),
        }
        Ok(cmd)
    }
}
