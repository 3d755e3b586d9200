//! Overseer command messages
//!
//! A message is a flat map of string keys to scalar values. A key mapped to
//! `null` is present but explicitly empty ("remove this property").

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

/// Operation name key
pub const OPERATION: &str = "operation";
/// Collection name key
pub const COLLECTION_PROP: &str = "collection";
/// Shard id key
pub const SHARD_ID_PROP: &str = "shard";
/// Shard hash range key
pub const SHARD_RANGE_PROP: &str = "shard_range";
/// Shard lifecycle state key
pub const SHARD_STATE_PROP: &str = "shard_state";
/// Parent shard key (split-originated shards)
pub const SHARD_PARENT_PROP: &str = "shard_parent";
/// Parent leader's coordination session key
pub const SHARD_PARENT_ZK_SESSION_PROP: &str = "shard_parent_zk_session";
/// Parent leader's node key
pub const SHARD_PARENT_NODE_PROP: &str = "shard_parent_node";

/// Command message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Message {
    props: IndexMap<String, Value>,
}

impl Message {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message for an operation
    pub fn for_action(action: OverseerAction) -> Self {
        Self::new().with(OPERATION, action.to_string())
    }

    /// Add a key (builder)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.props.insert(key.into(), value.into());
        self
    }

    /// Add a key mapped to null (builder)
    pub fn with_null(mut self, key: impl Into<String>) -> Self {
        self.props.insert(key.into(), Value::Null);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.props.get(key)
    }

    /// Value of `key` as a string
    ///
    /// Numbers and booleans are rendered; null and structured values read as
    /// absent.
    pub fn get_str(&self, key: &str) -> Option<String> {
        match self.props.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.props.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.props.iter()
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Operation named by the message, if any
    pub fn action(&self) -> Option<Result<OverseerAction, String>> {
        self.get_str(OPERATION).map(|op| op.parse())
    }
}

impl std::fmt::Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match serde_json::to_string(&self.props) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.props),
        }
    }
}

impl From<IndexMap<String, Value>> for Message {
    fn from(props: IndexMap<String, Value>) -> Self {
        Self { props }
    }
}

/// Collection-level operations handled by the collection mutator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OverseerAction {
    CreateShard,
    DeleteShard,
    ModifyCollection,
}

impl std::fmt::Display for OverseerAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OverseerAction::CreateShard => write!(f, "createshard"),
            OverseerAction::DeleteShard => write!(f, "deleteshard"),
            OverseerAction::ModifyCollection => write!(f, "modifycollection"),
        }
    }
}

impl std::str::FromStr for OverseerAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "createshard" => Ok(OverseerAction::CreateShard),
            "deleteshard" => Ok(OverseerAction::DeleteShard),
            "modifycollection" => Ok(OverseerAction::ModifyCollection),
            other => Err(other.to_string()),
        }
    }
}

/// Check that `key` is present and not blank
///
/// Logs and returns false otherwise, so callers can turn the message into a
/// no-op.
pub fn check_key_existence(message: &Message, key: &str) -> bool {
    match message.get_str(key) {
        Some(value) if !value.trim().is_empty() => true,
        _ => {
            error!(
                "Skipping invalid Overseer message because it has no {} specified '{}'",
                key, message
            );
            false
        }
    }
}

pub fn check_collection_key_existence(message: &Message) -> bool {
    check_key_existence(message, COLLECTION_PROP)
}
