//! Per-replica state records
//!
//! When a collection runs with per-replica state, every replica's state lives
//! in its own child entry under the collection's state document instead of in
//! the document itself. Each child is named `replica:version:state[:L]`.

use indexmap::IndexMap;

use super::replica::ReplicaState;
use crate::storage::StoreError;

/// Leader marker suffix
const LEADER_MARKER: &str = "L";

/// State of one replica as recorded in its own entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrsState {
    /// Replica name
    pub replica: String,
    /// Entry version, bumped on every rewrite
    pub version: i32,
    pub state: ReplicaState,
    pub leader: bool,
}

impl PrsState {
    pub fn new(replica: impl Into<String>, version: i32, state: ReplicaState, leader: bool) -> Self {
        Self {
            replica: replica.into(),
            version,
            state,
            leader,
        }
    }

    /// Encoded child entry name
    pub fn as_entry(&self) -> String {
        if self.leader {
            format!(
                "{}:{}:{}:{}",
                self.replica,
                self.version,
                self.state.short_code(),
                LEADER_MARKER
            )
        } else {
            format!("{}:{}:{}", self.replica, self.version, self.state.short_code())
        }
    }

    /// Decode a child entry name
    pub fn parse(entry: &str) -> Result<Self, StoreError> {
        let corrupt = || StoreError::Corrupt(entry.to_string());
        let parts: Vec<&str> = entry.split(':').collect();
        if parts.len() < 3 || parts.len() > 4 || parts[0].is_empty() {
            return Err(corrupt());
        }
        let version = parts[1].parse::<i32>().map_err(|_| corrupt())?;
        let state = ReplicaState::from_short_code(parts[2]).ok_or_else(corrupt)?;
        let leader = match parts.get(3) {
            None => false,
            Some(&LEADER_MARKER) => true,
            Some(_) => return Err(corrupt()),
        };
        Ok(Self::new(parts[0], version, state, leader))
    }
}

impl std::fmt::Display for PrsState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_entry())
    }
}

/// Per-replica state record of one collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PerReplicaStates {
    /// Location of the collection's state document
    pub path: String,
    /// Child version of the state document
    pub cversion: i32,
    states: IndexMap<String, PrsState>,
    /// Older entries for replicas that also have a newer one
    duplicates: Vec<PrsState>,
}

impl PerReplicaStates {
    /// Empty record
    pub fn empty(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    /// Build a record from child entry names
    ///
    /// When a replica has several entries the highest version wins; the
    /// others are kept as duplicates so they can be cleaned up.
    pub fn from_entries<'a, I>(path: impl Into<String>, cversion: i32, entries: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut record = Self {
            path: path.into(),
            cversion,
            ..Default::default()
        };
        for entry in entries {
            record.insert(PrsState::parse(entry)?);
        }
        Ok(record)
    }

    fn insert(&mut self, state: PrsState) {
        match self.states.get(&state.replica) {
            Some(existing) if existing.version >= state.version => self.duplicates.push(state),
            Some(_) => {
                if let Some(older) = self.states.insert(state.replica.clone(), state) {
                    self.duplicates.push(older);
                }
            }
            None => {
                self.states.insert(state.replica.clone(), state);
            }
        }
    }

    pub fn get(&self, replica: &str) -> Option<&PrsState> {
        self.states.get(replica)
    }

    pub fn states(&self) -> impl Iterator<Item = &PrsState> {
        self.states.values()
    }

    pub fn duplicates(&self) -> &[PrsState] {
        &self.duplicates
    }

    /// Duplicates of one replica
    pub fn duplicates_of<'a>(&'a self, replica: &'a str) -> impl Iterator<Item = &'a PrsState> + 'a {
        self.duplicates.iter().filter(move |d| d.replica == replica)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// All entry names, current states first
    pub fn entries(&self) -> Vec<String> {
        self.states
            .values()
            .chain(self.duplicates.iter())
            .map(PrsState::as_entry)
            .collect()
    }
}
