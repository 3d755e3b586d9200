//! Elementary replica transitions
//!
//! Each function returns a new replica and leaves its input alone.

use crate::metadata::{Replica, ReplicaState};

/// Replica with a new lifecycle state
pub fn set_state(replica: &Replica, state: ReplicaState) -> Replica {
    Replica {
        state,
        ..replica.clone()
    }
}

/// Replica marked as shard leader
pub fn set_leader(replica: &Replica) -> Replica {
    Replica {
        leader: true,
        ..replica.clone()
    }
}

/// Replica with the leader mark removed
pub fn unset_leader(replica: &Replica) -> Replica {
    Replica {
        leader: false,
        ..replica.clone()
    }
}
