//! Overseer errors
//!
//! Malformed or conflicting commands are not errors: they come back as
//! `WriteCommand::NoOp`. Only failures the caller must act on live here.

use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum OverseerError {
    /// Reading per-replica state failed; the caller decides whether to retry
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

pub type Result<T> = std::result::Result<T, OverseerError>;
