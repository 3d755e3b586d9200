//! State mutators
//!
//! Pure functions from (snapshot, message) to a write command

mod collection;
pub mod replica;

pub use collection::{CollectionMutator, ModifiableProperty};
