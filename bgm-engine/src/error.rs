//! Error types for bgm-engine
//!
//! Every error indicates caller/host desynchronization or an invalid request.
//! Reconciliation itself has no error channel.

use bgm_common::{GroupId, ItemId, Position};
use thiserror::Error;

/// Main error type for the group engine
#[derive(Error, Debug)]
pub enum Error {
    /// Fewer than two distinct items selected for a new group
    #[error("Invalid selection: a group needs at least 2 items, got {count}")]
    InvalidSelection { count: usize },

    /// Identifier does not resolve to an item in the current sequence
    #[error("Unknown item: {0}")]
    UnknownItem(ItemId),

    /// Selected items are not contiguous in the current sequence
    #[error("Selection is not adjacent: positions {positions:?}")]
    NonAdjacentSelection { positions: Vec<Position> },

    /// No item exists at the requested position
    #[error("No item at position {0}")]
    NoItemAtPosition(Position),

    /// Operation on a group id that is not in the store
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),

    /// Group snapshot could not be encoded or decoded
    #[error("Snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// Configuration or I/O error from the common layer
    #[error(transparent)]
    Common(#[from] bgm_common::Error),
}

/// Convenience Result type using bgm-engine Error
pub type Result<T> = std::result::Result<T, Error>;
