//! Group event types
//!
//! The engine records one event per group mutation. Hosts drain them after
//! each call to decide which parts of the UI to refresh.

use crate::ids::{GroupId, ItemId};
use serde::{Deserialize, Serialize};

/// Board group event types
///
/// Serialized with a `type` tag so hosts can forward them as-is to UI code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GroupEvent {
    /// Group formed from an explicit selection
    GroupCreated {
        group_id: GroupId,
        members: Vec<ItemId>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Group membership, order or derived name changed during repair
    GroupUpdated {
        group_id: GroupId,
        members: Vec<ItemId>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Items inserted inside the group's range were absorbed
    ///
    /// Always preceded by a `GroupUpdated` for the same group.
    GroupExpanded {
        group_id: GroupId,
        absorbed: Vec<ItemId>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Group no longer exists
    GroupRemoved {
        group_id: GroupId,
        reason: RemovalReason,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Display name changed by an explicit rename or reset
    GroupRenamed {
        group_id: GroupId,
        name: String,
        is_renamed: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Item added at a group boundary
    MemberJoined {
        group_id: GroupId,
        item_id: ItemId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Item removed from a group
    MemberLeft {
        group_id: GroupId,
        item_id: ItemId,
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl GroupEvent {
    /// Group the event refers to
    pub fn group_id(&self) -> GroupId {
        match self {
            GroupEvent::GroupCreated { group_id, .. }
            | GroupEvent::GroupUpdated { group_id, .. }
            | GroupEvent::GroupExpanded { group_id, .. }
            | GroupEvent::GroupRemoved { group_id, .. }
            | GroupEvent::GroupRenamed { group_id, .. }
            | GroupEvent::MemberJoined { group_id, .. }
            | GroupEvent::MemberLeft { group_id, .. } => *group_id,
        }
    }
}

/// Why a group was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum RemovalReason {
    /// Every member item was deleted from the sequence
    Emptied,
    /// Fewer than two members remained
    Underflow,
    /// Longest surviving run after a move-out was a single item
    Fragmented,
    /// Members were claimed by a newly created group
    Superseded,
    /// Deleted on request
    Explicit,
}

impl std::fmt::Display for RemovalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemovalReason::Emptied => write!(f, "Emptied"),
            RemovalReason::Underflow => write!(f, "Underflow"),
            RemovalReason::Fragmented => write!(f, "Fragmented"),
            RemovalReason::Superseded => write!(f, "Superseded"),
            RemovalReason::Explicit => write!(f, "Explicit"),
        }
    }
}
