//! Snapshot Codec
//!
//! Flat JSON form of the group store, for host persistence and undo history.
//! The engine keeps no derived state outside the group records, so a round
//! trip is exact.
//!
//! Decoded groups are not validated against any sequence: the host must
//! reconcile once after restoring before relying on adjacency.

use crate::error::Result;
use crate::group::{Group, GroupPayload};
use bgm_common::{GroupId, ItemId};
use serde::{Deserialize, Serialize};

/// Persisted form of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: GroupId,
    pub name: String,
    #[serde(default)]
    pub original_name: String,
    pub member_ids: Vec<ItemId>,
    pub color: String,
    #[serde(default)]
    pub is_renamed: bool,
    #[serde(default)]
    pub payload: GroupPayload,
}

impl From<&Group> for GroupRecord {
    fn from(group: &Group) -> Self {
        Self {
            id: group.id(),
            name: group.name().to_string(),
            original_name: group.original_name().to_string(),
            member_ids: group.members().to_vec(),
            color: group.color().to_string(),
            is_renamed: group.is_renamed(),
            payload: group.payload().clone(),
        }
    }
}

impl From<GroupRecord> for Group {
    fn from(record: GroupRecord) -> Self {
        Group::from_parts(
            record.id,
            record.name,
            record.original_name,
            record.member_ids,
            record.color,
            record.is_renamed,
            record.payload,
        )
    }
}

/// Encode groups as a JSON array of records
pub fn serialize(groups: &[Group]) -> Result<Vec<u8>> {
    let records: Vec<GroupRecord> = groups.iter().map(GroupRecord::from).collect();
    Ok(serde_json::to_vec(&records)?)
}

/// Decode groups from a JSON array of records
///
/// Repeated member identifiers within a record are dropped.
pub fn deserialize(bytes: &[u8]) -> Result<Vec<Group>> {
    let records: Vec<GroupRecord> = serde_json::from_slice(bytes)?;
    Ok(records.into_iter().map(Group::from).collect())
}
