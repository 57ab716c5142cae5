//! Identifier types
//!
//! Items (storyboard panels) carry a host-assigned opaque token that survives
//! reordering. Groups carry an engine-assigned UUIDv4.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 0-based index of an item in the host sequence
pub type Position = usize;

/// Stable identifier of a host item
///
/// Opaque to the engine: only equality and hashing are used.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Engine-assigned group identifier, unique for the process lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(Uuid);

impl GroupId {
    /// Generate a new random group id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a group id from its hyphenated string form
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        Uuid::parse_str(s).map(Self)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl From<Uuid> for GroupId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_serializes_as_plain_string() {
        let id = ItemId::from("k3x9");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"k3x9\"");
        let back: ItemId = serde_json::from_str("\"k3x9\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_group_ids_are_unique() {
        let a = GroupId::generate();
        let b = GroupId::generate();
        assert_ne!(a, b);
    }

    #[test]
    fn test_group_id_parse_matches_display() {
        let id = GroupId::generate();
        let parsed = GroupId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(GroupId::parse("not-a-uuid").is_err());
    }
}
