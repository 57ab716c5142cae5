//! Group record
//!
//! A group tracks its members by identifier, never by position. `color` and
//! `payload` (timing, FPS, duration and similar per-shot settings) are opaque
//! and copied verbatim through reconcile and snapshot.

use bgm_common::{GroupId, ItemId, Position};
use std::collections::HashSet;

/// Opaque per-group settings owned by the host
pub type GroupPayload = serde_json::Map<String, serde_json::Value>;

/// Named group of contiguous items
#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    id: GroupId,
    name: String,
    original_name: String,
    members: Vec<ItemId>,
    color: String,
    is_renamed: bool,
    payload: GroupPayload,
}

impl Group {
    /// New group with an empty derived name; the engine names it on commit
    pub(crate) fn new(id: GroupId, members: Vec<ItemId>, color: String) -> Self {
        Self {
            id,
            name: String::new(),
            original_name: String::new(),
            members: dedup_members(members),
            color,
            is_renamed: false,
            payload: GroupPayload::new(),
        }
    }

    /// Rebuild a group from persisted fields
    pub fn from_parts(
        id: GroupId,
        name: String,
        original_name: String,
        members: Vec<ItemId>,
        color: String,
        is_renamed: bool,
        payload: GroupPayload,
    ) -> Self {
        Self {
            id,
            name,
            original_name,
            members: dedup_members(members),
            color,
            is_renamed,
            payload,
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest derived default name
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Member identifiers, sorted by position after a reconcile
    pub fn members(&self) -> &[ItemId] {
        &self.members
    }

    pub fn color(&self) -> &str {
        &self.color
    }

    pub fn is_renamed(&self) -> bool {
        self.is_renamed
    }

    pub fn payload(&self) -> &GroupPayload {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.members.contains(id)
    }

    /// Replace the member list, dropping repeats
    pub(crate) fn set_members(&mut self, members: Vec<ItemId>) {
        self.members = dedup_members(members);
    }

    pub(crate) fn remove_member(&mut self, id: &ItemId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != id);
        self.members.len() != before
    }

    /// Store a freshly derived default name
    ///
    /// The display name follows it unless the group was renamed by hand.
    /// Returns true if anything changed.
    pub(crate) fn refresh_name(&mut self, derived: String) -> bool {
        let mut changed = false;
        if !self.is_renamed && self.name != derived {
            self.name = derived.clone();
            changed = true;
        }
        if self.original_name != derived {
            self.original_name = derived;
            changed = true;
        }
        changed
    }

    pub(crate) fn rename(&mut self, name: String) {
        self.name = name;
        self.is_renamed = true;
    }

    /// Drop the manual name and go back to the derived one
    pub(crate) fn reset_name(&mut self) {
        self.name = self.original_name.clone();
        self.is_renamed = false;
    }

    pub(crate) fn set_color(&mut self, color: String) {
        self.color = color;
    }

    pub(crate) fn set_payload(&mut self, payload: GroupPayload) {
        self.payload = payload;
    }
}

/// Render a default group name
///
/// `first` and `last` are 0-based positions; the template sees them 1-based.
pub fn derive_name(template: &str, first: Position, last: Position, count: usize) -> String {
    template
        .replace("{first}", &(first + 1).to_string())
        .replace("{last}", &(last + 1).to_string())
        .replace("{count}", &count.to_string())
}

fn dedup_members(members: Vec<ItemId>) -> Vec<ItemId> {
    let mut seen = HashSet::with_capacity(members.len());
    members.into_iter().filter(|m| seen.insert(m.clone())).collect()
}
