//! Group Store
//!
//! Ordered collection of group records keyed by id. Insertion order is kept
//! so reconcile processes groups deterministically.
//!
//! Duplicate members are impossible by construction: every `Group` write
//! path deduplicates. Existence, adjacency and underflow need the live
//! sequence and are left to the reconciler.

use crate::group::Group;
use bgm_common::{GroupId, ItemId};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupStore {
    groups: Vec<Group>,
}

impl GroupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: GroupId) -> Option<&Group> {
        self.groups.iter().find(|g| g.id() == id)
    }

    pub(crate) fn get_mut(&mut self, id: GroupId) -> Option<&mut Group> {
        self.groups.iter_mut().find(|g| g.id() == id)
    }

    /// All groups in insertion order
    pub fn all(&self) -> &[Group] {
        &self.groups
    }

    /// Insert or replace a group
    ///
    /// A replaced group keeps its slot in the ordering. Returns the previous
    /// record, if any.
    pub fn upsert(&mut self, group: Group) -> Option<Group> {
        match self.groups.iter().position(|g| g.id() == group.id()) {
            Some(idx) => Some(std::mem::replace(&mut self.groups[idx], group)),
            None => {
                self.groups.push(group);
                None
            }
        }
    }

    pub fn remove(&mut self, id: GroupId) -> Option<Group> {
        let idx = self.groups.iter().position(|g| g.id() == id)?;
        Some(self.groups.remove(idx))
    }

    /// Ids of every group listing `item` as a member
    pub fn groups_containing(&self, item: &ItemId) -> Vec<GroupId> {
        self.groups
            .iter()
            .filter(|g| g.contains(item))
            .map(Group::id)
            .collect()
    }

    /// Replace the whole collection, e.g. after restoring a snapshot
    ///
    /// Later records with an id already seen replace the earlier one.
    pub fn replace_all(&mut self, groups: Vec<Group>) {
        self.groups.clear();
        for group in groups {
            self.upsert(group);
        }
    }

    pub fn ids(&self) -> Vec<GroupId> {
        self.groups.iter().map(Group::id).collect()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(members: &[&str]) -> Group {
        Group::new(
            GroupId::generate(),
            members.iter().map(|m| ItemId::from(*m)).collect(),
            "#4f8fe6".to_string(),
        )
    }

    #[test]
    fn test_upsert_appends_then_replaces_in_place() {
        let mut store = GroupStore::new();
        let g1 = group(&["a", "b"]);
        let g2 = group(&["c", "d"]);
        let id1 = g1.id();

        assert!(store.upsert(g1.clone()).is_none());
        assert!(store.upsert(g2.clone()).is_none());

        let mut edited = g1.clone();
        edited.set_members(vec![ItemId::from("a"), ItemId::from("b"), ItemId::from("b")]);
        let previous = store.upsert(edited).unwrap();

        assert_eq!(previous, g1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.all()[0].id(), id1);
        assert_eq!(store.all()[0].len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut store = GroupStore::new();
        let g = group(&["a", "b"]);
        let id = g.id();
        store.upsert(g);

        assert!(store.remove(id).is_some());
        assert!(store.remove(id).is_none());
        assert!(store.get(id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_groups_containing() {
        let mut store = GroupStore::new();
        let g1 = group(&["a", "b"]);
        let g2 = group(&["b", "c"]);
        let (id1, id2) = (g1.id(), g2.id());
        store.upsert(g1);
        store.upsert(g2);

        assert_eq!(store.groups_containing(&ItemId::from("b")), vec![id1, id2]);
        assert_eq!(store.groups_containing(&ItemId::from("a")), vec![id1]);
        assert!(store.groups_containing(&ItemId::from("z")).is_empty());
    }

    #[test]
    fn test_replace_all_collapses_repeated_ids() {
        let mut store = GroupStore::new();
        store.upsert(group(&["x", "y"]));

        let g = group(&["a", "b"]);
        let mut later = g.clone();
        later.set_members(vec![ItemId::from("a"), ItemId::from("b"), ItemId::from("c")]);
        store.replace_all(vec![g, later]);

        assert_eq!(store.len(), 1);
        assert_eq!(store.all()[0].len(), 3);
    }
}
