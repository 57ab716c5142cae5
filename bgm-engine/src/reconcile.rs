//! Reconciler
//!
//! Recomputes every group's member positions from a freshly rebuilt
//! [`IdentityIndex`] and repairs whatever drift the host introduced.
//!
//! Per group, independently:
//! 1. Members that no longer resolve are purged. Nothing left → removed.
//! 2. Contiguous positions → members committed in position order.
//! 3. Gaps inside the range → either
//!    - **expansion**: every gap holds an item that was inserted or dragged
//!      there since the previous reconcile and that no group claims; the gap
//!      items are absorbed, or
//!    - **fragmentation**: the longest contiguous run survives (ties go to
//!      the leftmost run); a surviving run shorter than 2 removes the group.
//!
//! A gap holding items that only shifted means a member was dragged away,
//! which is why it fragments instead of growing. Groups are not arbitrated
//! against each other, except that an item absorbed by one group is claimed
//! and cannot be absorbed by another. Items a group drops are unclaimed again,
//! and a group whose expansion only waits on such items is repaired last.

use crate::group::{derive_name, Group};
use crate::identity::IdentityIndex;
use crate::store::GroupStore;
use bgm_common::events::{GroupEvent, RemovalReason};
use bgm_common::{GroupId, ItemId, Position};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Outcome of one reconcile pass, for host-side refresh decisions
///
/// `updated` lists groups whose record actually changed (members, member
/// order or derived name). Every `expanded` group is also `updated`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub updated: Vec<GroupId>,
    pub removed: Vec<GroupId>,
    pub expanded: Vec<GroupId>,
    /// Repeated identifiers ignored while rebuilding the index
    pub duplicate_identifiers: usize,
}

impl ReconcileReport {
    pub fn updated_count(&self) -> usize {
        self.updated.len()
    }

    pub fn removed_count(&self) -> usize {
        self.removed.len()
    }

    pub fn expanded_count(&self) -> usize {
        self.expanded.len()
    }

    /// True when the pass changed nothing
    pub fn is_empty(&self) -> bool {
        self.updated.is_empty() && self.removed.is_empty() && self.expanded.is_empty()
    }
}

/// Contiguous position range currently covered by a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupSpan {
    pub group_id: GroupId,
    pub start: Position,
    pub end: Position,
    pub members: Vec<ItemId>,
}

impl GroupSpan {
    pub fn contains_position(&self, position: Position) -> bool {
        (self.start..=self.end).contains(&position)
    }
}

/// Repair decision for one group
#[derive(Debug, Clone, PartialEq, Eq)]
enum Repair {
    Keep(Vec<ItemId>),
    Expand {
        members: Vec<ItemId>,
        absorbed: Vec<ItemId>,
    },
    Fragment(Vec<ItemId>),
    Remove(RemovalReason),
}

/// Drift repair over a group store
pub struct Reconciler<'a> {
    name_template: &'a str,
    /// Item the host reports as dragged; overrides the index's guess
    moved: Option<&'a ItemId>,
}

impl<'a> Reconciler<'a> {
    pub fn new(name_template: &'a str) -> Self {
        Self {
            name_template,
            moved: None,
        }
    }

    /// Treat `moved` as the only existing item that changed place
    pub fn with_moved(mut self, moved: &'a ItemId) -> Self {
        self.moved = Some(moved);
        self
    }

    /// Repair every group against `index`, which must already be rebuilt
    /// from the current sequence snapshot
    pub fn reconcile(
        &self,
        store: &mut GroupStore,
        index: &IdentityIndex,
        events: &mut Vec<GroupEvent>,
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut claimed = claimed_items(store);

        let mut deferred = Vec::new();
        for group_id in store.ids() {
            if self.waits_on_claims(store, index, group_id, &claimed) {
                deferred.push(group_id);
                continue;
            }
            self.reconcile_group(store, index, group_id, &mut claimed, &mut report, events);
        }
        for group_id in deferred {
            self.reconcile_group(store, index, group_id, &mut claimed, &mut report, events);
        }

        debug!(
            "Reconcile: {} updated, {} removed, {} expanded",
            report.updated_count(),
            report.removed_count(),
            report.expanded_count()
        );
        report
    }

    /// Repair a single group
    ///
    /// `claimed` holds every item some group lists; items absorbed by an
    /// expansion are added to it and items no group lists any more leave it.
    pub(crate) fn reconcile_group(
        &self,
        store: &mut GroupStore,
        index: &IdentityIndex,
        group_id: GroupId,
        claimed: &mut HashSet<ItemId>,
        report: &mut ReconcileReport,
        events: &mut Vec<GroupEvent>,
    ) {
        let (previous, repair) = match store.get(group_id) {
            Some(group) => (group.members().to_vec(), self.plan_repair(group, index, claimed)),
            None => return,
        };

        let (members, absorbed) = match repair {
            Repair::Remove(reason) => {
                store.remove(group_id);
                release_claims(store, claimed, &previous);
                info!("Group {} removed during reconcile ({})", group_id, reason);
                report.removed.push(group_id);
                events.push(GroupEvent::GroupRemoved {
                    group_id,
                    reason,
                    timestamp: chrono::Utc::now(),
                });
                return;
            }
            Repair::Keep(members) => (members, None),
            Repair::Fragment(members) => {
                debug!("Group {} fragmented, keeping {} members", group_id, members.len());
                (members, None)
            }
            Repair::Expand { members, absorbed } => {
                debug!("Group {} absorbing {} relocated items", group_id, absorbed.len());
                (members, Some(absorbed))
            }
        };

        let Some(group) = store.get_mut(group_id) else {
            return;
        };
        if self.commit(group, members, index) {
            report.updated.push(group_id);
            events.push(GroupEvent::GroupUpdated {
                group_id,
                members: group.members().to_vec(),
                timestamp: chrono::Utc::now(),
            });
        }
        let dropped: Vec<ItemId> = previous.into_iter().filter(|id| !group.contains(id)).collect();
        release_claims(store, claimed, &dropped);
        if let Some(absorbed) = absorbed {
            claimed.extend(absorbed.iter().cloned());
            report.expanded.push(group_id);
            events.push(GroupEvent::GroupExpanded {
                group_id,
                absorbed,
                timestamp: chrono::Utc::now(),
            });
        }
    }

    /// Write `members` (already in position order) and re-derive the name
    ///
    /// Returns true if the record changed.
    pub(crate) fn commit(&self, group: &mut Group, members: Vec<ItemId>, index: &IdentityIndex) -> bool {
        let members_changed = group.members() != members.as_slice();
        if members_changed {
            group.set_members(members);
        }

        let first = group.members().first().and_then(|id| index.position_of(id));
        let last = group.members().last().and_then(|id| index.position_of(id));
        let name_changed = match (first, last) {
            (Some(first), Some(last)) => {
                group.refresh_name(derive_name(self.name_template, first, last, group.len()))
            }
            _ => false,
        };

        members_changed || name_changed
    }
}

/// Every item listed by any group
pub(crate) fn claimed_items(store: &GroupStore) -> HashSet<ItemId> {
    store
        .all()
        .iter()
        .flat_map(|g| g.members().iter().cloned())
        .collect()
}

/// Unclaim the `items` no group lists any more
fn release_claims(store: &GroupStore, claimed: &mut HashSet<ItemId>, items: &[ItemId]) {
    for id in items {
        if !store.all().iter().any(|g| g.contains(id)) {
            claimed.remove(id);
        }
    }
}

/// Resolvable members with their positions, in position order
fn resolve_sorted(group: &Group, index: &IdentityIndex) -> Vec<(Position, ItemId)> {
    let mut resolved: Vec<(Position, ItemId)> = group
        .members()
        .iter()
        .filter_map(|id| index.position_of(id).map(|p| (p, id.clone())))
        .collect();
    resolved.sort_by_key(|(p, _)| *p);
    resolved
}

impl Reconciler<'_> {
    fn is_relocated(&self, index: &IdentityIndex, id: &ItemId) -> bool {
        match self.moved {
            Some(moved) => index.is_new(id) || id == moved,
            None => index.is_relocated(id),
        }
    }

    /// Items filling the gaps of sorted `positions`, if every one of them
    /// was relocated
    fn relocated_gap(&self, positions: &[Position], index: &IdentityIndex) -> Option<Vec<ItemId>> {
        gap_positions(positions)
            .into_iter()
            .map(|p| index.id_at(p).filter(|id| self.is_relocated(index, id)).cloned())
            .collect()
    }

    /// Whether the group could expand once other groups let go of some of
    /// its gap items
    fn waits_on_claims(
        &self,
        store: &GroupStore,
        index: &IdentityIndex,
        group_id: GroupId,
        claimed: &HashSet<ItemId>,
    ) -> bool {
        let Some(group) = store.get(group_id) else {
            return false;
        };
        let positions: Vec<Position> = resolve_sorted(group, index).into_iter().map(|(p, _)| p).collect();
        if is_contiguous(&positions) {
            return false;
        }
        self.relocated_gap(&positions, index)
            .is_some_and(|gap| gap.iter().any(|id| claimed.contains(id)))
    }

    fn plan_repair(&self, group: &Group, index: &IdentityIndex, claimed: &HashSet<ItemId>) -> Repair {
        let resolved = resolve_sorted(group, index);
        if resolved.is_empty() {
            return Repair::Remove(RemovalReason::Emptied);
        }

        let positions: Vec<Position> = resolved.iter().map(|(p, _)| *p).collect();

        if is_contiguous(&positions) {
            if resolved.len() < 2 {
                return Repair::Remove(RemovalReason::Underflow);
            }
            return Repair::Keep(resolved.into_iter().map(|(_, id)| id).collect());
        }

        // Expansion: every gap must hold a relocated, unclaimed item
        let absorbed = self
            .relocated_gap(&positions, index)
            .filter(|gap| gap.iter().all(|id| !claimed.contains(id)));

        if let Some(absorbed) = absorbed {
            let (first, last) = (positions[0], positions[positions.len() - 1]);
            let members = (first..=last).filter_map(|p| index.id_at(p).cloned()).collect();
            return Repair::Expand { members, absorbed };
        }

        let (start, len) = longest_run(&positions);
        if len < 2 {
            return Repair::Remove(RemovalReason::Fragmented);
        }
        Repair::Fragment(
            resolved[start..start + len]
                .iter()
                .map(|(_, id)| id.clone())
                .collect(),
        )
    }
}

/// True if sorted `positions` step by exactly one
pub fn is_contiguous(positions: &[Position]) -> bool {
    positions.windows(2).all(|w| w[1] == w[0] + 1)
}

/// Positions strictly between the first and last of sorted, unique
/// `positions` that are not in it
fn gap_positions(positions: &[Position]) -> Vec<Position> {
    positions
        .windows(2)
        .flat_map(|w| (w[0] + 1)..w[1])
        .collect()
}

/// Start index and length of the longest contiguous run in sorted
/// `positions`; the leftmost run wins ties
fn longest_run(positions: &[Position]) -> (usize, usize) {
    if positions.is_empty() {
        return (0, 0);
    }

    let (mut best_start, mut best_len) = (0, 1);
    let mut run_start = 0;
    for i in 1..positions.len() {
        if positions[i] != positions[i - 1] + 1 {
            run_start = i;
        }
        let run_len = i - run_start + 1;
        if run_len > best_len {
            best_start = run_start;
            best_len = run_len;
        }
    }
    (best_start, best_len)
}

/// Current range of every group with at least one resolvable member,
/// sorted by start position (insertion order breaks ties)
///
/// With `excluding` set, that item does not count towards any range, but
/// `members` still lists it.
pub fn group_spans(store: &GroupStore, index: &IdentityIndex, excluding: Option<&ItemId>) -> Vec<GroupSpan> {
    let mut spans: Vec<GroupSpan> = store
        .all()
        .iter()
        .filter_map(|group| {
            let mut positions = group
                .members()
                .iter()
                .filter(|id| Some(*id) != excluding)
                .filter_map(|id| index.position_of(id));
            let first = positions.next()?;
            let (start, end) = positions.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
            Some(GroupSpan {
                group_id: group.id(),
                start,
                end,
                members: group.members().to_vec(),
            })
        })
        .collect();
    spans.sort_by_key(|s| s.start);
    spans
}

/// Positions covered by any group member
pub fn positions_in_any_group(store: &GroupStore, index: &IdentityIndex) -> BTreeSet<Position> {
    store
        .all()
        .iter()
        .flat_map(|g| g.members().iter())
        .filter_map(|id| index.position_of(id))
        .collect()
}
