//! Group Engine
//!
//! Facade owning the identity index, the group store and the classifier.
//! Hosts call [`GroupEngine::reconcile`] after every sequence mutation and
//! [`GroupEngine::apply_move`] after drag-to-reorder moves.
//!
//! A reconcile only sees snapshots, so a drag past a single neighbour is
//! ambiguous: either item could have moved. The engine keeps the group store
//! as it was before the last reconcile until the next mutation, and
//! `apply_move` replays that reconcile knowing which item the host moved.
//!
//! Single-threaded by contract: every call runs to completion, performs no
//! I/O and takes no locks. The host serializes calls.

use crate::classify::{MoveAction, MoveClassifier};
use crate::error::{Error, Result};
use crate::group::{Group, GroupPayload};
use crate::identity::{IdentityHost, IdentityIndex, SequenceSnapshot};
use crate::reconcile::{self, claimed_items, is_contiguous, GroupSpan, ReconcileReport, Reconciler};
use crate::snapshot;
use crate::store::GroupStore;
use bgm_common::config::EngineConfig;
use bgm_common::events::{GroupEvent, RemovalReason};
use bgm_common::{GroupId, ItemId, Position};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};

/// Pending events kept when the host never drains them
const MAX_PENDING_EVENTS: usize = 4096;

pub struct GroupEngine {
    config: EngineConfig,
    index: IdentityIndex,
    store: GroupStore,
    classifier: MoveClassifier,
    events: Vec<GroupEvent>,
    /// Groups created so far, for palette rotation
    created_count: usize,
    /// Groups as they stood before the last reconcile; dropped on any other
    /// mutation
    before_reconcile: Option<Vec<Group>>,
}

impl GroupEngine {
    pub fn new(config: EngineConfig) -> Self {
        let index = IdentityIndex::new(config.identifier_prefix.clone());
        let classifier = MoveClassifier::new(config.auto_join_enabled);
        Self {
            config,
            index,
            store: GroupStore::new(),
            classifier,
            events: Vec::new(),
            created_count: 0,
            before_reconcile: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &IdentityIndex {
        &self.index
    }

    pub fn store(&self) -> &GroupStore {
        &self.store
    }

    pub fn get(&self, group_id: GroupId) -> Option<&Group> {
        self.store.get(group_id)
    }

    pub fn all(&self) -> &[Group] {
        self.store.all()
    }

    /// Rebuild the identity index from `snapshot` and repair every group
    ///
    /// Never fails. Calling it again with the same snapshot changes nothing.
    pub fn reconcile(&mut self, snapshot: &SequenceSnapshot) -> ReconcileReport {
        let duplicates = self.index.rebuild_with_groups(snapshot, &claimed_items(&self.store));
        self.before_reconcile = Some(self.store.all().to_vec());
        let reconciler = Reconciler::new(&self.config.group_name_template);
        let mut report = reconciler.reconcile(&mut self.store, &self.index, &mut self.events);
        report.duplicate_identifiers = duplicates;
        self.trim_events();
        report
    }

    /// Current positions of `ids` as of the last reconcile
    pub fn resolve_positions(&self, ids: &[ItemId]) -> Vec<Option<Position>> {
        self.index.resolve_positions(ids)
    }

    /// New never-used identifier for a host item that lacks one
    pub fn assign_identifier(&mut self, position: Position) -> ItemId {
        self.index.assign_identifier(position)
    }

    /// Form a group from currently adjacent items
    ///
    /// Checks, in order: at least two distinct items, every item resolves,
    /// positions are contiguous. Candidates are first taken out of any group
    /// that lists them; a group left below two members is removed and one
    /// left with a hole keeps its longest run.
    pub fn create_group(&mut self, candidates: &[ItemId]) -> Result<Group> {
        let mut seen = HashSet::new();
        let candidates: Vec<&ItemId> = candidates.iter().filter(|id| seen.insert(*id)).collect();
        if candidates.len() < 2 {
            return Err(Error::InvalidSelection {
                count: candidates.len(),
            });
        }

        let mut resolved = Vec::with_capacity(candidates.len());
        for id in candidates {
            let position = self
                .index
                .position_of(id)
                .ok_or_else(|| Error::UnknownItem(id.clone()))?;
            resolved.push((position, id.clone()));
        }
        resolved.sort_by_key(|(p, _)| *p);

        let positions: Vec<Position> = resolved.iter().map(|(p, _)| *p).collect();
        if !is_contiguous(&positions) {
            return Err(Error::NonAdjacentSelection { positions });
        }
        let members: Vec<ItemId> = resolved.into_iter().map(|(_, id)| id).collect();

        self.before_reconcile = None;
        self.release_items(&members);

        let color = self
            .config
            .palette
            .get(self.created_count % self.config.palette.len().max(1))
            .cloned()
            .unwrap_or_default();
        let mut group = Group::new(GroupId::generate(), Vec::new(), color);
        Reconciler::new(&self.config.group_name_template).commit(&mut group, members, &self.index);

        self.created_count += 1;
        info!("Created group {} '{}' with {} members", group.id(), group.name(), group.len());
        self.events.push(GroupEvent::GroupCreated {
            group_id: group.id(),
            members: group.members().to_vec(),
            timestamp: chrono::Utc::now(),
        });
        self.store.upsert(group.clone());
        self.trim_events();
        Ok(group)
    }

    /// Form a group from positions whose items may lack identifiers
    ///
    /// The host adopts identifiers handed out by the index, then the engine
    /// reconciles against the host's refreshed snapshot before creating the
    /// group.
    pub fn create_group_at<H: IdentityHost>(&mut self, positions: &[Position], host: &mut H) -> Result<Group> {
        let distinct: BTreeSet<Position> = positions.iter().copied().collect();
        if distinct.len() < 2 {
            return Err(Error::InvalidSelection { count: distinct.len() });
        }

        let mut ids = Vec::with_capacity(distinct.len());
        for position in distinct {
            let index = &mut self.index;
            let id = host
                .ensure_identifier(position, &mut || index.assign_identifier(position))
                .ok_or(Error::NoItemAtPosition(position))?;
            ids.push(id);
        }

        let snapshot = host.snapshot();
        self.reconcile(&snapshot);
        self.create_group(&ids)
    }

    /// Add `item` to a group and re-sort members by position
    ///
    /// Adjacency is the caller's concern; no reconcile is run.
    pub fn add_member(&mut self, group_id: GroupId, item: &ItemId) -> Result<()> {
        if !self.index.contains(item) {
            return Err(Error::UnknownItem(item.clone()));
        }
        let group = self.store.get_mut(group_id).ok_or(Error::GroupNotFound(group_id))?;
        if group.contains(item) {
            return Ok(());
        }
        self.before_reconcile = None;

        let mut members = group.members().to_vec();
        members.push(item.clone());
        sort_by_position(&mut members, &self.index);
        Reconciler::new(&self.config.group_name_template).commit(group, members, &self.index);

        debug!("Item {} joined group {}", item, group_id);
        self.events.push(GroupEvent::MemberJoined {
            group_id,
            item_id: item.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.trim_events();
        Ok(())
    }

    /// Remove `item` from a group, deleting the group below two members
    ///
    /// Removing an existing item that is not a member does nothing.
    pub fn remove_member(&mut self, group_id: GroupId, item: &ItemId) -> Result<()> {
        let group = self.store.get_mut(group_id).ok_or(Error::GroupNotFound(group_id))?;
        if !group.remove_member(item) {
            if self.index.contains(item) {
                return Ok(());
            }
            return Err(Error::UnknownItem(item.clone()));
        }
        self.before_reconcile = None;

        debug!("Item {} left group {}", item, group_id);
        self.events.push(GroupEvent::MemberLeft {
            group_id,
            item_id: item.clone(),
            timestamp: chrono::Utc::now(),
        });

        if group.len() < 2 {
            self.remove_group(group_id, RemovalReason::Underflow);
        } else {
            let mut members = group.members().to_vec();
            sort_by_position(&mut members, &self.index);
            Reconciler::new(&self.config.group_name_template).commit(group, members, &self.index);
        }
        self.trim_events();
        Ok(())
    }

    /// Set a manual display name; derived names no longer replace it
    pub fn rename(&mut self, group_id: GroupId, name: impl Into<String>) -> Result<()> {
        let group = self.store.get_mut(group_id).ok_or(Error::GroupNotFound(group_id))?;
        self.before_reconcile = None;
        group.rename(name.into());
        self.events.push(GroupEvent::GroupRenamed {
            group_id,
            name: group.name().to_string(),
            is_renamed: true,
            timestamp: chrono::Utc::now(),
        });
        self.trim_events();
        Ok(())
    }

    /// Drop the manual name and return to the derived one
    pub fn reset_name(&mut self, group_id: GroupId) -> Result<()> {
        let group = self.store.get_mut(group_id).ok_or(Error::GroupNotFound(group_id))?;
        self.before_reconcile = None;
        group.reset_name();
        self.events.push(GroupEvent::GroupRenamed {
            group_id,
            name: group.name().to_string(),
            is_renamed: false,
            timestamp: chrono::Utc::now(),
        });
        self.trim_events();
        Ok(())
    }

    pub fn set_color(&mut self, group_id: GroupId, color: impl Into<String>) -> Result<()> {
        let group = self.store.get_mut(group_id).ok_or(Error::GroupNotFound(group_id))?;
        self.before_reconcile = None;
        group.set_color(color.into());
        Ok(())
    }

    pub fn set_payload(&mut self, group_id: GroupId, payload: GroupPayload) -> Result<()> {
        let group = self.store.get_mut(group_id).ok_or(Error::GroupNotFound(group_id))?;
        self.before_reconcile = None;
        group.set_payload(payload);
        Ok(())
    }

    /// Delete a group on request
    pub fn delete_group(&mut self, group_id: GroupId) -> Result<Group> {
        let group = self
            .remove_group(group_id, RemovalReason::Explicit)
            .ok_or(Error::GroupNotFound(group_id))?;
        self.before_reconcile = None;
        self.trim_events();
        Ok(group)
    }

    /// Every group's current range, sorted by start position
    pub fn spans(&self) -> Vec<GroupSpan> {
        reconcile::group_spans(&self.store, &self.index, None)
    }

    /// Positions covered by any group, computed on demand
    pub fn positions_in_any_group(&self) -> BTreeSet<Position> {
        reconcile::positions_in_any_group(&self.store, &self.index)
    }

    pub fn auto_join_enabled(&self) -> bool {
        self.classifier.auto_join_enabled()
    }

    pub fn set_auto_join_enabled(&mut self, enabled: bool) {
        self.classifier.set_auto_join_enabled(enabled);
    }

    /// Classify a move against current spans without applying it
    pub fn classify_move(&self, moved: &ItemId, from: Position, to: Position) -> MoveAction {
        let origin = self.group_before_move(moved);
        self.classify_from(moved, from, to, origin)
    }

    /// Classify a move and apply the verdict
    ///
    /// Call after reconciling the move. Repairs from that reconcile that
    /// guessed the wrong item moved are redone first. A `Leave` is applied
    /// next; the item may then join a neighbouring group if auto-join is
    /// enabled. Returns the applied actions in order.
    pub fn apply_move(&mut self, moved: &ItemId, from: Position, to: Position) -> Result<Vec<MoveAction>> {
        let mut origin = self.group_before_move(moved);
        self.revisit_last_reconcile(moved);
        let mut applied = Vec::new();

        if let action @ MoveAction::Leave { group_id } = self.classify_from(moved, from, to, origin) {
            self.leave(group_id, moved)?;
            applied.push(action);
            origin = None;
        }

        if let action @ MoveAction::Join { group_id, .. } = self.classify_from(moved, from, to, origin) {
            self.add_member(group_id, moved)?;
            applied.push(action);
        }

        self.before_reconcile = None;
        Ok(applied)
    }

    /// Encode the group store for persistence or undo history
    pub fn serialize(&self) -> Result<Vec<u8>> {
        snapshot::serialize(self.store.all())
    }

    /// Replace the group store with decoded groups
    ///
    /// The result is not validated; reconcile before relying on adjacency.
    /// Returns the number of groups restored.
    pub fn restore(&mut self, bytes: &[u8]) -> Result<usize> {
        let groups = snapshot::deserialize(bytes)?;
        self.store.replace_all(groups);
        self.before_reconcile = None;
        self.index.forget_history();
        info!("Restored {} groups from snapshot", self.store.len());
        Ok(self.store.len())
    }

    /// Take all events recorded since the last drain
    pub fn drain_events(&mut self) -> Vec<GroupEvent> {
        std::mem::take(&mut self.events)
    }

    fn classify_from(&self, moved: &ItemId, from: Position, to: Position, origin: Option<GroupId>) -> MoveAction {
        let spans = reconcile::group_spans(&self.store, &self.index, Some(moved));
        self.classifier.classify_move(moved, from, to, origin, &spans)
    }

    /// Group `moved` belonged to before the last reconcile, or now if the
    /// store changed since
    fn group_before_move(&self, moved: &ItemId) -> Option<GroupId> {
        let groups = self.before_reconcile.as_deref().unwrap_or_else(|| self.store.all());
        groups.iter().find(|g| g.contains(moved)).map(Group::id)
    }

    /// Replay the last reconcile with `moved` as the only relocated existing
    /// item and adopt the result where it differs
    fn revisit_last_reconcile(&mut self, moved: &ItemId) {
        if !self.index.has_baseline() {
            return;
        }
        let Some(before) = self.before_reconcile.take() else {
            return;
        };

        let mut replay = GroupStore::new();
        replay.replace_all(before);
        let mut replay_events = Vec::new();
        Reconciler::new(&self.config.group_name_template)
            .with_moved(moved)
            .reconcile(&mut replay, &self.index, &mut replay_events);

        let mut revised: Vec<GroupId> = replay.ids();
        revised.extend(self.store.ids().into_iter().filter(|id| replay.get(*id).is_none()));
        revised.retain(|id| replay.get(*id) != self.store.get(*id));
        if revised.is_empty() {
            return;
        }

        debug!("Move of {} revised {} group repairs", moved, revised.len());
        for group_id in revised {
            match replay.get(group_id) {
                Some(group) => {
                    self.events.push(GroupEvent::GroupUpdated {
                        group_id,
                        members: group.members().to_vec(),
                        timestamp: chrono::Utc::now(),
                    });
                    self.events.extend(
                        replay_events
                            .iter()
                            .filter(|e| matches!(e, GroupEvent::GroupExpanded { .. }) && e.group_id() == group_id)
                            .cloned(),
                    );
                }
                None => {
                    let reason = replay_events
                        .iter()
                        .find_map(|e| match e {
                            GroupEvent::GroupRemoved { group_id: id, reason, .. } if *id == group_id => Some(*reason),
                            _ => None,
                        })
                        .unwrap_or(RemovalReason::Fragmented);
                    info!("Group {} removed after revisiting move of {} ({})", group_id, moved, reason);
                    self.events.push(GroupEvent::GroupRemoved {
                        group_id,
                        reason,
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
        }
        self.store = replay;
        self.trim_events();
    }

    /// Apply a `Leave`; the reconcile may already have dropped the item
    fn leave(&mut self, group_id: GroupId, item: &ItemId) -> Result<()> {
        if self.store.get(group_id).is_some_and(|g| g.contains(item)) {
            return self.remove_member(group_id, item);
        }
        debug!("Item {} left group {}", item, group_id);
        self.events.push(GroupEvent::MemberLeft {
            group_id,
            item_id: item.clone(),
            timestamp: chrono::Utc::now(),
        });
        self.trim_events();
        Ok(())
    }

    /// Take `items` out of every group listing them
    fn release_items(&mut self, items: &[ItemId]) {
        let mut affected = Vec::new();
        for group_id in self.store.ids() {
            let Some(group) = self.store.get_mut(group_id) else {
                continue;
            };
            let mut touched = false;
            for item in items {
                if group.remove_member(item) {
                    touched = true;
                    self.events.push(GroupEvent::MemberLeft {
                        group_id,
                        item_id: item.clone(),
                        timestamp: chrono::Utc::now(),
                    });
                }
            }
            if touched {
                affected.push(group_id);
            }
        }

        let mut claimed = claimed_items(&self.store);
        claimed.extend(items.iter().cloned());
        let mut scratch = ReconcileReport::default();

        for group_id in affected {
            let below_minimum = self.store.get(group_id).is_some_and(|g| g.len() < 2);
            if below_minimum {
                self.remove_group(group_id, RemovalReason::Superseded);
            } else {
                // Items may have been taken from the middle; keep the longest run
                Reconciler::new(&self.config.group_name_template).reconcile_group(
                    &mut self.store,
                    &self.index,
                    group_id,
                    &mut claimed,
                    &mut scratch,
                    &mut self.events,
                );
            }
        }
    }

    fn remove_group(&mut self, group_id: GroupId, reason: RemovalReason) -> Option<Group> {
        let group = self.store.remove(group_id)?;
        info!("Group {} '{}' removed ({})", group_id, group.name(), reason);
        self.events.push(GroupEvent::GroupRemoved {
            group_id,
            reason,
            timestamp: chrono::Utc::now(),
        });
        Some(group)
    }

    fn trim_events(&mut self) {
        if self.events.len() > MAX_PENDING_EVENTS {
            let excess = self.events.len() - MAX_PENDING_EVENTS;
            warn!("Dropping {} undrained group events", excess);
            self.events.drain(..excess);
        }
    }
}

impl Default for GroupEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Sort members by current position; unresolvable ones go last
fn sort_by_position(members: &mut [ItemId], index: &IdentityIndex) {
    members.sort_by_key(|id| index.position_of(id).unwrap_or(Position::MAX));
}
