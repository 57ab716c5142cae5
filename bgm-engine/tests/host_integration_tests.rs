//! Host integration tests
//!
//! Covers the surfaces a storyboard host touches besides plain reconcile:
//! identifier assignment through [`IdentityHost`], snapshot/restore for undo,
//! event draining and config-driven behavior.

use anyhow::Result;
use bgm_common::config::EngineConfig;
use bgm_common::events::{GroupEvent, RemovalReason};
use bgm_engine::{Error, GroupEngine, IdentityHost, ItemId, Position, SequenceSnapshot};
use serde_json::json;

/// Board whose panels may not have identifiers yet
struct TestBoard {
    panels: Vec<Option<ItemId>>,
}

impl TestBoard {
    fn new(panels: &[Option<&str>]) -> Self {
        Self {
            panels: panels.iter().map(|p| p.map(ItemId::from)).collect(),
        }
    }
}

impl IdentityHost for TestBoard {
    fn ensure_identifier(&mut self, position: Position, fresh: &mut dyn FnMut() -> ItemId) -> Option<ItemId> {
        let slot = self.panels.get_mut(position)?;
        Some(slot.get_or_insert_with(|| fresh()).clone())
    }

    fn snapshot(&self) -> SequenceSnapshot {
        self.panels.iter().flatten().cloned().collect()
    }
}

fn seq(tokens: &[&str]) -> SequenceSnapshot {
    SequenceSnapshot::from_ids(tokens.iter().copied())
}

fn ids(tokens: &[&str]) -> Vec<ItemId> {
    tokens.iter().map(|t| ItemId::from(*t)).collect()
}

#[test]
fn test_create_group_at_assigns_missing_identifiers() -> Result<()> {
    let mut engine = GroupEngine::default();
    let mut board = TestBoard::new(&[Some("a"), None, None, Some("d")]);

    let group = engine.create_group_at(&[2, 1], &mut board)?;

    let assigned: Vec<ItemId> = board.panels[1..3].iter().flatten().cloned().collect();
    assert_eq!(assigned.len(), 2);
    assert!(assigned.iter().all(|id| id.as_str().starts_with("bd-")));
    assert_ne!(assigned[0], assigned[1]);
    assert_eq!(group.members(), assigned.as_slice());
    assert_eq!(group.name(), "Group 2");
    Ok(())
}

#[test]
fn test_create_group_at_keeps_existing_identifiers() -> Result<()> {
    let mut engine = GroupEngine::default();
    let mut board = TestBoard::new(&[Some("a"), Some("b"), None]);

    let group = engine.create_group_at(&[0, 1], &mut board)?;

    assert_eq!(group.members(), ids(&["a", "b"]).as_slice());
    assert!(board.panels[2].is_none());
    Ok(())
}

#[test]
fn test_create_group_at_rejects_bad_positions() {
    let mut engine = GroupEngine::default();
    let mut board = TestBoard::new(&[Some("a"), Some("b")]);

    assert!(matches!(
        engine.create_group_at(&[1, 1], &mut board),
        Err(Error::InvalidSelection { count: 1 })
    ));
    assert!(matches!(
        engine.create_group_at(&[1, 9], &mut board),
        Err(Error::NoItemAtPosition(9))
    ));
    assert!(engine.all().is_empty());
}

#[test]
fn test_assigned_identifiers_are_unique() {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["bd-1", "x"]));

    let first = engine.assign_identifier(0);
    let second = engine.assign_identifier(1);

    assert_ne!(first, ItemId::from("bd-1"));
    assert_ne!(first, second);
}

#[test]
fn test_restore_returns_to_earlier_state() -> Result<()> {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["a", "b", "c", "d"]));
    let gid = engine.create_group(&ids(&["a", "b"]))?.id();
    let checkpoint = engine.serialize()?;

    engine.rename(gid, "Cold open")?;
    engine.create_group(&ids(&["c", "d"]))?;
    assert_eq!(engine.all().len(), 2);

    let restored = engine.restore(&checkpoint)?;

    assert_eq!(restored, 1);
    let group = engine.get(gid).expect("group restored");
    assert_eq!(group.name(), "Group 1");
    assert!(!group.is_renamed());
    assert_eq!(engine.serialize()?, checkpoint);
    Ok(())
}

#[test]
fn test_restore_then_reconcile_repairs_stale_groups() -> Result<()> {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["a", "b", "c", "d"]));
    let g1 = engine.create_group(&ids(&["a", "b"]))?.id();
    let g2 = engine.create_group(&ids(&["c", "d"]))?.id();
    let bytes = engine.serialize()?;

    // Restored into an engine that has never seen the sequence
    let mut fresh = GroupEngine::default();
    fresh.restore(&bytes)?;
    let report = fresh.reconcile(&seq(&["b", "a", "d"]));

    assert_eq!(report.updated, vec![g1]);
    assert_eq!(report.removed, vec![g2]);
    assert_eq!(fresh.get(g1).expect("g1 kept").members(), ids(&["b", "a"]).as_slice());
    Ok(())
}

#[test]
fn test_first_reconcile_after_restore_absorbs_insertions() -> Result<()> {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["a", "b", "c"]));
    let gid = engine.create_group(&ids(&["a", "b"]))?.id();
    let bytes = engine.serialize()?;

    let mut fresh = GroupEngine::default();
    fresh.restore(&bytes)?;
    let report = fresh.reconcile(&seq(&["a", "x", "b", "c"]));

    assert_eq!(report.expanded, vec![gid]);
    assert!(report.removed.is_empty());
    assert_eq!(fresh.get(gid).expect("group kept").members(), ids(&["a", "x", "b"]).as_slice());
    Ok(())
}

#[test]
fn test_restore_forgets_previous_sequence() -> Result<()> {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["a", "b", "c", "d"]));
    let gid = engine.create_group(&ids(&["a", "b"]))?.id();
    let checkpoint = engine.serialize()?;

    // Host undoes a later edit that put c between a and b
    engine.delete_group(gid)?;
    engine.reconcile(&seq(&["a", "c", "b", "d"]));
    engine.restore(&checkpoint)?;
    let report = engine.reconcile(&seq(&["a", "c", "b", "d"]));

    assert_eq!(report.expanded, vec![gid]);
    assert_eq!(engine.get(gid).expect("group kept").members(), ids(&["a", "c", "b"]).as_slice());

    // Later passes compare against the previous sequence again
    let report = engine.reconcile(&seq(&["a", "b", "d", "c"]));
    assert_eq!(engine.get(gid).expect("group kept").members(), ids(&["a", "b"]).as_slice());
    assert!(report.expanded.is_empty());
    Ok(())
}

#[test]
fn test_restore_rejects_garbage_and_keeps_state() -> Result<()> {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["a", "b"]));
    engine.create_group(&ids(&["a", "b"]))?;

    assert!(matches!(engine.restore(b"[{"), Err(Error::Snapshot(_))));
    assert_eq!(engine.all().len(), 1);
    Ok(())
}

#[test]
fn test_payload_and_color_survive_round_trip() -> Result<()> {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["a", "b"]));
    let gid = engine.create_group(&ids(&["a", "b"]))?.id();

    let mut payload = serde_json::Map::new();
    payload.insert("transition".to_string(), json!("crossfade"));
    engine.set_payload(gid, payload)?;
    engine.set_color(gid, "#123456")?;

    let mut other = GroupEngine::default();
    other.restore(&engine.serialize()?)?;

    let group = other.get(gid).expect("group restored");
    assert_eq!(group.color(), "#123456");
    assert_eq!(group.payload()["transition"], "crossfade");
    Ok(())
}

#[test]
fn test_events_drained_in_order() -> Result<()> {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["a", "b", "c"]));
    let gid = engine.create_group(&ids(&["a", "b"]))?.id();
    engine.rename(gid, "Intro")?;
    engine.reconcile(&seq(&["a", "c"]));

    let events = engine.drain_events();

    assert!(matches!(events[0], GroupEvent::GroupCreated { .. }));
    assert!(matches!(&events[1], GroupEvent::GroupRenamed { name, is_renamed: true, .. } if name == "Intro"));
    assert!(matches!(
        events[2],
        GroupEvent::GroupRemoved { reason: RemovalReason::Underflow, .. }
    ));
    assert!(events.iter().all(|e| e.group_id() == gid));
    assert!(engine.drain_events().is_empty());
    Ok(())
}

#[test]
fn test_undrained_events_are_capped() -> Result<()> {
    let mut engine = GroupEngine::default();
    engine.reconcile(&seq(&["a", "b"]));
    let gid = engine.create_group(&ids(&["a", "b"]))?.id();

    for i in 0..5000 {
        engine.rename(gid, format!("take {}", i))?;
    }

    let events = engine.drain_events();
    assert_eq!(events.len(), 4096);
    assert!(matches!(events.last(), Some(GroupEvent::GroupRenamed { name, .. }) if name == "take 4999"));
    Ok(())
}

#[test]
fn test_duplicate_identifiers_reported() {
    let mut engine = GroupEngine::default();

    let report = engine.reconcile(&seq(&["a", "b", "a"]));

    assert_eq!(report.duplicate_identifiers, 1);
    assert_eq!(engine.resolve_positions(&ids(&["a", "b"])), vec![Some(0), Some(1)]);
}

#[test]
fn test_config_drives_naming_and_auto_join() -> Result<()> {
    let config = EngineConfig {
        auto_join_enabled: true,
        group_name_template: "Shot {first}-{last} ({count})".to_string(),
        ..EngineConfig::default()
    };
    let mut engine = GroupEngine::new(config);
    engine.reconcile(&seq(&["a", "b", "c", "d"]));

    let group = engine.create_group(&ids(&["b", "c", "d"]))?;

    assert!(engine.auto_join_enabled());
    assert_eq!(group.name(), "Shot 2-4 (3)");
    Ok(())
}
