//! Mutation Classifier
//!
//! Decides whether a dragged item should join or leave a group. Runs after
//! the reconciler has processed the move, against group spans that leave the
//! moved item out.
//!
//! - `Leave`: the item belonged to a group before the move and its new
//!   position lies outside the range that group covered before the move.
//! - `Join`: an ungrouped item lands exactly one past a group boundary
//!   (`start - 1` or `end + 1`). Interior drops are the reconciler's job.
//!   With several candidate groups the one with the lowest start wins; groups
//!   are never merged.
//!
//! A dragged item and an item that shifted because a neighbour was removed
//! look the same from here, so `Join` emission is switched off by default.

use crate::reconcile::GroupSpan;
use bgm_common::{GroupId, ItemId, Position};
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Group boundary an item joined at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum GroupEdge {
    /// Item now sits at `start - 1`
    Start,
    /// Item now sits at `end + 1`
    End,
}

/// Classifier verdict for one move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action")]
pub enum MoveAction {
    Join { group_id: GroupId, edge: GroupEdge },
    Leave { group_id: GroupId },
    None,
}

/// Join/leave classifier for drag-to-reorder moves
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveClassifier {
    auto_join_enabled: bool,
}

impl MoveClassifier {
    pub fn new(auto_join_enabled: bool) -> Self {
        Self { auto_join_enabled }
    }

    pub fn auto_join_enabled(&self) -> bool {
        self.auto_join_enabled
    }

    pub fn set_auto_join_enabled(&mut self, enabled: bool) {
        self.auto_join_enabled = enabled;
    }

    /// Classify a move of `moved` from `from` to `to`
    ///
    /// `origin` is the group `moved` belonged to before the move. `spans`
    /// must reflect positions after the move with `moved` left out of every
    /// range, sorted by start.
    pub fn classify_move(
        &self,
        moved: &ItemId,
        from: Position,
        to: Position,
        origin: Option<GroupId>,
        spans: &[GroupSpan],
    ) -> MoveAction {
        if from == to {
            return MoveAction::None;
        }

        if let Some(span) = origin.and_then(|id| spans.iter().find(|s| s.group_id == id)) {
            let (start, end) = range_before_move(span, from, to);
            if to < start || to > end {
                trace!("{} moved {} -> {}, outside group {} [{}, {}]", moved, from, to, span.group_id, start, end);
                return MoveAction::Leave {
                    group_id: span.group_id,
                };
            }
            return MoveAction::None;
        }

        if !self.auto_join_enabled || spans.iter().any(|s| s.members.contains(moved)) {
            return MoveAction::None;
        }

        for span in spans {
            let edge = if span.start > 0 && to == span.start - 1 {
                GroupEdge::Start
            } else if to == span.end + 1 {
                GroupEdge::End
            } else {
                continue;
            };
            trace!("{} moved {} -> {}, adjacent to group {} ({:?})", moved, from, to, span.group_id, edge);
            return MoveAction::Join {
                group_id: span.group_id,
                edge,
            };
        }

        MoveAction::None
    }
}

/// Range `span` covered before the item at `to` was taken from `from`,
/// counting `from` itself
fn range_before_move(span: &GroupSpan, from: Position, to: Position) -> (Position, Position) {
    let before = |p: Position| {
        if from < to && (from..to).contains(&p) {
            p + 1
        } else if to < from && (to + 1..=from).contains(&p) {
            p - 1
        } else {
            p
        }
    };
    (before(span.start).min(from), before(span.end).max(from))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(start: Position, end: Position, members: &[&str]) -> GroupSpan {
        GroupSpan {
            group_id: GroupId::generate(),
            start,
            end,
            members: members.iter().map(|m| ItemId::from(*m)).collect(),
        }
    }

    #[test]
    fn test_join_at_either_boundary() {
        let classifier = MoveClassifier::new(true);
        let spans = vec![span(3, 4, &["a", "b"])];
        let gid = spans[0].group_id;
        let x = ItemId::from("x");

        assert_eq!(
            classifier.classify_move(&x, 9, 2, None, &spans),
            MoveAction::Join { group_id: gid, edge: GroupEdge::Start }
        );
        assert_eq!(
            classifier.classify_move(&x, 0, 5, None, &spans),
            MoveAction::Join { group_id: gid, edge: GroupEdge::End }
        );
        assert_eq!(classifier.classify_move(&x, 0, 10, None, &spans), MoveAction::None);
    }

    #[test]
    fn test_join_suppressed_when_disabled() {
        let classifier = MoveClassifier::default();
        let spans = vec![span(3, 4, &["a", "b"])];

        assert!(!classifier.auto_join_enabled());
        assert_eq!(classifier.classify_move(&ItemId::from("x"), 9, 2, None, &spans), MoveAction::None);
    }

    #[test]
    fn test_double_adjacency_prefers_lowest_start() {
        let classifier = MoveClassifier::new(true);
        // x at 2 touches the end of [0,1] and the start of [3,4]
        let spans = vec![span(0, 1, &["a", "b"]), span(3, 4, &["c", "d"])];

        assert_eq!(
            classifier.classify_move(&ItemId::from("x"), 8, 2, None, &spans),
            MoveAction::Join { group_id: spans[0].group_id, edge: GroupEdge::End }
        );
    }

    #[test]
    fn test_member_dragged_far_away_leaves() {
        let classifier = MoveClassifier::default();
        // {a,b,c} at [0,2], c dragged to 7: a and b still at 0 and 1
        let spans = vec![span(0, 1, &["a", "b", "c"])];
        let gid = spans[0].group_id;

        assert_eq!(
            classifier.classify_move(&ItemId::from("c"), 2, 7, Some(gid), &spans),
            MoveAction::Leave { group_id: gid }
        );
    }

    #[test]
    fn test_edge_member_dragged_one_slot_out_leaves() {
        let classifier = MoveClassifier::default();
        // a,b,c,d -> a,b,d,c
        let spans = vec![span(0, 1, &["a", "b", "c"])];
        let gid = spans[0].group_id;

        assert_eq!(
            classifier.classify_move(&ItemId::from("c"), 2, 3, Some(gid), &spans),
            MoveAction::Leave { group_id: gid }
        );
    }

    #[test]
    fn test_leading_member_dragged_out_leaves() {
        let classifier = MoveClassifier::default();
        // x,a,b,c -> a,b,c,x with {x,a,b} at [0,2]: a and b now at 0 and 1
        let spans = vec![span(0, 1, &["x", "a", "b"])];
        let gid = spans[0].group_id;

        assert_eq!(
            classifier.classify_move(&ItemId::from("x"), 0, 3, Some(gid), &spans),
            MoveAction::Leave { group_id: gid }
        );
    }

    #[test]
    fn test_member_moved_within_range_stays() {
        let classifier = MoveClassifier::new(true);
        // a,b,c -> c,a,b: a and b now at 1 and 2
        let spans = vec![span(1, 2, &["a", "b", "c"]), span(4, 5, &["d", "e"])];
        let gid = spans[0].group_id;

        assert_eq!(classifier.classify_move(&ItemId::from("c"), 2, 0, Some(gid), &spans), MoveAction::None);
        // a,b,c -> b,c,a: b and c now at 0 and 1
        let spans = vec![span(0, 1, &["a", "b", "c"])];
        let gid = spans[0].group_id;
        assert_eq!(classifier.classify_move(&ItemId::from("a"), 0, 2, Some(gid), &spans), MoveAction::None);
    }

    #[test]
    fn test_grouped_item_never_joins() {
        let classifier = MoveClassifier::new(true);
        let spans = vec![span(0, 2, &["a", "x", "b"]), span(4, 5, &["c", "d"])];

        assert_eq!(classifier.classify_move(&ItemId::from("x"), 3, 1, None, &spans), MoveAction::None);
    }

    #[test]
    fn test_origin_group_gone_allows_join() {
        let classifier = MoveClassifier::new(true);
        let spans = vec![span(3, 4, &["a", "b"])];

        assert_eq!(
            classifier.classify_move(&ItemId::from("x"), 9, 5, Some(GroupId::generate()), &spans),
            MoveAction::Join { group_id: spans[0].group_id, edge: GroupEdge::End }
        );
    }

    #[test]
    fn test_no_move_is_noop() {
        let classifier = MoveClassifier::new(true);
        let spans = vec![span(3, 4, &["a", "b"])];

        assert_eq!(classifier.classify_move(&ItemId::from("x"), 2, 2, None, &spans), MoveAction::None);
    }
}
