//! Identity Index
//!
//! Bidirectional mapping between an item's stable identifier and its current
//! position, rebuilt from a host snapshot on every reconcile. Positions are
//! never trusted across rebuilds.
//!
//! The index also compares each rebuild with the previous generation so the
//! reconciler can tell items that were inserted or dragged to a new place
//! apart from items that merely shifted because something else moved.
//! Without a previous generation (first rebuild, or after
//! [`IdentityIndex::forget_history`]) every existing item counts as relocated.

use bgm_common::{ItemId, Position};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, trace, warn};

/// One entry of a host sequence snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceEntry {
    pub id: ItemId,
    /// Tombstoned entries occupy no position
    pub exists: bool,
}

/// Ordered `(identifier, exists)` view of the host sequence
///
/// Supplied fresh for every reconcile; the engine never keeps a reference to
/// the host's live collection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSnapshot {
    entries: Vec<SequenceEntry>,
}

impl SequenceSnapshot {
    pub fn new(entries: Vec<SequenceEntry>) -> Self {
        Self { entries }
    }

    /// Snapshot where every listed item exists
    pub fn from_ids<I, T>(ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ItemId>,
    {
        ids.into_iter().map(Into::into).collect()
    }

    pub fn push(&mut self, id: impl Into<ItemId>) {
        self.entries.push(SequenceEntry {
            id: id.into(),
            exists: true,
        });
    }

    /// Append an entry for an item that no longer exists
    pub fn push_tombstone(&mut self, id: impl Into<ItemId>) {
        self.entries.push(SequenceEntry {
            id: id.into(),
            exists: false,
        });
    }

    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    /// Existing items in sequence order
    pub fn existing(&self) -> impl Iterator<Item = &ItemId> {
        self.entries.iter().filter(|e| e.exists).map(|e| &e.id)
    }
}

impl FromIterator<ItemId> for SequenceSnapshot {
    fn from_iter<I: IntoIterator<Item = ItemId>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|id| SequenceEntry { id, exists: true })
                .collect(),
        }
    }
}

/// Host-side identity assignment
///
/// Used when forming a group from positions whose items may not carry an
/// identifier yet.
pub trait IdentityHost {
    /// Return the identifier of the item at `position`, adopting the token
    /// produced by `fresh` if the item has none yet
    ///
    /// Must be idempotent: a second call for the same item returns the same
    /// identifier without calling `fresh`. Returns None if no item exists at
    /// `position`.
    fn ensure_identifier(&mut self, position: Position, fresh: &mut dyn FnMut() -> ItemId) -> Option<ItemId>;

    /// Current sequence, every item carrying an identifier
    fn snapshot(&self) -> SequenceSnapshot;
}

/// Stable identifier ↔ position index
#[derive(Debug, Clone)]
pub struct IdentityIndex {
    /// Item identifiers in position order
    order: Vec<ItemId>,

    /// Reverse lookup
    positions: HashMap<ItemId, Position>,

    /// Positions of the previous generation
    previous: HashMap<ItemId, Position>,

    /// Items that existed before but left the longest order-preserving
    /// subsequence of the previous generation
    displaced: HashSet<ItemId>,

    /// Number of rebuilds so far
    generation: u64,

    /// `previous` describes the sequence the groups were last reconciled against
    has_baseline: bool,

    /// Set by `forget_history`; the next rebuild starts without a baseline
    baseline_discarded: bool,

    /// Freshness counter for assigned identifiers; only ever increases
    fresh_counter: u64,

    identifier_prefix: String,
}

impl IdentityIndex {
    /// Create an empty index handing out identifiers with `identifier_prefix`
    pub fn new(identifier_prefix: impl Into<String>) -> Self {
        Self {
            order: Vec::new(),
            positions: HashMap::new(),
            previous: HashMap::new(),
            displaced: HashSet::new(),
            generation: 0,
            has_baseline: false,
            baseline_discarded: false,
            fresh_counter: 0,
            identifier_prefix: identifier_prefix.into(),
        }
    }

    /// Rebuild from a host snapshot
    ///
    /// Tombstoned entries are skipped. A repeated identifier keeps its first
    /// position; the repeat is logged and ignored. Returns the number of
    /// ignored repeats.
    pub fn rebuild(&mut self, snapshot: &SequenceSnapshot) -> usize {
        self.rebuild_with_groups(snapshot, &HashSet::new())
    }

    /// Rebuild, resolving ambiguous moves against `grouped` items
    ///
    /// Swapping two neighbours has two equally short explanations. When one
    /// of them is grouped and the other is not, the grouped item is taken as
    /// the one that moved.
    pub fn rebuild_with_groups(&mut self, snapshot: &SequenceSnapshot, grouped: &HashSet<ItemId>) -> usize {
        self.previous = std::mem::take(&mut self.positions);
        self.order.clear();
        self.has_baseline = self.generation > 0 && !std::mem::take(&mut self.baseline_discarded);

        let mut duplicates = 0;
        for id in snapshot.existing() {
            if self.positions.contains_key(id) {
                warn!("Identifier {} appears more than once in sequence snapshot, keeping first", id);
                duplicates += 1;
                continue;
            }
            self.positions.insert(id.clone(), self.order.len());
            self.order.push(id.clone());
        }

        self.displaced = if self.has_baseline {
            displaced_items(&self.order, &self.previous, grouped)
        } else {
            HashSet::new()
        };
        self.generation += 1;
        debug!(
            "Identity index generation {}: {} items, {} displaced ({} duplicates ignored)",
            self.generation,
            self.order.len(),
            self.displaced.len(),
            duplicates
        );
        duplicates
    }

    /// Drop the comparison baseline; the next rebuild treats every item as
    /// relocated
    ///
    /// Used when the group store is replaced wholesale and the last known
    /// sequence no longer describes it.
    pub fn forget_history(&mut self) {
        self.baseline_discarded = true;
    }

    /// Whether the current generation was compared against a previous one
    pub fn has_baseline(&self) -> bool {
        self.has_baseline
    }

    /// Current position of each identifier, None for items that no longer
    /// exist. Input order is preserved.
    pub fn resolve_positions(&self, ids: &[ItemId]) -> Vec<Option<Position>> {
        ids.iter().map(|id| self.position_of(id)).collect()
    }

    pub fn position_of(&self, id: &ItemId) -> Option<Position> {
        self.positions.get(id).copied()
    }

    pub fn id_at(&self, position: Position) -> Option<&ItemId> {
        self.order.get(position)
    }

    pub fn contains(&self, id: &ItemId) -> bool {
        self.positions.contains_key(id)
    }

    /// Whether `id` entered the sequence since the previous rebuild
    ///
    /// Always false without a baseline.
    pub fn is_new(&self, id: &ItemId) -> bool {
        self.has_baseline && self.positions.contains_key(id) && !self.previous.contains_key(id)
    }

    /// Whether `id` was inserted or moved to a new place since the previous
    /// rebuild, as opposed to shifting along with its neighbours
    ///
    /// Without a baseline any existing item may have been placed anywhere.
    pub fn is_relocated(&self, id: &ItemId) -> bool {
        if !self.has_baseline {
            return self.positions.contains_key(id);
        }
        self.is_new(id) || self.displaced.contains(id)
    }

    /// Hand out a new identifier for the item at `position`
    ///
    /// Tokens derive from a monotonically increasing counter and are never
    /// reused. Tokens that collide with an identifier already in the index
    /// are skipped.
    pub fn assign_identifier(&mut self, position: Position) -> ItemId {
        loop {
            self.fresh_counter += 1;
            let token = ItemId::new(format!("{}{:x}", self.identifier_prefix, self.fresh_counter));
            if !self.positions.contains_key(&token) && !self.previous.contains_key(&token) {
                trace!("Assigned identifier {} for item at position {}", token, position);
                return token;
            }
        }
    }

    /// Number of existing items in the current generation
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Items of `order` that are not part of a longest subsequence whose
/// previous positions are increasing
///
/// The longest increasing subsequence is the largest set of items that kept
/// their relative order; everything else that existed before was moved.
/// Among equally long subsequences the one keeping the most ungrouped items
/// wins.
fn displaced_items(
    order: &[ItemId],
    previous: &HashMap<ItemId, Position>,
    grouped: &HashSet<ItemId>,
) -> HashSet<ItemId> {
    // (current position, previous position) of items seen last generation
    let known: Vec<(Position, Position)> = order
        .iter()
        .enumerate()
        .filter_map(|(i, id)| previous.get(id).map(|p| (i, *p)))
        .collect();

    let mut tree = ChainTree::new(previous.len());
    let mut scores: Vec<ChainScore> = Vec::with_capacity(known.len());
    let mut parent: Vec<Option<usize>> = Vec::with_capacity(known.len());
    for (k, &(i, prev)) in known.iter().enumerate() {
        let ungrouped = usize::from(!grouped.contains(&order[i]));
        let (score, from) = match tree.best_below(prev) {
            Some(((len, kept), j)) => ((len + 1, kept + ungrouped), Some(j)),
            None => ((1, ungrouped), None),
        };
        scores.push(score);
        parent.push(from);
        tree.offer(prev, score, k);
    }

    let mut stationary = vec![false; known.len()];
    let mut cursor = (0..known.len()).max_by_key(|&k| scores[k]);
    while let Some(k) = cursor {
        stationary[k] = true;
        cursor = parent[k];
    }

    known
        .iter()
        .zip(stationary)
        .filter(|(_, keep)| !keep)
        .map(|((i, _), _)| order[*i].clone())
        .collect()
}

/// (chain length, ungrouped items in the chain)
type ChainScore = (usize, usize);

/// Prefix-maximum Fenwick tree over previous positions
struct ChainTree {
    nodes: Vec<Option<(ChainScore, usize)>>,
}

impl ChainTree {
    fn new(len: usize) -> Self {
        Self { nodes: vec![None; len + 1] }
    }

    /// Best chain ending at a previous position strictly below `position`
    fn best_below(&self, position: Position) -> Option<(ChainScore, usize)> {
        let mut best: Option<(ChainScore, usize)> = None;
        let mut i = position;
        while i > 0 {
            if let Some(candidate) = self.nodes[i] {
                if best.map_or(true, |(score, _)| candidate.0 > score) {
                    best = Some(candidate);
                }
            }
            i -= i & i.wrapping_neg();
        }
        best
    }

    fn offer(&mut self, position: Position, score: ChainScore, k: usize) {
        let mut i = position + 1;
        while i < self.nodes.len() {
            if self.nodes[i].map_or(true, |(held, _)| score > held) {
                self.nodes[i] = Some((score, k));
            }
            i += i & i.wrapping_neg();
        }
    }
}

impl Default for IdentityIndex {
    fn default() -> Self {
        Self::new("bd-")
    }
}
