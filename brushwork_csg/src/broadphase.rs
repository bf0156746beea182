// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Broad phase: bounding-box candidates for pairwise intersection.

use brushwork_index::Aabb3D;
use brushwork_tree::{Hierarchy, NodeId};
use hashbrown::HashMap;

use crate::compact_tree::{CompactTree, IndexOrder};

/// How two bounding boxes relate. Disjoint boxes have no relation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BoundsRelation {
    /// The boxes overlap or touch without containment.
    Touching,
    /// The brush's box contains the other's.
    Contains,
    /// The other's box contains the brush's.
    ContainedBy,
}

impl BoundsRelation {
    /// Classify `a` against `b`, or `None` when they are disjoint.
    pub fn of(a: &Aabb3D<f64>, b: &Aabb3D<f64>) -> Option<Self> {
        if !a.overlaps(b) {
            None
        } else if a.contains(b) {
            Some(Self::Contains)
        } else if b.contains(a) {
            Some(Self::ContainedBy)
        } else {
            Some(Self::Touching)
        }
    }
}

/// A pair of brushes whose bounds overlap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CandidatePair {
    /// The brush being rebuilt.
    pub brush: IndexOrder,
    /// The brush it may intersect.
    pub other: IndexOrder,
    /// Bounds of `brush` relative to `other`.
    pub relation: BoundsRelation,
}

impl CandidatePair {
    /// The pair as `(lower, higher)` index order, for deduplication.
    pub fn unordered(&self) -> (IndexOrder, IndexOrder) {
        if self.brush.index <= self.other.index {
            (self.brush, self.other)
        } else {
            (self.other, self.brush)
        }
    }
}

/// Brush bounds as they will be once the current cycle commits.
///
/// The hierarchy's index still holds the previous bounds of brushes edited
/// this cycle; those are answered from `pending` instead.
#[derive(Clone, Copy, Debug)]
pub struct BoundsView<'a> {
    hierarchy: &'a Hierarchy,
    pending: &'a HashMap<NodeId, Option<Aabb3D<f64>>>,
}

impl<'a> BoundsView<'a> {
    /// Overlay `pending` on the committed bounds of `hierarchy`.
    pub fn new(hierarchy: &'a Hierarchy, pending: &'a HashMap<NodeId, Option<Aabb3D<f64>>>) -> Self {
        Self { hierarchy, pending }
    }

    /// Current bounds of `id`.
    pub fn bounds(&self, id: NodeId) -> Option<Aabb3D<f64>> {
        match self.pending.get(&id) {
            Some(b) => *b,
            None => self.hierarchy.bounds(id),
        }
    }

    /// Brushes whose current bounds intersect `aabb`.
    pub fn query(&self, aabb: Aabb3D<f64>) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .hierarchy
            .query_bounds(aabb)
            .filter(|id| !self.pending.contains_key(id))
            .collect();
        out.extend(
            self.pending
                .iter()
                .filter(|(_, b)| b.is_some_and(|b| b.overlaps(&aabb)))
                .map(|(&id, _)| id),
        );
        out
    }

    /// Whether any other brush of `tree` overlaps `id`'s bounds padded by `padding`.
    pub fn has_overlap(&self, tree: &CompactTree, id: NodeId, padding: f64) -> bool {
        let Some(b) = self.bounds(id) else {
            return false;
        };
        self.query(b.inflate(padding))
            .into_iter()
            .any(|other| other != id && tree.index_of(other).is_some())
    }
}

/// Candidates for one brush, sorted by the other brush's index order.
///
/// Brushes outside `tree` and brushes without bounds are skipped.
pub fn find_candidates(
    brush: IndexOrder,
    view: &BoundsView<'_>,
    tree: &CompactTree,
    padding: f64,
) -> Vec<CandidatePair> {
    let Some(bounds) = view.bounds(brush.id) else {
        return Vec::new();
    };
    let padded = bounds.inflate(padding);
    let mut out: Vec<CandidatePair> = view
        .query(padded)
        .into_iter()
        .filter(|&id| id != brush.id)
        .filter_map(|id| {
            let other = tree.index_of(id)?;
            let relation = BoundsRelation::of(&padded, &view.bounds(id)?)?;
            Some(CandidatePair {
                brush,
                other,
                relation,
            })
        })
        .collect();
    out.sort_by_key(|c| c.other.index);
    out
}
