// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-cycle flattened view of the hierarchy.
//!
//! Nodes are stored in pre-order; a node's children follow it, each child's
//! subtree ending where the next sibling starts. Every brush gets a dense
//! index (its [`IndexOrder`]) and a `[start, end)` range into a flat array of
//! its ancestors, so marking everything above a brush is a slice walk.

use std::collections::TryReserveError;
use std::ops::Range;

use brushwork_tree::{CsgOperation, Hierarchy, NodeId, NodeKind};
use smallvec::SmallVec;

/// A brush handle paired with its dense index for the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexOrder {
    /// Position in this cycle's brush arrays. Orders brushes like a pre-order walk.
    pub index: u32,
    /// Stable handle.
    pub id: NodeId,
}

/// One node of a [`CompactTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CompactNode {
    /// Handle in the hierarchy.
    pub id: NodeId,
    /// How the node combines with the siblings before it.
    pub operation: CsgOperation,
    /// Node index of the parent; `None` for the root.
    pub parent: Option<u32>,
    /// One past the last node of this subtree.
    pub subtree_end: u32,
    /// Dense brush index, for brushes.
    pub brush: Option<u32>,
}

const NO_BRUSH: u32 = u32::MAX;

/// Flattened hierarchy snapshot with an ancestor index.
#[derive(Clone, Debug, Default)]
pub struct CompactTree {
    nodes: Vec<CompactNode>,
    ancestors: Vec<u32>,
    legend: Vec<Range<u32>>,
    brush_nodes: Vec<u32>,
    order: Vec<IndexOrder>,
    slot_lookup: Vec<u32>,
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "node counts are bounded by the u32 slot space of NodeId"
)]
fn to_u32(n: usize) -> u32 {
    n as u32
}

/// Pending work of [`CompactTree::build`].
enum Step {
    Enter(NodeId),
    /// Close the branch at this node index.
    Exit(u32),
}

impl CompactTree {
    /// Snapshot `hierarchy`. Only nodes attached to the root are included.
    pub fn build(hierarchy: &Hierarchy) -> Result<Self, TryReserveError> {
        let mut tree = Self::default();
        tree.nodes.try_reserve(hierarchy.len())?;
        tree.ancestors.try_reserve(hierarchy.len())?;
        let mut path: Vec<u32> = Vec::new();
        let mut stack = Vec::new();
        stack.try_reserve(16)?;
        stack.push(Step::Enter(hierarchy.root()));
        while let Some(step) = stack.pop() {
            let id = match step {
                Step::Enter(id) => id,
                Step::Exit(at) => {
                    path.pop();
                    tree.nodes[at as usize].subtree_end = to_u32(tree.nodes.len());
                    continue;
                }
            };
            let at = to_u32(tree.nodes.len());
            let kind = hierarchy.kind(id).unwrap_or(NodeKind::Branch);
            let brush = (kind == NodeKind::Brush).then(|| to_u32(tree.order.len()));
            tree.nodes.push(CompactNode {
                id,
                operation: hierarchy.operation(id).unwrap_or_default(),
                parent: path.last().copied(),
                subtree_end: at + 1,
                brush,
            });
            if let Some(index) = brush {
                tree.add_brush(id, index, at, &path)?;
                continue;
            }
            path.try_reserve(1)?;
            path.push(at);
            stack.try_reserve(1)?;
            stack.push(Step::Exit(at));
            // Children are pushed in reverse so the first one is entered first.
            let first = stack.len();
            for child in hierarchy.children(id) {
                stack.try_reserve(1)?;
                stack.push(Step::Enter(child));
            }
            stack[first..].reverse();
        }
        Ok(tree)
    }

    fn add_brush(
        &mut self,
        id: NodeId,
        index: u32,
        at: u32,
        path: &[u32],
    ) -> Result<(), TryReserveError> {
        let start = to_u32(self.ancestors.len());
        self.ancestors.try_reserve(path.len())?;
        self.ancestors.extend_from_slice(path);
        self.legend.push(start..to_u32(self.ancestors.len()));
        self.brush_nodes.push(at);
        self.order.push(IndexOrder { index, id });
        let slot = id.slot() as usize;
        if self.slot_lookup.len() <= slot {
            self.slot_lookup.try_reserve(slot + 1 - self.slot_lookup.len())?;
            self.slot_lookup.resize(slot + 1, NO_BRUSH);
        }
        self.slot_lookup[slot] = index;
        Ok(())
    }

    /// Nodes in pre-order; index 0 is the root.
    pub fn nodes(&self) -> &[CompactNode] {
        &self.nodes
    }

    /// Brushes in index order.
    pub fn order(&self) -> &[IndexOrder] {
        &self.order
    }

    /// Number of brushes.
    pub fn brush_count(&self) -> usize {
        self.order.len()
    }

    /// The index order of `id`, if it is a brush in this snapshot.
    pub fn index_of(&self, id: NodeId) -> Option<IndexOrder> {
        let index = *self.slot_lookup.get(id.slot() as usize)?;
        let order = *self.order.get(index as usize)?;
        (order.id == id).then_some(order)
    }

    /// Node index of brush `index`.
    pub fn node_of(&self, index: u32) -> u32 {
        self.brush_nodes[index as usize]
    }

    /// Brushes among the nodes in `range`, in index order.
    pub fn brushes_between(&self, range: Range<u32>) -> impl Iterator<Item = IndexOrder> + '_ {
        self.nodes[range.start as usize..range.end as usize]
            .iter()
            .filter_map(|n| n.brush)
            .map(|b| self.order[b as usize])
    }

    /// Brushes in the subtrees of the siblings before node `at`.
    ///
    /// These are the brushes an `Intersecting` node at `at` clips, wherever they are.
    pub fn preceding_siblings(&self, at: u32) -> impl Iterator<Item = IndexOrder> + '_ {
        let start = self.nodes[at as usize].parent.map_or(at, |p| p + 1);
        self.brushes_between(start..at)
    }

    /// Whether any node below the root intersects with its preceding siblings.
    pub fn has_intersecting(&self) -> bool {
        self.nodes
            .iter()
            .skip(1)
            .any(|n| n.operation == CsgOperation::Intersecting)
    }

    /// Range of brush `index`'s ancestors inside [`ancestor_array`](Self::ancestor_array).
    pub fn ancestor_range(&self, index: u32) -> Range<u32> {
        self.legend[index as usize].clone()
    }

    /// Node indices of brush `index`'s ancestors, root first.
    pub fn ancestors(&self, index: u32) -> &[u32] {
        let r = self.ancestor_range(index);
        &self.ancestors[r.start as usize..r.end as usize]
    }

    /// The flat ancestor array shared by all brushes.
    pub fn ancestor_array(&self) -> &[u32] {
        &self.ancestors
    }

    /// Whether the hierarchy node `ancestor` lies above brush `index`.
    pub fn is_ancestor(&self, ancestor: NodeId, index: u32) -> bool {
        self.ancestors(index)
            .iter()
            .any(|&n| self.nodes[n as usize].id == ancestor)
    }

    /// Mark brushes and all their ancestors.
    pub fn touch(&self, brushes: impl IntoIterator<Item = u32>) -> TouchedSet {
        let mut set = TouchedSet::with_len(self.nodes.len());
        for b in brushes {
            set.mark(self.brush_nodes[b as usize]);
            for &a in self.ancestors(b) {
                set.mark(a);
            }
        }
        set
    }

    /// Evaluate the CSG expression at a point.
    ///
    /// `inside(brush)` says whether the point is inside a brush; it is only
    /// called for touched brushes. Untouched subtrees are empty.
    pub fn evaluate(&self, touched: &TouchedSet, inside: impl Fn(u32) -> bool) -> bool {
        let Some(root) = self.nodes.first() else {
            return false;
        };
        if !touched.contains(0) {
            return false;
        }
        if let Some(b) = root.brush {
            return inside(b);
        }
        let mut stack: SmallVec<[Frame; 16]> = SmallVec::new();
        stack.push(Frame {
            at: 0,
            next: 1,
            solid: false,
        });
        while let Some(top) = stack.last_mut() {
            let end = self.nodes[top.at as usize].subtree_end;
            if top.next >= end {
                let Some(done) = stack.pop() else {
                    break;
                };
                let Some(parent) = stack.last_mut() else {
                    return done.solid;
                };
                let op = self.nodes[done.at as usize].operation;
                parent.solid = combine(op, parent.solid, done.solid);
                continue;
            }
            let child = top.next;
            let c = &self.nodes[child as usize];
            top.next = c.subtree_end;
            if !touched.contains(child) {
                top.solid = combine(c.operation, top.solid, false);
            } else if let Some(b) = c.brush {
                top.solid = combine(c.operation, top.solid, inside(b));
            } else {
                stack.push(Frame {
                    at: child,
                    next: child + 1,
                    solid: false,
                });
            }
        }
        false
    }
}

/// A branch being evaluated: `next` is the child to visit, `solid` the value so far.
#[derive(Clone, Copy)]
struct Frame {
    at: u32,
    next: u32,
    solid: bool,
}

fn combine(operation: CsgOperation, solid: bool, value: bool) -> bool {
    match operation {
        CsgOperation::Additive => solid || value,
        CsgOperation::Subtractive => solid && !value,
        CsgOperation::Intersecting => solid && value,
    }
}

/// Bitset over compact node indices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TouchedSet {
    words: Vec<u64>,
}

impl TouchedSet {
    /// An empty set for `len` nodes.
    pub fn with_len(len: usize) -> Self {
        Self {
            words: vec![0; len.div_ceil(64)],
        }
    }

    /// Add node `i`.
    pub fn mark(&mut self, i: u32) {
        self.words[i as usize / 64] |= 1_u64 << (i % 64);
    }

    /// Whether node `i` is in the set.
    pub fn contains(&self, i: u32) -> bool {
        self.words
            .get(i as usize / 64)
            .is_some_and(|&w| w & (1_u64 << (i % 64)) != 0)
    }
}
