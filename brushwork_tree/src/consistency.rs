// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Invariant checks over the whole arena, for tests and debug builds.

use alloc::vec;

use crate::hierarchy::Hierarchy;
use crate::types::{NodeId, NodeKind, ShapeId};

/// A broken invariant found by [`Hierarchy::check_consistency`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConsistencyError {
    /// A live slot does not point at a record carrying its handle.
    #[error("slot {slot} does not point at its record")]
    SlotMismatch {
        /// The slot.
        slot: u32,
    },
    /// A record sits in the array but its slot is dead or points elsewhere.
    #[error("record at position {position} is not referenced by its slot")]
    OrphanRecord {
        /// Array position of the record.
        position: usize,
    },
    /// A node's parent is invalid or does not list the node in its child range.
    #[error("parent of {node:?} does not contain it")]
    DanglingParent {
        /// The child.
        node: NodeId,
    },
    /// A child range runs past the array, contains a hole, or holds a foreign node.
    #[error("child range of {node:?} is broken")]
    BrokenChildRange {
        /// The parent.
        node: NodeId,
    },
    /// A brush has children.
    #[error("brush {node:?} has children")]
    BrushWithChildren {
        /// The brush.
        node: NodeId,
    },
    /// The parent chain of a node loops.
    #[error("cycle through {node:?}")]
    Cycle {
        /// A node on the cycle.
        node: NodeId,
    },
    /// The shape map and the brushes' registrations disagree.
    #[error("shape map entry {shape:?} disagrees with brush {node:?}")]
    ShapeBackReference {
        /// The shape.
        shape: ShapeId,
        /// The brush.
        node: NodeId,
    },
    /// A brush's bounds and its spatial index entry disagree.
    #[error("index entry of {node:?} does not match its bounds")]
    IndexBookkeeping {
        /// The brush.
        node: NodeId,
    },
}

impl Hierarchy {
    /// Walk the arena and verify every structural invariant.
    pub fn check_consistency(&self) -> Result<(), ConsistencyError> {
        for (slot, s) in self.slots.iter().enumerate() {
            if !s.live {
                continue;
            }
            #[allow(
                clippy::cast_possible_truncation,
                reason = "NodeId uses 32-bit slots by design."
            )]
            let slot = slot as u32;
            match self.records.get(s.position).and_then(Option::as_ref) {
                Some(r) if r.id.slot() == slot && r.id.generation() == s.generation => {}
                _ => return Err(ConsistencyError::SlotMismatch { slot }),
            }
        }
        for (position, r) in self.records.iter().enumerate() {
            let Some(r) = r else { continue };
            if !self.is_valid(r.id) || self.slots[r.id.idx()].position != position {
                return Err(ConsistencyError::OrphanRecord { position });
            }
            if r.kind == NodeKind::Brush && r.child_count > 0 {
                return Err(ConsistencyError::BrushWithChildren { node: r.id });
            }
            if r.child_range().end > self.records.len() {
                return Err(ConsistencyError::BrokenChildRange { node: r.id });
            }
            for child in &self.records[r.child_range()] {
                match child {
                    Some(c) if c.parent == Some(r.id) => {}
                    _ => return Err(ConsistencyError::BrokenChildRange { node: r.id }),
                }
            }
            if let Some(p) = r.parent {
                let Some(parent) = self.get(p) else {
                    return Err(ConsistencyError::DanglingParent { node: r.id });
                };
                if !parent.child_range().contains(&position) {
                    return Err(ConsistencyError::DanglingParent { node: r.id });
                }
            }
            self.check_index_entry(r.id)?;
        }
        self.check_acyclic()?;
        for (&shape, users) in &self.shape_users {
            for &node in users {
                let ok = self
                    .get(node)
                    .is_some_and(|r| r.kind == NodeKind::Brush && r.registered_shape == Some(shape));
                if !ok {
                    return Err(ConsistencyError::ShapeBackReference { shape, node });
                }
            }
        }
        for r in self.records.iter().flatten() {
            if let Some(shape) = r.registered_shape
                && !self.shape_users.get(&shape).is_some_and(|u| u.contains(&r.id))
            {
                return Err(ConsistencyError::ShapeBackReference { shape, node: r.id });
            }
        }
        Ok(())
    }

    fn check_index_entry(&self, id: NodeId) -> Result<(), ConsistencyError> {
        let r = self.record(id);
        let ok = match (r.bounds, r.index_key) {
            (None, None) => true,
            (Some(b), Some(key)) => self.bounds_index.get(key) == Some((b, id)),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(ConsistencyError::IndexBookkeeping { node: id })
        }
    }

    fn check_acyclic(&self) -> Result<(), ConsistencyError> {
        // Every parent chain must end within `len` steps.
        let limit = self.len();
        let mut stack = vec![];
        for r in self.records.iter().flatten() {
            stack.clear();
            let mut cur = Some(r.id);
            while let Some(id) = cur {
                stack.push(id);
                if stack.len() > limit {
                    return Err(ConsistencyError::Cycle { node: r.id });
                }
                cur = self.get(id).and_then(|n| n.parent);
            }
        }
        Ok(())
    }
}
