// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Handles, node kinds, operations and status flags.

use bitflags::bitflags;
use core::sync::atomic::{AtomicU32, Ordering};

static NEXT_HIERARCHY: AtomicU32 = AtomicU32::new(1);

/// Identifies one [`Hierarchy`](crate::Hierarchy) instance.
///
/// Handles carry it so that a handle from one tree is rejected by another.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HierarchyId(u32);

impl HierarchyId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HIERARCHY.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identifier for a node in a hierarchy (generational).
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(u32, u32, HierarchyId);

impl NodeId {
    pub(crate) const fn new(slot: u32, generation: u32, hierarchy: HierarchyId) -> Self {
        Self(slot, generation, hierarchy)
    }

    /// Dense slot number. Slots are reused after deletion, so this is only unique
    /// among live nodes.
    pub const fn slot(self) -> u32 {
        self.0
    }

    /// Generation of the slot when this handle was issued.
    pub const fn generation(self) -> u32 {
        self.1
    }

    /// Hierarchy that issued the handle.
    pub const fn hierarchy(self) -> HierarchyId {
        self.2
    }

    pub(crate) const fn idx(self) -> usize {
        self.0 as usize
    }
}

/// What a node is.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// The root of a hierarchy. There is exactly one per hierarchy.
    Tree,
    /// Combines its children; carries an operation and a transform but no shape.
    Branch,
    /// Leaf referencing a convex shape.
    Brush,
}

/// How a node combines with the siblings that precede it.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum CsgOperation {
    /// Union.
    #[default]
    Additive,
    /// Difference: removes this node's volume from what came before.
    Subtractive,
    /// Intersection: keeps only what came before that lies inside this node.
    Intersecting,
}

/// Identifies a shape in a shape registry.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShapeId(pub u32);

/// A brush's reference to a shape together with the shape's content hash.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ShapeRef {
    /// Registry key.
    pub id: ShapeId,
    /// Content hash at the time the reference was set.
    pub hash: u64,
}

bitflags! {
    /// Per-node status bits. Set by edits, cleared only by the dirty scan.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NodeStatusFlags: u16 {
        /// Shape reference or shape content changed.
        const SHAPE_MODIFIED           = 1 << 0;
        /// Local transform (own or inherited) changed.
        const TRANSFORM_MODIFIED       = 1 << 1;
        /// Operation (own or inherited) changed.
        const OPERATION_MODIFIED       = 1 << 2;
        /// The node moved to a different parent or position.
        const HIERARCHY_MODIFIED       = 1 << 3;
        /// Everything about the node must be recomputed (new nodes).
        const NEEDS_FULL_UPDATE        = 1 << 4;
        /// Every brush overlapping this one must be recomputed as well.
        const NEED_ALL_TOUCHING_UPDATE = 1 << 5;
        /// The child set of a branch changed.
        const BRANCH_NEEDS_UPDATE      = 1 << 6;
        /// Set on the root whenever anything below it changed.
        const TREE_NEEDS_UPDATE        = 1 << 7;
    }
}

impl NodeStatusFlags {
    /// Bits that force a full boolean re-evaluation of a brush.
    pub const REBUILD: Self = Self::SHAPE_MODIFIED
        .union(Self::OPERATION_MODIFIED)
        .union(Self::HIERARCHY_MODIFIED)
        .union(Self::NEEDS_FULL_UPDATE);

    /// Bits that change the structure of the CSG expression.
    pub const TOPOLOGY: Self = Self::OPERATION_MODIFIED
        .union(Self::HIERARCHY_MODIFIED)
        .union(Self::BRANCH_NEEDS_UPDATE);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hierarchy_ids_are_unique() {
        let a = HierarchyId::next();
        let b = HierarchyId::next();
        assert_ne!(a, b);
    }

    #[test]
    fn rebuild_bits_exclude_transform() {
        assert!(!NodeStatusFlags::REBUILD.contains(NodeStatusFlags::TRANSFORM_MODIFIED));
        assert!(NodeStatusFlags::REBUILD.contains(NodeStatusFlags::NEEDS_FULL_UPDATE));
    }
}
