// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Brushwork Tree: the hierarchy store of a CSG brush tree.
//!
//! A [`Hierarchy`] holds one tree of nodes: a root, branches that combine their
//! children, and brushes that reference convex shapes. Nodes are addressed by
//! generational [`NodeId`] handles that also carry the id of the hierarchy that
//! issued them, so stale or foreign handles are rejected.
//!
//! - Children of a node live in one contiguous run of the backing array; attaching
//!   and detaching shift that run instead of relinking pointers.
//! - Edits set [`NodeStatusFlags`] bits. A dirty scan ([`Hierarchy::collect_dirty`])
//!   turns them into work lists for an evaluation cycle and
//!   [`Hierarchy::acknowledge`] clears them once the cycle succeeded.
//! - Tree-space brush bounds are mirrored into a [`brushwork_index`] BVH for
//!   overlap queries.
//! - [`Hierarchy::check_consistency`] verifies the structural invariants.
//!
//! Read queries take stale handles gracefully (`None`/`false`); mutators panic on
//! them, since that is a caller bug.
//!
//! # Example
//!
//! ```rust
//! use brushwork_tree::{CsgOperation, Hierarchy, NodeStatusFlags, ShapeId, ShapeRef};
//! use glam::{DMat4, DVec3};
//!
//! let mut tree = Hierarchy::new();
//! let root = tree.root();
//! let cube = Some(ShapeRef { id: ShapeId(0), hash: 1 });
//!
//! let branch = tree.create_branch(Some(root));
//! let a = tree.create_brush(cube, Some(branch));
//! let b = tree.create_brush(cube, Some(branch));
//! tree.set_operation(b, CsgOperation::Subtractive);
//!
//! // Both brushes are new and need a full evaluation.
//! let scan = tree.scan_dirty();
//! assert_eq!(scan.rebuild, [a, b]);
//!
//! // Moving a brush only asks for a transform refresh.
//! let moved = tree.set_transform(a, DMat4::from_translation(DVec3::X));
//! assert!(moved.contains(NodeStatusFlags::TRANSFORM_MODIFIED));
//! let scan = tree.scan_dirty();
//! assert!(scan.rebuild.is_empty());
//! assert_eq!(scan.transform_only, [a]);
//!
//! // Deleting the branch frees both brushes.
//! assert!(tree.delete(branch, true));
//! assert!(!tree.is_valid(a));
//! assert!(tree.check_consistency().is_ok());
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

pub mod consistency;
pub mod dirty;
pub mod hierarchy;
pub mod types;

pub use consistency::ConsistencyError;
pub use dirty::DirtyScan;
pub use hierarchy::Hierarchy;
pub use types::{CsgOperation, HierarchyId, NodeId, NodeKind, NodeStatusFlags, ShapeId, ShapeRef};

pub use brushwork_index::Aabb3D;
