// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Brushwork CSG: incremental constructive solid geometry over convex brushes.
//!
//! A [`CsgTree`] holds a [`Hierarchy`](brushwork_tree::Hierarchy) of brushes
//! and branches, each combining with the siblings before it through a
//! [`CsgOperation`]. Every brush gets a [`RenderBuffer`] holding the parts of its
//! surface that lie on the boundary of the combined solid. Edits only mark
//! nodes; [`CsgTree::update`] then recomputes just the brushes whose result can
//! have changed:
//!
//! - dirty brushes are placed in tree space and their bounds refreshed;
//! - a [`CompactTree`] snapshot gives every brush a dense index and its
//!   ancestor range;
//! - the broad phase pairs brushes with overlapping bounds;
//! - each pair is intersected into per-plane [`SurfaceLoop`]s sharing welded
//!   corners;
//! - faces are split by their neighbours, each fragment is classified by
//!   evaluating the CSG expression just behind and in front of it, and the
//!   visible fragments are triangulated into vertex streams.
//!
//! The stages run in parallel with `rayon`. Until results are committed the
//! hierarchy is only read, so a failed cycle ([`CycleError`]) leaves the
//! previous buffers and the pending edits in place.
//!
//! # Example
//!
//! ```rust
//! use brushwork_csg::{BrushMesh, CsgOperation, CsgTree};
//! use glam::DVec3;
//!
//! let mut csg = CsgTree::default();
//! let block = csg.add_shape(BrushMesh::cuboid(DVec3::ZERO, DVec3::splat(2.0)));
//! let notch = csg.add_shape(BrushMesh::cuboid(DVec3::ONE, DVec3::splat(3.0)));
//!
//! let a = csg.create_brush(Some(csg.root()), Some(block));
//! let b = csg.create_brush(Some(csg.root()), Some(notch));
//! csg.set_operation(b, CsgOperation::Subtractive);
//!
//! let out = csg.update().unwrap();
//! assert_eq!(out.stats.intersecting_pairs, 1);
//!
//! // The block lost its corner; the notch only shows its inner walls.
//! let block = csg.render_buffer(a).unwrap();
//! assert_eq!(block.surfaces.len(), 6);
//! let walls = csg.render_buffer(b).unwrap();
//! assert!(walls.surfaces.iter().all(|s| s.reversed));
//!
//! // Nothing changed since: the next cycle is empty.
//! assert!(csg.update().unwrap().is_empty());
//! ```
//!
//! Shapes are convex solids bounded by planes; see [`BrushMesh::from_planes`].
//! Invalid shapes are kept in the [`ShapeRegistry`] as "no geometry", so a
//! brush referencing one simply produces no buffer.

pub mod broadphase;
pub mod brush_mesh;
pub mod categorize;
pub mod compact_tree;
pub mod error;
pub mod evaluator;
pub mod intersection;
pub mod loops;
pub mod plane;
pub mod render_buffer;
pub mod settings;
pub mod shapes;
pub mod tree_space;
pub mod triangulate;
pub mod vertex;
pub mod weld;

pub use brush_mesh::{BrushEdge, BrushMesh, LayerUsage, SurfaceDescription, UvMatrix};
pub use compact_tree::{CompactTree, IndexOrder};
pub use error::{CycleError, ShapeError};
pub use evaluator::{BrushUpdate, CsgTree, CycleListener, CycleOutput, CycleStats};
pub use intersection::{BrushIntersection, IntersectionKind};
pub use loops::SurfaceLoop;
pub use plane::Plane;
pub use render_buffer::{RenderBuffer, SurfaceBuffer};
pub use settings::CsgSettings;
pub use shapes::ShapeRegistry;
pub use tree_space::TreeSpaceBrush;
pub use vertex::{RenderVertex, SelectionVertex};

pub use brushwork_tree::{CsgOperation, NodeId, ShapeId};
