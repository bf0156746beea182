// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Brushwork Index: a generic 3D AABB index.
//!
//! - Insert, update, and remove axis-aligned bounding boxes (AABBs) with user payloads.
//! - Query by point or intersecting box. Bounds are closed, so touching boxes intersect.
//! - Batch updates with [`Index::commit`] and receive damage (added/removed/moved boxes with payloads).
//!
//! It is generic over the scalar type `T` and does not depend on any geometry crate.
//! The brush hierarchy feeds tree-space brush bounds in here and the CSG broad phase
//! queries it for overlapping candidates.
//!
//! Backends are pluggable via a simple trait so you can swap the spatial strategy without API churn.
//! The default backend is a flat vector (linear scan).
//! A uniform grid backend is available for `f64` with an explicit origin offset.
//! The BVH backend is generic over the scalar and uses widened accumulator types
//! (f32→f64, f64→f64, i64→i128) for its insertion cost.
//!
//! # Example
//!
//! ```rust
//! use brushwork_index::{Aabb3D, Index};
//!
//! // Create an index and add two boxes.
//! let mut idx: Index<i64, u32> = Index::new();
//! let k1 = idx.insert(Aabb3D::new(0, 0, 0, 10, 10, 10), 1);
//! let _k2 = idx.insert(Aabb3D::new(5, 5, 5, 15, 15, 15), 2);
//! let _damage0 = idx.commit();
//!
//! // Move the first box and commit a damage set.
//! idx.update(k1, Aabb3D::new(20, 0, 0, 30, 10, 10));
//! let damage = idx.commit();
//! assert_eq!(damage.moved.len(), 1);
//! assert_eq!(damage.moved[0].0, 1);
//!
//! // Query a point inside the second box.
//! let hits: Vec<_> = idx.query_point(6, 6, 6).collect();
//! assert_eq!(hits.len(), 1);
//! assert_eq!(hits[0].1, 2);
//! ```
//!
//! The BVH backend suits brush bounds, which are irregular in size and distribution:
//!
//! ```rust
//! use brushwork_index::{Aabb3D, BVHF64, Index, IndexGeneric};
//!
//! let mut idx: IndexGeneric<f64, u32, BVHF64<u32>> = Index::<f64, u32>::with_bvh();
//! let _ = idx.insert(Aabb3D::new(0.0, 0.0, 0.0, 1.0, 1.0, 1.0), 1);
//! let _ = idx.insert(Aabb3D::new(1.0, 0.0, 0.0, 2.0, 1.0, 1.0), 2);
//! let _ = idx.commit();
//!
//! // Boxes sharing a face are both reported.
//! let mut hits: Vec<_> = idx
//!     .query_box(Aabb3D::new(0.0, 0.0, 0.0, 1.0, 1.0, 1.0))
//!     .map(|(_, p)| p)
//!     .collect();
//! hits.sort();
//! assert_eq!(hits, [1, 2]);
//! ```
//!
//! ## Choosing a backend
//!
//! - `FlatVec` (default): simplest and smallest, linear scans. Good for very small sets
//!   or when inserts/updates vastly outnumber queries.
//! - `GridF64`: uniform cubic grid; great locality and simple tuning. Choose the cell size
//!   so most AABBs fall within a handful of cells.
//! - `BVHF32`/`BVHF64`/`BVHI64`: dynamic binary hierarchy; small moves are absorbed in place
//!   and freed nodes are recycled, which suits brushes that are edited every cycle.
//!   See the [`backends`] docs for the insertion cost.
//!
//! ### Float semantics
//!
//! This crate assumes no NaNs for floating-point coordinates.
//! Area metrics use widened accumulators to reduce precision pitfalls.

#![no_std]

extern crate alloc;

pub mod backend;
pub mod backends;
pub mod damage;
pub mod index;
pub mod types;

pub use backend::Backend;
pub use backends::bvh::{BVHF32, BVHF64, BVHI64};
pub use backends::flatvec::FlatVec;
pub use backends::grid::GridF64;
pub use damage::Damage;
pub use index::{Index, IndexGeneric, Key};
pub use types::{Aabb3D, Scalar, half_area};
