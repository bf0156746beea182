// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Backend implementations for different spatial strategies.
//!
//! - `flatvec`: packed list with linear scans (small, simple).
//! - `grid`: uniform cubic grid for f64 coordinates with an origin offset.
//! - `bvh`: dynamic BVH generic over `T: Scalar` (aliases: `BVHF32`, `BVHF64`, `BVHI64`).
//!
//! BVH insertion cost
//! ------------------
//! A new box descends from the root towards the child whose bounds grow least,
//! measured as `half_area(union(child, box)) - half_area(child)`. Leaves that
//! overflow are cut at the median centroid along the axis where centroids
//! spread most. Half areas are computed in a widened accumulator
//! (`f32`→`f64`, `f64`→`f64`, `i64`→`i128`).

pub mod bvh;
pub mod flatvec;
pub mod grid;

pub use grid::GridF64;
