// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Numeric tolerances and switches for an evaluation cycle.

/// Tolerances used by the geometry stages.
///
/// The defaults suit scenes measured in units between millimetres and
/// kilometres. All distances are in tree space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CsgSettings {
    /// Half-thickness of a "fat" plane: points closer than this count as on it.
    pub plane_epsilon: f64,
    /// Plane triples whose normal determinant falls below this are skipped as
    /// near-parallel. Also the tolerance for treating two normals as equal.
    pub normal_epsilon: f64,
    /// Radius inside which two vertices are snapped to one.
    pub weld_epsilon: f64,
    /// Distance of the probe points in front of and behind a fragment.
    pub surface_offset: f64,
    /// Fragments with a smaller area are dropped.
    pub min_fragment_area: f64,
    /// Run [`Hierarchy::check_consistency`](brushwork_tree::Hierarchy::check_consistency)
    /// before every cycle.
    pub check_consistency: bool,
}

impl Default for CsgSettings {
    fn default() -> Self {
        Self {
            plane_epsilon: 1e-5,
            normal_epsilon: 1e-6,
            weld_epsilon: 1e-5,
            surface_offset: 1e-4,
            min_fragment_area: 1e-9,
            check_consistency: cfg!(debug_assertions),
        }
    }
}
