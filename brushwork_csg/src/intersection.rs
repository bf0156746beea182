// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pairwise brush intersection.
//!
//! The intersection of two convex brushes is convex, and each of its corners is
//! either a corner of one brush inside the other, or where an edge of one brush
//! pierces a plane of the other. Both kinds are collected, welded, and grouped
//! per plane into [`SurfaceLoop`]s: the part of each face covered by the other
//! brush.

use std::ops::Range;

use glam::DVec3;

use crate::compact_tree::IndexOrder;
use crate::loops::{SurfaceLoop, assemble_loops};
use crate::plane::{Plane, inside_all};
use crate::settings::CsgSettings;
use crate::tree_space::TreeSpaceBrush;
use crate::weld::HashedVertices;

/// How a brush relates to another one, seen from the first.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum IntersectionKind {
    /// No shared volume or face area.
    #[default]
    None,
    /// The brushes overlap partially.
    Intersecting,
    /// This brush lies entirely inside the other.
    OtherDominates,
    /// The other brush lies entirely inside this one.
    SelfDominates,
}

impl IntersectionKind {
    /// The same relation seen from the other brush.
    pub fn reversed(self) -> Self {
        match self {
            Self::OtherDominates => Self::SelfDominates,
            Self::SelfDominates => Self::OtherDominates,
            k => k,
        }
    }
}

/// One entry of a brush's intersection list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BrushIntersection {
    /// The other brush.
    pub other: IndexOrder,
    /// Relation of the owning brush to `other`.
    pub kind: IntersectionKind,
    /// Range of `other`'s ancestors in the compact tree of the same cycle.
    pub ancestors: Range<u32>,
}

/// Result of intersecting an unordered pair.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PairIntersection {
    /// Relation of the first brush to the second.
    pub kind: IntersectionKind,
    /// Loops on the first brush's planes.
    pub first_loops: Vec<SurfaceLoop>,
    /// Loops on the second brush's planes.
    pub second_loops: Vec<SurfaceLoop>,
    /// Welded corners of the shared region.
    pub vertices: Vec<DVec3>,
}

impl PairIntersection {
    /// Loops on the planes of one side.
    pub fn loops_of(&self, first: bool) -> &[SurfaceLoop] {
        if first {
            &self.first_loops
        } else {
            &self.second_loops
        }
    }

    /// The relation seen from one side.
    pub fn kind_of(&self, first: bool) -> IntersectionKind {
        if first { self.kind } else { self.kind.reversed() }
    }
}

/// Intersect two brushes placed in tree space.
///
/// Both brushes see one welded vertex set, so loops on touching faces share
/// bit-identical corners.
pub fn intersect_pair(
    a: &TreeSpaceBrush,
    b: &TreeSpaceBrush,
    settings: &CsgSettings,
) -> PairIntersection {
    let fat = settings.plane_epsilon;
    let mut welded = HashedVertices::new(settings.weld_epsilon);

    // Brush corners first, so shared corners keep their exact positions.
    let a_inside = insert_inside(&mut welded, a.vertices(), b.planes(), fat);
    let b_inside = insert_inside(&mut welded, b.vertices(), a.planes(), fat);
    pierce(&mut welded, b, a, settings);
    pierce(&mut welded, a, b, settings);

    if welded.len() < 3 {
        return PairIntersection::default();
    }
    let vertices = welded.vertices().to_vec();
    let first_loops = assemble_loops(&vertices, a.planes(), fat, settings.min_fragment_area);
    let second_loops = assemble_loops(&vertices, b.planes(), fat, settings.min_fragment_area);
    if first_loops.is_empty() && second_loops.is_empty() {
        return PairIntersection::default();
    }
    let kind = if a_inside == a.vertices().len() {
        IntersectionKind::OtherDominates
    } else if b_inside == b.vertices().len() {
        IntersectionKind::SelfDominates
    } else {
        IntersectionKind::Intersecting
    };
    PairIntersection {
        kind,
        first_loops,
        second_loops,
        vertices,
    }
}

fn insert_inside(
    welded: &mut HashedVertices,
    corners: &[DVec3],
    planes: &[Plane],
    fat: f64,
) -> usize {
    let mut n = 0;
    for &v in corners {
        if inside_all(planes, v, fat) {
            welded.insert(v);
            n += 1;
        }
    }
    n
}

/// Where the edges of `edges_of` cross the planes of `planes_of`, inside both.
fn pierce(
    welded: &mut HashedVertices,
    edges_of: &TreeSpaceBrush,
    planes_of: &TreeSpaceBrush,
    settings: &CsgSettings,
) {
    let fat = settings.plane_epsilon;
    let own = edges_of.planes();
    for edge in edges_of.mesh().edges() {
        let p = &own[edge.planes[0] as usize];
        let q = &own[edge.planes[1] as usize];
        for r in planes_of.planes() {
            let Some(x) = Plane::intersect_three(p, q, r, settings.normal_epsilon) else {
                continue;
            };
            if inside_all(planes_of.planes(), x, fat) && inside_all(own, x, fat) {
                welded.insert(x);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush_mesh::BrushMesh;
    use glam::{DMat4, DQuat};
    use std::sync::Arc;

    fn cube(min: DVec3, max: DVec3) -> TreeSpaceBrush {
        TreeSpaceBrush::new(
            Arc::new(BrushMesh::cuboid(min, max).unwrap()),
            DMat4::IDENTITY,
        )
        .unwrap()
    }

    fn settings() -> CsgSettings {
        CsgSettings::default()
    }

    #[test]
    fn overlapping_cubes_share_a_box() {
        let a = cube(DVec3::ZERO, DVec3::splat(2.0));
        let b = cube(DVec3::ONE, DVec3::splat(3.0));
        let r = intersect_pair(&a, &b, &settings());
        assert_eq!(r.kind, IntersectionKind::Intersecting);
        assert_eq!(r.vertices.len(), 8, "the unit box [1,2]^3");
        // Three faces of each cube are cut by the other.
        assert_eq!(r.first_loops.len(), 3);
        assert_eq!(r.second_loops.len(), 3);
        for l in r.first_loops.iter().chain(&r.second_loops) {
            assert_eq!(l.vertices.len(), 4);
        }
    }

    #[test]
    fn disjoint_pair_has_no_loops() {
        let a = cube(DVec3::ZERO, DVec3::ONE);
        let b = cube(DVec3::splat(3.0), DVec3::splat(4.0));
        let r = intersect_pair(&a, &b, &settings());
        assert_eq!(r, PairIntersection::default());
    }

    #[test]
    fn edge_contact_is_not_an_intersection() {
        let a = cube(DVec3::ZERO, DVec3::ONE);
        let b = cube(DVec3::new(1.0, 1.0, 0.0), DVec3::new(2.0, 2.0, 1.0));
        let r = intersect_pair(&a, &b, &settings());
        assert_eq!(r.kind, IntersectionKind::None);
        assert!(r.first_loops.is_empty() && r.second_loops.is_empty());
    }

    #[test]
    fn bounds_touch_but_bodies_do_not() {
        // A cube rotated 45 degrees about z, whose box touches the unit cube's
        // corner region but whose body stays clear of it.
        let a = cube(DVec3::ZERO, DVec3::ONE);
        let b = TreeSpaceBrush::new(
            Arc::new(BrushMesh::cuboid(DVec3::splat(-0.5), DVec3::splat(0.5)).unwrap()),
            DMat4::from_rotation_translation(
                DQuat::from_rotation_z(core::f64::consts::FRAC_PI_4),
                DVec3::new(1.0 + 0.5 * core::f64::consts::SQRT_2 - 0.1, 1.6, 0.5),
            ),
        )
        .unwrap();
        assert!(a.bounds().overlaps(&b.bounds()));
        let r = intersect_pair(&a, &b, &settings());
        assert_eq!(r.kind, IntersectionKind::None);
    }

    #[test]
    fn shared_face_loops_are_bit_identical() {
        // Rotated and translated so the shared face is not axis aligned and the
        // plane triples involve rounding.
        let m = DMat4::from_rotation_translation(
            DQuat::from_euler(glam::EulerRot::XYZ, 0.3, 0.7, 1.1),
            DVec3::new(0.1, 0.2, 0.3),
        );
        let mesh_a = Arc::new(BrushMesh::cuboid(DVec3::ZERO, DVec3::ONE).unwrap());
        let mesh_b =
            Arc::new(BrushMesh::cuboid(DVec3::new(1.0, 0.25, 0.25), DVec3::new(2.0, 0.75, 0.75)).unwrap());
        let a = TreeSpaceBrush::new(mesh_a, m).unwrap();
        let b = TreeSpaceBrush::new(mesh_b, m).unwrap();
        let r = intersect_pair(&a, &b, &settings());
        assert_eq!(r.kind, IntersectionKind::Intersecting, "face contact counts");
        assert_eq!(r.first_loops.len(), 1);
        assert_eq!(r.second_loops.len(), 1);

        let mut first: Vec<[u64; 3]> = r.first_loops[0]
            .vertices
            .iter()
            .map(|v| v.to_array().map(f64::to_bits))
            .collect();
        let mut second: Vec<[u64; 3]> = r.second_loops[0]
            .vertices
            .iter()
            .map(|v| v.to_array().map(f64::to_bits))
            .collect();
        first.sort_unstable();
        second.sort_unstable();
        assert_eq!(first.len(), 4);
        assert_eq!(first, second);
    }

    #[test]
    fn containment_is_dominance() {
        let outer = cube(DVec3::ZERO, DVec3::splat(4.0));
        let inner = cube(DVec3::ONE, DVec3::splat(2.0));
        let r = intersect_pair(&inner, &outer, &settings());
        assert_eq!(r.kind, IntersectionKind::OtherDominates);
        assert_eq!(r.kind_of(false), IntersectionKind::SelfDominates);
        assert_eq!(r.first_loops.len(), 6, "every face of the inner brush is covered");
        assert!(r.second_loops.is_empty());
    }
}
