// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Brush shapes placed in tree space.

use std::sync::Arc;

use brushwork_index::Aabb3D;
use glam::{DMat4, DVec3};

use crate::brush_mesh::BrushMesh;
use crate::plane::{Plane, normal_matrix};

/// A brush's shape mapped through its node-to-tree transform.
///
/// All pairwise geometry runs in tree space, so two brushes meeting at a face
/// compute the same intersection points regardless of their own transforms.
#[derive(Clone)]
pub struct TreeSpaceBrush {
    mesh: Arc<BrushMesh>,
    local_to_tree: DMat4,
    tree_to_local: DMat4,
    planes: Vec<Plane>,
    vertices: Vec<DVec3>,
    bounds: Aabb3D<f64>,
    mirrored: bool,
}

impl core::fmt::Debug for TreeSpaceBrush {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TreeSpaceBrush")
            .field("mesh", &self.mesh)
            .field("bounds", &self.bounds)
            .field("mirrored", &self.mirrored)
            .finish_non_exhaustive()
    }
}

impl TreeSpaceBrush {
    /// Place `mesh` with `local_to_tree`.
    ///
    /// Returns `None` for a singular or non-finite transform.
    pub fn new(mesh: Arc<BrushMesh>, local_to_tree: DMat4) -> Option<Self> {
        let det = local_to_tree.determinant();
        if !det.is_finite() || det.abs() <= f64::EPSILON {
            return None;
        }
        let normals = normal_matrix(&local_to_tree);
        let planes: Vec<Plane> = mesh
            .planes()
            .iter()
            .map(|p| p.transformed_with(&local_to_tree, &normals))
            .collect();
        let vertices: Vec<DVec3> = mesh
            .vertices()
            .iter()
            .map(|&v| local_to_tree.transform_point3(v))
            .collect();
        let first = *vertices.first()?;
        let mut bounds = Aabb3D::from_point(first.x, first.y, first.z);
        for v in &vertices[1..] {
            bounds = bounds.union(&Aabb3D::from_point(v.x, v.y, v.z));
        }
        Some(Self {
            tree_to_local: local_to_tree.inverse(),
            mesh,
            local_to_tree,
            planes,
            vertices,
            bounds,
            mirrored: det < 0.0,
        })
    }

    /// The shape in brush-local space.
    pub fn mesh(&self) -> &Arc<BrushMesh> {
        &self.mesh
    }

    /// Brush-local to tree space.
    pub fn local_to_tree(&self) -> DMat4 {
        self.local_to_tree
    }

    /// Tree space to brush-local.
    pub fn tree_to_local(&self) -> DMat4 {
        self.tree_to_local
    }

    /// Outward planes in tree space, parallel to [`BrushMesh::planes`].
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Corners in tree space, parallel to [`BrushMesh::vertices`].
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Tree-space bounds.
    pub fn bounds(&self) -> Aabb3D<f64> {
        self.bounds
    }

    /// Corners of face `plane`, counter-clockwise seen from outside in tree space.
    pub fn polygon(&self, plane: usize) -> Vec<DVec3> {
        let mut out: Vec<DVec3> = self.mesh.polygons()[plane]
            .iter()
            .map(|&i| self.vertices[i as usize])
            .collect();
        // A mirroring transform flips the winding.
        if self.mirrored {
            out.reverse();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush_mesh::polygon_area;

    #[test]
    fn translated_cube_bounds_and_planes() {
        let mesh = Arc::new(BrushMesh::cuboid(DVec3::ZERO, DVec3::ONE).unwrap());
        let b = TreeSpaceBrush::new(mesh, DMat4::from_translation(DVec3::new(2.0, 0.0, 0.0)))
            .unwrap();
        assert_eq!(b.bounds(), Aabb3D::new(2.0, 0.0, 0.0, 3.0, 1.0, 1.0));
        for p in b.planes() {
            assert!(p.signed_distance(DVec3::new(2.5, 0.5, 0.5)) < 0.0);
        }
    }

    #[test]
    fn mirrored_polygons_keep_outward_winding() {
        let mesh = Arc::new(BrushMesh::cuboid(DVec3::ZERO, DVec3::ONE).unwrap());
        let b = TreeSpaceBrush::new(mesh, DMat4::from_scale(DVec3::new(-1.0, 1.0, 1.0))).unwrap();
        for (i, plane) in b.planes().iter().enumerate() {
            let poly = b.polygon(i);
            let idx: Vec<u32> = (0_u32..).take(poly.len()).collect();
            assert!(polygon_area(&poly, &idx, plane.normal) > 0.0, "face {i}");
        }
    }

    #[test]
    fn singular_transform_is_rejected() {
        let mesh = Arc::new(BrushMesh::cuboid(DVec3::ZERO, DVec3::ONE).unwrap());
        assert!(TreeSpaceBrush::new(mesh, DMat4::from_scale(DVec3::new(1.0, 0.0, 1.0))).is_none());
    }
}
