// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Render-buffer assembly from categorized fragments.

use core::hash::Hasher;
use std::collections::BTreeMap;

use brushwork_tree::NodeId;
use glam::{DMat3, DVec3};
use hashbrown::HashMap;
use rustc_hash::FxHasher;

use crate::brush_mesh::{LayerUsage, SurfaceDescription, hash_surface};
use crate::categorize::{Categorized, Fragment};
use crate::plane::tangent_axes;
use crate::settings::CsgSettings;
use crate::tree_space::TreeSpaceBrush;
use crate::triangulate::triangulate_surface;
use crate::vertex::{RenderVertex, SelectionVertex};

/// Triangles of one visible side of one brush face.
///
/// The vertex streams are parallel: `indices` address the same vertex in each
/// stream that is filled. Streams the surface's [`LayerUsage`] leaves out are
/// empty.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceBuffer {
    /// Plane index within the brush.
    pub surface: u32,
    /// The side facing against the plane normal.
    pub reversed: bool,
    /// Material id of the surface.
    pub material: u32,
    /// Streams this surface feeds.
    pub usage: LayerUsage,
    /// Triangle list, counter-clockwise seen from the visible side.
    pub indices: Vec<u32>,
    /// Filled for [`LayerUsage::RENDERABLE`].
    pub render_vertices: Vec<RenderVertex>,
    /// Filled for [`LayerUsage::COLLIDABLE`].
    pub physics_positions: Vec<[f32; 3]>,
    /// Filled for [`LayerUsage::SELECTABLE`].
    pub selection_vertices: Vec<SelectionVertex>,
    /// Hash of positions and indices.
    pub geometry_hash: u64,
    /// Hash of texture coordinates, tangents and the surface description.
    pub surface_hash: u64,
}

/// Output geometry of one brush.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderBuffer {
    /// The brush node.
    pub brush: NodeId,
    /// Non-empty surfaces, ordered by plane and side.
    pub surfaces: Vec<SurfaceBuffer>,
    /// Combined geometry hash of all surfaces.
    pub geometry_hash: u64,
    /// Combined surface hash of all surfaces.
    pub surface_hash: u64,
}

impl RenderBuffer {
    /// Total triangle count.
    pub fn triangle_count(&self) -> usize {
        self.surfaces.iter().map(|s| s.indices.len() / 3).sum()
    }

    /// Surfaces built from one plane.
    pub fn surfaces_of(&self, plane: u32) -> impl Iterator<Item = &SurfaceBuffer> + '_ {
        self.surfaces.iter().filter(move |s| s.surface == plane)
    }
}

/// Fragment rings per visible side of each face, ordered by `(plane, reversed)`.
pub fn group_fragments(fragments: &[Fragment]) -> BTreeMap<(u32, bool), Vec<Vec<u32>>> {
    let mut groups: BTreeMap<(u32, bool), Vec<Vec<u32>>> = BTreeMap::new();
    for f in fragments {
        groups
            .entry((f.plane, f.reversed))
            .or_default()
            .push(f.vertices.clone());
    }
    groups
}

/// Triangulate every visible surface of `brush` and fill its vertex streams.
///
/// Returns `None` when no surface produced a triangle.
pub fn build_render_buffer(
    node: NodeId,
    brush: &TreeSpaceBrush,
    categorized: &Categorized,
    settings: &CsgSettings,
) -> Option<RenderBuffer> {
    let positions = categorized.vertices.vertices();
    let mut surfaces = Vec::new();
    for ((plane, reversed), rings) in group_fragments(&categorized.fragments) {
        let description = brush.mesh().surfaces()[plane as usize];
        if description.usage.is_empty() {
            continue;
        }
        let normal = brush.planes()[plane as usize].normal;
        let facing = if reversed { -normal } else { normal };
        let triangles = triangulate_surface(positions, &rings, facing, settings.weld_epsilon);
        if triangles.is_empty() {
            continue;
        }
        surfaces.push(build_surface(
            node, brush, plane, reversed, facing, description, positions, &triangles,
        ));
    }
    if surfaces.is_empty() {
        return None;
    }

    let mut geometry = FxHasher::default();
    let mut surface = FxHasher::default();
    for s in &surfaces {
        geometry.write_u64(s.geometry_hash);
        surface.write_u64(s.surface_hash);
    }
    Some(RenderBuffer {
        brush: node,
        surfaces,
        geometry_hash: geometry.finish(),
        surface_hash: surface.finish(),
    })
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "render streams are single precision; per-surface vertex counts fit in u32"
)]
fn build_surface(
    node: NodeId,
    brush: &TreeSpaceBrush,
    plane: u32,
    reversed: bool,
    facing: DVec3,
    description: SurfaceDescription,
    positions: &[DVec3],
    triangles: &[[u32; 3]],
) -> SurfaceBuffer {
    // Compact the welded table down to the vertices this surface uses.
    let mut remap: HashMap<u32, u32> = HashMap::new();
    let mut used: Vec<DVec3> = Vec::new();
    let mut indices = Vec::with_capacity(triangles.len() * 3);
    for &v in triangles.iter().flatten() {
        let next = used.len() as u32;
        let local = *remap.entry(v).or_insert_with(|| {
            used.push(positions[v as usize]);
            next
        });
        indices.push(local);
    }

    let usage = description.usage;
    let to_f32 = |v: DVec3| v.as_vec3().to_array();

    let mut geometry = FxHasher::default();
    for p in &used {
        for x in p.to_array() {
            geometry.write_u64(x.to_bits());
        }
    }
    for &i in &indices {
        geometry.write_u32(i);
    }

    let mut render_vertices = Vec::new();
    let mut surface = FxHasher::default();
    hash_surface(&mut surface, &description);
    surface.write_u8(u8::from(reversed));
    if usage.contains(LayerUsage::RENDERABLE) {
        let tangent = surface_tangent(brush, description, facing);
        for x in tangent {
            surface.write_u32(x.to_bits());
        }
        let tree_to_local = brush.tree_to_local();
        render_vertices.reserve(used.len());
        for &p in &used {
            let uv = description.uv.apply(tree_to_local.transform_point3(p));
            let uv = [uv.x as f32, uv.y as f32];
            surface.write_u32(uv[0].to_bits());
            surface.write_u32(uv[1].to_bits());
            render_vertices.push(RenderVertex {
                position: to_f32(p),
                normal: to_f32(facing),
                tangent,
                uv,
            });
        }
    }
    let physics_positions = if usage.contains(LayerUsage::COLLIDABLE) {
        used.iter().map(|&p| to_f32(p)).collect()
    } else {
        Vec::new()
    };
    let selection_vertices = if usage.contains(LayerUsage::SELECTABLE) {
        used.iter()
            .map(|&p| SelectionVertex {
                position: to_f32(p),
                brush: node.slot(),
                surface: plane,
            })
            .collect()
    } else {
        Vec::new()
    };

    SurfaceBuffer {
        surface: plane,
        reversed,
        material: description.material,
        usage,
        indices,
        render_vertices,
        physics_positions,
        selection_vertices,
        geometry_hash: geometry.finish(),
        surface_hash: surface.finish(),
    }
}

/// Tree-space direction of increasing u within the surface, with the bitangent
/// sign in `w`.
#[allow(
    clippy::cast_possible_truncation,
    reason = "render streams are single precision"
)]
fn surface_tangent(brush: &TreeSpaceBrush, description: SurfaceDescription, facing: DVec3) -> [f32; 4] {
    // Texture coordinates are affine in local space, so their tree-space
    // gradients go through the transposed inverse.
    let gradient = DMat3::from_mat4(brush.tree_to_local()).transpose();
    let (u_local, v_local) = description.uv.axes();
    let (du, dv) = (gradient * u_local, gradient * v_local);
    let mut t = (du - facing * du.dot(facing)).normalize_or_zero();
    if t == DVec3::ZERO {
        t = tangent_axes(facing).0;
    }
    let w = if facing.cross(t).dot(dv) < 0.0 { -1.0 } else { 1.0 };
    [t.x as f32, t.y as f32, t.z as f32, w]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brush_mesh::BrushMesh;
    use crate::categorize::categorize;
    use crate::compact_tree::CompactTree;
    use brushwork_tree::{Hierarchy, ShapeId, ShapeRef};
    use glam::DMat4;
    use std::sync::Arc;

    fn lone_buffer(mesh: BrushMesh, transform: DMat4) -> Option<RenderBuffer> {
        let mut h = Hierarchy::new();
        let shape = Some(ShapeRef {
            id: ShapeId(0),
            hash: 0,
        });
        let id = h.create_brush(shape, Some(h.root()));
        let tree = CompactTree::build(&h).unwrap();
        let brush = TreeSpaceBrush::new(Arc::new(mesh), transform).unwrap();
        let settings = CsgSettings::default();
        let c = categorize(0, &brush, &[], &tree, &settings);
        build_render_buffer(id, &brush, &c, &settings)
    }

    fn unit_cube() -> BrushMesh {
        BrushMesh::cuboid(DVec3::ZERO, DVec3::ONE).unwrap()
    }

    #[test]
    fn cube_has_six_quads() {
        let buffer = lone_buffer(unit_cube(), DMat4::IDENTITY).unwrap();
        assert_eq!(buffer.surfaces.len(), 6);
        assert_eq!(buffer.triangle_count(), 12);
        for s in &buffer.surfaces {
            assert_eq!(s.render_vertices.len(), 4);
            assert_eq!(s.physics_positions.len(), 4);
            assert_eq!(s.selection_vertices.len(), 4);
            assert!(!s.reversed);
            // Triangles face along the stored normal.
            for t in s.indices.chunks_exact(3) {
                let p = |i: u32| glam::Vec3::from(s.render_vertices[i as usize].position);
                let n = (p(t[1]) - p(t[0])).cross(p(t[2]) - p(t[0]));
                let stored = glam::Vec3::from(s.render_vertices[0].normal);
                assert!(n.dot(stored) > 0.0, "triangle winding");
            }
        }
    }

    #[test]
    fn tangents_are_unit_and_in_plane() {
        let m = DMat4::from_rotation_y(0.4) * DMat4::from_scale(DVec3::new(2.0, 1.0, 0.5));
        let buffer = lone_buffer(unit_cube(), m).unwrap();
        for s in &buffer.surfaces {
            let v = s.render_vertices[0];
            let t = glam::Vec3::new(v.tangent[0], v.tangent[1], v.tangent[2]);
            let n = glam::Vec3::from(v.normal);
            assert!((t.length() - 1.0).abs() < 1e-5);
            assert!(t.dot(n).abs() < 1e-5);
            assert!(v.tangent[3].abs() == 1.0);
        }
    }

    #[test]
    fn moving_changes_geometry_but_not_surface_hash() {
        let a = lone_buffer(unit_cube(), DMat4::IDENTITY).unwrap();
        let b = lone_buffer(unit_cube(), DMat4::IDENTITY).unwrap();
        assert_eq!(a.geometry_hash, b.geometry_hash);
        assert_eq!(a.surface_hash, b.surface_hash);

        let moved = lone_buffer(unit_cube(), DMat4::from_translation(DVec3::X * 0.5)).unwrap();
        assert_ne!(a.geometry_hash, moved.geometry_hash);
    }

    #[test]
    fn material_changes_only_the_surface_hash() {
        let plain = BrushMesh::from_faces(
            unit_cube()
                .planes()
                .iter()
                .map(|&p| (p, SurfaceDescription::planar(p.normal))),
        )
        .unwrap();
        let painted = BrushMesh::from_faces(unit_cube().planes().iter().map(|&p| {
            let mut s = SurfaceDescription::planar(p.normal);
            s.material = 7;
            (p, s)
        }))
        .unwrap();
        let a = lone_buffer(plain, DMat4::IDENTITY).unwrap();
        let b = lone_buffer(painted, DMat4::IDENTITY).unwrap();
        assert_eq!(a.geometry_hash, b.geometry_hash);
        assert_ne!(a.surface_hash, b.surface_hash);
        assert!(b.surfaces.iter().all(|s| s.material == 7));
    }

    #[test]
    fn usage_gates_streams() {
        let mesh = BrushMesh::from_faces(unit_cube().planes().iter().enumerate().map(|(i, &p)| {
            let mut s = SurfaceDescription::planar(p.normal);
            s.usage = match i {
                0 => LayerUsage::COLLIDABLE,
                1 => LayerUsage::empty(),
                _ => LayerUsage::all(),
            };
            (p, s)
        }))
        .unwrap();
        let buffer = lone_buffer(mesh, DMat4::IDENTITY).unwrap();
        assert_eq!(buffer.surfaces.len(), 5, "a surface with no usage is omitted");
        let first = buffer.surfaces_of(0).next().unwrap();
        assert!(first.render_vertices.is_empty());
        assert!(first.selection_vertices.is_empty());
        assert_eq!(first.physics_positions.len(), 4);
        assert!(buffer.surfaces_of(1).next().is_none());
    }

    #[test]
    fn nothing_visible_is_none() {
        let mut h = Hierarchy::new();
        let id = h.create_brush(
            Some(ShapeRef {
                id: ShapeId(0),
                hash: 0,
            }),
            Some(h.root()),
        );
        h.set_operation(id, brushwork_tree::CsgOperation::Subtractive);
        let tree = CompactTree::build(&h).unwrap();
        let brush = TreeSpaceBrush::new(Arc::new(unit_cube()), DMat4::IDENTITY).unwrap();
        let settings = CsgSettings::default();
        let c = categorize(0, &brush, &[], &tree, &settings);
        assert!(c.fragments.is_empty());
        assert!(build_render_buffer(id, &brush, &c, &settings).is_none());
    }
}
