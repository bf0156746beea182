// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Convex brush shapes.

use core::f64::consts::TAU;
use core::hash::Hasher;

use bitflags::bitflags;
use brushwork_index::Aabb3D;
use glam::{DVec2, DVec3, DVec4};
use hashbrown::HashMap;
use rustc_hash::FxHasher;

use crate::error::ShapeError;
use crate::plane::{Plane, inside_all, tangent_axes};
use crate::weld::HashedVertices;

/// Tolerance used while deriving a shape's own vertices and faces.
const SHAPE_EPSILON: f64 = 1e-7;

bitflags! {
    /// Which output streams a surface contributes to.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct LayerUsage: u8 {
        /// Drawn: render vertices with UVs and tangents.
        const RENDERABLE = 1 << 0;
        /// Part of the physics mesh.
        const COLLIDABLE = 1 << 1;
        /// Pickable in an editor.
        const SELECTABLE = 1 << 2;
    }
}

impl Default for LayerUsage {
    fn default() -> Self {
        Self::all()
    }
}

/// Affine map from brush-local positions to texture coordinates.
///
/// `uv = (u · (x, y, z, 1), v · (x, y, z, 1))`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvMatrix {
    /// Row producing the u coordinate.
    pub u: DVec4,
    /// Row producing the v coordinate.
    pub v: DVec4,
}

impl UvMatrix {
    /// Project onto the tangent plane of `normal`, `scale` units per texture repeat.
    pub fn planar(normal: DVec3, scale: f64) -> Self {
        let (u, v) = tangent_axes(normal);
        let s = if scale.abs() > f64::EPSILON { 1.0 / scale } else { 1.0 };
        Self {
            u: (u * s).extend(0.0),
            v: (v * s).extend(0.0),
        }
    }

    /// Texture coordinate of a brush-local position.
    pub fn apply(&self, local: DVec3) -> DVec2 {
        let p = local.extend(1.0);
        DVec2::new(self.u.dot(p), self.v.dot(p))
    }

    /// Brush-local directions in which u and v increase.
    pub fn axes(&self) -> (DVec3, DVec3) {
        (self.u.truncate(), self.v.truncate())
    }
}

/// Shading and usage attributes of one brush face.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SurfaceDescription {
    /// Texture mapping.
    pub uv: UvMatrix,
    /// Opaque material id, passed through to the render buffer.
    pub material: u32,
    /// Output streams this surface feeds.
    pub usage: LayerUsage,
}

impl SurfaceDescription {
    /// Planar mapping at one unit per repeat, material 0, every layer.
    pub fn planar(normal: DVec3) -> Self {
        Self {
            uv: UvMatrix::planar(normal, 1.0),
            material: 0,
            usage: LayerUsage::default(),
        }
    }
}

/// An edge of a brush: where two of its planes meet.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrushEdge {
    /// The two planes sharing this edge.
    pub planes: [u32; 2],
    /// End points, as indices into [`BrushMesh::vertices`].
    pub vertices: [u32; 2],
}

/// A bounded convex polyhedron in brush-local space.
///
/// Planes that do not contribute a face are dropped on construction, so every
/// plane has a polygon with at least three vertices. Polygons wind
/// counter-clockwise seen from outside.
#[derive(Clone, PartialEq)]
pub struct BrushMesh {
    planes: Vec<Plane>,
    surfaces: Vec<SurfaceDescription>,
    vertices: Vec<DVec3>,
    polygons: Vec<Vec<u32>>,
    edges: Vec<BrushEdge>,
    bounds: Aabb3D<f64>,
    hash: u64,
}

impl core::fmt::Debug for BrushMesh {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BrushMesh")
            .field("planes", &self.planes.len())
            .field("vertices", &self.vertices.len())
            .field("edges", &self.edges.len())
            .field("bounds", &self.bounds)
            .field("hash", &self.hash)
            .finish_non_exhaustive()
    }
}

impl BrushMesh {
    /// Build a solid from planes, with a planar surface for each.
    pub fn from_planes(planes: impl IntoIterator<Item = Plane>) -> Result<Self, ShapeError> {
        Self::from_faces(
            planes
                .into_iter()
                .map(|p| (p, SurfaceDescription::planar(p.normal))),
        )
    }

    /// Build a solid from planes paired with their surface descriptions.
    pub fn from_faces(
        faces: impl IntoIterator<Item = (Plane, SurfaceDescription)>,
    ) -> Result<Self, ShapeError> {
        let mut planes: Vec<Plane> = Vec::new();
        let mut surfaces = Vec::new();
        for (i, (plane, surface)) in faces.into_iter().enumerate() {
            let plane = Plane::new(plane.normal, plane.distance)
                .ok_or(ShapeError::NonFinitePlane(i))?;
            if planes
                .iter()
                .any(|p| p.coincides(&plane, SHAPE_EPSILON, SHAPE_EPSILON))
            {
                continue;
            }
            planes.push(plane);
            surfaces.push(surface);
        }
        if planes.len() < 4 {
            return Err(ShapeError::TooFewPlanes(planes.len()));
        }

        let mut welded = HashedVertices::new(SHAPE_EPSILON * 10.0);
        let n = planes.len();
        for i in 0..n {
            for j in i + 1..n {
                for k in j + 1..n {
                    let Some(p) =
                        Plane::intersect_three(&planes[i], &planes[j], &planes[k], SHAPE_EPSILON)
                    else {
                        continue;
                    };
                    if inside_all(&planes, p, SHAPE_EPSILON) {
                        welded.insert(p);
                    }
                }
            }
        }
        let vertices = welded.vertices().to_vec();
        if vertices.len() < 4 {
            return Err(if spans_space(&planes) {
                ShapeError::Degenerate
            } else {
                ShapeError::Unbounded
            });
        }

        // One polygon per plane; planes touching the solid only along an edge or
        // at a corner are dropped.
        let mut kept_planes = Vec::with_capacity(n);
        let mut kept_surfaces = Vec::with_capacity(n);
        let mut polygons = Vec::with_capacity(n);
        for (plane, surface) in planes.iter().zip(&surfaces) {
            let mut polygon: Vec<u32> = (0..vertices.len())
                .filter(|&v| plane.signed_distance(vertices[v]).abs() <= SHAPE_EPSILON)
                .map(index_u32)
                .collect();
            if polygon.len() < 3 {
                continue;
            }
            sort_around(&vertices, &mut polygon, plane.normal);
            if polygon_area(&vertices, &polygon, plane.normal) <= SHAPE_EPSILON {
                continue;
            }
            kept_planes.push(*plane);
            kept_surfaces.push(*surface);
            polygons.push(polygon);
        }

        let edges = match_edges(&polygons).ok_or(ShapeError::Unbounded)?;
        let euler = vertices.len() as i64 - edges.len() as i64 + polygons.len() as i64;
        if euler != 2 || volume(&vertices, &polygons, &kept_planes) <= SHAPE_EPSILON {
            return Err(ShapeError::Degenerate);
        }

        let mut bounds = Aabb3D::from_point(vertices[0].x, vertices[0].y, vertices[0].z);
        for v in &vertices[1..] {
            bounds = bounds.union(&Aabb3D::from_point(v.x, v.y, v.z));
        }
        let hash = content_hash(&kept_planes, &kept_surfaces);
        Ok(Self {
            planes: kept_planes,
            surfaces: kept_surfaces,
            vertices,
            polygons,
            edges,
            bounds,
            hash,
        })
    }

    /// An axis-aligned box between two corners.
    pub fn cuboid(min: DVec3, max: DVec3) -> Result<Self, ShapeError> {
        let planes = [
            (DVec3::X, max.x),
            (DVec3::NEG_X, -min.x),
            (DVec3::Y, max.y),
            (DVec3::NEG_Y, -min.y),
            (DVec3::Z, max.z),
            (DVec3::NEG_Z, -min.z),
        ];
        Self::from_planes(planes.into_iter().map(|(normal, distance)| Plane {
            normal,
            distance,
        }))
    }

    /// A prism with `segments` sides around the z axis, centred on the origin.
    ///
    /// The side faces touch the circle of `radius`.
    pub fn cylinder(radius: f64, height: f64, segments: u32) -> Result<Self, ShapeError> {
        if segments < 3 {
            return Err(ShapeError::TooFewPlanes(segments as usize + 2));
        }
        let half = height * 0.5;
        let sides = (0..segments).map(|i| {
            let angle = TAU * f64::from(i) / f64::from(segments);
            Plane {
                normal: DVec3::new(angle.cos(), angle.sin(), 0.0),
                distance: radius,
            }
        });
        let caps = [
            Plane {
                normal: DVec3::Z,
                distance: half,
            },
            Plane {
                normal: DVec3::NEG_Z,
                distance: half,
            },
        ];
        Self::from_planes(sides.chain(caps))
    }

    /// Outward planes, one per face.
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Surface attributes, parallel to [`planes`](Self::planes).
    pub fn surfaces(&self) -> &[SurfaceDescription] {
        &self.surfaces
    }

    /// Corner positions.
    pub fn vertices(&self) -> &[DVec3] {
        &self.vertices
    }

    /// Face polygons as vertex indices, parallel to [`planes`](Self::planes).
    pub fn polygons(&self) -> &[Vec<u32>] {
        &self.polygons
    }

    /// Edges, each listed once.
    pub fn edges(&self) -> &[BrushEdge] {
        &self.edges
    }

    /// Local-space bounds.
    pub fn bounds(&self) -> Aabb3D<f64> {
        self.bounds
    }

    /// Hash of the planes and surface descriptions.
    pub fn content_hash(&self) -> u64 {
        self.hash
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "shape vertex counts stay far below u32::MAX"
)]
fn index_u32(i: usize) -> u32 {
    i as u32
}

/// Sort vertex indices counter-clockwise around `normal`, about their centroid.
pub(crate) fn sort_around(vertices: &[DVec3], polygon: &mut [u32], normal: DVec3) {
    sort_points_around(polygon, |i| vertices[i as usize], normal);
}

/// Sort any items counter-clockwise around `normal` by the position `at` gives them.
pub(crate) fn sort_points_around<T: Copy>(items: &mut [T], at: impl Fn(T) -> DVec3, normal: DVec3) {
    if items.len() < 3 {
        return;
    }
    let centroid = items.iter().map(|&i| at(i)).sum::<DVec3>() / items.len() as f64;
    let (u, v) = tangent_axes(normal);
    let angle = |i: T| {
        let d = at(i) - centroid;
        d.dot(v).atan2(d.dot(u))
    };
    items.sort_by(|&a, &b| angle(a).total_cmp(&angle(b)));
}

/// Area of a planar polygon, via the Newell normal projected on `normal`.
pub(crate) fn polygon_area(vertices: &[DVec3], polygon: &[u32], normal: DVec3) -> f64 {
    newell(polygon.iter().map(|&i| vertices[i as usize])).dot(normal) * 0.5
}

/// Twice the vector area of a closed loop of points.
pub(crate) fn newell(points: impl Iterator<Item = DVec3> + Clone) -> DVec3 {
    let mut sum = DVec3::ZERO;
    let mut iter = points.clone();
    let Some(first) = iter.next() else {
        return sum;
    };
    let mut prev = first;
    for p in iter.chain(core::iter::once(first)) {
        sum += prev.cross(p);
        prev = p;
    }
    sum
}

/// Pair up opposite half-edges. `None` when the surface is not closed.
fn match_edges(polygons: &[Vec<u32>]) -> Option<Vec<BrushEdge>> {
    let mut half_edges: HashMap<(u32, u32), u32> = HashMap::new();
    for (face, polygon) in polygons.iter().enumerate() {
        for (a, b) in ring(polygon) {
            if half_edges.insert((a, b), index_u32(face)).is_some() {
                return None;
            }
        }
    }
    let mut edges = Vec::with_capacity(half_edges.len() / 2);
    for (&(a, b), &face) in &half_edges {
        let &twin = half_edges.get(&(b, a))?;
        if a < b {
            edges.push(BrushEdge {
                planes: [face, twin],
                vertices: [a, b],
            });
        }
    }
    edges.sort_by_key(|e| e.vertices);
    Some(edges)
}

/// Consecutive pairs of a closed loop.
pub(crate) fn ring<T: Copy>(items: &[T]) -> impl Iterator<Item = (T, T)> + '_ {
    items
        .iter()
        .copied()
        .zip(items.iter().copied().cycle().skip(1))
}

fn volume(vertices: &[DVec3], polygons: &[Vec<u32>], planes: &[Plane]) -> f64 {
    polygons
        .iter()
        .zip(planes)
        .map(|(poly, plane)| polygon_area(vertices, poly, plane.normal) * plane.distance / 3.0)
        .sum()
}

/// Whether some three normals are linearly independent.
fn spans_space(planes: &[Plane]) -> bool {
    let n = planes.len();
    (0..n).any(|i| {
        (i + 1..n).any(|j| {
            let c = planes[i].normal.cross(planes[j].normal);
            (j + 1..n).any(|k| c.dot(planes[k].normal).abs() > SHAPE_EPSILON)
        })
    })
}

fn content_hash(planes: &[Plane], surfaces: &[SurfaceDescription]) -> u64 {
    let mut h = FxHasher::default();
    for (p, s) in planes.iter().zip(surfaces) {
        for x in p.normal.to_array() {
            h.write_u64(x.to_bits());
        }
        h.write_u64(p.distance.to_bits());
        hash_surface(&mut h, s);
    }
    h.finish()
}

pub(crate) fn hash_surface(h: &mut impl Hasher, s: &SurfaceDescription) {
    for x in s.uv.u.to_array().into_iter().chain(s.uv.v.to_array()) {
        h.write_u64(x.to_bits());
    }
    h.write_u32(s.material);
    h.write_u8(s.usage.bits());
}
