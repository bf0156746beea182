// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Surface categorization.
//!
//! Each face of a brush is cut into convex fragments by the planes of every
//! brush that covers part of it. A fragment then lies either fully inside or
//! fully outside each neighbour, so one probe pair per fragment decides it:
//! the CSG expression is evaluated just behind and just in front of the
//! fragment, and the fragment is part of the boundary when the two differ.

use core::iter;

use glam::DVec3;

use crate::brush_mesh::newell;
use crate::compact_tree::{CompactTree, TouchedSet};
use crate::loops::{SurfaceLoop, remove_degenerate_runs};
use crate::plane::Plane;
use crate::settings::CsgSettings;
use crate::tree_space::TreeSpaceBrush;
use crate::weld::HashedVertices;

/// Another brush as seen while categorizing one brush.
#[derive(Clone, Copy, Debug)]
pub struct Neighbor<'a> {
    /// Dense index of the neighbour.
    pub index: u32,
    /// Its tree-space shape.
    pub brush: &'a TreeSpaceBrush,
    /// Loops of the shared region on the categorized brush's planes.
    pub loops: &'a [SurfaceLoop],
    /// Welded corners of the shared region.
    pub seeds: &'a [DVec3],
}

/// A visible convex piece of a brush face.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Face (plane index) the piece belongs to.
    pub plane: u32,
    /// The piece faces against the plane normal.
    pub reversed: bool,
    /// Corners as indices into [`Categorized::vertices`], counter-clockwise
    /// around the facing normal.
    pub vertices: Vec<u32>,
}

/// Visible fragments of one brush and the vertex table they index.
#[derive(Clone, Debug)]
pub struct Categorized {
    /// Welded tree-space positions.
    pub vertices: HashedVertices,
    /// Visible fragments, grouped by plane.
    pub fragments: Vec<Fragment>,
}

/// Which side of a fragment a probe sits on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Back,
    Front,
}

/// Split every face of `brush` and keep the fragments on the boundary of the
/// CSG result.
///
/// `neighbors` must hold every brush intersecting `brush`; brushes not listed
/// are taken to be clear of its surface.
pub fn categorize(
    index: u32,
    brush: &TreeSpaceBrush,
    neighbors: &[Neighbor<'_>],
    tree: &CompactTree,
    settings: &CsgSettings,
) -> Categorized {
    let mut welded = HashedVertices::new(settings.weld_epsilon);
    // Shared corners first: both brushes of a pair snap onto the same positions.
    for n in neighbors {
        for &v in n.seeds {
            welded.insert(v);
        }
    }
    let touched = tree.touch(iter::once(index).chain(neighbors.iter().map(|n| n.index)));
    let mut fragments = Vec::new();

    for (i, plane) in brush.planes().iter().enumerate() {
        let mut face: Vec<u32> = brush
            .polygon(i)
            .into_iter()
            .map(|p| welded.insert(p))
            .collect();
        remove_degenerate_runs(&mut face);
        if face.len() < 3 {
            continue;
        }
        let mut pieces = vec![face];
        for n in neighbors {
            if n.loops.iter().any(|l| l.plane as usize == i) {
                pieces = split_by_brush(pieces, plane, n.brush, &mut welded, settings);
            }
        }
        for mut piece in pieces {
            let points: Vec<DVec3> = piece.iter().map(|&v| welded.get(v)).collect();
            let area = newell(points.iter().copied()).dot(plane.normal) * 0.5;
            if area < settings.min_fragment_area {
                continue;
            }
            let centroid = points.iter().sum::<DVec3>() / points.len() as f64;
            let probe = Probe {
                centroid,
                normal: plane.normal,
                settings,
            };
            let Some(reversed) = probe.boundary(index, brush, neighbors, tree, &touched) else {
                continue;
            };
            let shadowed = neighbors
                .iter()
                .any(|n| n.index > index && probe.covered_coplanar(n.brush.planes()));
            if shadowed {
                continue;
            }
            if reversed {
                piece.reverse();
            }
            fragments.push(Fragment {
                plane: plane_u32(i),
                reversed,
                vertices: piece,
            });
        }
    }
    Categorized {
        vertices: welded,
        fragments,
    }
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "brushes have far fewer than u32::MAX planes"
)]
fn plane_u32(i: usize) -> u32 {
    i as u32
}

/// Probe points around one fragment.
struct Probe<'s> {
    centroid: DVec3,
    normal: DVec3,
    settings: &'s CsgSettings,
}

impl Probe<'_> {
    /// `Some(reversed)` when the fragment lies on the boundary of the result.
    fn boundary(
        &self,
        index: u32,
        brush: &TreeSpaceBrush,
        neighbors: &[Neighbor<'_>],
        tree: &CompactTree,
        touched: &TouchedSet,
    ) -> Option<bool> {
        let solid = |side| {
            tree.evaluate(touched, |b| {
                if b == index {
                    return self.inside(brush.planes(), side);
                }
                neighbors
                    .iter()
                    .find(|n| n.index == b)
                    .is_some_and(|n| self.inside(n.brush.planes(), side))
            })
        };
        let back = solid(Side::Back);
        let front = solid(Side::Front);
        (back != front).then_some(front)
    }

    /// Whether the probe on `side` lies inside the convex solid `planes`.
    ///
    /// Planes through the fragment decide by orientation alone, so fragments on
    /// a shared face classify the same way from both brushes.
    fn inside(&self, planes: &[Plane], side: Side) -> bool {
        let s = self.settings;
        for plane in planes {
            let d = plane.signed_distance(self.centroid);
            let align = plane.normal.dot(self.normal);
            if d.abs() <= s.plane_epsilon && align.abs() >= 1.0 - s.normal_epsilon {
                if (align > 0.0) != (side == Side::Back) {
                    return false;
                }
                continue;
            }
            if d > s.plane_epsilon {
                return false;
            }
            if d >= -s.plane_epsilon {
                let offset = self.normal * s.surface_offset;
                let p = match side {
                    Side::Back => self.centroid - offset,
                    Side::Front => self.centroid + offset,
                };
                if plane.signed_distance(p) > 0.0 {
                    return false;
                }
            }
        }
        true
    }

    /// Whether `planes` has a face through the fragment that covers it.
    fn covered_coplanar(&self, planes: &[Plane]) -> bool {
        let s = self.settings;
        let mut coplanar = false;
        for plane in planes {
            let d = plane.signed_distance(self.centroid);
            if d.abs() <= s.plane_epsilon
                && plane.normal.dot(self.normal).abs() >= 1.0 - s.normal_epsilon
            {
                coplanar = true;
            } else if d > s.plane_epsilon {
                return false;
            }
        }
        coplanar
    }
}

/// Cut each piece by the planes of `other` (those not parallel to `face`).
///
/// Parts outside `other` are set aside after each cut, so only the part inside
/// it is cut further.
fn split_by_brush(
    pieces: Vec<Vec<u32>>,
    face: &Plane,
    other: &TreeSpaceBrush,
    welded: &mut HashedVertices,
    settings: &CsgSettings,
) -> Vec<Vec<u32>> {
    let mut out = Vec::with_capacity(pieces.len() * 2);
    for piece in pieces {
        let mut rest = Some(piece);
        for q in other.planes() {
            if q.normal.dot(face.normal).abs() >= 1.0 - settings.normal_epsilon {
                continue;
            }
            let Some(r) = rest.take() else {
                break;
            };
            let (inside, outside) = split_polygon(&r, q, welded, settings.plane_epsilon);
            out.extend(outside);
            rest = inside;
        }
        out.extend(rest);
    }
    out
}

/// Split a convex polygon by `plane` into the parts inside and outside it.
///
/// Corners within `epsilon` of the plane go to both parts. New corners are
/// welded into `welded`.
pub fn split_polygon(
    polygon: &[u32],
    plane: &Plane,
    welded: &mut HashedVertices,
    epsilon: f64,
) -> (Option<Vec<u32>>, Option<Vec<u32>>) {
    let d: Vec<f64> = polygon
        .iter()
        .map(|&v| plane.signed_distance(welded.get(v)))
        .collect();
    if d.iter().all(|&x| x <= epsilon) {
        return (Some(polygon.to_vec()), None);
    }
    if d.iter().all(|&x| x >= -epsilon) {
        return (None, Some(polygon.to_vec()));
    }
    let n = polygon.len();
    let mut inside = Vec::with_capacity(n + 1);
    let mut outside = Vec::with_capacity(n + 1);
    for k in 0..n {
        let (a, b) = (polygon[k], polygon[(k + 1) % n]);
        let (da, db) = (d[k], d[(k + 1) % n]);
        if da <= epsilon {
            inside.push(a);
        }
        if da >= -epsilon {
            outside.push(a);
        }
        if (da < -epsilon && db > epsilon) || (da > epsilon && db < -epsilon) {
            let pa = welded.get(a);
            let pb = welded.get(b);
            let x = welded.insert(pa + (pb - pa) * (da / (da - db)));
            inside.push(x);
            outside.push(x);
        }
    }
    remove_degenerate_runs(&mut inside);
    remove_degenerate_runs(&mut outside);
    (
        (inside.len() >= 3).then_some(inside),
        (outside.len() >= 3).then_some(outside),
    )
}
