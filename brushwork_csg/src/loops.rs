// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Loop assembly: turn a welded point cloud into one convex loop per plane.

use glam::DVec3;
use smallvec::SmallVec;

use crate::brush_mesh::{newell, sort_points_around};
use crate::plane::Plane;

/// A convex polygon lying on one plane of a brush.
#[derive(Clone, Debug, PartialEq)]
pub struct SurfaceLoop {
    /// Index of the plane in the brush's plane list.
    pub plane: u32,
    /// Corners, counter-clockwise around the plane normal.
    pub vertices: Vec<DVec3>,
}

impl SurfaceLoop {
    /// Enclosed area.
    pub fn area(&self, normal: DVec3) -> f64 {
        newell(self.vertices.iter().copied()).dot(normal) * 0.5
    }
}

/// Which planes each point lies on, within `epsilon`.
pub fn planes_through(points: &[DVec3], planes: &[Plane], epsilon: f64) -> Vec<SmallVec<[u32; 4]>> {
    points
        .iter()
        .map(|&p| {
            planes
                .iter()
                .enumerate()
                .filter(|(_, plane)| plane.signed_distance(p).abs() <= epsilon)
                .map(|(i, _)| plane_index(i))
                .collect()
        })
        .collect()
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "brushes have far fewer than u32::MAX planes"
)]
fn plane_index(i: usize) -> u32 {
    i as u32
}

/// Group `points` by the planes they lie on and order each group into a loop.
///
/// The points must be welded and convex per plane. Groups with fewer than
/// three distinct corners or with an area below `min_area` yield no loop.
pub fn assemble_loops(
    points: &[DVec3],
    planes: &[Plane],
    epsilon: f64,
    min_area: f64,
) -> Vec<SurfaceLoop> {
    let on = planes_through(points, planes, epsilon);
    let mut groups: Vec<Vec<DVec3>> = vec![Vec::new(); planes.len()];
    for (p, list) in points.iter().zip(&on) {
        for &plane in list {
            groups[plane as usize].push(*p);
        }
    }
    let mut out = Vec::new();
    for (i, mut group) in groups.into_iter().enumerate() {
        if group.len() < 3 {
            continue;
        }
        let normal = planes[i].normal;
        sort_points_around(&mut group, |p| p, normal);
        remove_degenerate_runs(&mut group);
        if group.len() < 3 {
            continue;
        }
        let l = SurfaceLoop {
            plane: plane_index(i),
            vertices: group,
        };
        if l.area(normal) >= min_area {
            out.push(l);
        }
    }
    out
}

/// Drop vertices equal to their predecessor, including across the wrap.
pub fn remove_degenerate_runs<T: PartialEq>(ring: &mut Vec<T>) {
    ring.dedup();
    while ring.len() > 1 && ring.first() == ring.last() {
        ring.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis_planes() -> Vec<Plane> {
        [DVec3::X, DVec3::NEG_X, DVec3::Y, DVec3::NEG_Y, DVec3::Z, DVec3::NEG_Z]
            .map(|n| Plane::new(n, 1.0).unwrap())
            .to_vec()
    }

    #[test]
    fn cube_corners_make_six_square_loops() {
        let mut corners = Vec::new();
        for x in [-1.0, 1.0] {
            for y in [-1.0, 1.0] {
                for z in [-1.0, 1.0] {
                    corners.push(DVec3::new(x, y, z));
                }
            }
        }
        let planes = axis_planes();
        let loops = assemble_loops(&corners, &planes, 1e-9, 1e-9);
        assert_eq!(loops.len(), 6);
        for l in &loops {
            assert_eq!(l.vertices.len(), 4);
            let area = l.area(planes[l.plane as usize].normal);
            assert!((area - 4.0).abs() < 1e-12, "area {area}");
        }
    }

    #[test]
    fn edge_contact_yields_no_loop() {
        // Two points on the +X face only: an edge, not a loop.
        let points = [DVec3::new(1.0, 1.0, -1.0), DVec3::new(1.0, 1.0, 1.0)];
        assert!(assemble_loops(&points, &axis_planes(), 1e-9, 1e-9).is_empty());
    }

    #[test]
    fn degenerate_runs_collapse() {
        let mut ring = vec![1, 1, 2, 3, 3, 1];
        remove_degenerate_runs(&mut ring);
        assert_eq!(ring, [1, 2, 3]);
    }
}
