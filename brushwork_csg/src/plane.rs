// Copyright 2025 the Brushwork Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Half-space planes.

use glam::{DMat3, DMat4, DVec3};

/// An oriented plane `normal · x = distance`.
///
/// The normal points out of the solid: a point is inside the half-space when
/// `normal · x - distance <= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Plane {
    /// Outward unit normal.
    pub normal: DVec3,
    /// Signed distance of the plane from the origin along `normal`.
    pub distance: f64,
}

impl Plane {
    /// Create a plane from a normal and distance, normalizing both.
    ///
    /// Returns `None` when the normal has zero length or any input is not finite.
    pub fn new(normal: DVec3, distance: f64) -> Option<Self> {
        let len = normal.length();
        if !len.is_finite() || len <= f64::EPSILON || !distance.is_finite() {
            return None;
        }
        Some(Self {
            normal: normal / len,
            distance: distance / len,
        })
    }

    /// The plane through `point` facing `normal`.
    pub fn from_point_normal(point: DVec3, normal: DVec3) -> Option<Self> {
        let n = normal.try_normalize()?;
        Self::new(n, n.dot(point))
    }

    /// Signed distance of `point` from the plane; negative inside.
    #[inline]
    pub fn signed_distance(&self, point: DVec3) -> f64 {
        self.normal.dot(point) - self.distance
    }

    /// The same plane facing the other way.
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            distance: -self.distance,
        }
    }

    /// Map the plane through an affine transform.
    pub fn transformed(&self, transform: &DMat4) -> Self {
        self.transformed_with(transform, &normal_matrix(transform))
    }

    /// Like [`transformed`](Self::transformed) with a precomputed
    /// [`normal_matrix`] of `transform`.
    pub fn transformed_with(&self, transform: &DMat4, normal_matrix: &DMat3) -> Self {
        let point = transform.transform_point3(self.normal * self.distance);
        let normal = (*normal_matrix * self.normal).normalize_or_zero();
        Self {
            normal,
            distance: normal.dot(point),
        }
    }

    /// Whether two planes are the same plane with the same orientation.
    pub fn coincides(&self, other: &Self, normal_epsilon: f64, plane_epsilon: f64) -> bool {
        self.normal.dot(other.normal) >= 1.0 - normal_epsilon
            && (self.distance - other.distance).abs() <= plane_epsilon
    }

    /// The point where three planes meet.
    ///
    /// Returns `None` when the normals are close to linearly dependent (the
    /// absolute determinant is below `normal_epsilon`) or the result is not finite.
    pub fn intersect_three(a: &Self, b: &Self, c: &Self, normal_epsilon: f64) -> Option<DVec3> {
        let bc = b.normal.cross(c.normal);
        let det = a.normal.dot(bc);
        if det.abs() < normal_epsilon {
            return None;
        }
        let ca = c.normal.cross(a.normal);
        let ab = a.normal.cross(b.normal);
        let point = (bc * a.distance + ca * b.distance + ab * c.distance) / det;
        point.is_finite().then_some(point)
    }
}

/// Inverse transpose of the linear part of `transform`, used to map normals.
pub fn normal_matrix(transform: &DMat4) -> DMat3 {
    DMat3::from_mat4(*transform).inverse().transpose()
}

/// Two unit vectors spanning the plane with normal `normal`, such that
/// `u × v = normal`.
pub fn tangent_axes(normal: DVec3) -> (DVec3, DVec3) {
    let a = normal.abs();
    let up = if a.y >= a.x && a.y >= a.z {
        DVec3::Z
    } else {
        DVec3::Y
    };
    let u = normal.cross(up).normalize_or_zero();
    let v = normal.cross(u).normalize_or_zero();
    (u, v)
}

/// Whether `point` lies inside every plane, with planes thickened by `epsilon`.
pub fn inside_all(planes: &[Plane], point: DVec3, epsilon: f64) -> bool {
    planes.iter().all(|p| p.signed_distance(point) <= epsilon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DQuat;

    #[test]
    fn three_axis_planes_meet_at_corner() {
        let x = Plane::new(DVec3::X, 1.0).unwrap();
        let y = Plane::new(DVec3::Y, 2.0).unwrap();
        let z = Plane::new(DVec3::Z, 3.0).unwrap();
        let p = Plane::intersect_three(&x, &y, &z, 1e-6).unwrap();
        assert!((p - DVec3::new(1.0, 2.0, 3.0)).length() < 1e-12, "got {p}");
    }

    #[test]
    fn parallel_triple_is_skipped() {
        let a = Plane::new(DVec3::X, 0.0).unwrap();
        let b = Plane::new(DVec3::X, 1.0).unwrap();
        let c = Plane::new(DVec3::Y, 0.0).unwrap();
        assert!(Plane::intersect_three(&a, &b, &c, 1e-6).is_none());
        let nearly = Plane::new(DVec3::new(1.0, 1e-9, 0.0), 1.0).unwrap();
        assert!(Plane::intersect_three(&a, &nearly, &c, 1e-6).is_none());
    }

    #[test]
    fn transform_keeps_points_on_plane() {
        let plane = Plane::new(DVec3::new(1.0, 1.0, 0.0), 2.0).unwrap();
        let m = DMat4::from_scale_rotation_translation(
            DVec3::new(2.0, 1.0, 0.5),
            DQuat::from_rotation_z(0.7),
            DVec3::new(3.0, -1.0, 4.0),
        );
        let moved = plane.transformed(&m);
        let on = plane.normal * plane.distance + DVec3::Z * 5.0;
        let inside = on - plane.normal;
        assert!(moved.signed_distance(m.transform_point3(on)).abs() < 1e-9);
        assert!(moved.signed_distance(m.transform_point3(inside)) < 0.0);
        assert!((moved.normal.length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn tangent_axes_are_right_handed() {
        for n in [DVec3::X, DVec3::NEG_Y, DVec3::new(0.3, -0.4, 0.866).normalize()] {
            let (u, v) = tangent_axes(n);
            assert!((u.cross(v) - n).length() < 1e-12, "frame for {n}");
        }
    }

    #[test]
    fn rejects_zero_normal() {
        assert!(Plane::new(DVec3::ZERO, 1.0).is_none());
        assert!(Plane::new(DVec3::X, f64::NAN).is_none());
    }
}
