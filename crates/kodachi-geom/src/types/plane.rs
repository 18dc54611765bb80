// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

use glam::DVec3;

/// Outcome of testing a volume against a plane or a frustum.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Intersection {
    /// The volume straddles the boundary.
    Intersects,
    /// The volume is entirely on the outer side.
    FullyOutside,
    /// The volume is entirely on the inner side.
    FullyInside,
}

/// Plane in implicit form `n·p + d = 0`, with `n` unit length.
///
/// Points with positive [`Plane::distance`] are in front of the plane
/// (outside, for frustum faces).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Plane {
    point: DVec3,
    normal: DVec3,
    d: f64,
}

impl Plane {
    /// Plane through three points given counter-clockwise around `mid`, the
    /// shared vertex. The normal is `(p2 - mid) × (p1 - mid)`, normalized.
    ///
    /// Degenerate (collinear) input yields a zero normal; such a plane
    /// reports every point as lying on it.
    #[must_use]
    pub fn from_points(p1: DVec3, mid: DVec3, p2: DVec3) -> Self {
        let normal = (p2 - mid).cross(p1 - mid).normalize_or_zero();
        Self {
            point: mid,
            normal,
            d: -normal.dot(mid),
        }
    }

    /// Unit normal.
    #[must_use]
    pub fn normal(&self) -> DVec3 {
        self.normal
    }

    /// Plane offset `d`.
    #[must_use]
    pub fn d(&self) -> f64 {
        self.d
    }

    /// Signed distance from `point` to the plane.
    #[must_use]
    pub fn distance(&self, point: DVec3) -> f64 {
        point.dot(self.normal) + self.d
    }

    /// Returns `true` if `point` lies strictly in front of the plane.
    #[must_use]
    pub fn is_in_front(&self, point: DVec3) -> bool {
        (point - self.point).dot(self.normal) > 0.0
    }

    /// Classifies the box with the given center and half-extents.
    ///
    /// The box's projected radius onto the normal is
    /// `Σ half[i] · |n[i]|`.
    #[must_use]
    pub fn aabb_test(&self, center: DVec3, half: DVec3) -> Intersection {
        let extent = half.dot(self.normal.abs());
        let distance = self.distance(center);
        if distance - extent > 0.0 {
            Intersection::FullyOutside
        } else if distance + extent < 0.0 {
            Intersection::FullyInside
        } else {
            Intersection::Intersects
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn ccw_points_face_the_viewer() {
        // Looking down -z at the xy plane: x then y, counter-clockwise.
        let plane = Plane::from_points(DVec3::Y, DVec3::ZERO, DVec3::X);
        assert_eq!(plane.normal(), DVec3::Z);
        assert!((plane.distance(DVec3::new(3.0, 4.0, 2.0)) - 2.0).abs() < 1e-12);
        assert!(plane.is_in_front(DVec3::Z));
        assert!(!plane.is_in_front(-DVec3::Z));
    }

    #[test]
    fn box_classification_uses_projected_radius() {
        let plane = Plane::from_points(DVec3::Y, DVec3::ZERO, DVec3::X);
        let half = DVec3::splat(0.5);
        assert_eq!(plane.aabb_test(DVec3::new(0.0, 0.0, 2.0), half), Intersection::FullyOutside);
        assert_eq!(plane.aabb_test(DVec3::new(0.0, 0.0, -2.0), half), Intersection::FullyInside);
        assert_eq!(plane.aabb_test(DVec3::new(0.0, 0.0, 0.25), half), Intersection::Intersects);
    }

    #[test]
    fn collinear_points_give_a_degenerate_plane() {
        let plane = Plane::from_points(DVec3::X, DVec3::ZERO, DVec3::X * 2.0);
        assert_eq!(plane.normal(), DVec3::ZERO);
        assert_eq!(plane.aabb_test(DVec3::ONE, DVec3::ONE), Intersection::Intersects);
    }
}
