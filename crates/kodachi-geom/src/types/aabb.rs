// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

use glam::{DMat4, DVec3};

/// Axis-aligned bounding box.
///
/// Invariant: `min` components are less than or equal to `max` components.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Aabb {
    min: DVec3,
    max: DVec3,
}

impl Aabb {
    /// Constructs an AABB from its minimum and maximum corners.
    ///
    /// Returns `None` if any component of `min` exceeds its counterpart in
    /// `max`, or if a component is not finite.
    #[must_use]
    pub fn new(min: DVec3, max: DVec3) -> Option<Self> {
        (min.is_finite() && max.is_finite() && min.cmple(max).all()).then_some(Self { min, max })
    }

    /// Builds an AABB from a location `bound` attribute laid out as
    /// `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    #[must_use]
    pub fn from_bound(bound: &[f64]) -> Option<Self> {
        match bound {
            [x0, x1, y0, y1, z0, z1] => {
                Self::new(DVec3::new(*x0, *y0, *z0), DVec3::new(*x1, *y1, *z1))
            }
            _ => None,
        }
    }

    /// Returns the minimum corner.
    #[must_use]
    pub fn min(&self) -> DVec3 {
        self.min
    }

    /// Returns the maximum corner.
    #[must_use]
    pub fn max(&self) -> DVec3 {
        self.max
    }

    /// Center point.
    #[must_use]
    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    /// Half of the box diagonal.
    #[must_use]
    pub fn half_extents(&self) -> DVec3 {
        (self.max - self.min) * 0.5
    }

    /// Builds an AABB centered at `center` with half-extents `half`.
    #[must_use]
    pub fn from_center_half_extents(center: DVec3, half: DVec3) -> Self {
        let half = half.abs();
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Returns `true` if this AABB overlaps another (inclusive on faces).
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.min.cmple(other.max).all() && other.min.cmple(self.max).all()
    }

    /// Returns `true` if `point` lies inside or on the box.
    #[must_use]
    pub fn contains_point(&self, point: DVec3) -> bool {
        self.min.cmple(point).all() && point.cmple(self.max).all()
    }

    /// Returns the union of two AABBs.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// The eight corners, `min` first and `max` last.
    #[must_use]
    pub fn corners(&self) -> [DVec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            DVec3::new(lo.x, lo.y, lo.z),
            DVec3::new(lo.x, lo.y, hi.z),
            DVec3::new(lo.x, hi.y, lo.z),
            DVec3::new(lo.x, hi.y, hi.z),
            DVec3::new(hi.x, lo.y, lo.z),
            DVec3::new(hi.x, lo.y, hi.z),
            DVec3::new(hi.x, hi.y, lo.z),
            DVec3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Computes the AABB that bounds this box after transformation by `mat`.
    #[must_use]
    pub fn transformed(&self, mat: &DMat4) -> Self {
        let corners = self.corners();
        let first = mat.transform_point3(corners[0]);
        corners[1..].iter().fold(
            Self {
                min: first,
                max: first,
            },
            |acc, c| {
                let p = mat.transform_point3(*c);
                Self {
                    min: acc.min.min(p),
                    max: acc.max.max(p),
                }
            },
        )
    }

    /// Builds the minimal AABB that contains all `points`, or `None` when
    /// `points` is empty.
    #[must_use]
    pub fn from_points(points: &[DVec3]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        Some(rest.iter().fold(
            Self {
                min: *first,
                max: *first,
            },
            |acc, p| Self {
                min: acc.min.min(*p),
                max: acc.max.max(*p),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    #[test]
    fn inverted_or_non_finite_corners_are_rejected() {
        assert!(Aabb::new(DVec3::ONE, DVec3::ZERO).is_none());
        assert!(Aabb::new(DVec3::ZERO, DVec3::splat(f64::INFINITY)).is_none());
        assert!(Aabb::from_bound(&[0.0, 1.0, 0.0, 1.0]).is_none());
        let b = Aabb::from_bound(&[-1.0, 1.0, -2.0, 2.0, -3.0, 3.0]).unwrap();
        assert_eq!(b.half_extents(), DVec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn touching_faces_overlap() {
        let a = Aabb::from_center_half_extents(DVec3::ZERO, DVec3::ONE);
        let b = Aabb::from_center_half_extents(DVec3::new(2.0, 0.0, 0.0), DVec3::ONE);
        let c = Aabb::from_center_half_extents(DVec3::new(2.5, 0.0, 0.0), DVec3::ONE);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c));
        assert_eq!(a.union(&c).max(), DVec3::new(3.5, 1.0, 1.0));
    }

    #[test]
    fn rotation_grows_the_bounds() {
        let a = Aabb::from_center_half_extents(DVec3::ZERO, DVec3::new(1.0, 0.1, 0.1));
        let rot = DMat4::from_rotation_z(core::f64::consts::FRAC_PI_4);
        let t = a.transformed(&rot);
        assert!(t.max().y > 0.7);
        assert!(t.contains_point(DVec3::ZERO));
        assert!(Aabb::from_points(&[]).is_none());
    }
}
