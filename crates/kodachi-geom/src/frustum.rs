// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Six-plane view frustum.
use glam::{DMat4, DVec3};

use crate::camera::CameraParams;
use crate::types::aabb::Aabb;
use crate::types::plane::{Intersection, Plane};

/// Number of vertices needed to form the six planes (far bottom-right is
/// implied).
pub const VERTEX_COUNT: usize = 7;

/// Vertex triples (counter-clockwise, shared vertex in the middle) for the
/// near, far, top, bottom, left and right faces.
const FACE_INDICES: [[usize; 3]; 6] = [
    [3, 0, 1],
    [4, 5, 6],
    [5, 3, 2],
    [1, 0, 4],
    [0, 3, 5],
    [6, 2, 1],
];

/// View frustum with outward-facing planes.
///
/// Vertex layout:
/// `[0]` near bottom-left, `[1]` near bottom-right, `[2]` near top-right,
/// `[3]` near top-left, `[4]` far bottom-left, `[5]` far top-left,
/// `[6]` far top-right.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frustum {
    vertices: [DVec3; VERTEX_COUNT],
    planes: [Plane; 6],
}

impl Frustum {
    /// Builds the frustum from its seven vertices, transforming them by
    /// `transform` first when given.
    #[must_use]
    pub fn from_vertices(vertices: [DVec3; VERTEX_COUNT], transform: Option<&DMat4>) -> Self {
        let vertices = match transform {
            Some(m) => vertices.map(|v| m.transform_point3(v)),
            None => vertices,
        };
        let planes = FACE_INDICES
            .map(|[a, mid, b]| Plane::from_points(vertices[a], vertices[mid], vertices[b]));
        Self { vertices, planes }
    }

    /// Builds the frustum from 21 packed doubles (seven xyz triples in
    /// vertex-layout order). Returns `None` for any other length.
    #[must_use]
    pub fn from_raw(raw: &[f64], transform: Option<&DMat4>) -> Option<Self> {
        if raw.len() != VERTEX_COUNT * 3 {
            return None;
        }
        let mut vertices = [DVec3::ZERO; VERTEX_COUNT];
        for (vertex, xyz) in vertices.iter_mut().zip(raw.chunks_exact(3)) {
            *vertex = DVec3::from_slice(xyz);
        }
        Some(Self::from_vertices(vertices, transform))
    }

    /// Camera-space frustum for `camera`, its screen window widened by
    /// `padding`.
    #[must_use]
    pub fn from_camera(camera: &CameraParams, padding: f64) -> Self {
        Self::from_vertices(camera.frustum_vertices(padding), None)
    }

    /// This frustum moved by `transform`.
    #[must_use]
    pub fn transformed(&self, transform: &DMat4) -> Self {
        Self::from_vertices(self.vertices, Some(transform))
    }

    /// The seven defining vertices.
    #[must_use]
    pub fn vertices(&self) -> &[DVec3; VERTEX_COUNT] {
        &self.vertices
    }

    /// Vertices packed as 21 doubles, the inverse of [`Frustum::from_raw`].
    #[must_use]
    pub fn to_raw(&self) -> Vec<f64> {
        self.vertices.iter().flat_map(|v| v.to_array()).collect()
    }

    /// Near, far, top, bottom, left and right planes.
    #[must_use]
    pub fn planes(&self) -> &[Plane; 6] {
        &self.planes
    }

    /// Classifies `aabb` against the frustum.
    ///
    /// Any face with the box fully outside wins; otherwise the box
    /// intersects if any face cuts it.
    #[must_use]
    pub fn aabb_intersection(&self, aabb: &Aabb) -> Intersection {
        let center = aabb.center();
        let half = aabb.half_extents();
        let mut intersecting = false;
        for plane in &self.planes {
            match plane.aabb_test(center, half) {
                Intersection::FullyOutside => return Intersection::FullyOutside,
                Intersection::Intersects => intersecting = true,
                Intersection::FullyInside => {}
            }
        }
        if intersecting {
            Intersection::Intersects
        } else {
            Intersection::FullyInside
        }
    }

    /// Returns `true` if `point` is behind all six faces.
    #[must_use]
    pub fn contains_point(&self, point: DVec3) -> bool {
        !self.planes.iter().any(|p| p.is_in_front(point))
    }
}
