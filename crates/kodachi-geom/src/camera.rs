// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Camera parameters as stored on camera locations.
use glam::DVec3;
use kodachi_runtime::{Attr, GroupAttr};

/// Camera projection model.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Pinhole projection driven by `fov`.
    #[default]
    Perspective,
    /// Parallel projection driven by `orthographic_width`.
    Orthographic,
}

/// Camera values needed to build a view frustum.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraParams {
    /// Projection model.
    pub projection: Projection,
    /// Field of view in degrees.
    pub fov: f64,
    /// Near clip distance (positive, along -z).
    pub near: f64,
    /// Far clip distance (positive, along -z).
    pub far: f64,
    /// Screen window left edge.
    pub left: f64,
    /// Screen window right edge.
    pub right: f64,
    /// Screen window bottom edge.
    pub bottom: f64,
    /// Screen window top edge.
    pub top: f64,
    /// Width of the view for orthographic cameras.
    pub orthographic_width: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        Self {
            projection: Projection::Perspective,
            fov: 70.0,
            near: 0.1,
            far: 100_000.0,
            left: -1.0,
            right: 1.0,
            bottom: -1.0,
            top: 1.0,
            orthographic_width: 30.0,
        }
    }
}

impl CameraParams {
    /// Reads `fov`, `near`, `far`, `left`, `right`, `bottom`, `top`,
    /// `projection` and `orthographicWidth` from a camera geometry group.
    ///
    /// Returns `None` unless the first seven are all present and numeric.
    #[must_use]
    pub fn from_attrs(attrs: &GroupAttr) -> Option<Self> {
        let num = |name: &str| attrs.get(name).and_then(Attr::as_float);
        let projection = match attrs.get("projection").and_then(Attr::as_str) {
            Some("orthographic") => Projection::Orthographic,
            _ => Projection::Perspective,
        };
        Some(Self {
            projection,
            fov: num("fov")?,
            near: num("near")?,
            far: num("far")?,
            left: num("left")?,
            right: num("right")?,
            bottom: num("bottom")?,
            top: num("top")?,
            orthographic_width: num("orthographicWidth").unwrap_or(0.0),
        })
    }

    /// The seven camera-space vertices that define the frustum:
    /// near bottom-left, bottom-right, top-right, top-left, then far
    /// bottom-left, top-left, top-right.
    ///
    /// `padding` widens the screen window on every side.
    #[must_use]
    pub fn frustum_vertices(&self, padding: f64) -> [DVec3; 7] {
        let left = self.left - padding;
        let right = self.right + padding;
        let bottom = self.bottom - padding;
        let top = self.top + padding;

        let (near_scale, far_scale) = match self.projection {
            Projection::Orthographic => {
                let scale = self.orthographic_width / (right - left).abs();
                (scale, scale)
            }
            Projection::Perspective => {
                let slope = (self.fov.to_radians() / 2.0).tan();
                (self.near * slope, self.far * slope)
            }
        };

        let near = |x: f64, y: f64| DVec3::new(near_scale * x, near_scale * y, -self.near);
        let far = |x: f64, y: f64| DVec3::new(far_scale * x, far_scale * y, -self.far);
        [
            near(left, bottom),
            near(right, bottom),
            near(right, top),
            near(left, top),
            far(left, bottom),
            far(left, top),
            far(right, top),
        ]
    }
}
