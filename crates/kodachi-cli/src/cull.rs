// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Frustum culling of cooked locations.
//!
//! A location's `bound` is `[xmin, xmax, ymin, ymax, zmin, zmax]` and its
//! `xform.matrix` (16 doubles, column-major) places it in world space.
//! Cameras keep their projection values under `geometry`.
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use glam::DMat4;
use kodachi_geom::{Aabb, CameraParams, Frustum, Intersection};
use kodachi_runtime::{Attr, Client, GroupAttr, LocationData, Traversal};
use tracing::debug;

/// World matrix of a location, if it carries a well-formed one.
pub fn world_matrix(attrs: &GroupAttr) -> Option<DMat4> {
    attrs
        .get("xform.matrix")
        .and_then(Attr::as_floats)
        .filter(|m| m.len() == 16)
        .map(DMat4::from_cols_slice)
}

/// World-space bounds of a cooked location.
pub fn world_bounds(location: &LocationData) -> Option<Aabb> {
    let local = location
        .attrs
        .get("bound")
        .and_then(Attr::as_floats)
        .and_then(Aabb::from_bound)?;
    Some(match world_matrix(&location.attrs) {
        Some(m) => local.transformed(&m),
        None => local,
    })
}

/// Builds the world-space frustum of the camera at `camera`.
pub fn camera_frustum(client: &Client, camera: &str, padding: f64) -> Result<Frustum> {
    let data = client.cook_location(camera, false)?;
    if !data.exists {
        bail!("camera location {camera} does not exist");
    }
    let params = data
        .attrs
        .get("geometry")
        .and_then(Attr::as_group)
        .and_then(CameraParams::from_attrs)
        .with_context(|| {
            format!("camera {camera} needs geometry.{{fov,near,far,left,right,bottom,top}}")
        })?;
    let frustum = Frustum::from_camera(&params, padding);
    Ok(match world_matrix(&data.attrs) {
        Some(m) => frustum.transformed(&m),
        None => frustum,
    })
}

/// Short label for an intersection result.
pub fn label(result: Intersection) -> &'static str {
    match result {
        Intersection::Intersects => "intersects",
        Intersection::FullyOutside => "outside",
        Intersection::FullyInside => "inside",
    }
}

/// Classifies every bounded location below `root` against `frustum`,
/// in path order.
pub fn cull(
    client: &Arc<Client>,
    frustum: &Frustum,
    root: Option<&str>,
) -> Result<Vec<(String, Intersection)>> {
    let mut traversal = Traversal::new(Arc::clone(client))?;
    if let Some(root) = root {
        traversal = traversal.root(root);
    }
    let results: Vec<_> = traversal
        .run()?
        .into_iter()
        .filter_map(|location| {
            let bounds = world_bounds(&location)?;
            Some((location.path, frustum.aabb_intersection(&bounds)))
        })
        .collect();
    debug!(bounded = results.len(), "culled locations");
    Ok(results)
}
