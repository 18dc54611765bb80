// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::pedantic,
    rust_2018_idioms,
    missing_docs,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic
)]
#![allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#![doc = r"Geometry helpers for Kodachi ops.

This crate provides:
- Axis-aligned bounding boxes (`Aabb`) and implicit planes (`Plane`).
- Camera frusta (`Frustum`, `CameraParams`) with AABB and point tests.
- Curve reduction (`curve`): Douglas-Peucker and Visvalingam-Whyatt.

Design notes:
- Bounds, planes and frusta are `f64`; curve points are `f32`.
- Frustum planes face outward: negative distance means inside.
- Reductions return keep masks so callers can drop the same CVs from every
  per-point attribute.
"]

/// Camera attribute parsing.
pub mod camera;
/// Curve reduction.
pub mod curve;
/// View frusta.
pub mod frustum;
/// Foundational geometric types.
pub mod types;

pub use camera::{CameraParams, Projection};
pub use curve::{
    douglas_peucker, reduce_curve, reduce_curves, visvalingam, CurveReduction, GeomError,
    SimplificationMode,
};
pub use frustum::Frustum;
pub use types::aabb::Aabb;
pub use types::plane::{Intersection, Plane};
