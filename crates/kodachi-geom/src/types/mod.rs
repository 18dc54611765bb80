// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Core geometry types used by culling ops (AABB, plane).
//!
//! Overlap semantics are inclusive on faces: boxes that touch overlap, and a
//! box touching a plane from inside intersects it.

#[doc = "Axis-aligned bounding boxes (world space)."]
pub mod aabb;
#[doc = "Implicit planes `n·p + d = 0`."]
pub mod plane;
