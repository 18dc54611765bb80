// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! CV reduction for curves.
//!
//! Every reduction returns a keep mask with one entry per input point so the
//! same CVs can be dropped from every per-point attribute.
use std::str::FromStr;

use glam::Vec3;
use kodachi_runtime::{Attr, GroupAttr};
use rayon::prelude::*;
use thiserror::Error;
use tracing::debug;

/// Minimum CV count used when none is given.
pub const DEFAULT_MIN_CVS: usize = 4;

/// Errors raised by packed multi-curve reduction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeomError {
    /// Per-curve vertex counts do not add up to the number of points.
    #[error("curve vertex counts sum to {expected} but {actual} points were given")]
    VertexCountMismatch {
        /// Sum of the per-curve vertex counts.
        expected: usize,
        /// Number of points supplied.
        actual: usize,
    },
    /// The mode string is neither `percent` nor `distance`.
    #[error("unknown simplification mode {0:?}")]
    UnknownMode(String),
}

/// How `simplification` is interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum SimplificationMode {
    /// Fraction (0..=1) of removable CVs to drop, smallest area first
    /// (Visvalingam-Whyatt).
    #[default]
    Percent,
    /// Squared distance tolerance (Douglas-Peucker).
    Distance,
}

impl FromStr for SimplificationMode {
    type Err = GeomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percent" => Ok(Self::Percent),
            "distance" => Ok(Self::Distance),
            other => Err(GeomError::UnknownMode(other.to_owned())),
        }
    }
}

/// Parameters for reducing a set of curves.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CurveReduction {
    /// Interpretation of `simplification`.
    pub mode: SimplificationMode,
    /// Reduction amount; values below `f32::EPSILON` disable reduction.
    pub simplification: f32,
    /// Curves are never reduced below this many CVs (at least 2).
    /// Only [`SimplificationMode::Percent`] honours it.
    pub min_cvs: usize,
}

impl Default for CurveReduction {
    fn default() -> Self {
        Self {
            mode: SimplificationMode::Percent,
            simplification: 0.0,
            min_cvs: DEFAULT_MIN_CVS,
        }
    }
}

impl CurveReduction {
    /// Reads `simplification`, `simplificationMode` and `minCv`.
    ///
    /// Any mode other than `distance` falls back to percent.
    #[must_use]
    pub fn from_attrs(attrs: &GroupAttr) -> Self {
        let mode = attrs
            .get("simplificationMode")
            .and_then(Attr::as_str)
            .and_then(|s| s.parse().ok())
            .unwrap_or_default();
        let min_cvs = attrs
            .get("minCv")
            .and_then(Attr::as_int)
            .map_or(DEFAULT_MIN_CVS, |v| usize::try_from(v).unwrap_or(0));
        Self {
            mode,
            simplification: attrs
                .get("simplification")
                .and_then(Attr::as_float)
                .unwrap_or(0.0) as f32,
            min_cvs,
        }
    }

    /// Returns `true` if this reduction would leave every curve untouched.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.simplification.is_nan() || self.simplification < f32::EPSILON
    }

    fn reduce(&self, points: &[Vec3]) -> Vec<bool> {
        match self.mode {
            SimplificationMode::Distance => douglas_peucker(points, self.simplification),
            SimplificationMode::Percent => {
                visvalingam(points, self.simplification, self.min_cvs)
            }
        }
    }
}

/// Squared distance from `p` to the segment `a`-`b`.
fn distance_sq(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    let line = b - a;
    let ap = p - a;
    let len_sq = line.length_squared();
    let dot = ap.dot(line);
    if dot <= 0.0 {
        ap.length_squared()
    } else if dot >= len_sq {
        (p - b).length_squared()
    } else {
        ap.cross(p - b).length_squared() / len_sq
    }
}

fn triangle_area(p: Vec3, a: Vec3, b: Vec3) -> f32 {
    (a - p).cross(b - p).length() * 0.5
}

/// Douglas-Peucker reduction.
///
/// `epsilon` is compared against squared point-to-segment distances: a
/// point is kept when it is the farthest from its current segment and
/// farther than that. End points are always kept.
#[must_use]
pub fn douglas_peucker(points: &[Vec3], epsilon: f32) -> Vec<bool> {
    let mut keep = vec![false; points.len()];
    if points.is_empty() {
        return keep;
    }
    let mut segments = vec![(0, points.len() - 1)];
    while let Some((start, end)) = segments.pop() {
        keep[start] = true;
        keep[end] = true;
        if end <= start + 1 {
            continue;
        }
        let (max_idx, max_dsq) = (start + 1..end)
            .map(|i| (i, distance_sq(points[i], points[start], points[end])))
            .fold((start, 0.0_f32), |best, cur| if cur.1 > best.1 { cur } else { best });
        if max_dsq > epsilon {
            segments.push((max_idx, end));
            segments.push((start, max_idx));
        }
    }
    keep
}

/// Visvalingam-Whyatt reduction.
///
/// Drops `ceil((len - min_cvs) * simplification)` interior CVs, each time the
/// one spanning the smallest triangle with its current neighbours (lowest
/// index on ties). `simplification` is clamped to `0..=1` and `min_cvs` to
/// at least 2. Curves with `min_cvs` or fewer points are returned intact.
#[must_use]
pub fn visvalingam(points: &[Vec3], simplification: f32, min_cvs: usize) -> Vec<bool> {
    let n = points.len();
    let mut keep = vec![true; n];
    let min_cvs = min_cvs.max(2);
    if n <= min_cvs {
        return keep;
    }
    let simplification = simplification.clamp(0.0, 1.0);
    let iterations = ((n - min_cvs) as f32 * simplification).ceil() as usize;

    let mut prev: Vec<usize> = (0..n).map(|i| i.saturating_sub(1)).collect();
    let mut next: Vec<usize> = (0..n).map(|i| (i + 1).min(n - 1)).collect();
    let mut area: Vec<f32> = (0..n)
        .map(|i| {
            if i == 0 || i == n - 1 {
                f32::INFINITY
            } else {
                triangle_area(points[i], points[i - 1], points[i + 1])
            }
        })
        .collect();

    for _ in 0..iterations {
        let Some(victim) = (1..n - 1)
            .filter(|&i| keep[i])
            .min_by(|&a, &b| area[a].total_cmp(&area[b]))
        else {
            break;
        };
        keep[victim] = false;
        let (p, q) = (prev[victim], next[victim]);
        next[p] = q;
        prev[q] = p;
        for i in [p, q] {
            if i != 0 && i != n - 1 {
                area[i] = triangle_area(points[i], points[prev[i]], points[next[i]]);
            }
        }
    }
    keep
}

/// Reduces one curve with the default minimum CV count.
#[must_use]
pub fn reduce_curve(points: &[Vec3], mode: SimplificationMode, simplification: f32) -> Vec<bool> {
    let params = CurveReduction {
        mode,
        simplification,
        min_cvs: DEFAULT_MIN_CVS,
    };
    if params.is_noop() {
        return vec![true; points.len()];
    }
    params.reduce(points)
}

/// Reduces packed curves in parallel and returns the indices of the points
/// to omit, in ascending order.
///
/// `num_vertices[c]` is the CV count of curve `c`; curves are stored back to
/// back in `points`.
pub fn reduce_curves(
    points: &[Vec3],
    num_vertices: &[usize],
    params: &CurveReduction,
) -> Result<Vec<usize>, GeomError> {
    let expected: usize = num_vertices.iter().sum();
    if expected != points.len() {
        return Err(GeomError::VertexCountMismatch {
            expected,
            actual: points.len(),
        });
    }
    if params.is_noop() {
        debug!(simplification = params.simplification, "curve reduction disabled");
        return Ok(Vec::new());
    }

    let mut curves = Vec::with_capacity(num_vertices.len());
    let mut start = 0;
    for &count in num_vertices {
        curves.push((start, &points[start..start + count]));
        start += count;
    }

    let omitted: Vec<usize> = curves
        .par_iter()
        .flat_map_iter(|&(offset, curve)| {
            params
                .reduce(curve)
                .into_iter()
                .enumerate()
                .filter(|(_, keep)| !keep)
                .map(move |(i, _)| offset + i)
        })
        .collect();
    debug!(
        curves = num_vertices.len(),
        omitted = omitted.len(),
        "reduced curves"
    );
    Ok(omitted)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]
    use super::*;

    fn line(n: usize) -> Vec<Vec3> {
        (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect()
    }

    #[test]
    fn collinear_points_collapse_to_end_points() {
        let keep = douglas_peucker(&line(5), 0.01);
        assert_eq!(keep, vec![true, false, false, false, true]);
    }

    #[test]
    fn peaks_beyond_tolerance_survive() {
        let pts = [
            Vec3::ZERO,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(2.0, 2.0, 0.0),
            Vec3::new(3.0, 1.0, 0.0),
            Vec3::new(4.0, 0.0, 0.0),
        ];
        assert_eq!(
            douglas_peucker(&pts, 0.1),
            vec![true, false, true, false, true]
        );
        // The peak is 4.0 away (squared) from the chord.
        assert_eq!(
            douglas_peucker(&pts, 5.0),
            vec![true, false, false, false, true]
        );
        assert!(douglas_peucker(&[], 1.0).is_empty());
    }

    #[test]
    fn visvalingam_respects_min_cvs() {
        let pts = line(10);
        let keep = visvalingam(&pts, 1.0, 4);
        assert_eq!(keep.iter().filter(|k| **k).count(), 4);
        assert!(keep[0] && keep[9]);
        assert!(visvalingam(&line(4), 1.0, 4).iter().all(|k| *k));
    }

    #[test]
    fn visvalingam_drops_flattest_first() {
        let pts = [
            Vec3::ZERO,
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(2.0, 0.01, 0.0),
            Vec3::new(3.0, 0.0, 0.0),
            Vec3::new(4.0, 2.0, 0.0),
            Vec3::new(5.0, 0.0, 0.0),
        ];
        // Six points, min 2: ceil(4 * 0.25) = 1 removal.
        let keep = visvalingam(&pts, 0.25, 2);
        assert_eq!(keep, vec![true, true, false, true, true, true]);
    }

    #[test]
    fn modes_parse_from_attr_strings() {
        assert_eq!("distance".parse(), Ok(SimplificationMode::Distance));
        assert!("area".parse::<SimplificationMode>().is_err());

        let mut attrs = GroupAttr::new();
        attrs.set("simplification", 0.5);
        attrs.set("simplificationMode", "bogus");
        attrs.set("minCv", 1_i64);
        let params = CurveReduction::from_attrs(&attrs);
        assert_eq!(params.mode, SimplificationMode::Percent);
        assert_eq!(params.min_cvs, 1);
        assert!(!params.is_noop());
        assert!(CurveReduction::default().is_noop());
    }
}
