// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs, clippy::unwrap_used, clippy::expect_used)]
use glam::Vec3;
use proptest::prelude::*;

use kodachi_geom::{
    douglas_peucker, reduce_curve, reduce_curves, visvalingam, CurveReduction, GeomError,
    SimplificationMode,
};

fn point() -> impl Strategy<Value = Vec3> {
    prop::array::uniform3(-100.0f32..100.0).prop_map(Vec3::from_array)
}

fn curve(len: std::ops::Range<usize>) -> impl Strategy<Value = Vec<Vec3>> {
    prop::collection::vec(point(), len)
}

proptest! {
    #[test]
    fn douglas_peucker_keeps_end_points(points in curve(1..64), eps in 0.0f32..50.0) {
        let keep = douglas_peucker(&points, eps);
        prop_assert_eq!(keep.len(), points.len());
        prop_assert!(keep[0]);
        prop_assert!(keep[points.len() - 1]);
    }

    #[test]
    fn visvalingam_removes_the_requested_count(
        points in curve(2..64),
        simplification in 0.0f32..=1.0,
        min_cvs in 0usize..8,
    ) {
        let keep = visvalingam(&points, simplification, min_cvs);
        let n = points.len();
        let floor = min_cvs.max(2);
        let kept = keep.iter().filter(|k| **k).count();
        if n <= floor {
            prop_assert_eq!(kept, n);
        } else {
            let removed = ((n - floor) as f32 * simplification).ceil() as usize;
            prop_assert_eq!(kept, n - removed);
            prop_assert!(kept >= floor);
        }
        prop_assert!(keep[0] && keep[n - 1]);
    }

    #[test]
    fn packed_reduction_matches_per_curve_reduction(
        curves in prop::collection::vec(curve(2..20), 1..8),
        simplification in 0.01f32..=1.0,
    ) {
        let counts: Vec<usize> = curves.iter().map(Vec::len).collect();
        let packed: Vec<Vec3> = curves.iter().flatten().copied().collect();
        let params = CurveReduction {
            mode: SimplificationMode::Percent,
            simplification,
            min_cvs: 3,
        };
        let omitted = reduce_curves(&packed, &counts, &params).unwrap();

        let mut expected = Vec::new();
        let mut offset = 0;
        for c in &curves {
            for (i, keep) in visvalingam(c, simplification, 3).into_iter().enumerate() {
                if !keep {
                    expected.push(offset + i);
                }
            }
            offset += c.len();
        }
        prop_assert_eq!(omitted, expected);
    }
}

#[test]
fn zero_simplification_is_a_no_op() {
    let points: Vec<Vec3> = (0..10).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
    assert!(reduce_curve(&points, SimplificationMode::Distance, 0.0)
        .iter()
        .all(|k| *k));
    assert!(reduce_curves(&points, &[10], &CurveReduction::default())
        .unwrap()
        .is_empty());
}

#[test]
fn distance_mode_drops_collinear_interior_points() {
    let points: Vec<Vec3> = (0..6).map(|i| Vec3::new(0.0, i as f32, 0.0)).collect();
    let params = CurveReduction {
        mode: SimplificationMode::Distance,
        simplification: 0.001,
        min_cvs: 4,
    };
    let omitted = reduce_curves(&points, &[3, 3], &params).unwrap();
    assert_eq!(omitted, vec![1, 4]);
}

#[test]
fn mismatched_vertex_counts_are_rejected() {
    let points = vec![Vec3::ZERO; 5];
    assert_eq!(
        reduce_curves(&points, &[2, 2], &CurveReduction::default()),
        Err(GeomError::VertexCountMismatch {
            expected: 4,
            actual: 5
        })
    );
}
