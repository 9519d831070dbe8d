mod common;

use common::ModelCodec;
use proptest::prelude::*;
use sizefit::engine::common::{clamp_dimensions, scale_dimensions};
use sizefit::engine::{
    bisect_quality, generate_candidate_grid, rank_candidates, BisectionParams,
    CompressionCandidate, GridShape, Provenance, ScoredCandidate, SearchConfig,
};
use sizefit::ops::PhysicalUnit;
use sizefit::EncodeFormat;

const TIE: u64 = 256;

fn scored(bytes: usize, target: u64) -> ScoredCandidate {
    let candidate = CompressionCandidate::new(vec![0; bytes], 100, 100, 0.8, EncodeFormat::Jpeg);
    ScoredCandidate::score(candidate, target, Provenance::Grid)
}

fn unit_strategy() -> impl Strategy<Value = PhysicalUnit> {
    prop_oneof![
        Just(PhysicalUnit::Cm),
        Just(PhysicalUnit::Mm),
        Just(PhysicalUnit::Inch),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_rank_is_stable_under_reranking(
        sizes in prop::collection::vec(1usize..20_000, 1..24),
        target in 1_000u64..15_000,
    ) {
        let candidates: Vec<ScoredCandidate> = sizes.iter().map(|&s| scored(s, target)).collect();
        let best = rank_candidates(&candidates, TIE).unwrap().clone();

        // Re-ranking with the winner appended picks an equivalent candidate.
        let mut again = candidates.clone();
        again.push(best.clone());
        let second = rank_candidates(&again, TIE).unwrap();
        prop_assert_eq!(second.error, best.error);
        prop_assert_eq!(second.achieved_bytes(), best.achieved_bytes());

        let min_error = candidates.iter().map(|c| c.error).min().unwrap();
        prop_assert!(best.error < min_error + TIE);
    }

    #[test]
    fn prop_under_target_wins_inside_tie_window(
        target in 2_000u64..50_000,
        under_gap in 1u64..200,
        over_gap in 1u64..200,
    ) {
        prop_assume!(under_gap.abs_diff(over_gap) < TIE);
        let under = scored((target - under_gap) as usize, target);
        let over = scored((target + over_gap) as usize, target);

        for pair in [vec![under.clone(), over.clone()], vec![over.clone(), under.clone()]] {
            let best = rank_candidates(&pair, TIE).unwrap();
            prop_assert!(best.is_under_target());
        }
    }

    #[test]
    fn prop_grid_respects_cap_and_bounds(
        width in 1u32..6_000,
        height in 1u32..6_000,
        cap in 1usize..300,
        min_dimension in 1u32..200,
        target in 1_000u64..5_000_000,
    ) {
        let shape = GridShape::lossy(cap, min_dimension);
        let grid = generate_candidate_grid(width, height, target, &shape);

        prop_assert!(grid.len() <= cap);
        for point in &grid {
            prop_assert!(point.width >= min_dimension && point.height >= min_dimension);
            prop_assert!(point.quality > 0.0 && point.quality <= 1.0);
            prop_assert!(point.scale <= 1.0 && point.scale >= 0.4 - 1e-9);
        }
        for pair in grid.windows(2) {
            prop_assert!(pair[0].scale >= pair[1].scale);
            if pair[0].scale == pair[1].scale {
                prop_assert!(pair[0].quality > pair[1].quality);
            }
        }
        if let Some(last) = grid.last() {
            let smallest = shape
                .scales
                .iter()
                .copied()
                .filter(|&scale| {
                    let (w, h) = scale_dimensions(width, height, scale);
                    w >= min_dimension && h >= min_dimension
                })
                .fold(f64::INFINITY, f64::min);
            prop_assert_eq!(last.scale, smallest);
            prop_assert_eq!(last.quality, 0.10);
        }
    }

    #[test]
    fn prop_physical_units_round_trip(
        value in 0.5f64..100.0,
        dpi in prop::sample::select(vec![72u32, 96, 150, 200, 300, 600]),
        unit in unit_strategy(),
    ) {
        let px = unit.to_pixels(value, dpi);
        let back = unit.from_pixels(px, dpi);
        let half_pixel = unit.per_inch() / dpi as f64 / 2.0;
        prop_assert!((back - value).abs() <= half_pixel + 1e-9);
    }

    #[test]
    fn prop_clamped_dimensions_stay_in_bounds(
        width in 0u32..100_000,
        height in 0u32..100_000,
        min in 1u32..100,
        span in 0u32..20_000,
    ) {
        let max = min + span;
        let (w, h) = clamp_dimensions(width, height, min, max);
        prop_assert!((min..=max).contains(&w));
        prop_assert!((min..=max).contains(&h));
        if (min..=max).contains(&width) {
            prop_assert_eq!(w, width);
        }
    }

    #[test]
    fn prop_bisection_is_bounded_and_keeps_best(
        width in 100u32..1_200,
        height in 100u32..1_200,
        baseline in 20_000u64..2_000_000,
        fraction in 0.05f64..1.2,
    ) {
        let codec = ModelCodec::with_baseline(width, height, baseline);
        let target = ((baseline as f64 * fraction) as u64).max(1);
        let params = BisectionParams::from_config(&SearchConfig::default(), Provenance::Bisection);

        let outcome = bisect_quality(&codec, width, height, target, &params);
        let best = outcome.best.unwrap();

        prop_assert!(outcome.iterations <= params.max_iterations);
        prop_assert!(best.candidate.quality >= params.min_quality);
        prop_assert!(best.candidate.quality <= params.max_quality);
        // The first midpoint is always evaluated; the result is never worse
        // than it beyond the under-target tie window.
        let first = codec.predicted_bytes(width, height, (params.min_quality + params.max_quality) / 2.0);
        prop_assert!(best.error < first.abs_diff(target) + params.tie_threshold);
    }
}
