// src/engine/estimator.rs
//
// Candidate grid generation. Shapes the (scale, quality) search space; never ranks it.

use crate::engine::common::scale_dimensions;
use crate::engine::config::SearchConfig;
use tracing::debug;

/// Scale axis: 1.0 down to 0.4 in 0.05 steps.
pub const SCALE_MAX: f64 = 1.0;
pub const SCALE_MIN: f64 = 0.4;
pub const SCALE_STEP: f64 = 0.05;

/// Quality axis, dense near the top where size is most sensitive to quality.
pub const GRID_QUALITIES: [f32; 16] = [
    1.0, 0.98, 0.96, 0.94, 0.92, 0.90, 0.85, 0.80, 0.75, 0.70, 0.60, 0.50, 0.40, 0.30, 0.20, 0.10,
];

#[derive(Clone, Debug, PartialEq)]
pub struct GridShape {
    pub scales: Vec<f64>,
    pub qualities: Vec<f32>,
    pub max_combinations: usize,
    pub min_dimension: u32,
}

impl GridShape {
    pub fn lossy(max_combinations: usize, min_dimension: u32) -> Self {
        Self {
            scales: default_scales(),
            qualities: GRID_QUALITIES.to_vec(),
            max_combinations,
            min_dimension,
        }
    }

    /// Lossless formats have no quality axis.
    pub fn lossless(max_combinations: usize, min_dimension: u32) -> Self {
        Self {
            scales: default_scales(),
            qualities: vec![1.0],
            max_combinations,
            min_dimension,
        }
    }

    pub fn for_config(config: &SearchConfig, lossless: bool) -> Self {
        if lossless {
            Self::lossless(config.max_grid_combinations, config.min_dimension)
        } else {
            Self::lossy(config.max_grid_combinations, config.min_dimension)
        }
    }
}

/// One point of the candidate grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridPoint {
    pub scale: f64,
    pub quality: f32,
    pub width: u32,
    pub height: u32,
    /// Rough bits-per-pixel prediction. Informational; the search never prunes on it.
    pub estimated_bytes: u64,
}

fn default_scales() -> Vec<f64> {
    let steps = ((SCALE_MAX - SCALE_MIN) / SCALE_STEP).round() as usize;
    (0..=steps)
        .map(|i| {
            let scale = SCALE_MAX - SCALE_STEP * i as f64;
            (scale * 100.0).round() / 100.0
        })
        .collect()
}

/// Heuristic byte size for a photographic image at the given size and quality.
pub fn estimate_bytes(width: u32, height: u32, quality: f32) -> u64 {
    let pixels = width as f64 * height as f64;
    let q = quality.clamp(0.0, 1.0) as f64;
    let bits_per_pixel = 0.25 + 3.75 * q.powf(2.5);
    (pixels * bits_per_pixel / 8.0).round() as u64
}

/// Ordered, capped candidate grid: scales descending, qualities descending
/// within each scale. Points whose either side falls below the minimum
/// dimension are left out.
///
/// The cap thins the quality axis evenly rather than cutting the last rows,
/// so the smallest scale at the lowest quality is always evaluated.
pub fn generate_candidate_grid(
    width: u32,
    height: u32,
    target_bytes: u64,
    shape: &GridShape,
) -> Vec<GridPoint> {
    let rows: Vec<(f64, u32, u32)> = shape
        .scales
        .iter()
        .filter_map(|&scale| {
            let (w, h) = scale_dimensions(width, height, scale);
            (w >= shape.min_dimension && h >= shape.min_dimension).then_some((scale, w, h))
        })
        .collect();
    let rows = spread(&rows, shape.max_combinations);
    let per_row = (shape.max_combinations / rows.len().max(1)).max(1);
    let qualities = spread(&shape.qualities, per_row);

    let mut grid = Vec::with_capacity(rows.len() * qualities.len());
    for &(scale, w, h) in &rows {
        grid.extend(qualities.iter().map(|&quality| GridPoint {
            scale,
            quality,
            width: w,
            height: h,
            estimated_bytes: estimate_bytes(w, h, quality),
        }));
    }

    let predicted_under = grid
        .iter()
        .filter(|p| p.estimated_bytes <= target_bytes)
        .count();
    debug!(
        width,
        height,
        target_bytes,
        points = grid.len(),
        predicted_under,
        "candidate grid generated"
    );
    grid
}

/// Keep `keep` items spread evenly over `items`, first and last included.
/// A single survivor is the last item.
fn spread<T: Copy>(items: &[T], keep: usize) -> Vec<T> {
    let n = items.len();
    match keep {
        _ if keep >= n => items.to_vec(),
        0 => Vec::new(),
        1 => items[n - 1..].to_vec(),
        _ => (0..keep)
            .map(|i| items[(i * (n - 1) + (keep - 1) / 2) / (keep - 1)])
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_axis() {
        let scales = default_scales();
        assert_eq!(scales.len(), 13);
        assert_eq!(scales[0], 1.0);
        assert_eq!(*scales.last().unwrap(), 0.4);
        assert!(scales.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn test_quality_axis_dense_at_top() {
        let top = GRID_QUALITIES.iter().filter(|&&q| q >= 0.90).count();
        assert_eq!(top, 6);
        assert_eq!(*GRID_QUALITIES.last().unwrap(), 0.10);
    }

    #[test]
    fn test_grid_is_capped() {
        let shape = GridShape::lossy(200, 50);
        let grid = generate_candidate_grid(4000, 3000, 100 * 1024, &shape);
        // 13 * 16 = 208 combinations; every row keeps 15 qualities
        assert_eq!(grid.len(), 195);
        assert_eq!(grid[0].scale, 1.0);
        assert_eq!(grid[0].quality, 1.0);
        assert_eq!((grid[0].width, grid[0].height), (4000, 3000));
        let last = grid.last().unwrap();
        assert_eq!((last.scale, last.quality), (0.4, 0.10));
        assert_eq!((last.width, last.height), (1600, 1200));
    }

    #[test]
    fn test_grid_order_scale_then_quality() {
        let shape = GridShape::lossy(200, 1);
        let grid = generate_candidate_grid(1000, 1000, 1, &shape);
        assert_eq!(grid[14].quality, 0.10);
        assert_eq!(grid[15].scale, 0.95);
        assert_eq!(grid[15].quality, 1.0);
        assert_eq!(grid[15].width, 950);
    }

    #[test]
    fn test_tight_cap_keeps_most_compressive_corner() {
        let grid = generate_candidate_grid(1000, 1000, 1, &GridShape::lossy(30, 1));
        assert_eq!(grid.len(), 26);
        assert!(grid.chunks(2).all(|row| row[0].quality == 1.0 && row[1].quality == 0.10));

        let grid = generate_candidate_grid(1000, 1000, 1, &GridShape::lossy(5, 1));
        let scales: Vec<f64> = grid.iter().map(|p| p.scale).collect();
        assert_eq!(scales.len(), 5);
        assert_eq!((scales[0], scales[4]), (1.0, 0.4));
        assert!(grid.iter().all(|p| p.quality == 0.10));
    }

    #[test]
    fn test_spread_keeps_endpoints() {
        let items: Vec<u32> = (0..16).collect();
        assert_eq!(spread(&items, 16), items);
        assert_eq!(spread(&items, 15).len(), 15);
        assert!(!spread(&items, 15).contains(&7));
        assert_eq!(spread(&items, 2), vec![0, 15]);
        assert_eq!(spread(&items, 1), vec![15]);
        assert!(spread(&items, 0).is_empty());
        assert!(spread::<u32>(&[], 3).is_empty());
    }

    #[test]
    fn test_small_sides_excluded() {
        let shape = GridShape::lossy(200, 50);
        let grid = generate_candidate_grid(100, 100, 1000, &shape);
        assert!(grid.iter().all(|p| p.width >= 50 && p.height >= 50));
        // 0.5 is the smallest scale keeping 50px
        assert_eq!(grid.last().unwrap().scale, 0.5);
    }

    #[test]
    fn test_lossless_shape_has_single_quality() {
        let shape = GridShape::lossless(200, 50);
        let grid = generate_candidate_grid(800, 600, 1000, &shape);
        assert_eq!(grid.len(), 13);
        assert!(grid.iter().all(|p| p.quality == 1.0));
    }

    #[test]
    fn test_estimate_grows_with_quality() {
        assert!(estimate_bytes(100, 100, 0.9) > estimate_bytes(100, 100, 0.5));
        assert!(estimate_bytes(200, 200, 0.5) > estimate_bytes(100, 100, 0.5));
    }
}
