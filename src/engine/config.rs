// src/engine/config.rs
//
// Search configuration: tolerances, iteration caps, dimension bounds and the
// tunable strategy thresholds for preprocessing and enlarging.

use crate::engine::common::{abs_error, error_percent, scale_dimensions, EngineResult};
use crate::error::SizeFitError;

const DEFAULT_MAX_GRID_COMBINATIONS: usize = 200;
const FAST_MAX_GRID_COMBINATIONS: usize = 120;
const DEFAULT_TOLERANCE_PERCENT: f64 = 5.0;
const DEFAULT_PRECISE_PERCENT: f64 = 0.5;
const PRECISE_PRECISE_PERCENT: f64 = 0.2;
const FAST_PRECISE_PERCENT: f64 = 1.0;
const DEFAULT_MAX_BISECTION_ITERATIONS: u32 = 25;
const FAST_MAX_BISECTION_ITERATIONS: u32 = 10;
const DEFAULT_MIN_QUALITY_STEP: f32 = 0.005;
const DEFAULT_MIN_DIMENSION: u32 = 50;
const DEFAULT_MAX_DIMENSION: u32 = 10_000;
const DEFAULT_TIE_THRESHOLD_BYTES: u64 = 256;

const PREPROCESS_PIXEL_THRESHOLD: u64 = 8_000_000; // 8MP
const PREPROCESS_BYTE_THRESHOLD: u64 = 3 * 1024 * 1024; // 3MB
const PREPROCESS_PIXEL_BUDGET: u64 = 4_000_000; // 4MP
const PREPROCESS_MIN_REDUCTION: f64 = 0.9;

/// Acceptable error band around a target.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Tolerance {
    Percent(f64),
    Bytes(u64),
}

impl Tolerance {
    pub fn allows(&self, achieved: u64, target: u64) -> bool {
        match *self {
            Tolerance::Percent(pct) => error_percent(achieved, target) <= pct,
            Tolerance::Bytes(bytes) => abs_error(achieved, target) <= bytes,
        }
    }

    /// The band expressed as a percentage of `target`.
    pub fn as_percent(&self, target: u64) -> f64 {
        match *self {
            Tolerance::Percent(pct) => pct,
            Tolerance::Bytes(bytes) => {
                if target == 0 {
                    0.0
                } else {
                    bytes as f64 / target as f64 * 100.0
                }
            }
        }
    }

    fn is_valid(&self) -> bool {
        match *self {
            Tolerance::Percent(pct) => pct.is_finite() && pct >= 0.0,
            Tolerance::Bytes(_) => true,
        }
    }
}

/// Oversized-input guard run before any other engine work.
#[derive(Clone, Debug, PartialEq)]
pub struct PreprocessConfig {
    pub enabled: bool,
    pub pixel_threshold: u64,
    pub byte_threshold: u64,
    pub pixel_budget: u64,
    /// Skip when the planned scale would be above this (not worth a redraw).
    pub min_reduction: f64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pixel_threshold: PREPROCESS_PIXEL_THRESHOLD,
            byte_threshold: PREPROCESS_BYTE_THRESHOLD,
            pixel_budget: PREPROCESS_PIXEL_BUDGET,
            min_reduction: PREPROCESS_MIN_REDUCTION,
        }
    }
}

impl PreprocessConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Downscaled size for an oversized input, or `None` to skip the pass entirely.
    pub fn plan(&self, width: u32, height: u32, byte_len: u64) -> Option<(u32, u32)> {
        if !self.enabled || width == 0 || height == 0 {
            return None;
        }
        let pixels = width as u64 * height as u64;
        if pixels <= self.pixel_threshold && byte_len <= self.byte_threshold {
            return None;
        }
        let scale = (self.pixel_budget as f64 / pixels as f64).sqrt().min(1.0);
        if scale > self.min_reduction {
            return None;
        }
        Some(scale_dimensions(width, height, scale))
    }
}

/// Strategy thresholds for enlarge-to-size. Empirically tuned.
#[derive(Clone, Debug, PartialEq)]
pub struct EnlargeConfig {
    /// At or below this processing factor the request is not an enlargement.
    pub quality_threshold: f64,
    /// Up to this factor, resolution is kept and quality pushed to the ceiling.
    pub near_baseline_factor: f64,
    /// Resolution scale is `factor ^ scale_exponent` beyond `near_baseline_factor`.
    pub scale_exponent: f64,
    pub high_quality: f32,
}

impl Default for EnlargeConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 1.0,
            near_baseline_factor: 1.2,
            scale_exponent: 0.8,
            high_quality: 0.85,
        }
    }
}

impl EnlargeConfig {
    pub fn scale_for(&self, factor: f64) -> f64 {
        factor.powf(self.scale_exponent)
    }

    /// Documented accuracy band (percent) for an enlarge factor.
    pub fn accuracy_band(&self, factor: f64) -> f64 {
        if factor <= self.near_baseline_factor {
            5.0
        } else if factor <= 2.0 {
            6.0
        } else {
            8.0
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SearchProfile {
    Balanced,
    Precise,
    Fast,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchConfig {
    pub profile: SearchProfile,
    pub max_grid_combinations: usize,
    /// Band within which a grid candidate ends the search and no refinement runs.
    pub tolerance: Tolerance,
    /// Early-exit band for bisection.
    pub precise_tolerance: Tolerance,
    pub max_bisection_iterations: u32,
    pub min_quality: f32,
    pub max_quality: f32,
    pub min_quality_step: f32,
    pub min_dimension: u32,
    pub max_dimension: u32,
    /// Errors closer than this are tied; under-target wins ties.
    pub tie_threshold_bytes: u64,
    pub preprocess: PreprocessConfig,
    pub enlarge: EnlargeConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            profile: SearchProfile::Balanced,
            max_grid_combinations: DEFAULT_MAX_GRID_COMBINATIONS,
            tolerance: Tolerance::Percent(DEFAULT_TOLERANCE_PERCENT),
            precise_tolerance: Tolerance::Percent(DEFAULT_PRECISE_PERCENT),
            max_bisection_iterations: DEFAULT_MAX_BISECTION_ITERATIONS,
            min_quality: 0.1,
            max_quality: 1.0,
            min_quality_step: DEFAULT_MIN_QUALITY_STEP,
            min_dimension: DEFAULT_MIN_DIMENSION,
            max_dimension: DEFAULT_MAX_DIMENSION,
            tie_threshold_bytes: DEFAULT_TIE_THRESHOLD_BYTES,
            preprocess: PreprocessConfig::default(),
            enlarge: EnlargeConfig::default(),
        }
    }
}

impl SearchConfig {
    pub fn balanced() -> Self {
        Self::default()
    }

    pub fn precise() -> Self {
        Self {
            profile: SearchProfile::Precise,
            precise_tolerance: Tolerance::Percent(PRECISE_PRECISE_PERCENT),
            ..Self::default()
        }
    }

    pub fn fast() -> Self {
        Self {
            profile: SearchProfile::Fast,
            max_grid_combinations: FAST_MAX_GRID_COMBINATIONS,
            precise_tolerance: Tolerance::Percent(FAST_PRECISE_PERCENT),
            max_bisection_iterations: FAST_MAX_BISECTION_ITERATIONS,
            ..Self::default()
        }
    }

    pub fn apply_profile(profile: SearchProfile) -> Self {
        match profile {
            SearchProfile::Balanced => Self::balanced(),
            SearchProfile::Precise => Self::precise(),
            SearchProfile::Fast => Self::fast(),
        }
    }

    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_precise_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.precise_tolerance = tolerance;
        self
    }

    pub fn with_max_bisection_iterations(mut self, iterations: u32) -> Self {
        self.max_bisection_iterations = iterations;
        self
    }

    pub fn with_dimension_bounds(mut self, min: u32, max: u32) -> Self {
        self.min_dimension = min;
        self.max_dimension = max;
        self
    }

    pub fn with_preprocess(mut self, preprocess: PreprocessConfig) -> Self {
        self.preprocess = preprocess;
        self
    }

    pub fn with_enlarge(mut self, enlarge: EnlargeConfig) -> Self {
        self.enlarge = enlarge;
        self
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_grid_combinations == 0 {
            return Err(SizeFitError::invalid_argument(
                "max_grid_combinations",
                "0",
                "grid must allow at least one combination",
            ));
        }
        if self.max_bisection_iterations == 0 {
            return Err(SizeFitError::invalid_argument(
                "max_bisection_iterations",
                "0",
                "at least one bisection iteration is required",
            ));
        }
        if !self.tolerance.is_valid() || !self.precise_tolerance.is_valid() {
            return Err(SizeFitError::invalid_argument(
                "tolerance",
                format!("{:?} / {:?}", self.tolerance, self.precise_tolerance),
                "percent tolerances must be finite and non-negative",
            ));
        }
        let quality_ok = self.min_quality.is_finite()
            && self.max_quality.is_finite()
            && self.min_quality > 0.0
            && self.min_quality < self.max_quality
            && self.max_quality <= 1.0;
        if !quality_ok {
            return Err(SizeFitError::invalid_argument(
                "quality_range",
                format!("[{}, {}]", self.min_quality, self.max_quality),
                "expected 0 < min_quality < max_quality <= 1",
            ));
        }
        if !(self.min_quality_step.is_finite() && self.min_quality_step > 0.0) {
            return Err(SizeFitError::invalid_argument(
                "min_quality_step",
                self.min_quality_step.to_string(),
                "must be positive",
            ));
        }
        if self.min_dimension == 0 || self.min_dimension > self.max_dimension {
            return Err(SizeFitError::invalid_argument(
                "dimension_bounds",
                format!("[{}, {}]", self.min_dimension, self.max_dimension),
                "expected 0 < min_dimension <= max_dimension",
            ));
        }
        let enlarge = &self.enlarge;
        if !(enlarge.near_baseline_factor >= enlarge.quality_threshold
            && enlarge.scale_exponent > 0.0
            && enlarge.high_quality > 0.0
            && enlarge.high_quality <= 1.0)
        {
            return Err(SizeFitError::invalid_argument(
                "enlarge",
                format!("{enlarge:?}"),
                "thresholds out of range",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod tolerance_tests {
        use super::*;

        #[test]
        fn test_percent_tolerance() {
            let tol = Tolerance::Percent(5.0);
            assert!(tol.allows(105, 100));
            assert!(tol.allows(95, 100));
            assert!(!tol.allows(106, 100));
        }

        #[test]
        fn test_byte_tolerance() {
            let tol = Tolerance::Bytes(10);
            assert!(tol.allows(1010, 1000));
            assert!(!tol.allows(1011, 1000));
            assert!((tol.as_percent(1000) - 1.0).abs() < 1e-9);
        }
    }

    mod preprocess_tests {
        use super::*;

        #[test]
        fn test_within_bounds_is_skipped() {
            let cfg = PreprocessConfig::default();
            assert_eq!(cfg.plan(2000, 1500, 1024 * 1024), None);
        }

        #[test]
        fn test_oversized_pixels_downscale_to_budget() {
            let cfg = PreprocessConfig::default();
            let (w, h) = cfg.plan(4000, 3000, 1024).unwrap();
            assert!((w as u64 * h as u64) <= 4_000_000 + 4000);
            assert!(w < 4000 && h < 3000);
            let ratio = w as f64 / h as f64;
            assert!((ratio - 4.0 / 3.0).abs() < 0.01);
        }

        #[test]
        fn test_large_file_already_small_in_pixels_is_skipped() {
            let cfg = PreprocessConfig::default();
            assert_eq!(cfg.plan(1600, 1200, 5 * 1024 * 1024), None);
        }

        #[test]
        fn test_marginal_reduction_is_skipped() {
            let cfg = PreprocessConfig {
                pixel_threshold: 4_100_000,
                ..PreprocessConfig::default()
            };
            // sqrt(4.0 / 4.2) ~ 0.976 > 0.9
            assert_eq!(cfg.plan(2400, 1750, 0), None);
        }

        #[test]
        fn test_disabled() {
            assert_eq!(PreprocessConfig::disabled().plan(8000, 6000, u64::MAX), None);
        }
    }

    mod enlarge_tests {
        use super::*;

        #[test]
        fn test_scale_for_three_x() {
            let cfg = EnlargeConfig::default();
            assert!((cfg.scale_for(3.0) - 2.408).abs() < 0.01);
        }

        #[test]
        fn test_accuracy_bands() {
            let cfg = EnlargeConfig::default();
            assert_eq!(cfg.accuracy_band(1.1), 5.0);
            assert_eq!(cfg.accuracy_band(1.8), 6.0);
            assert_eq!(cfg.accuracy_band(3.0), 8.0);
        }
    }

    mod search_config_tests {
        use super::*;

        #[test]
        fn test_defaults_validate() {
            for profile in [SearchProfile::Balanced, SearchProfile::Precise, SearchProfile::Fast] {
                let cfg = SearchConfig::apply_profile(profile);
                assert_eq!(cfg.profile, profile);
                assert!(cfg.validate().is_ok());
            }
        }

        #[test]
        fn test_fast_profile_is_bounded() {
            let cfg = SearchConfig::fast();
            assert_eq!(cfg.max_bisection_iterations, 10);
            assert_eq!(cfg.max_grid_combinations, 120);
        }

        #[test]
        fn test_invalid_quality_range() {
            let mut cfg = SearchConfig::default();
            cfg.min_quality = 0.9;
            cfg.max_quality = 0.5;
            assert!(matches!(
                cfg.validate(),
                Err(SizeFitError::InvalidArgument { .. })
            ));
        }

        #[test]
        fn test_invalid_dimension_bounds() {
            let cfg = SearchConfig::default().with_dimension_bounds(500, 100);
            assert!(cfg.validate().is_err());
        }

        #[test]
        fn test_zero_iterations_rejected() {
            let cfg = SearchConfig::default().with_max_bisection_iterations(0);
            assert!(cfg.validate().is_err());
        }
    }
}
