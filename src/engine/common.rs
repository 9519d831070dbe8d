// src/engine/common.rs
//
// Common utilities shared across engine modules.
// Provides the engine result alias, the codec panic policy and numeric helpers.

use crate::error::SizeFitError;
use std::panic::{catch_unwind, AssertUnwindSafe};

pub type EngineResult<T> = std::result::Result<T, SizeFitError>;

/// Run a codec call, converting a panic inside native or pure-Rust codec code
/// into `InternalPanic` so a single bad candidate never unwinds through the search.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            tracing::error!(target: "sizefit::codec", label, %detail, "codec panicked");
            Err(SizeFitError::internal_panic(format!("{label}: {detail}")))
        }
    }
}

/// Clamp one dimension into `[min, max]`. A degenerate configuration where
/// `min > max` resolves to `max`.
#[inline]
pub fn clamp_dimension(value: u32, min: u32, max: u32) -> u32 {
    value.max(min).min(max).max(1)
}

/// Clamp a width/height pair independently.
#[inline]
pub fn clamp_dimensions(width: u32, height: u32, min: u32, max: u32) -> (u32, u32) {
    (
        clamp_dimension(width, min, max),
        clamp_dimension(height, min, max),
    )
}

/// Scale dimensions by `scale`, rounding to the nearest pixel.
#[inline]
pub fn scale_dimensions(width: u32, height: u32, scale: f64) -> (u32, u32) {
    let w = (width as f64 * scale).round();
    let h = (height as f64 * scale).round();
    (saturating_u32(w), saturating_u32(h))
}

#[inline]
fn saturating_u32(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// `|achieved - target|` in bytes.
#[inline]
pub fn abs_error(achieved: u64, target: u64) -> u64 {
    achieved.abs_diff(target)
}

/// Absolute error as a percentage of the target.
#[inline]
pub fn error_percent(achieved: u64, target: u64) -> f64 {
    if target == 0 {
        return f64::INFINITY;
    }
    abs_error(achieved, target) as f64 / target as f64 * 100.0
}

/// Signed relative error in percent; negative means under target.
#[inline]
pub fn relative_error(achieved: u64, target: u64) -> f64 {
    if target == 0 {
        return f64::INFINITY;
    }
    (achieved as f64 - target as f64) / target as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_policy_passes_through_results() {
        let ok: EngineResult<u8> = run_with_panic_policy("test:ok", || Ok(7));
        assert_eq!(ok.unwrap(), 7);

        let err: EngineResult<u8> =
            run_with_panic_policy("test:err", || Err(SizeFitError::decode_failed("nope")));
        assert!(matches!(err, Err(SizeFitError::DecodeFailed { .. })));
    }

    #[test]
    fn test_panic_policy_converts_panics() {
        let result: EngineResult<()> = run_with_panic_policy("test:panic", || panic!("kaboom"));
        match result {
            Err(SizeFitError::InternalPanic { message }) => {
                assert!(message.contains("test:panic"));
                assert!(message.contains("kaboom"));
            }
            other => panic!("expected InternalPanic, got {other:?}"),
        }
    }

    #[test]
    fn test_clamp_dimensions() {
        assert_eq!(clamp_dimensions(10, 20_000, 50, 10_000), (50, 10_000));
        assert_eq!(clamp_dimensions(640, 480, 50, 10_000), (640, 480));
        assert_eq!(clamp_dimension(0, 0, 100), 1);
    }

    #[test]
    fn test_scale_dimensions_rounds() {
        assert_eq!(scale_dimensions(4000, 3000, 0.45), (1800, 1350));
        assert_eq!(scale_dimensions(333, 333, 0.5), (167, 167));
        assert_eq!(scale_dimensions(100, 100, -1.0), (0, 0));
    }

    #[test]
    fn test_error_metrics() {
        assert_eq!(abs_error(90, 100), 10);
        assert_eq!(abs_error(110, 100), 10);
        assert!((error_percent(95, 100) - 5.0).abs() < 1e-9);
        assert!(relative_error(95, 100) < 0.0);
        assert!(relative_error(105, 100) > 0.0);
        assert!(error_percent(1, 0).is_infinite());
    }
}
