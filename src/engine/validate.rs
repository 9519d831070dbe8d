// src/engine/validate.rs
//
// Boundary checks run before a request reaches the engine.

use crate::engine::common::EngineResult;
use crate::error::SizeFitError;
use crate::ops::{EncodeFormat, ResolutionMode, TargetSpec};

pub const MIN_TARGET_BYTES: u64 = 1024; // 1KB
pub const MAX_COMPRESS_TARGET_BYTES: u64 = 50 * 1024 * 1024; // 50MB
pub const MAX_ENLARGE_TARGET_BYTES: u64 = 100 * 1024 * 1024; // 100MB
pub const MAX_COMPRESS_RATIO: u64 = 2;
pub const MAX_TARGET_DIMENSION: u32 = 10_000;

fn kb(bytes: u64) -> String {
    format!("{:.1}KB", bytes as f64 / 1024.0)
}

/// Compress target: at least 1KB, at most 50MB and at most twice the source size.
pub fn validate_compress_target(target_bytes: u64, source_bytes: u64) -> EngineResult<()> {
    if target_bytes < MIN_TARGET_BYTES {
        return Err(SizeFitError::invalid_input(format!(
            "target size {} is below the 1KB minimum",
            kb(target_bytes)
        )));
    }
    if target_bytes > MAX_COMPRESS_TARGET_BYTES {
        return Err(SizeFitError::invalid_input(format!(
            "target size {} exceeds the 50MB maximum",
            kb(target_bytes)
        )));
    }
    if source_bytes > 0 && target_bytes > source_bytes.saturating_mul(MAX_COMPRESS_RATIO) {
        return Err(SizeFitError::invalid_input(format!(
            "target size {} is more than twice the current size {}; use enlarge instead",
            kb(target_bytes),
            kb(source_bytes)
        )));
    }
    Ok(())
}

/// Enlarge target: strictly above the current size and at most 100MB.
pub fn validate_enlarge_target(target_bytes: u64, source_bytes: u64) -> EngineResult<()> {
    if target_bytes < MIN_TARGET_BYTES {
        return Err(SizeFitError::invalid_input(format!(
            "target size {} is below the 1KB minimum",
            kb(target_bytes)
        )));
    }
    if target_bytes <= source_bytes {
        return Err(SizeFitError::invalid_input(format!(
            "enlarge target {} must exceed the current size {}",
            kb(target_bytes),
            kb(source_bytes)
        )));
    }
    if target_bytes > MAX_ENLARGE_TARGET_BYTES {
        return Err(SizeFitError::invalid_input(format!(
            "target size {} exceeds the 100MB maximum",
            kb(target_bytes)
        )));
    }
    Ok(())
}

pub fn validate_pixel_target(width: u32, height: u32) -> EngineResult<()> {
    if width == 0 || height == 0 {
        return Err(SizeFitError::invalid_argument(
            "dimensions",
            format!("{width}x{height}"),
            "width and height must be positive",
        ));
    }
    if width > MAX_TARGET_DIMENSION || height > MAX_TARGET_DIMENSION {
        return Err(SizeFitError::invalid_argument(
            "dimensions",
            format!("{width}x{height}"),
            "each side must be at most 10000 pixels",
        ));
    }
    Ok(())
}

/// Validate a dimension target and convert it to pixels.
pub fn resolve_dimension_target(target: &TargetSpec) -> EngineResult<(u32, u32)> {
    match target {
        TargetSpec::Bytes { .. } => Err(SizeFitError::invalid_argument(
            "target",
            "bytes",
            "a pixel or physical target is required",
        )),
        TargetSpec::Pixels { width, height } => {
            validate_pixel_target(*width, *height)?;
            Ok((*width, *height))
        }
        TargetSpec::Physical {
            width,
            height,
            unit,
            dpi,
        } => {
            let finite = width.is_finite() && height.is_finite();
            if !finite || *width <= 0.0 || *height <= 0.0 {
                return Err(SizeFitError::invalid_argument(
                    "physical_size",
                    format!("{width}x{height}{}", unit.as_str()),
                    "physical dimensions must be positive numbers",
                ));
            }
            if *dpi == 0 {
                return Err(SizeFitError::invalid_argument("dpi", "0", "dpi must be positive"));
            }
            let (w, h) = (unit.to_pixels(*width, *dpi), unit.to_pixels(*height, *dpi));
            validate_pixel_target(w, h)?;
            Ok((w, h))
        }
    }
}

/// Byte targeting a lossless format at fixed resolution has no free variable.
pub fn validate_byte_targeting(format: EncodeFormat, resolution: &ResolutionMode) -> EngineResult<()> {
    if format.is_lossless() && matches!(resolution, ResolutionMode::Fixed(_)) {
        return Err(SizeFitError::unsupported_operation(format!(
            "{} is lossless: its size cannot be targeted at a fixed resolution; \
             allow automatic resolution or choose JPEG/WebP",
            format.as_str()
        )));
    }
    Ok(())
}
