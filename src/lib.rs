// lib.rs
//
// sizefit: fit an image to a target file size or print size.
//
// Design goals:
// - Land within a small error band of the requested byte budget
// - Bounded work: capped grids and iteration limits, never wall-clock guesses
// - Prefer undershooting a budget over overshooting it
// - Stateless core; callers own their session state

// Memory allocator optimization - jemalloc for better performance
// Note: jemalloc is not supported on Windows/MSVC, so we exclude it on that platform
#[cfg(all(feature = "jemalloc", not(target_env = "msvc")))]
#[global_allocator]
static ALLOC: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    compress_to_size, enlarge_to_size, process_batch, resize_by_dimensions, SearchConfig,
    SourceImage,
};
pub use error::{ErrorCategory, Result, SizeFitError};
pub use ops::{ByteSize, EncodeFormat, Fit, OutputFormat, ResolutionMode, TargetSpec};

/// Supported input formats (HEIC/HEIF must be converted first).
pub fn supported_input_formats() -> Vec<&'static str> {
    vec!["jpeg", "png", "webp", "gif", "bmp"]
}

/// Supported output formats.
pub fn supported_output_formats() -> Vec<&'static str> {
    vec!["original", "jpeg", "png", "webp"]
}

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
