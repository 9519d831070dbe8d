// src/engine.rs
//
// The core of sizefit. Given a source image and a byte budget (or explicit
// dimensions), find a (resolution, quality) pair whose encoded output lands
// inside an error band of the target, in bounded time:
// 1. Guard oversized inputs with a one-off downscale
// 2. Probe the max-quality baseline
// 3. Grid search (auto resolution) or bisection (fixed resolution)
// 4. Refine the best candidate when it misses tolerance
//
// This file is a facade over the decomposed modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Images larger than 32768x32768 are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA. Beyond this is likely malicious.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULE DECOMPOSITION
// =============================================================================

pub mod batch;
pub mod codec;
pub mod common;
pub mod config;
pub mod decoder;
pub mod encoder;
pub mod estimator;
pub mod io;
pub mod modes;
pub mod optimizer;
pub mod session;
pub mod surface;
pub mod targeting;
pub mod validate;

pub use batch::{process_batch, process_batch_with, BatchInput, BatchOutcome, BatchReport};
pub use codec::{
    Attempt, CandidatePool, Codec, CompressionCandidate, Provenance, RasterCodec,
    ScoredCandidate, SkippedCandidate,
};
pub use common::{run_with_panic_policy, EngineResult};
pub use config::{EnlargeConfig, PreprocessConfig, SearchConfig, SearchProfile, Tolerance};
pub use decoder::{check_dimensions, decode_image, detect_mime};
pub use encoder::{encode_jpeg, encode_png, encode_webp, QualitySettings};
pub use estimator::{generate_candidate_grid, GridPoint, GridShape, GRID_QUALITIES};
pub use io::{Source, SourceImage};
pub use modes::{
    compress_to_size, compress_to_size_with, enlarge_to_size, enlarge_to_size_with,
    resize_by_dimensions, resize_by_dimensions_with, CompressJob, EnlargeJob, Job, ModeOutput,
    ResizeJob,
};
pub use optimizer::{
    bisect_quality, fit_under_budget, rank_candidates, BisectionOutcome, BisectionParams,
    UnderBudgetParams,
};
pub use session::{ImageSession, SessionImage, SessionResult};
pub use surface::{calc_inside_dimensions, fast_resize, RasterSurface};
pub use targeting::{
    Convergence, EngineState, ResolutionTarget, SearchDiagnostics, SearchDirection,
    SearchReport, SearchRequest, SizeTargetingEngine, Strategy,
};
