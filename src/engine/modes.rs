// src/engine/modes.rs
//
// Mode variants over the size-targeting engine: compress-to-size,
// resize-by-dimensions (with an optional byte budget) and enlarge-to-size.
// Each validates its request, builds a codec from the source and runs.

use crate::engine::codec::{Codec, Provenance, RasterCodec, ScoredCandidate};
use crate::engine::common::{clamp_dimensions, EngineResult};
use crate::engine::config::SearchConfig;
use crate::engine::io::SourceImage;
use crate::engine::optimizer::{fit_under_budget, UnderBudgetParams};
use crate::engine::surface::calc_inside_dimensions;
use crate::engine::targeting::{
    Convergence, EngineState, ResolutionTarget, SearchDiagnostics, SearchReport, SearchRequest,
    SizeTargetingEngine,
};
use crate::engine::validate::{
    resolve_dimension_target, validate_byte_targeting, validate_compress_target,
    validate_enlarge_target, MIN_TARGET_BYTES,
};
use crate::error::SizeFitError;
use crate::ops::{ByteSize, EncodeFormat, Fit, OutputFormat, ResolutionMode, TargetSpec};
use std::time::Instant;
use tracing::{debug, info};

/// Quality of the primary encode in resize-by-dimensions.
pub const DEFAULT_RESIZE_QUALITY: f32 = 0.9;

#[derive(Clone, Debug, PartialEq)]
pub struct CompressJob {
    pub target_bytes: u64,
    pub resolution: ResolutionMode,
    pub output: OutputFormat,
}

impl CompressJob {
    pub fn new(target: ByteSize) -> Self {
        Self::from_bytes(target.to_bytes())
    }

    pub fn from_bytes(target_bytes: u64) -> Self {
        Self {
            target_bytes,
            resolution: ResolutionMode::Auto,
            output: OutputFormat::KeepOriginal,
        }
    }

    pub fn with_resolution(mut self, resolution: ResolutionMode) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResizeJob {
    /// Pixel or physical target.
    pub target: TargetSpec,
    pub fit: Fit,
    /// Optional secondary budget applied on top of the resized output.
    pub max_bytes: Option<u64>,
    pub quality: f32,
    pub output: OutputFormat,
}

impl ResizeJob {
    pub fn new(target: TargetSpec) -> Self {
        Self {
            target,
            fit: Fit::Exact,
            max_bytes: None,
            quality: DEFAULT_RESIZE_QUALITY,
            output: OutputFormat::KeepOriginal,
        }
    }

    pub fn with_fit(mut self, fit: Fit) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_max_size(mut self, max: ByteSize) -> Self {
        self.max_bytes = Some(max.to_bytes());
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct EnlargeJob {
    pub target_bytes: u64,
    pub output: OutputFormat,
}

impl EnlargeJob {
    pub fn new(target: ByteSize) -> Self {
        Self::from_bytes(target.to_bytes())
    }

    pub fn from_bytes(target_bytes: u64) -> Self {
        Self {
            target_bytes,
            output: OutputFormat::KeepOriginal,
        }
    }

    pub fn with_output(mut self, output: OutputFormat) -> Self {
        self.output = output;
        self
    }
}

/// Any of the three mode variants.
#[derive(Clone, Debug, PartialEq)]
pub enum Job {
    Compress(CompressJob),
    Resize(ResizeJob),
    Enlarge(EnlargeJob),
}

impl Job {
    pub fn run(&self, source: &SourceImage, config: &SearchConfig) -> EngineResult<ModeOutput> {
        match self {
            Job::Compress(job) => compress_to_size(source, job, config),
            Job::Resize(job) => resize_by_dimensions(source, job, config),
            Job::Enlarge(job) => enlarge_to_size(source, job, config),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Job::Compress(_) => "compress",
            Job::Resize(_) => "resize",
            Job::Enlarge(_) => "enlarge",
        }
    }
}

/// Result of a mode run: the winning candidate plus how close it got.
#[derive(Clone, Debug)]
pub struct ModeOutput {
    pub candidate: ScoredCandidate,
    /// Byte target the candidate was judged against, when there was one.
    pub target_bytes: Option<u64>,
    pub convergence: Convergence,
    pub diagnostics: SearchDiagnostics,
}

impl ModeOutput {
    pub fn bytes(&self) -> &[u8] {
        &self.candidate.candidate.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.candidate.candidate.bytes
    }

    pub fn achieved_bytes(&self) -> u64 {
        self.candidate.achieved_bytes()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.candidate.candidate.dimensions()
    }

    pub fn quality(&self) -> f32 {
        self.candidate.candidate.quality
    }

    pub fn format(&self) -> EncodeFormat {
        self.candidate.candidate.format
    }

    pub fn mime(&self) -> &'static str {
        self.format().mime()
    }

    pub fn is_converged(&self) -> bool {
        matches!(self.convergence, Convergence::Converged)
    }

    /// Message for the person who asked; distinguishes a shortfall from a hit.
    pub fn user_message(&self) -> String {
        let achieved = ByteSize::from_bytes(self.achieved_bytes());
        match (self.target_bytes, self.convergence) {
            (Some(target), Convergence::Shortfall { error_percent }) => format!(
                "processed, but only to within {error_percent:.1}% of your target: {achieved} for {}",
                ByteSize::from_bytes(target)
            ),
            (Some(target), Convergence::Converged) => format!(
                "processed: {achieved} for a {} target ({:.1}% off)",
                ByteSize::from_bytes(target),
                self.candidate.error_percent
            ),
            (None, _) => {
                let (w, h) = self.dimensions();
                format!("processed: {w}x{h}, {achieved}")
            }
        }
    }

    fn from_report(report: SearchReport) -> Self {
        Self {
            target_bytes: Some(report.target_bytes),
            candidate: report.best,
            convergence: report.convergence,
            diagnostics: report.diagnostics,
        }
    }
}

fn resolution_target(resolution: &ResolutionMode) -> EngineResult<ResolutionTarget> {
    match resolution {
        ResolutionMode::Auto => Ok(ResolutionTarget::Auto),
        ResolutionMode::Fixed(spec) => {
            let (width, height) = resolve_dimension_target(spec)?;
            Ok(ResolutionTarget::Fixed { width, height })
        }
    }
}

/// Compress a source to a byte target.
pub fn compress_to_size(
    source: &SourceImage,
    job: &CompressJob,
    config: &SearchConfig,
) -> EngineResult<ModeOutput> {
    let format = job.output.resolve(source.mime());
    validate_byte_targeting(format, &job.resolution)?;
    validate_compress_target(job.target_bytes, source.byte_len())?;
    let resolution = resolution_target(&job.resolution)?;

    let codec = RasterCodec::from_source(source, job.output)?;
    let mut request = SearchRequest::compress(job.target_bytes).with_source_len(source.byte_len());
    request.resolution = resolution;
    compress_to_size_with(&codec, &request, config)
}

/// Compress with any codec. Validation is the caller's job.
pub fn compress_to_size_with<C: Codec>(
    codec: &C,
    request: &SearchRequest,
    config: &SearchConfig,
) -> EngineResult<ModeOutput> {
    let engine = SizeTargetingEngine::new(config.clone())?;
    let report = engine.run(codec, request)?;
    Ok(ModeOutput::from_report(report))
}

/// Resize to explicit pixel or physical dimensions, then optionally bring
/// the result under a byte budget.
pub fn resize_by_dimensions(
    source: &SourceImage,
    job: &ResizeJob,
    config: &SearchConfig,
) -> EngineResult<ModeOutput> {
    let (box_w, box_h) = resolve_dimension_target(&job.target)?;
    let (width, height) = match job.fit {
        Fit::Exact => (box_w, box_h),
        Fit::Inside => calc_inside_dimensions(source.width(), source.height(), box_w, box_h),
    };
    if let Some(max) = job.max_bytes {
        if max < MIN_TARGET_BYTES {
            return Err(SizeFitError::invalid_input("size budget is below the 1KB minimum"));
        }
    }
    let codec = RasterCodec::from_source(source, job.output)?;
    resize_by_dimensions_with(&codec, width, height, job.quality, job.max_bytes, config)
}

/// Resize with any codec. Aspect ratio is whatever the caller asked for.
pub fn resize_by_dimensions_with<C: Codec>(
    codec: &C,
    width: u32,
    height: u32,
    quality: f32,
    max_bytes: Option<u64>,
    config: &SearchConfig,
) -> EngineResult<ModeOutput> {
    let started = Instant::now();
    let mut diagnostics = SearchDiagnostics {
        phases: vec![EngineState::Idle, EngineState::Baselining],
        ..SearchDiagnostics::default()
    };
    let (w, h) = clamp_dimensions(width, height, config.min_dimension, config.max_dimension);
    if (w, h) != (width, height) {
        debug!(width, height, clamped_width = w, clamped_height = h, "resize target clamped");
    }
    let surface = codec.draw(w, h)?;
    let primary = codec.serialize(&surface, quality)?;
    diagnostics.encode_calls = 1;
    info!(width = w, height = h, bytes = primary.achieved_bytes, "resized");

    let Some(budget) = max_bytes else {
        let achieved = primary.achieved_bytes;
        diagnostics.phases.push(EngineState::Done);
        diagnostics.elapsed = started.elapsed();
        return Ok(ModeOutput {
            candidate: ScoredCandidate::score(primary, achieved, Provenance::Baseline),
            target_bytes: None,
            convergence: Convergence::Converged,
            diagnostics,
        });
    };

    let mut best = ScoredCandidate::score(primary, budget, Provenance::Baseline);
    diagnostics.baseline_bytes = Some(best.achieved_bytes());
    if codec.is_lossless() {
        debug!("lossless output; size budget pass skipped");
    } else if best.achieved_bytes() > budget {
        diagnostics.phases.push(EngineState::Refining);
        let outcome = fit_under_budget(codec, &surface, best, budget, &UnderBudgetParams::default());
        diagnostics.bisection_iterations = outcome.iterations;
        diagnostics.encode_calls += outcome.encode_calls;
        diagnostics.skipped = outcome.skipped.len();
        best = match outcome.best {
            Some(best) => best,
            None => {
                return Err(SizeFitError::search_exhausted(
                    outcome.encode_calls,
                    "no candidate fit the size budget",
                ))
            }
        };
    }

    let convergence = if best.achieved_bytes() <= budget {
        Convergence::Converged
    } else {
        Convergence::Shortfall {
            error_percent: best.error_percent,
        }
    };
    diagnostics.phases.push(EngineState::Done);
    diagnostics.elapsed = started.elapsed();
    Ok(ModeOutput {
        candidate: best,
        target_bytes: Some(budget),
        convergence,
        diagnostics,
    })
}

/// Grow a source towards a byte target larger than its current size.
pub fn enlarge_to_size(
    source: &SourceImage,
    job: &EnlargeJob,
    config: &SearchConfig,
) -> EngineResult<ModeOutput> {
    validate_enlarge_target(job.target_bytes, source.byte_len())?;
    let codec = RasterCodec::from_source(source, job.output)?;
    let request = SearchRequest::enlarge(job.target_bytes).with_source_len(source.byte_len());
    enlarge_to_size_with(&codec, &request, config)
}

pub fn enlarge_to_size_with<C: Codec>(
    codec: &C,
    request: &SearchRequest,
    config: &SearchConfig,
) -> EngineResult<ModeOutput> {
    let engine = SizeTargetingEngine::new(config.clone())?;
    let report = engine.run(codec, request)?;
    Ok(ModeOutput::from_report(report))
}
