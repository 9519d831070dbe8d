// src/engine/codec.rs
//
// Codec adapter: draw a source at a pixel size, serialize at a quality, report bytes.
// Also the candidate types the search produces and the pool they are collected in.

use crate::engine::common::{abs_error, error_percent, relative_error, EngineResult};
use crate::engine::encoder::{self, clamp_quality};
use crate::engine::io::SourceImage;
use crate::engine::surface::RasterSurface;
use crate::error::SizeFitError;
use crate::ops::{EncodeFormat, OutputFormat};
use image::DynamicImage;
use std::fmt;
use std::sync::Arc;

/// Which search phase produced a candidate. Informational only; never used for ranking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Provenance {
    Baseline,
    Grid,
    Bisection,
    Refinement,
    Prediction,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Baseline => "baseline",
            Provenance::Grid => "grid",
            Provenance::Bisection => "bisection",
            Provenance::Refinement => "refinement",
            Provenance::Prediction => "prediction",
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one codec invocation.
#[derive(Clone, Debug, PartialEq)]
pub struct CompressionCandidate {
    /// Encoded output. May be released by a [`CandidatePool`] once the
    /// candidate can no longer win; `achieved_bytes` is kept regardless.
    pub bytes: Vec<u8>,
    pub achieved_bytes: u64,
    pub width: u32,
    pub height: u32,
    /// Quality actually used, after clamping. Always 1.0 for lossless formats.
    pub quality: f32,
    pub format: EncodeFormat,
}

impl CompressionCandidate {
    pub fn new(bytes: Vec<u8>, width: u32, height: u32, quality: f32, format: EncodeFormat) -> Self {
        Self {
            achieved_bytes: bytes.len() as u64,
            bytes,
            width,
            height,
            quality,
            format,
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// A candidate measured against a target.
///
/// `error == |achieved_bytes - target|`, `error_percent == error / target * 100`.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredCandidate {
    pub candidate: CompressionCandidate,
    pub error: u64,
    pub error_percent: f64,
    /// Signed; negative when under target.
    pub relative_error: f64,
    pub provenance: Provenance,
}

impl ScoredCandidate {
    pub fn score(candidate: CompressionCandidate, target_bytes: u64, provenance: Provenance) -> Self {
        let achieved = candidate.achieved_bytes;
        Self {
            error: abs_error(achieved, target_bytes),
            error_percent: error_percent(achieved, target_bytes),
            relative_error: relative_error(achieved, target_bytes),
            candidate,
            provenance,
        }
    }

    pub fn achieved_bytes(&self) -> u64 {
        self.candidate.achieved_bytes
    }

    pub fn is_under_target(&self) -> bool {
        self.relative_error < 0.0
    }

    pub fn is_over_target(&self) -> bool {
        self.relative_error > 0.0
    }

    /// Re-measure against another target (e.g. reuse a baseline for a grid point).
    pub fn rescore(&self, target_bytes: u64, provenance: Provenance) -> Self {
        Self::score(self.candidate.clone(), target_bytes, provenance)
    }
}

/// Explicit marker for an encode that failed and was skipped.
#[derive(Debug)]
pub struct SkippedCandidate {
    pub width: u32,
    pub height: u32,
    pub quality: f32,
    pub provenance: Provenance,
    pub error: SizeFitError,
}

/// One entry of the candidate pool: a measured candidate or a skip marker.
pub type Attempt = std::result::Result<ScoredCandidate, SkippedCandidate>;

/// Host codec seam.
///
/// `draw` is the expensive part (rasterizing at a pixel size); `write` is a
/// cheap re-serialization of an existing surface. Callers trying several
/// qualities at one size draw once and serialize repeatedly.
pub trait Codec {
    type Surface;

    fn source_dimensions(&self) -> (u32, u32);

    fn format(&self) -> EncodeFormat;

    fn is_lossless(&self) -> bool {
        self.format().is_lossless()
    }

    fn draw(&self, width: u32, height: u32) -> EngineResult<Self::Surface>;

    fn surface_dimensions(&self, surface: &Self::Surface) -> (u32, u32);

    /// Serialize a surface. `quality` is already clamped.
    fn write(&self, surface: &Self::Surface, quality: f32) -> EngineResult<Vec<u8>>;

    /// A codec over a downscaled copy of the source, used by preprocessing.
    fn downscale(&self, width: u32, height: u32) -> EngineResult<Self>
    where
        Self: Sized;

    /// Serialize with the adapter contract applied: quality clamped to
    /// `[0.01, 1.0]`, reported as 1.0 for lossless formats, empty output rejected.
    fn serialize(&self, surface: &Self::Surface, quality: f32) -> EngineResult<CompressionCandidate> {
        let quality = if self.is_lossless() {
            1.0
        } else {
            clamp_quality(quality)
        };
        let (width, height) = self.surface_dimensions(surface);
        let bytes = self.write(surface, quality)?;
        if bytes.is_empty() {
            return Err(SizeFitError::encode_failed(
                self.format().as_str(),
                "codec produced no output",
            ));
        }
        Ok(CompressionCandidate::new(
            bytes,
            width,
            height,
            quality,
            self.format(),
        ))
    }

    /// Draw and serialize in one step.
    fn encode(&self, width: u32, height: u32, quality: f32) -> EngineResult<CompressionCandidate> {
        if width == 0 || height == 0 {
            return Err(SizeFitError::invalid_argument(
                "dimensions",
                format!("{width}x{height}"),
                "width and height must be positive",
            ));
        }
        let surface = self.draw(width, height)?;
        self.serialize(&surface, quality)
    }
}

/// Production codec over a decoded raster.
#[derive(Clone, Debug)]
pub struct RasterCodec {
    source: Arc<DynamicImage>,
    format: EncodeFormat,
}

impl RasterCodec {
    pub fn new(image: DynamicImage, format: EncodeFormat) -> Self {
        Self {
            source: Arc::new(image),
            format,
        }
    }

    /// Decode a source image and resolve the output format against its MIME type.
    pub fn from_source(source: &SourceImage, output: OutputFormat) -> EngineResult<Self> {
        let image = source.decode()?;
        Ok(Self::new(image, output.resolve(source.mime())))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.source
    }
}

impl Codec for RasterCodec {
    type Surface = RasterSurface;

    fn source_dimensions(&self) -> (u32, u32) {
        (self.source.width(), self.source.height())
    }

    fn format(&self) -> EncodeFormat {
        self.format
    }

    fn draw(&self, width: u32, height: u32) -> EngineResult<RasterSurface> {
        RasterSurface::draw(&self.source, width, height)
    }

    fn surface_dimensions(&self, surface: &RasterSurface) -> (u32, u32) {
        surface.dimensions()
    }

    fn write(&self, surface: &RasterSurface, quality: f32) -> EngineResult<Vec<u8>> {
        encoder::encode(surface, self.format, quality)
    }

    fn downscale(&self, width: u32, height: u32) -> EngineResult<Self> {
        let surface = self.draw(width, height)?;
        Ok(Self {
            source: Arc::new(surface.into_image()),
            format: self.format,
        })
    }
}

/// Candidates collected during one engine run, with skip markers kept apart.
///
/// Encoded bytes of candidates that can no longer win (error beyond the best
/// error plus the tie threshold) are released as the pool grows; the best
/// error only decreases, so released entries never become eligible again.
#[derive(Debug)]
pub struct CandidatePool {
    target_bytes: u64,
    tie_threshold: u64,
    scored: Vec<ScoredCandidate>,
    skipped: Vec<SkippedCandidate>,
    best_error: Option<u64>,
}

impl CandidatePool {
    pub fn new(target_bytes: u64, tie_threshold: u64) -> Self {
        Self {
            target_bytes,
            tie_threshold,
            scored: Vec::new(),
            skipped: Vec::new(),
            best_error: None,
        }
    }

    pub fn target_bytes(&self) -> u64 {
        self.target_bytes
    }

    pub fn record(&mut self, attempt: Attempt) {
        match attempt {
            Ok(scored) => self.push(scored),
            Err(skip) => self.skipped.push(skip),
        }
    }

    fn push(&mut self, scored: ScoredCandidate) {
        let error = scored.error;
        let improved = self.best_error.map_or(true, |best| error < best);
        self.scored.push(scored);
        if improved {
            self.best_error = Some(error);
            let cutoff = error.saturating_add(self.tie_threshold);
            for entry in self.scored.iter_mut().filter(|c| c.error > cutoff) {
                if !entry.candidate.bytes.is_empty() {
                    entry.candidate.bytes = Vec::new();
                }
            }
        } else if let Some(best) = self.best_error {
            if error > best.saturating_add(self.tie_threshold) {
                if let Some(last) = self.scored.last_mut() {
                    last.candidate.bytes = Vec::new();
                }
            }
        }
    }

    /// Successful candidates, in insertion order.
    pub fn candidates(&self) -> &[ScoredCandidate] {
        &self.scored
    }

    pub fn skipped(&self) -> &[SkippedCandidate] {
        &self.skipped
    }

    pub fn len(&self) -> usize {
        self.scored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scored.is_empty()
    }

    pub fn attempts(&self) -> usize {
        self.scored.len() + self.skipped.len()
    }

    pub fn last_skip_error(&self) -> Option<&SizeFitError> {
        self.skipped.last().map(|s| &s.error)
    }
}
