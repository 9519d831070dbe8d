// src/engine/targeting.rs
//
// Size-targeting engine: preprocessing guard, max-quality baseline, grid or
// bisection search, refinement. One call runs one request to completion; the
// engine holds no state between calls.

use crate::engine::codec::{
    Attempt, CandidatePool, Codec, Provenance, ScoredCandidate, SkippedCandidate,
};
use crate::engine::common::{clamp_dimensions, scale_dimensions, EngineResult};
use crate::engine::config::{SearchConfig, Tolerance};
use crate::engine::estimator::{generate_candidate_grid, GridShape};
use crate::engine::optimizer::{
    bisect_on_surface, bisect_quality, rank_candidates, BisectionOutcome, BisectionParams,
};
use crate::error::SizeFitError;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EngineState {
    Idle,
    Preprocessing,
    Baselining,
    Searching,
    Refining,
    Done,
    Failed,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::Preprocessing => "preprocessing",
            EngineState::Baselining => "baselining",
            EngineState::Searching => "searching",
            EngineState::Refining => "refining",
            EngineState::Done => "done",
            EngineState::Failed => "failed",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResolutionTarget {
    /// Resolution is a free search variable.
    #[default]
    Auto,
    /// Resolution is fixed; only quality is searched.
    Fixed { width: u32, height: u32 },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SearchDirection {
    #[default]
    Compress,
    /// Target exceeds the current size; the engine aims to grow the output.
    Enlarge,
}

/// Branch the engine took after the baseline. Diagnostic only.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    BaselineOnly,
    GridSearch,
    FixedBisection,
    EnlargeQuality,
    EnlargeNearBaseline,
    EnlargeScaleUp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchRequest {
    pub target_bytes: u64,
    pub resolution: ResolutionTarget,
    pub direction: SearchDirection,
    /// Encoded size of the source, consulted by the preprocessing guard.
    pub source_byte_len: u64,
}

impl SearchRequest {
    pub fn compress(target_bytes: u64) -> Self {
        Self {
            target_bytes,
            resolution: ResolutionTarget::Auto,
            direction: SearchDirection::Compress,
            source_byte_len: 0,
        }
    }

    pub fn enlarge(target_bytes: u64) -> Self {
        Self {
            direction: SearchDirection::Enlarge,
            ..Self::compress(target_bytes)
        }
    }

    pub fn with_fixed_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = ResolutionTarget::Fixed { width, height };
        self
    }

    pub fn with_source_len(mut self, byte_len: u64) -> Self {
        self.source_byte_len = byte_len;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Convergence {
    Converged,
    /// Caps were reached with the best candidate still outside tolerance.
    Shortfall { error_percent: f64 },
}

#[derive(Clone, Debug, Default)]
pub struct SearchDiagnostics {
    pub phases: Vec<EngineState>,
    pub strategy: Option<Strategy>,
    pub preprocessed_to: Option<(u32, u32)>,
    pub baseline_bytes: Option<u64>,
    pub processing_factor: Option<f64>,
    pub grid_evaluated: usize,
    pub bisection_iterations: u32,
    pub encode_calls: u32,
    pub skipped: usize,
    /// Percent band the result was judged against.
    pub tolerance_percent: f64,
    pub elapsed: Duration,
}

impl SearchDiagnostics {
    pub fn final_phase(&self) -> EngineState {
        self.phases.last().copied().unwrap_or(EngineState::Idle)
    }

    pub fn visited(&self, state: EngineState) -> bool {
        self.phases.contains(&state)
    }
}

#[derive(Clone, Debug)]
pub struct SearchReport {
    pub target_bytes: u64,
    pub best: ScoredCandidate,
    pub convergence: Convergence,
    pub diagnostics: SearchDiagnostics,
}

impl SearchReport {
    pub fn is_converged(&self) -> bool {
        matches!(self.convergence, Convergence::Converged)
    }

    /// The winning candidate, or `ConvergenceShortfall` when it missed tolerance.
    pub fn require_converged(self) -> EngineResult<ScoredCandidate> {
        match self.convergence {
            Convergence::Converged => Ok(self.best),
            Convergence::Shortfall { error_percent } => Err(SizeFitError::convergence_shortfall(
                self.best.achieved_bytes(),
                self.target_bytes,
                error_percent,
            )),
        }
    }

    pub fn into_candidate(self) -> ScoredCandidate {
        self.best
    }
}

#[derive(Clone, Debug, Default)]
pub struct SizeTargetingEngine {
    config: SearchConfig,
}

impl SizeTargetingEngine {
    pub fn new(config: SearchConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    #[instrument(
        skip_all,
        fields(target_bytes = request.target_bytes, direction = ?request.direction)
    )]
    pub fn run<C: Codec>(&self, codec: &C, request: &SearchRequest) -> EngineResult<SearchReport> {
        if request.target_bytes == 0 {
            return Err(SizeFitError::invalid_input("target size must be positive"));
        }
        if let ResolutionTarget::Fixed { width, height } = request.resolution {
            if width == 0 || height == 0 {
                return Err(SizeFitError::invalid_argument(
                    "resolution",
                    format!("{width}x{height}"),
                    "fixed resolution must be positive",
                ));
            }
        }

        let mut run = Run::new(&self.config, request);
        let downscaled = run.preprocess(codec);
        let result = match downscaled.as_ref() {
            Some(small) => run.execute(small),
            None => run.execute(codec),
        };
        run.finish(result)
    }
}

/// Request-scoped state of one engine run.
struct Run<'a> {
    config: &'a SearchConfig,
    request: &'a SearchRequest,
    pool: CandidatePool,
    diagnostics: SearchDiagnostics,
    started: Instant,
}

impl<'a> Run<'a> {
    fn new(config: &'a SearchConfig, request: &'a SearchRequest) -> Self {
        Self {
            config,
            request,
            pool: CandidatePool::new(request.target_bytes, config.tie_threshold_bytes),
            diagnostics: SearchDiagnostics {
                phases: vec![EngineState::Idle],
                tolerance_percent: config.tolerance.as_percent(request.target_bytes),
                ..SearchDiagnostics::default()
            },
            started: Instant::now(),
        }
    }

    fn enter(&mut self, state: EngineState) {
        debug!(state = state.as_str(), "engine transition");
        self.diagnostics.phases.push(state);
    }

    fn clamp(&self, width: u32, height: u32) -> (u32, u32) {
        clamp_dimensions(width, height, self.config.min_dimension, self.config.max_dimension)
    }

    fn target(&self) -> u64 {
        self.request.target_bytes
    }

    fn record_skip(&mut self, width: u32, height: u32, quality: f32, provenance: Provenance, error: SizeFitError) {
        warn!(width, height, quality, provenance = provenance.as_str(), %error, "candidate skipped");
        self.pool.record(Err(SkippedCandidate {
            width,
            height,
            quality,
            provenance,
            error,
        }));
    }

    fn absorb(&mut self, outcome: BisectionOutcome) -> Option<ScoredCandidate> {
        self.diagnostics.bisection_iterations += outcome.iterations;
        self.diagnostics.encode_calls += outcome.encode_calls;
        for skip in outcome.skipped {
            self.pool.record(Err(skip));
        }
        outcome.best
    }

    /// Oversized-input guard. Only auto-resolution compression is preprocessed;
    /// the pass is skipped entirely when the source is within bounds.
    fn preprocess<C: Codec>(&mut self, codec: &C) -> Option<C> {
        if self.request.resolution != ResolutionTarget::Auto
            || self.request.direction != SearchDirection::Compress
        {
            return None;
        }
        let (width, height) = codec.source_dimensions();
        let (w, h) = self
            .config
            .preprocess
            .plan(width, height, self.request.source_byte_len)?;
        self.enter(EngineState::Preprocessing);
        match codec.downscale(w, h) {
            Ok(small) => {
                info!(from_width = width, from_height = height, width = w, height = h, "oversized input downscaled");
                self.diagnostics.preprocessed_to = Some((w, h));
                Some(small)
            }
            Err(error) => {
                warn!(%error, "preprocessing downscale failed; continuing at full size");
                None
            }
        }
    }

    fn execute<C: Codec>(&mut self, codec: &C) -> EngineResult<()> {
        self.enter(EngineState::Baselining);
        let (width, height) = match self.request.resolution {
            ResolutionTarget::Auto => {
                let (w, h) = codec.source_dimensions();
                self.clamp(w, h)
            }
            ResolutionTarget::Fixed { width, height } => self.clamp(width, height),
        };

        let surface = match codec.draw(width, height) {
            Ok(surface) => Some(surface),
            Err(error) => {
                self.record_skip(width, height, 1.0, Provenance::Baseline, error);
                None
            }
        };
        let baseline = match surface.as_ref() {
            Some(surface) => {
                self.diagnostics.encode_calls += 1;
                match codec.serialize(surface, 1.0) {
                    Ok(c) => Some(ScoredCandidate::score(c, self.target(), Provenance::Baseline)),
                    Err(error) => {
                        self.record_skip(width, height, 1.0, Provenance::Baseline, error);
                        None
                    }
                }
            }
            None => None,
        };

        let factor = baseline
            .as_ref()
            .map(|b| self.target() as f64 / b.achieved_bytes().max(1) as f64);
        if let Some(b) = baseline.as_ref() {
            info!(width, height, bytes = b.achieved_bytes(), ?factor, "baseline established");
            self.diagnostics.baseline_bytes = Some(b.achieved_bytes());
            self.diagnostics.processing_factor = factor;
            self.pool.record(Ok(b.clone()));
        }

        match self.request.direction {
            SearchDirection::Compress => self.compress(codec, surface, baseline, factor),
            SearchDirection::Enlarge => self.enlarge(codec, surface, baseline, factor),
        }
        Ok(())
    }

    fn compress<C: Codec>(
        &mut self,
        codec: &C,
        surface: Option<C::Surface>,
        baseline: Option<ScoredCandidate>,
        factor: Option<f64>,
    ) {
        let fixed = self.request.resolution != ResolutionTarget::Auto;

        // Quality cannot raise output above the max-quality baseline, and a
        // lossless format at fixed size has nothing left to vary.
        if (fixed && codec.is_lossless()) || factor.is_some_and(|f| f >= 1.0) {
            info!(lossless = codec.is_lossless(), fixed, "baseline is the final candidate");
            self.diagnostics.strategy = Some(Strategy::BaselineOnly);
            return;
        }

        self.enter(EngineState::Searching);
        if fixed {
            self.diagnostics.strategy = Some(Strategy::FixedBisection);
            let params = BisectionParams::from_config(self.config, Provenance::Bisection);
            let outcome = match surface.as_ref() {
                Some(surface) => bisect_on_surface(codec, surface, self.target(), &params),
                None => {
                    let (w, h) = match self.request.resolution {
                        ResolutionTarget::Fixed { width, height } => self.clamp(width, height),
                        ResolutionTarget::Auto => codec.source_dimensions(),
                    };
                    bisect_quality(codec, w, h, self.target(), &params)
                }
            };
            if let Some(best) = self.absorb(outcome) {
                self.pool.record(Ok(best));
            }
            return;
        }

        self.diagnostics.strategy = Some(Strategy::GridSearch);
        self.grid_search(codec, surface, baseline.as_ref());
        self.refine(codec, Provenance::Refinement);
    }

    fn grid_search<C: Codec>(
        &mut self,
        codec: &C,
        baseline_surface: Option<C::Surface>,
        baseline: Option<&ScoredCandidate>,
    ) {
        let (width, height) = codec.source_dimensions();
        let shape = GridShape::for_config(self.config, codec.is_lossless());
        let grid = generate_candidate_grid(width, height, self.target(), &shape);
        let baseline_dims = baseline.map(|b| b.candidate.dimensions());

        // One surface per pixel size; the grid visits each size contiguously.
        let mut current: Option<((u32, u32), C::Surface)> =
            match (baseline_dims, baseline_surface) {
                (Some(dims), Some(surface)) => Some((dims, surface)),
                _ => None,
            };

        // Size whose draw failed; the rest of that row is not attempted.
        let mut dead_row: Option<(u32, u32)> = None;

        for point in grid {
            let (w, h) = self.clamp(point.width, point.height);
            if dead_row == Some((w, h)) {
                continue;
            }
            self.diagnostics.grid_evaluated += 1;

            let attempt: Attempt = match baseline {
                Some(b) if baseline_dims == Some((w, h)) && point.quality >= 1.0 => {
                    Ok(b.rescore(self.target(), Provenance::Grid))
                }
                _ => {
                    let surface = match current.take() {
                        Some((dims, surface)) if dims == (w, h) => surface,
                        _ => match codec.draw(w, h) {
                            Ok(surface) => surface,
                            Err(error) => {
                                self.record_skip(w, h, point.quality, Provenance::Grid, error);
                                dead_row = Some((w, h));
                                continue;
                            }
                        },
                    };
                    self.diagnostics.encode_calls += 1;
                    let attempt = codec
                        .serialize(&surface, point.quality)
                        .map(|c| ScoredCandidate::score(c, self.target(), Provenance::Grid))
                        .map_err(|error| SkippedCandidate {
                            width: w,
                            height: h,
                            quality: point.quality,
                            provenance: Provenance::Grid,
                            error,
                        });
                    current = Some(((w, h), surface));
                    attempt
                }
            };

            match attempt {
                Ok(scored) => {
                    debug!(
                        width = w,
                        height = h,
                        quality = point.quality,
                        bytes = scored.achieved_bytes(),
                        error_percent = scored.error_percent,
                        "grid candidate"
                    );
                    let hit = self.config.tolerance.allows(scored.achieved_bytes(), self.target());
                    self.pool.record(Ok(scored));
                    if hit {
                        info!(evaluated = self.diagnostics.grid_evaluated, "grid candidate within tolerance");
                        break;
                    }
                }
                Err(skip) => {
                    warn!(width = w, height = h, quality = point.quality, error = %skip.error, "grid encode failed");
                    self.pool.record(Err(skip));
                }
            }
        }
    }

    /// One bisection at the best candidate's size when it misses tolerance.
    /// The result replaces the incumbent only when its error is strictly lower.
    fn refine<C: Codec>(&mut self, codec: &C, provenance: Provenance) {
        let tolerance = self.tolerance();
        let Some(best) = rank_candidates(self.pool.candidates(), self.config.tie_threshold_bytes) else {
            return;
        };
        if tolerance.allows(best.achieved_bytes(), self.target()) || codec.is_lossless() {
            return;
        }
        let (w, h) = best.candidate.dimensions();
        let incumbent_error = best.error;

        self.enter(EngineState::Refining);
        let params = BisectionParams::from_config(self.config, provenance);
        let outcome = bisect_quality(codec, w, h, self.target(), &params);
        if let Some(refined) = self.absorb(outcome) {
            if refined.error < incumbent_error {
                info!(
                    width = w,
                    height = h,
                    quality = refined.candidate.quality,
                    error_percent = refined.error_percent,
                    "refinement improved result"
                );
                self.pool.record(Ok(refined));
            } else {
                debug!(error = refined.error, incumbent_error, "refinement did not improve; kept incumbent");
            }
        }
    }

    fn enlarge<C: Codec>(
        &mut self,
        codec: &C,
        surface: Option<C::Surface>,
        baseline: Option<ScoredCandidate>,
        factor: Option<f64>,
    ) {
        let config = self.config;
        let enlarge = &config.enlarge;
        let Some(factor) = factor else {
            // No baseline: nothing to derive a strategy from.
            return;
        };
        self.diagnostics.tolerance_percent = enlarge.accuracy_band(factor);
        self.enter(EngineState::Searching);

        if factor <= enlarge.quality_threshold {
            // Target at or under the max-quality size: plain quality search.
            self.diagnostics.strategy = Some(Strategy::EnlargeQuality);
            if let Some(surface) = surface.as_ref() {
                let params = BisectionParams::from_config(self.config, Provenance::Bisection);
                let outcome = bisect_on_surface(codec, surface, self.target(), &params);
                if let Some(best) = self.absorb(outcome) {
                    self.pool.record(Ok(best));
                }
            }
            return;
        }

        if let ResolutionTarget::Fixed { .. } = self.request.resolution {
            // Resolution is pinned; the max-quality baseline is the ceiling.
            self.diagnostics.strategy = Some(Strategy::BaselineOnly);
            return;
        }

        if factor <= enlarge.near_baseline_factor {
            self.diagnostics.strategy = Some(Strategy::EnlargeNearBaseline);
            let within = baseline
                .as_ref()
                .is_some_and(|b| self.tolerance().allows(b.achieved_bytes(), self.target()));
            if within {
                return;
            }
            debug!(factor, "max quality misses the band near baseline; scaling up");
        }

        self.diagnostics.strategy = Some(Strategy::EnlargeScaleUp);
        let (width, height) = codec.source_dimensions();
        let max = self.config.max_dimension as f64;
        let scale = enlarge
            .scale_for(factor)
            .min(max / width.max(1) as f64)
            .min(max / height.max(1) as f64);
        let (sw, sh) = scale_dimensions(width, height, scale);
        let (w, h) = self.clamp(sw, sh);
        info!(factor, scale, width = w, height = h, "enlarging resolution");

        self.diagnostics.encode_calls += 1;
        match codec.encode(w, h, enlarge.high_quality) {
            Ok(c) => {
                let scored = ScoredCandidate::score(c, self.target(), Provenance::Prediction);
                self.pool.record(Ok(scored));
            }
            Err(error) => self.record_skip(w, h, enlarge.high_quality, Provenance::Prediction, error),
        }
        self.refine(codec, Provenance::Refinement);
    }

    fn tolerance(&self) -> Tolerance {
        match self.request.direction {
            SearchDirection::Compress => self.config.tolerance,
            SearchDirection::Enlarge => Tolerance::Percent(self.diagnostics.tolerance_percent),
        }
    }

    fn finish(mut self, result: EngineResult<()>) -> EngineResult<SearchReport> {
        self.diagnostics.skipped = self.pool.skipped().len();
        self.diagnostics.elapsed = self.started.elapsed();

        if let Err(error) = result {
            self.enter(EngineState::Failed);
            return Err(error);
        }

        let tolerance = self.tolerance();
        let Some(best) = rank_candidates(self.pool.candidates(), self.config.tie_threshold_bytes).cloned()
        else {
            self.enter(EngineState::Failed);
            let last = self
                .pool
                .last_skip_error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no candidate was produced".to_string());
            warn!(attempts = self.pool.attempts(), %last, "every candidate failed");
            return Err(SizeFitError::search_exhausted(
                self.pool.attempts() as u32,
                last,
            ));
        };

        let convergence = if tolerance.allows(best.achieved_bytes(), self.target()) {
            Convergence::Converged
        } else {
            warn!(
                bytes = best.achieved_bytes(),
                target_bytes = self.target(),
                error_percent = best.error_percent,
                "search finished outside tolerance"
            );
            Convergence::Shortfall {
                error_percent: best.error_percent,
            }
        };

        self.enter(EngineState::Done);
        info!(
            width = best.candidate.width,
            height = best.candidate.height,
            quality = best.candidate.quality,
            bytes = best.achieved_bytes(),
            error_percent = best.error_percent,
            provenance = best.provenance.as_str(),
            "search complete"
        );
        Ok(SearchReport {
            target_bytes: self.target(),
            best,
            convergence,
            diagnostics: self.diagnostics,
        })
    }
}
