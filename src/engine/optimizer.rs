// src/engine/optimizer.rs
//
// Precision optimizer: candidate ranking with the under-target tie-break,
// bounded quality bisection at a fixed pixel size, and the under-budget
// pass used after an explicit resize.

use crate::engine::codec::{Codec, Provenance, ScoredCandidate, SkippedCandidate};
use crate::engine::config::{SearchConfig, Tolerance};
use std::cmp::Ordering;
use tracing::{debug, warn};

/// Under-budget pass defaults.
pub const UNDER_BUDGET_MAX_ATTEMPTS: u32 = 10;
pub const UNDER_BUDGET_MIN_STEP: f32 = 0.05;

fn is_tied(a: &ScoredCandidate, b: &ScoredCandidate, tie_threshold: u64) -> bool {
    a.error == b.error || a.error.abs_diff(b.error) < tie_threshold
}

/// Ordering used inside a tie window: not-over-target first, then smaller
/// error. Equal keys keep insertion order (the caller compares by index).
fn tie_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    a.is_over_target()
        .cmp(&b.is_over_target())
        .then(a.error.cmp(&b.error))
}

/// Whether `challenger` should replace `incumbent` as the best-seen candidate.
pub fn is_better(challenger: &ScoredCandidate, incumbent: &ScoredCandidate, tie_threshold: u64) -> bool {
    if is_tied(challenger, incumbent, tie_threshold) {
        tie_order(challenger, incumbent) == Ordering::Less
    } else {
        challenger.error < incumbent.error
    }
}

/// Pick the best candidate: smallest absolute error, where errors closer than
/// `tie_threshold` bytes to the minimum are tied and an under-target
/// candidate beats an over-target one. Deterministic; `None` on empty input.
/// Provenance is ignored.
pub fn rank_candidates(candidates: &[ScoredCandidate], tie_threshold: u64) -> Option<&ScoredCandidate> {
    let min_error = candidates.iter().map(|c| c.error).min()?;
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.error == min_error || c.error - min_error < tie_threshold)
        .min_by(|(ia, a), (ib, b)| tie_order(a, b).then(ia.cmp(ib)))
        .map(|(_, c)| c)
}

#[derive(Clone, Debug, PartialEq)]
pub struct BisectionParams {
    pub min_quality: f32,
    pub max_quality: f32,
    /// Early-exit band.
    pub tolerance: Tolerance,
    pub min_step: f32,
    pub max_iterations: u32,
    pub tie_threshold: u64,
    pub provenance: Provenance,
}

impl BisectionParams {
    pub fn from_config(config: &SearchConfig, provenance: Provenance) -> Self {
        Self {
            min_quality: config.min_quality,
            max_quality: config.max_quality,
            tolerance: config.precise_tolerance,
            min_step: config.min_quality_step,
            max_iterations: config.max_bisection_iterations,
            tie_threshold: config.tie_threshold_bytes,
            provenance,
        }
    }
}

#[derive(Debug, Default)]
pub struct BisectionOutcome {
    pub best: Option<ScoredCandidate>,
    pub iterations: u32,
    pub encode_calls: u32,
    pub skipped: Vec<SkippedCandidate>,
}

/// Bisection over quality at `width x height`. Draws the surface once.
pub fn bisect_quality<C: Codec>(
    codec: &C,
    width: u32,
    height: u32,
    target_bytes: u64,
    params: &BisectionParams,
) -> BisectionOutcome {
    match codec.draw(width, height) {
        Ok(surface) => bisect_on_surface(codec, &surface, target_bytes, params),
        Err(error) => {
            warn!(width, height, %error, "bisection surface could not be drawn");
            BisectionOutcome {
                skipped: vec![SkippedCandidate {
                    width,
                    height,
                    quality: params.max_quality,
                    provenance: params.provenance,
                    error,
                }],
                ..BisectionOutcome::default()
            }
        }
    }
}

/// Bisection over quality on an already drawn surface.
///
/// Raises the lower bound when under target and lowers the upper bound
/// otherwise; an encode failure lowers the upper bound to the failing
/// quality. Tracks the best candidate over all iterations. Stops inside the
/// tolerance, when the interval is narrower than `min_step`, or at the
/// iteration cap.
pub fn bisect_on_surface<C: Codec>(
    codec: &C,
    surface: &C::Surface,
    target_bytes: u64,
    params: &BisectionParams,
) -> BisectionOutcome {
    let mut outcome = BisectionOutcome::default();
    let (width, height) = codec.surface_dimensions(surface);

    // Quality has no effect on lossless output.
    if codec.is_lossless() {
        outcome.iterations = 1;
        outcome.encode_calls = 1;
        match codec.serialize(surface, 1.0) {
            Ok(c) => {
                outcome.best = Some(ScoredCandidate::score(c, target_bytes, params.provenance));
            }
            Err(error) => outcome.skipped.push(SkippedCandidate {
                width,
                height,
                quality: 1.0,
                provenance: params.provenance,
                error,
            }),
        }
        return outcome;
    }

    let mut lo = params.min_quality;
    let mut hi = params.max_quality;

    while outcome.iterations < params.max_iterations && hi - lo >= params.min_step {
        let quality = (lo + hi) / 2.0;
        outcome.iterations += 1;
        outcome.encode_calls += 1;

        match codec.serialize(surface, quality) {
            Ok(candidate) => {
                let scored = ScoredCandidate::score(candidate, target_bytes, params.provenance);
                debug!(
                    iteration = outcome.iterations,
                    width,
                    height,
                    quality,
                    bytes = scored.achieved_bytes(),
                    error_percent = scored.error_percent,
                    "bisection step"
                );
                if scored.achieved_bytes() < target_bytes {
                    lo = quality;
                } else {
                    hi = quality;
                }
                let converged = params.tolerance.allows(scored.achieved_bytes(), target_bytes);
                let replace = outcome
                    .best
                    .as_ref()
                    .map_or(true, |best| is_better(&scored, best, params.tie_threshold));
                if replace {
                    outcome.best = Some(scored);
                }
                if converged {
                    break;
                }
            }
            Err(error) => {
                warn!(width, height, quality, %error, "bisection encode failed; lowering ceiling");
                hi = quality;
                outcome.skipped.push(SkippedCandidate {
                    width,
                    height,
                    quality,
                    provenance: params.provenance,
                    error,
                });
            }
        }
    }

    outcome
}

#[derive(Clone, Debug, PartialEq)]
pub struct UnderBudgetParams {
    pub min_quality: f32,
    pub max_attempts: u32,
    pub min_step: f32,
}

impl Default for UnderBudgetParams {
    fn default() -> Self {
        Self {
            min_quality: 0.1,
            max_attempts: UNDER_BUDGET_MAX_ATTEMPTS,
            min_step: UNDER_BUDGET_MIN_STEP,
        }
    }
}

/// Bring a fixed-size result under a byte budget by lowering quality.
///
/// Returns `initial` unchanged when it already fits. Otherwise bisects over
/// `[min_quality, initial.quality]` and keeps the largest candidate that
/// fits; when nothing fits, the smallest candidate seen is returned.
pub fn fit_under_budget<C: Codec>(
    codec: &C,
    surface: &C::Surface,
    initial: ScoredCandidate,
    target_bytes: u64,
    params: &UnderBudgetParams,
) -> BisectionOutcome {
    let mut outcome = BisectionOutcome::default();
    if initial.achieved_bytes() <= target_bytes || codec.is_lossless() {
        outcome.best = Some(initial);
        return outcome;
    }

    let (width, height) = codec.surface_dimensions(surface);
    let mut lo = params.min_quality;
    let mut hi = initial.candidate.quality;
    let mut fitting: Option<ScoredCandidate> = None;
    let mut smallest = initial;

    while outcome.iterations < params.max_attempts && hi - lo >= params.min_step {
        let quality = (lo + hi) / 2.0;
        outcome.iterations += 1;
        outcome.encode_calls += 1;
        match codec.serialize(surface, quality) {
            Ok(candidate) => {
                let scored = ScoredCandidate::score(candidate, target_bytes, Provenance::Bisection);
                debug!(
                    attempt = outcome.iterations,
                    quality,
                    bytes = scored.achieved_bytes(),
                    "under-budget step"
                );
                if scored.achieved_bytes() <= target_bytes {
                    lo = quality;
                    let larger = fitting
                        .as_ref()
                        .map_or(true, |f| scored.achieved_bytes() > f.achieved_bytes());
                    if larger {
                        fitting = Some(scored);
                    }
                } else {
                    hi = quality;
                    if scored.achieved_bytes() < smallest.achieved_bytes() {
                        smallest = scored;
                    }
                }
            }
            Err(error) => {
                hi = quality;
                outcome.skipped.push(SkippedCandidate {
                    width,
                    height,
                    quality,
                    provenance: Provenance::Bisection,
                    error,
                });
            }
        }
    }

    outcome.best = Some(fitting.unwrap_or(smallest));
    outcome
}
