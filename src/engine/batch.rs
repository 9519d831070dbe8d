// src/engine/batch.rs
//
// Sequential batch processing with per-item outcomes.
// One image's full engine run finishes before the next starts; a failure
// is recorded against its index and the batch continues.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::config::SearchConfig;
use crate::engine::io::SourceImage;
use crate::engine::modes::{Job, ModeOutput};
use crate::error::{ErrorCategory, SizeFitError};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// One batch input, loaded lazily so a bad file fails only its own slot.
#[derive(Clone, Debug)]
pub enum BatchInput {
    Source(SourceImage),
    Bytes(Vec<u8>),
    Path(PathBuf),
}

impl BatchInput {
    pub fn load(self) -> EngineResult<SourceImage> {
        match self {
            BatchInput::Source(source) => Ok(source),
            BatchInput::Bytes(bytes) => SourceImage::from_bytes(bytes),
            BatchInput::Path(path) => SourceImage::open(path),
        }
    }
}

impl From<SourceImage> for BatchInput {
    fn from(source: SourceImage) -> Self {
        BatchInput::Source(source)
    }
}

impl From<Vec<u8>> for BatchInput {
    fn from(bytes: Vec<u8>) -> Self {
        BatchInput::Bytes(bytes)
    }
}

impl From<PathBuf> for BatchInput {
    fn from(path: PathBuf) -> Self {
        BatchInput::Path(path)
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    /// Position in the input sequence.
    pub index: usize,
    pub result: EngineResult<ModeOutput>,
}

impl BatchOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error_category(&self) -> Option<ErrorCategory> {
        self.result.as_ref().err().map(SizeFitError::category)
    }

    pub fn user_message(&self) -> String {
        let n = self.index + 1;
        match &self.result {
            Ok(output) => format!("image {n}: {}", output.user_message()),
            Err(err) => format!("image {n}: could not process this image: {err}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct BatchReport {
    /// In input order.
    pub outcomes: Vec<BatchOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|o| o.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &BatchOutcome> {
        self.outcomes.iter().filter(|o| !o.is_ok())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn user_messages(&self) -> Vec<String> {
        self.outcomes.iter().map(BatchOutcome::user_message).collect()
    }
}

/// Run `job` over every input, in order.
pub fn process_batch<I>(inputs: I, job: &Job, config: &SearchConfig) -> BatchReport
where
    I: IntoIterator,
    I::Item: Into<BatchInput>,
{
    process_batch_with(inputs, |_, input| {
        let source = input.into().load()?;
        job.run(&source, config)
    })
}

/// Sequential runner shared by [`process_batch`] and custom pipelines.
/// Panics inside `run` are converted to errors for that item.
pub fn process_batch_with<I, F>(inputs: I, mut run: F) -> BatchReport
where
    I: IntoIterator,
    F: FnMut(usize, I::Item) -> EngineResult<ModeOutput>,
{
    let started = Instant::now();
    let mut outcomes = Vec::new();
    for (index, item) in inputs.into_iter().enumerate() {
        let result = run_with_panic_policy("batch:item", || run(index, item));
        match &result {
            Ok(output) => info!(
                index,
                bytes = output.achieved_bytes(),
                converged = output.is_converged(),
                "batch item processed"
            ),
            Err(err) => warn!(index, error = %err, category = err.category().as_str(), "batch item failed"),
        }
        outcomes.push(BatchOutcome { index, result });
    }
    let report = BatchReport {
        outcomes,
        elapsed: started.elapsed(),
    };
    info!(
        total = report.len(),
        succeeded = report.success_count(),
        failed = report.failure_count(),
        "batch complete"
    );
    report
}
