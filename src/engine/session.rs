// src/engine/session.rs
//
// Owned per-user session state: uploaded images, the active selection and the
// results produced so far. Passed explicitly into each run; the engine itself
// keeps nothing between calls.

use crate::engine::batch::{process_batch_with, BatchReport};
use crate::engine::common::EngineResult;
use crate::engine::config::SearchConfig;
use crate::engine::io::SourceImage;
use crate::engine::modes::{Job, ModeOutput};
use crate::error::SizeFitError;
use tracing::debug;

#[derive(Clone, Debug)]
pub struct SessionImage {
    pub id: u64,
    pub name: String,
    pub source: SourceImage,
}

#[derive(Clone, Debug)]
pub struct SessionResult {
    pub image_id: u64,
    pub job: &'static str,
    pub output: ModeOutput,
}

#[derive(Debug, Default)]
pub struct ImageSession {
    config: SearchConfig,
    images: Vec<SessionImage>,
    active: Option<usize>,
    next_id: u64,
    results: Vec<SessionResult>,
}

impl ImageSession {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Add an image; the first image added becomes active.
    pub fn add(&mut self, name: impl Into<String>, source: SourceImage) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.images.push(SessionImage {
            id,
            name: name.into(),
            source,
        });
        if self.active.is_none() {
            self.active = Some(self.images.len() - 1);
        }
        debug!(id, count = self.images.len(), "image added to session");
        id
    }

    /// Remove an image. The selection moves to the neighbour that takes its
    /// place, or is cleared when the session becomes empty.
    pub fn remove(&mut self, id: u64) -> Option<SessionImage> {
        let pos = self.position(id)?;
        let removed = self.images.remove(pos);
        self.active = match self.active {
            _ if self.images.is_empty() => None,
            Some(active) if active > pos => Some(active - 1),
            Some(active) if active == pos => Some(pos.min(self.images.len() - 1)),
            other => other,
        };
        Some(removed)
    }

    pub fn select(&mut self, id: u64) -> EngineResult<()> {
        let pos = self.position(id).ok_or_else(|| {
            SizeFitError::invalid_argument("image_id", id.to_string(), "no such image in session")
        })?;
        self.active = Some(pos);
        Ok(())
    }

    pub fn active(&self) -> Option<&SessionImage> {
        self.active.and_then(|i| self.images.get(i))
    }

    pub fn images(&self) -> &[SessionImage] {
        &self.images
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Results in the order they were produced. Never shrinks.
    pub fn results(&self) -> &[SessionResult] {
        &self.results
    }

    /// Run a job on the active image and keep the result.
    pub fn run_job(&mut self, job: &Job) -> EngineResult<&SessionResult> {
        let image = self
            .active()
            .ok_or_else(|| SizeFitError::invalid_input("no image selected"))?;
        let image_id = image.id;
        let output = job.run(&image.source, &self.config)?;
        self.results.push(SessionResult {
            image_id,
            job: job.name(),
            output,
        });
        self.results
            .last()
            .ok_or_else(|| SizeFitError::internal_panic("result list empty after push"))
    }

    /// Run a job over every image in order; successes are kept as results.
    pub fn run_all(&mut self, job: &Job) -> BatchReport {
        let config = &self.config;
        let report = process_batch_with(self.images.iter(), |_, image| {
            job.run(&image.source, config)
        });
        for outcome in &report.outcomes {
            if let (Ok(output), Some(image)) = (&outcome.result, self.images.get(outcome.index)) {
                self.results.push(SessionResult {
                    image_id: image.id,
                    job: job.name(),
                    output: output.clone(),
                });
            }
        }
        report
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.images.iter().position(|img| img.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy() -> SourceImage {
        SourceImage::new(vec![0; 16], 4, 4, "image/jpeg")
    }

    #[test]
    fn test_first_image_becomes_active() {
        let mut session = ImageSession::default();
        assert!(session.active().is_none());
        let a = session.add("a.jpg", dummy());
        session.add("b.jpg", dummy());
        assert_eq!(session.active().unwrap().id, a);
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_select_and_remove() {
        let mut session = ImageSession::default();
        let a = session.add("a", dummy());
        let b = session.add("b", dummy());
        let c = session.add("c", dummy());

        session.select(c).unwrap();
        assert_eq!(session.active().unwrap().id, c);

        session.remove(a).unwrap();
        assert_eq!(session.active().unwrap().id, c);

        session.remove(c).unwrap();
        assert_eq!(session.active().unwrap().id, b);

        session.remove(b).unwrap();
        assert!(session.active().is_none());
        assert!(session.is_empty());
        assert!(session.remove(b).is_none());
    }

    #[test]
    fn test_select_unknown_id() {
        let mut session = ImageSession::default();
        assert!(session.select(42).is_err());
    }

    #[test]
    fn test_run_job_without_selection() {
        let mut session = ImageSession::default();
        let job = Job::Compress(crate::engine::modes::CompressJob::from_bytes(4096));
        assert!(matches!(
            session.run_job(&job),
            Err(SizeFitError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_failed_run_keeps_results_unchanged() {
        let mut session = ImageSession::default();
        session.add("broken", dummy());
        let job = Job::Compress(crate::engine::modes::CompressJob::from_bytes(4096));
        let report = session.run_all(&job);
        assert_eq!(report.failure_count(), 1);
        assert!(session.results().is_empty());
    }
}
