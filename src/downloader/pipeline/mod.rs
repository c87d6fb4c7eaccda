// Request pipelines
//
// Both pipelines share the shape
// Extract -> Select/Fetch -> Transcode/Merge -> Embed -> Cleanup -> Done.
// Any `Err` aborts the request; the per-request workspace is removed when it
// goes out of scope, taking every intermediate file with it.

pub mod music;
pub mod video;

use std::path::Path;
use std::sync::Arc;

use super::config::DownloaderConfig;
use super::errors::DownloadError;
use super::models::ProbeResult;
use super::traits::{HttpFetcher, MediaTranscoder, StageReporter, StreamExtractor, StreamMerger};

/// `DownloadResult.filename`: the file's name inside the destination folder
fn output_name(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}

/// Collaborators a pipeline drives
#[derive(Clone)]
pub struct Collaborators {
    pub extractor: Arc<dyn StreamExtractor>,
    pub merger: Arc<dyn StreamMerger>,
    pub transcoder: Arc<dyn MediaTranscoder>,
    pub http: Arc<dyn HttpFetcher>,
}

/// Everything one request needs, borrowed for its duration
pub struct PipelineContext<'a> {
    pub collaborators: &'a Collaborators,
    pub config: &'a DownloaderConfig,
    pub reporter: &'a StageReporter,
    warnings: Vec<String>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        collaborators: &'a Collaborators,
        config: &'a DownloaderConfig,
        reporter: &'a StageReporter,
    ) -> Self {
        Self {
            collaborators,
            config,
            reporter,
            warnings: Vec::new(),
        }
    }

    /// Record a non-fatal problem
    pub fn warn(&mut self, message: String) {
        tracing::warn!(%message, "absorbed failure");
        self.reporter.warning(&message);
        self.warnings.push(message);
    }

    /// Absorb metadata failures unless strict mode is on.
    /// Returns whether the operation succeeded.
    pub fn absorb(&mut self, result: Result<(), DownloadError>) -> Result<bool, DownloadError> {
        match result {
            Ok(()) => Ok(true),
            Err(e) if e.is_absorbable() && !self.config.strict_metadata => {
                self.warn(e.to_string());
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Probe and reject items without any downloadable format
    async fn probe(&self, url: &str) -> Result<ProbeResult, DownloadError> {
        let probe = self.collaborators.extractor.probe(url).await?;
        if probe.formats.is_empty() {
            return Err(DownloadError::ExtractionFailed(format!(
                "{} returned no downloadable formats for {}",
                self.collaborators.extractor.name(),
                url
            )));
        }
        Ok(probe)
    }
}
