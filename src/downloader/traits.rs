// Collaborator seams used by the pipelines

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;

use super::config::ConversionProfile;
use super::errors::DownloadError;
use super::models::{DownloadEvent, PipelineStage, ProbeResult};
use super::remux::RemuxStats;

/// Resolves URLs into stream descriptors and fetches single descriptors
#[async_trait]
pub trait StreamExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Describe the media item behind `url`
    async fn probe(&self, url: &str) -> Result<ProbeResult, DownloadError>;

    /// Download one descriptor. `destination_template` ends in `.%(ext)s`;
    /// returns the path of the written file.
    async fn fetch(
        &self,
        url: &str,
        format_id: &str,
        destination_template: &Path,
    ) -> Result<PathBuf, DownloadError>;
}

/// Combines one video-only and one audio-only file by copying packets
#[async_trait]
pub trait StreamMerger: Send + Sync {
    fn name(&self) -> &'static str;

    /// Returns packet statistics when the backend can observe them
    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<Option<RemuxStats>, DownloadError>;
}

/// Which streams must be re-encoded to fit the output container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Reencode {
    pub video: bool,
    pub audio: bool,
}

impl Reencode {
    pub fn any(&self) -> bool {
        self.video || self.audio
    }
}

/// Re-encoding operations delegated to an external codec implementation
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Convert the first audio stream of `input` to compressed audio
    async fn convert_audio(
        &self,
        input: &Path,
        output: &Path,
        profile: &ConversionProfile,
    ) -> Result<(), DownloadError>;

    /// Merge like `StreamMerger`, re-encoding the flagged streams
    async fn merge_reencode(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        reencode: Reencode,
    ) -> Result<(), DownloadError>;
}

/// Plain HTTP GET for thumbnails and caption tracks
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError>;

    async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        let bytes = self.get_bytes(url).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Stage/warning emitter for one request
#[derive(Clone, Default)]
pub struct StageReporter {
    sender: Option<UnboundedSender<DownloadEvent>>,
}

impl StageReporter {
    pub fn new(sender: UnboundedSender<DownloadEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// Reporter that drops every event
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn stage(&self, stage: PipelineStage) {
        tracing::debug!(%stage, "pipeline stage");
        self.emit(DownloadEvent::Stage(stage));
    }

    pub fn warning(&self, message: &str) {
        self.emit(DownloadEvent::Warning(message.to_string()));
    }

    pub fn emit(&self, event: DownloadEvent) {
        if let Some(sender) = &self.sender {
            // receiver gone means nobody is watching any more
            let _ = sender.send(event);
        }
    }
}
