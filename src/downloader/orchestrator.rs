// Downloader facade
//
// The two public operations never return `Err`: every failure becomes a
// `DownloadResult` with `success == false` and the root cause as message.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::backends::FfmpegCli;
use super::config::DownloaderConfig;
use super::errors::DownloadError;
use super::extractors::YtDlpExtractor;
use super::http::ReqwestFetcher;
use super::models::{DownloadEvent, DownloadRequest, DownloadResult};
use super::pipeline::{music, video, Collaborators, PipelineContext};
use super::tools::{ToolManager, ToolType};
use super::traits::{StageReporter, StreamMerger};

pub struct Downloader {
    collaborators: Collaborators,
    config: Arc<DownloaderConfig>,
}

impl Downloader {
    /// Production collaborators: yt-dlp, ffmpeg and reqwest
    pub fn new(config: DownloaderConfig) -> Result<Self, DownloadError> {
        let tools = ToolManager::new();
        let ytdlp = tools.resolve(ToolType::YtDlp, config.ytdlp_path.as_deref());
        let ffmpeg = tools.resolve(ToolType::Ffmpeg, config.ffmpeg_path.as_deref());
        tracing::debug!(%ytdlp, %ffmpeg, "resolved tools");

        let ffmpeg = Arc::new(FfmpegCli::new(ffmpeg, config.ffmpeg_timeout_seconds));
        let http = ReqwestFetcher::new(config.http_timeout_seconds, config.extractor.proxy.as_deref())?;

        let collaborators = Collaborators {
            extractor: Arc::new(YtDlpExtractor::new(ytdlp, config.extractor.clone())),
            merger: default_merger(ffmpeg.clone()),
            transcoder: ffmpeg,
            http: Arc::new(http),
        };
        Ok(Self::with_collaborators(collaborators, config))
    }

    pub fn with_collaborators(collaborators: Collaborators, config: DownloaderConfig) -> Self {
        Self {
            collaborators,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Best audio track into `destination`, optionally converted to MP3
    pub async fn download_audio(&self, url: &str, destination: &Path, convert_to_mp3: bool) -> DownloadResult {
        let request = DownloadRequest::Audio {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            convert_to_mp3,
        };
        execute(&self.collaborators, &self.config, &request, &StageReporter::silent()).await
    }

    /// Best video + best audio merged into one file in `destination`
    pub async fn download_video(&self, url: &str, destination: &Path) -> DownloadResult {
        let request = DownloadRequest::Video {
            url: url.to_string(),
            destination: destination.to_path_buf(),
        };
        execute(&self.collaborators, &self.config, &request, &StageReporter::silent()).await
    }

    /// Run one request on its own task, reporting progress over a channel
    pub fn spawn(&self, request: DownloadRequest) -> DownloadTask {
        let (tx, rx) = mpsc::unbounded_channel();
        let collaborators = self.collaborators.clone();
        let config = self.config.clone();

        let span = tracing::info_span!("download", kind = request.kind(), url = %request.url());
        let handle = tokio::spawn(
            async move {
                let reporter = StageReporter::new(tx);
                let result = execute(&collaborators, &config, &request, &reporter).await;
                reporter.emit(DownloadEvent::Finished(result.clone()));
                result
            }
            .instrument(span),
        );

        DownloadTask { events: rx, handle }
    }
}

#[cfg(feature = "ffmpeg-native")]
fn default_merger(ffmpeg: Arc<FfmpegCli>) -> Arc<dyn StreamMerger> {
    use super::backends::FfmpegContainers;
    use super::remux::PacketRemuxer;

    match FfmpegContainers::new() {
        Ok(containers) => Arc::new(PacketRemuxer::new(containers)),
        Err(e) => {
            tracing::warn!(error = %e, "libav unavailable, merging with the ffmpeg binary");
            ffmpeg
        }
    }
}

#[cfg(not(feature = "ffmpeg-native"))]
fn default_merger(ffmpeg: Arc<FfmpegCli>) -> Arc<dyn StreamMerger> {
    ffmpeg
}

async fn execute(
    collaborators: &Collaborators,
    config: &DownloaderConfig,
    request: &DownloadRequest,
    reporter: &StageReporter,
) -> DownloadResult {
    let mut ctx = PipelineContext::new(collaborators, config, reporter);

    let outcome = match request {
        DownloadRequest::Audio {
            url,
            destination,
            convert_to_mp3,
        } => music::run(&mut ctx, url, destination, *convert_to_mp3).await,
        DownloadRequest::Video { url, destination } => video::run(&mut ctx, url, destination).await,
    };

    match outcome {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(url = request.url(), error = %e, "download failed");
            let mut result = DownloadResult::failure(&e);
            result.warnings = ctx.take_warnings();
            result
        }
    }
}

/// Handle to a spawned request
pub struct DownloadTask {
    events: UnboundedReceiver<DownloadEvent>,
    handle: JoinHandle<DownloadResult>,
}

impl DownloadTask {
    /// Next progress event; `None` once the task has finished and the
    /// channel is drained
    pub async fn next_event(&mut self) -> Option<DownloadEvent> {
        self.events.recv().await
    }

    /// Stop the request. Its workspace and child processes are dropped.
    pub fn abort(&self) {
        self.handle.abort();
    }

    pub async fn join(self) -> DownloadResult {
        match self.handle.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => DownloadResult::failure(&DownloadError::Cancelled),
            Err(e) => DownloadResult::failure(&DownloadError::ExtractionFailed(format!(
                "download task panicked: {}",
                e
            ))),
        }
    }
}
