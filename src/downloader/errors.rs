// Error types for the download pipelines

use super::extractors::diagnose_error;
use super::models::StreamKind;

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// Extractor returned no usable video or audio descriptors
    #[error("No usable {0} streams available")]
    NoStreamsAvailable(StreamKind),

    /// The extractor could not resolve or fetch the URL
    #[error("Extraction failed: {0}")]
    ExtractionFailed(String),

    /// Container creation or packet copy failed during remux
    #[error("Merge failed: {0}")]
    MergeFailed(String),

    /// Transcoding to the target audio format failed
    #[error("Conversion failed: {0}")]
    ConversionFailed(String),

    /// Tag or artwork write failed (absorbed unless strict metadata is on)
    #[error("Metadata embedding failed: {0}")]
    MetadataEmbedFailed(String),

    /// yt-dlp or ffmpeg not found in system
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Plain HTTP fetch (thumbnail, caption track) failed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// External process did not finish in time
    #[error("Timed out after {0}s")]
    Timeout(u64),

    /// The request's worker task was aborted
    #[error("Download cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Build an `ExtractionFailed` from yt-dlp stderr, prefixing the
    /// diagnosed reason when one is recognized.
    pub fn from_extractor_stderr(stderr: &str) -> Self {
        let details = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .take(3)
            .collect::<Vec<_>>()
            .join(" | ");

        let details = if details.is_empty() {
            "extractor exited without output".to_string()
        } else {
            details
        };

        match diagnose_error(stderr) {
            Some(reason) => Self::ExtractionFailed(format!("{} ({})", reason.description(), details)),
            None => Self::ExtractionFailed(details),
        }
    }

    /// Whether the pipeline may absorb this error and keep going
    pub fn is_absorbable(&self) -> bool {
        matches!(self, Self::MetadataEmbedFailed(_))
    }
}
