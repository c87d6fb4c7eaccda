// Downloader module - stream selection, remuxing and tagging pipelines

pub mod backends;
pub mod config;
pub mod errors;
pub mod extractors;
pub mod format_selector;
pub mod http;
pub mod lyrics;
pub mod metadata;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod remux;
pub mod tools;
pub mod traits;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConversionProfile, DownloaderConfig, ExtractorConfig};
pub use errors::DownloadError;
pub use models::{DownloadEvent, DownloadRequest, DownloadResult, PipelineStage};
pub use orchestrator::{DownloadTask, Downloader};
pub use traits::{HttpFetcher, MediaTranscoder, StreamExtractor, StreamMerger};
