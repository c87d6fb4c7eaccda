pub mod downloader;

pub use downloader::{
    ConversionProfile, DownloadError, DownloadEvent, DownloadRequest, DownloadResult, DownloadTask,
    Downloader, DownloaderConfig, ExtractorConfig, PipelineStage,
};
