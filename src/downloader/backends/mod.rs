// Media tool backends

pub mod ffmpeg;
#[cfg(feature = "ffmpeg-native")]
pub mod native;

pub use ffmpeg::FfmpegCli;
#[cfg(feature = "ffmpeg-native")]
pub use native::FfmpegContainers;
