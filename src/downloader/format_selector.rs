// FormatSelector - picks the streams a request downloads
//
// Video requests: best video-only + best audio-only descriptor.
// Music requests: best audio track, preferring the tag-friendly M4A container.
//
// Ranking is pure and deterministic; ties keep the extractor's order.

use std::cmp::Ordering;

use super::errors::DownloadError;
use super::models::{SelectionResult, StreamDescriptor, StreamKind};

/// Container preferred for music downloads (native MP4 atom tags)
pub const PREFERRED_AUDIO_EXT: &str = "m4a";

pub struct FormatSelector;

impl FormatSelector {
    /// Choose one video and one audio descriptor.
    ///
    /// Video pool: video-only descriptors, else anything carrying video,
    /// ranked by height then total bitrate. Audio pool: audio-only
    /// descriptors, else anything carrying audio, ranked by average bitrate.
    pub fn select(formats: &[StreamDescriptor]) -> Result<SelectionResult, DownloadError> {
        let video = Self::best_video(formats)
            .ok_or(DownloadError::NoStreamsAvailable(StreamKind::Video))?;
        let audio = Self::best_audio(formats)
            .ok_or(DownloadError::NoStreamsAvailable(StreamKind::Audio))?;

        tracing::debug!(
            video = %video.format_id,
            audio = %audio.format_id,
            "selected streams"
        );

        Ok(SelectionResult {
            video: video.clone(),
            audio: audio.clone(),
        })
    }

    /// Audio descriptor for a music download:
    /// best audio-only M4A, else best audio-only, else best stream with audio
    pub fn select_music_track(formats: &[StreamDescriptor]) -> Result<StreamDescriptor, DownloadError> {
        let preferred: Vec<&StreamDescriptor> = formats
            .iter()
            .filter(|f| f.is_audio_only() && f.ext.eq_ignore_ascii_case(PREFERRED_AUDIO_EXT))
            .collect();

        Self::rank_audio(preferred)
            .or_else(|| Self::best_audio(formats))
            .cloned()
            .ok_or(DownloadError::NoStreamsAvailable(StreamKind::Audio))
    }

    fn best_video(formats: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
        let mut pool: Vec<&StreamDescriptor> = formats.iter().filter(|f| f.is_video_only()).collect();
        if pool.is_empty() {
            pool = formats.iter().filter(|f| f.has_video()).collect();
        }

        // stable sort, descending
        pool.sort_by(|a, b| {
            b.height
                .unwrap_or(0)
                .cmp(&a.height.unwrap_or(0))
                .then_with(|| cmp_bitrate(b.tbr, a.tbr))
        });
        pool.first().copied()
    }

    fn best_audio(formats: &[StreamDescriptor]) -> Option<&StreamDescriptor> {
        let mut pool: Vec<&StreamDescriptor> = formats.iter().filter(|f| f.is_audio_only()).collect();
        if pool.is_empty() {
            pool = formats.iter().filter(|f| f.has_audio()).collect();
        }
        Self::rank_audio(pool)
    }

    fn rank_audio(mut pool: Vec<&StreamDescriptor>) -> Option<&StreamDescriptor> {
        pool.sort_by(|a, b| cmp_bitrate(b.abr, a.abr));
        pool.first().copied()
    }
}

/// Missing bitrate ranks as zero
fn cmp_bitrate(a: Option<f64>, b: Option<f64>) -> Ordering {
    a.unwrap_or(0.0).total_cmp(&b.unwrap_or(0.0))
}
