// Common data models for the download pipelines

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};

use super::errors::DownloadError;

/// Which elementary stream a descriptor or track carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamKind {
    Video,
    Audio,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

/// yt-dlp reports a missing codec as the literal string "none"
fn deserialize_codec<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|c| !c.is_empty() && c != "none"))
}

fn deserialize_null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// One downloadable stream of a media item, as reported by the extractor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Format ID (e.g., "137", "140")
    pub format_id: String,
    /// File extension (mp4, webm, m4a)
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub ext: String,
    /// Video codec, absent for audio-only streams
    #[serde(default, deserialize_with = "deserialize_codec")]
    pub vcodec: Option<String>,
    /// Audio codec, absent for video-only streams
    #[serde(default, deserialize_with = "deserialize_codec")]
    pub acodec: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    /// Total bitrate in kbps
    #[serde(default)]
    pub tbr: Option<f64>,
    /// Audio bitrate in kbps
    #[serde(default)]
    pub abr: Option<f64>,
}

impl StreamDescriptor {
    pub fn has_video(&self) -> bool {
        self.vcodec.is_some()
    }

    pub fn has_audio(&self) -> bool {
        self.acodec.is_some()
    }

    pub fn is_video_only(&self) -> bool {
        self.has_video() && !self.has_audio()
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio() && !self.has_video()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thumbnail {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}

impl Thumbnail {
    fn area(&self) -> Option<u64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) => Some(w as u64 * h as u64),
            _ => None,
        }
    }
}

/// Subtitle or automatic caption track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionTrack {
    pub url: String,
    #[serde(default)]
    pub ext: Option<String>,
}

/// Typed extractor output, validated at the collaborator boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub id: String,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub title: String,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub album: Option<String>,
    /// YYYYMMDD
    #[serde(default)]
    pub upload_date: Option<String>,
    /// Seconds
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub thumbnails: Vec<Thumbnail>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub formats: Vec<StreamDescriptor>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub automatic_captions: HashMap<String, Vec<CaptionTrack>>,
    #[serde(default, deserialize_with = "deserialize_null_default")]
    pub subtitles: HashMap<String, Vec<CaptionTrack>>,
}

impl ProbeResult {
    /// Parse `--dump-json` output and normalize optional fields
    pub fn from_json(bytes: &[u8]) -> Result<Self, DownloadError> {
        let mut probe: ProbeResult = serde_json::from_slice(bytes)
            .map_err(|e| DownloadError::ExtractionFailed(format!("Invalid extractor JSON: {}", e)))?;
        probe.normalize();
        Ok(probe)
    }

    fn normalize(&mut self) {
        if self.title.trim().is_empty() {
            self.title = "Unknown".to_string();
        }
        for field in [&mut self.uploader, &mut self.artist, &mut self.album, &mut self.upload_date] {
            if field.as_deref().map_or(false, |v| v.trim().is_empty()) {
                *field = None;
            }
        }
        self.formats.retain(|f| !f.format_id.is_empty());
        self.thumbnails.retain(|t| !t.url.is_empty());
    }

    /// Whole seconds, if the extractor knows the duration
    pub fn duration_seconds(&self) -> Option<u64> {
        self.duration.filter(|d| *d >= 0.0).map(|d| d.round() as u64)
    }

    /// Highest-resolution thumbnail; the last one wins when sizes are unknown
    pub fn best_thumbnail(&self) -> Option<&Thumbnail> {
        if self.thumbnails.iter().any(|t| t.area().is_some()) {
            // max_by_key keeps the last of equal maxima
            self.thumbnails
                .iter()
                .filter(|t| t.area().is_some())
                .max_by_key(|t| t.area())
        } else {
            self.thumbnails.last()
        }
    }

    pub fn descriptor(&self, format_id: &str) -> Option<&StreamDescriptor> {
        self.formats.iter().find(|f| f.format_id == format_id)
    }
}

/// Chosen pair of descriptors for one media item
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionResult {
    pub video: StreamDescriptor,
    pub audio: StreamDescriptor,
}

impl SelectionResult {
    /// Both picks are the same combined stream: fetch directly, no merge
    pub fn is_combined(&self) -> bool {
        self.video.format_id == self.audio.format_id
    }
}

/// A fetched local file plus the descriptor it came from
#[derive(Debug, Clone)]
pub struct MediaAsset {
    pub path: PathBuf,
    pub descriptor: StreamDescriptor,
}

impl MediaAsset {
    pub fn new(path: PathBuf, descriptor: StreamDescriptor) -> Self {
        Self { path, descriptor }
    }

    /// Extension of the file actually written, falling back to the descriptor's
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_else(|| self.descriptor.ext.to_ascii_lowercase())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Descriptive tags attached to a produced audio file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub year: Option<String>,
    /// Cover artwork bytes (JPEG after normalization)
    pub cover: Option<Vec<u8>>,
    pub lyrics: Option<String>,
}

/// Terminal value of one download request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DownloadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Absorbed non-fatal failures (metadata, cover, lyrics)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl DownloadResult {
    pub fn failure(error: &DownloadError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Pipeline step, reported while a request runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStage {
    Extracting,
    Selecting,
    Fetching,
    Merging,
    Converting,
    Embedding,
    CleaningUp,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Extracting => "Extracting metadata",
            Self::Selecting => "Selecting streams",
            Self::Fetching => "Fetching streams",
            Self::Merging => "Merging video and audio",
            Self::Converting => "Converting audio",
            Self::Embedding => "Embedding metadata",
            Self::CleaningUp => "Cleaning up",
            Self::Done => "Done",
        };
        f.write_str(label)
    }
}

/// Message delivered from a download worker to whoever watches it
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadEvent {
    Stage(PipelineStage),
    Warning(String),
    Finished(DownloadResult),
}

/// What a worker task should download
#[derive(Debug, Clone)]
pub enum DownloadRequest {
    Audio {
        url: String,
        destination: PathBuf,
        convert_to_mp3: bool,
    },
    Video {
        url: String,
        destination: PathBuf,
    },
}

impl DownloadRequest {
    pub fn url(&self) -> &str {
        match self {
            Self::Audio { url, .. } | Self::Video { url, .. } => url,
        }
    }

    pub fn destination(&self) -> &Path {
        match self {
            Self::Audio { destination, .. } | Self::Video { destination, .. } => destination.as_path(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Audio { .. } => "audio",
            Self::Video { .. } => "video",
        }
    }
}
