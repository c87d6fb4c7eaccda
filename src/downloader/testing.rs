// Mock collaborators shared by the pipeline and facade tests

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::config::ConversionProfile;
use super::errors::DownloadError;
use super::models::{ProbeResult, StreamDescriptor};
use super::remux::RemuxStats;
use super::traits::{HttpFetcher, MediaTranscoder, Reencode, StreamExtractor, StreamMerger};
use super::utils::run_output_with_timeout;

pub fn descriptor(
    id: &str,
    ext: &str,
    vcodec: Option<&str>,
    acodec: Option<&str>,
    height: Option<u32>,
    bitrate: f64,
) -> StreamDescriptor {
    StreamDescriptor {
        format_id: id.to_string(),
        ext: ext.to_string(),
        vcodec: vcodec.map(String::from),
        acodec: acodec.map(String::from),
        width: None,
        height,
        tbr: Some(bitrate),
        abr: acodec.map(|_| bitrate),
    }
}

pub fn probe(title: &str, formats: Vec<StreamDescriptor>) -> ProbeResult {
    let mut probe = ProbeResult::from_json(br#"{"id": "abc123"}"#).unwrap();
    probe.title = title.to_string();
    probe.uploader = Some("Channel".to_string());
    probe.duration = Some(245.0);
    probe.upload_date = Some("20200102".to_string());
    probe.formats = formats;
    probe
}

/// Writes `<template stem>.<descriptor ext>` for every fetch
pub struct MockExtractor {
    probe: Result<ProbeResult, String>,
    fetched: Mutex<Vec<String>>,
}

impl MockExtractor {
    pub fn new(probe: ProbeResult) -> Self {
        Self {
            probe: Ok(probe),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(stderr: &str) -> Self {
        Self {
            probe: Err(stderr.to_string()),
            fetched: Mutex::new(Vec::new()),
        }
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl StreamExtractor for MockExtractor {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn probe(&self, _url: &str) -> Result<ProbeResult, DownloadError> {
        self.probe
            .clone()
            .map_err(|stderr| DownloadError::from_extractor_stderr(&stderr))
    }

    async fn fetch(
        &self,
        _url: &str,
        format_id: &str,
        destination_template: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let probe = self.probe.as_ref().map_err(|e| DownloadError::ExtractionFailed(e.clone()))?;
        let descriptor = probe
            .descriptor(format_id)
            .ok_or_else(|| DownloadError::ExtractionFailed(format!("unknown format {}", format_id)))?;

        let template = destination_template.to_string_lossy();
        let path = PathBuf::from(template.replace("%(ext)s", &descriptor.ext));
        tokio::fs::write(&path, format!("payload-{}", format_id)).await?;

        self.fetched.lock().unwrap().push(format_id.to_string());
        Ok(path)
    }
}

/// Concatenates both inputs into the output
#[derive(Default)]
pub struct MockMerger {
    pub calls: AtomicUsize,
    pub fail: bool,
}

impl MockMerger {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamMerger for MockMerger {
    fn name(&self) -> &'static str {
        "mock-merger"
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<Option<RemuxStats>, DownloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            tokio::fs::write(output, b"partial").await?;
            return Err(DownloadError::MergeFailed("mock merge failure".to_string()));
        }

        let mut merged = tokio::fs::read(video).await?;
        merged.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, merged).await?;
        Ok(None)
    }
}

#[derive(Default)]
pub struct MockTranscoder {
    pub conversions: AtomicUsize,
    pub reencodes: Mutex<Vec<Reencode>>,
    pub fail_conversion: bool,
    /// Time spent "encoding" after the output file appears
    pub delay: Option<Duration>,
}

impl MockTranscoder {
    pub fn failing() -> Self {
        Self {
            fail_conversion: true,
            ..Self::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn conversions(&self) -> usize {
        self.conversions.load(Ordering::SeqCst)
    }

    pub fn reencodes(&self) -> Vec<Reencode> {
        self.reencodes.lock().unwrap().clone()
    }
}

#[async_trait]
impl MediaTranscoder for MockTranscoder {
    fn name(&self) -> &'static str {
        "mock-transcoder"
    }

    async fn convert_audio(
        &self,
        input: &Path,
        output: &Path,
        _profile: &ConversionProfile,
    ) -> Result<(), DownloadError> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        if self.fail_conversion {
            return Err(DownloadError::ConversionFailed("mock conversion failure".to_string()));
        }
        let data = tokio::fs::read(input).await?;
        tokio::fs::write(output, data).await?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    async fn merge_reencode(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        reencode: Reencode,
    ) -> Result<(), DownloadError> {
        self.reencodes.lock().unwrap().push(reencode);
        let mut merged = tokio::fs::read(video).await?;
        merged.extend(tokio::fs::read(audio).await?);
        tokio::fs::write(output, merged).await?;
        Ok(())
    }
}

/// Serves canned bodies by URL; anything else is a 404
#[derive(Default, Clone)]
pub struct MockHttp {
    bodies: HashMap<String, Vec<u8>>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockHttp {
    pub fn with_bytes(mut self, url: &str, body: Vec<u8>) -> Self {
        self.bodies.insert(url.to_string(), body);
        self
    }

    pub fn with_text(self, url: &str, body: &str) -> Self {
        self.with_bytes(url, body.as_bytes().to_vec())
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpFetcher for MockHttp {
    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        self.requests.lock().unwrap().push(url.to_string());
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| DownloadError::Http(format!("404 Not Found for {}", url)))
    }
}

/// Render a media file with the ffmpeg binary from `inputs` (lavfi sources
/// and codec flags). `false` when ffmpeg is missing or fails.
pub async fn render_fixture(inputs: &[&str], output: &Path) -> bool {
    let mut args: Vec<String> = ["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]
        .iter()
        .chain(inputs)
        .map(|s| s.to_string())
        .collect();
    args.push(output.to_string_lossy().into_owned());

    matches!(
        run_output_with_timeout("ffmpeg", args, 60).await,
        Ok(out) if out.status.success()
    )
}

/// `(codec_type, packets)` per stream as counted by ffprobe
pub async fn packet_counts(path: &Path) -> Option<Vec<(String, u64)>> {
    let mut args: Vec<String> = [
        "-v",
        "error",
        "-count_packets",
        "-show_entries",
        "stream=codec_type,nb_read_packets",
        "-of",
        "json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.push(path.to_string_lossy().into_owned());

    let out = run_output_with_timeout("ffprobe", args, 60).await.ok()?;
    if !out.status.success() {
        return None;
    }
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).ok()?;
    json["streams"]
        .as_array()?
        .iter()
        .map(|stream| {
            let kind = stream["codec_type"].as_str()?.to_string();
            let packets: u64 = stream["nb_read_packets"].as_str()?.parse().ok()?;
            Some((kind, packets))
        })
        .collect()
}
