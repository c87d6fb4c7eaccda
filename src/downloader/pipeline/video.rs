// Video pipeline: best video + best audio merged into one MP4

use std::path::Path;

use super::{output_name, PipelineContext};
use crate::downloader::errors::DownloadError;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::models::{DownloadResult, MediaAsset, PipelineStage, SelectionResult};
use crate::downloader::traits::Reencode;
use crate::downloader::utils::{place_unique, sanitize_title, RequestWorkspace};

/// Container produced by the merge path
pub const MERGED_EXTENSION: &str = "mp4";

/// Codec families an MP4 muxer accepts by stream copy
const MP4_VIDEO_CODECS: &[&str] = &["avc1", "avc3", "h264", "hev1", "hvc1", "av01", "vp09", "vp9"];
const MP4_AUDIO_CODECS: &[&str] = &["mp4a", "aac", "opus", "mp3", "flac", "ac-3", "ec-3"];

fn codec_family(codec: &str) -> String {
    codec
        .split('.')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn copy_compatible(codec: Option<&str>, allowed: &[&str]) -> bool {
    // an unreported codec is left to the muxer
    codec.map_or(true, |c| allowed.contains(&codec_family(c).as_str()))
}

/// Which streams must be re-encoded to land in an MP4 container
pub fn plan_reencode(selection: &SelectionResult) -> Reencode {
    Reencode {
        video: !copy_compatible(selection.video.vcodec.as_deref(), MP4_VIDEO_CODECS),
        audio: !copy_compatible(selection.audio.acodec.as_deref(), MP4_AUDIO_CODECS),
    }
}

pub async fn run(
    ctx: &mut PipelineContext<'_>,
    url: &str,
    destination: &Path,
) -> Result<DownloadResult, DownloadError> {
    ctx.reporter.stage(PipelineStage::Extracting);
    let probe = ctx.probe(url).await?;

    ctx.reporter.stage(PipelineStage::Selecting);
    let selection = FormatSelector::select(&probe.formats)?;
    tracing::info!(
        url,
        video = %selection.video.format_id,
        audio = %selection.audio.format_id,
        height = selection.video.height.unwrap_or_default(),
        "selected streams"
    );

    tokio::fs::create_dir_all(destination).await?;
    let workspace = RequestWorkspace::create(destination).await?;
    let stem = sanitize_title(&probe.title);
    let extractor = ctx.collaborators.extractor.clone();

    ctx.reporter.stage(PipelineStage::Fetching);
    let output = if selection.is_combined() {
        // source already carries both streams
        let path = extractor
            .fetch(url, &selection.video.format_id, &workspace.template("combined"))
            .await?;
        let asset = MediaAsset::new(path, selection.video.clone());

        place_unique(asset.path(), destination, &stem, &asset.extension()).await?
    } else {
        let video_path = extractor
            .fetch(url, &selection.video.format_id, &workspace.template("video"))
            .await?;
        let audio_path = extractor
            .fetch(url, &selection.audio.format_id, &workspace.template("audio"))
            .await?;
        let video = MediaAsset::new(video_path, selection.video.clone());
        let audio = MediaAsset::new(audio_path, selection.audio.clone());

        ctx.reporter.stage(PipelineStage::Merging);
        let merged = workspace.path().join(format!("merged.{}", MERGED_EXTENSION));
        merge(ctx, &selection, &video, &audio, &merged).await?;

        place_unique(&merged, destination, &stem, MERGED_EXTENSION).await?
    };

    ctx.reporter.stage(PipelineStage::CleaningUp);
    drop(workspace);

    tracing::info!(path = %output.display(), "video download finished");
    ctx.reporter.stage(PipelineStage::Done);

    Ok(DownloadResult {
        success: true,
        filename: output_name(&output),
        title: Some(probe.title.clone()),
        artist: probe.artist.clone().or_else(|| probe.uploader.clone()),
        album: probe.album.clone(),
        duration_seconds: probe.duration_seconds(),
        error: None,
        warnings: ctx.take_warnings(),
    })
}

async fn merge(
    ctx: &PipelineContext<'_>,
    selection: &SelectionResult,
    video: &MediaAsset,
    audio: &MediaAsset,
    output: &Path,
) -> Result<(), DownloadError> {
    let plan = plan_reencode(selection);

    if plan.any() {
        tracing::info!(
            vcodec = ?selection.video.vcodec,
            acodec = ?selection.audio.acodec,
            transcoder = ctx.collaborators.transcoder.name(),
            "streams not copy-compatible with mp4, re-encoding"
        );
        return ctx
            .collaborators
            .transcoder
            .merge_reencode(video.path(), audio.path(), output, plan)
            .await;
    }

    let merger = &ctx.collaborators.merger;
    if let Some(stats) = merger.merge(video.path(), audio.path(), output).await? {
        tracing::debug!(
            merger = merger.name(),
            packets = stats.written(),
            skipped = stats.skipped_packets,
            "merge stats"
        );
    }
    Ok(())
}
