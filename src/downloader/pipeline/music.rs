// Music pipeline: best audio track, tags, optional MP3 conversion

use std::path::{Path, PathBuf};

use super::{output_name, PipelineContext};
use crate::downloader::config::ConversionProfile;
use crate::downloader::errors::DownloadError;
use crate::downloader::format_selector::FormatSelector;
use crate::downloader::lyrics::fetch_lyrics;
use crate::downloader::metadata::{self, fetch_cover_art};
use crate::downloader::models::{
    DownloadResult, MediaAsset, PipelineStage, ProbeResult, TrackMetadata,
};
use crate::downloader::utils::{place_unique, sanitize_title, RequestWorkspace};

pub async fn run(
    ctx: &mut PipelineContext<'_>,
    url: &str,
    destination: &Path,
    convert_to_mp3: bool,
) -> Result<DownloadResult, DownloadError> {
    ctx.reporter.stage(PipelineStage::Extracting);
    let probe = ctx.probe(url).await?;

    ctx.reporter.stage(PipelineStage::Selecting);
    let track = FormatSelector::select_music_track(&probe.formats)?;
    tracing::info!(
        url,
        format_id = %track.format_id,
        ext = %track.ext,
        abr = track.abr.unwrap_or_default(),
        "selected audio track"
    );

    tokio::fs::create_dir_all(destination).await?;
    let workspace = RequestWorkspace::create(destination).await?;

    ctx.reporter.stage(PipelineStage::Fetching);
    let fetched = ctx
        .collaborators
        .extractor
        .fetch(url, &track.format_id, &workspace.template("audio"))
        .await?;
    let asset = MediaAsset::new(fetched, track);

    let meta = collect_metadata(ctx, &probe).await;
    let stem = sanitize_title(&probe.title);

    let output = if convert_to_mp3 {
        let converted = convert_and_tag(ctx, &asset, &meta, workspace.path()).await?;
        place_unique(&converted, destination, &stem, ConversionProfile::EXTENSION).await?
    } else {
        ctx.reporter.stage(PipelineStage::Embedding);
        let result = metadata::embed(asset.path(), &meta).await;
        ctx.absorb(result)?;

        place_unique(asset.path(), destination, &stem, &asset.extension()).await?
    };

    ctx.reporter.stage(PipelineStage::CleaningUp);
    drop(workspace);

    tracing::info!(path = %output.display(), "audio download finished");
    ctx.reporter.stage(PipelineStage::Done);

    Ok(DownloadResult {
        success: true,
        filename: output_name(&output),
        title: Some(meta.title),
        artist: Some(meta.artist),
        album: Some(meta.album),
        duration_seconds: probe.duration_seconds(),
        error: None,
        warnings: ctx.take_warnings(),
    })
}

/// Convert inside the workspace, then carry the tags over
async fn convert_and_tag(
    ctx: &mut PipelineContext<'_>,
    asset: &MediaAsset,
    meta: &TrackMetadata,
    workspace: &Path,
) -> Result<PathBuf, DownloadError> {
    ctx.reporter.stage(PipelineStage::Converting);
    let target = workspace.join(format!("converted.{}", ConversionProfile::EXTENSION));
    ctx.collaborators
        .transcoder
        .convert_audio(asset.path(), &target, &ctx.config.conversion)
        .await?;

    ctx.reporter.stage(PipelineStage::Embedding);
    tag_converted(ctx, asset, meta, &target).await?;
    Ok(target)
}

/// Tag the intermediate, then translate its tags into the converted file.
/// Containers without a readable tag scheme get `meta` written directly.
async fn tag_converted(
    ctx: &mut PipelineContext<'_>,
    asset: &MediaAsset,
    meta: &TrackMetadata,
    target: &Path,
) -> Result<(), DownloadError> {
    let embedded = metadata::embed(asset.path(), meta).await;
    let source_tagged = ctx.absorb(embedded)?;

    let result = if source_tagged && metadata::supports_translation(asset.path()) {
        metadata::translate_tags(asset.path(), target).await
    } else {
        metadata::embed(target, meta).await
    };
    ctx.absorb(result).map(|_| ())
}

/// Tags from the probe plus cover art and lyrics; fetch failures are warnings
async fn collect_metadata(ctx: &mut PipelineContext<'_>, probe: &ProbeResult) -> TrackMetadata {
    let mut meta = TrackMetadata::from_probe(probe, ctx.config);
    let http = ctx.collaborators.http.clone();

    match fetch_cover_art(http.as_ref(), probe).await {
        Ok(cover) => meta.cover = cover,
        Err(e) => ctx.warn(format!("Cover art unavailable: {}", e)),
    }

    meta.lyrics = fetch_lyrics(http.as_ref(), probe, &ctx.config.lyrics_language).await;
    if meta.lyrics.is_none() {
        tracing::debug!(id = %probe.id, "no lyrics found");
    }

    meta
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::downloader::config::DownloaderConfig;
    use crate::downloader::pipeline::Collaborators;
    use crate::downloader::testing::{descriptor, probe, MockExtractor, MockHttp, MockMerger, MockTranscoder};
    use crate::downloader::traits::StageReporter;
    use crate::downloader::utils::scratch_dir;

    fn audio_formats() -> Vec<crate::downloader::models::StreamDescriptor> {
        vec![
            descriptor("251", "webm", None, Some("opus"), None, 160.0),
            descriptor("140", "m4a", None, Some("mp4a.40.2"), None, 129.0),
            descriptor("137", "mp4", Some("avc1.640028"), None, Some(1080), 4400.0),
        ]
    }

    fn collaborators(extractor: Arc<MockExtractor>, transcoder: Arc<MockTranscoder>) -> Collaborators {
        Collaborators {
            extractor,
            merger: Arc::new(MockMerger::default()),
            transcoder,
            http: Arc::new(MockHttp::default()),
        }
    }

    fn leftover_workspaces(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".ytgrab-"))
            .count()
    }

    #[tokio::test]
    async fn test_native_audio_keeps_extractor_extension() {
        let dir = scratch_dir();
        let extractor = Arc::new(MockExtractor::new(probe("My Song", audio_formats())));
        let transcoder = Arc::new(MockTranscoder::default());
        let collab = collaborators(extractor.clone(), transcoder.clone());
        let config = DownloaderConfig::default();
        let reporter = StageReporter::silent();
        let mut ctx = PipelineContext::new(&collab, &config, &reporter);

        let result = run(&mut ctx, "https://youtu.be/abc123", &dir, false).await.unwrap();

        assert!(result.success);
        let filename = result.filename.unwrap();
        assert_eq!(filename, "My Song.m4a");
        assert!(dir.join(&filename).exists());
        assert_eq!(extractor.fetched(), vec!["140"]);
        assert_eq!(transcoder.conversions(), 0);
        assert_eq!(result.artist.as_deref(), Some("Channel"));
        assert_eq!(result.duration_seconds, Some(245));
        // mock payload is not a real MP4, so tagging is absorbed
        assert!(!result.warnings.is_empty());
        assert_eq!(leftover_workspaces(&dir), 0);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_conversion_produces_mp3_and_removes_intermediate() {
        let dir = scratch_dir();
        let extractor = Arc::new(MockExtractor::new(probe("My Song", audio_formats())));
        let transcoder = Arc::new(MockTranscoder::default());
        let collab = collaborators(extractor, transcoder.clone());
        let config = DownloaderConfig::default();
        let reporter = StageReporter::silent();
        let mut ctx = PipelineContext::new(&collab, &config, &reporter);

        let result = run(&mut ctx, "https://youtu.be/abc123", &dir, true).await.unwrap();

        assert!(result.success);
        let filename = result.filename.unwrap();
        assert_eq!(filename, "My Song.mp3");
        assert!(dir.join(&filename).exists());
        assert_eq!(transcoder.conversions(), 1);
        assert!(!dir.join("My Song.m4a").exists());
        assert_eq!(leftover_workspaces(&dir), 0);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_conversion_failure_aborts_and_cleans_up() {
        let dir = scratch_dir();
        let extractor = Arc::new(MockExtractor::new(probe("Song", audio_formats())));
        let collab = collaborators(extractor, Arc::new(MockTranscoder::failing()));
        let config = DownloaderConfig::default();
        let reporter = StageReporter::silent();
        let mut ctx = PipelineContext::new(&collab, &config, &reporter);

        let err = run(&mut ctx, "u", &dir, true).await.unwrap_err();
        assert!(matches!(err, DownloadError::ConversionFailed(_)));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_strict_metadata_fails_request() {
        let dir = scratch_dir();
        let extractor = Arc::new(MockExtractor::new(probe("Song", audio_formats())));
        let collab = collaborators(extractor, Arc::new(MockTranscoder::default()));
        let config = DownloaderConfig::default().with_strict_metadata(true);
        let reporter = StageReporter::silent();
        let mut ctx = PipelineContext::new(&collab, &config, &reporter);

        let err = run(&mut ctx, "u", &dir, false).await.unwrap_err();
        assert!(matches!(err, DownloadError::MetadataEmbedFailed(_)));
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_existing_file_is_not_overwritten() {
        let dir = scratch_dir();
        std::fs::write(dir.join("Song.m4a"), b"original").unwrap();

        let extractor = Arc::new(MockExtractor::new(probe("Song", audio_formats())));
        let collab = collaborators(extractor, Arc::new(MockTranscoder::default()));
        let config = DownloaderConfig::default();
        let reporter = StageReporter::silent();
        let mut ctx = PipelineContext::new(&collab, &config, &reporter);

        let result = run(&mut ctx, "u", &dir, false).await.unwrap();
        assert_eq!(result.filename.as_deref(), Some("Song_1.m4a"));
        assert_eq!(std::fs::read(dir.join("Song.m4a")).unwrap(), b"original");

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_conversions_keep_both_files() {
        let dir = scratch_dir();
        let extractor = Arc::new(MockExtractor::new(probe("Song", audio_formats())));
        let transcoder = Arc::new(MockTranscoder::with_delay(Duration::from_millis(200)));
        let collab = collaborators(extractor, transcoder.clone());
        let config = DownloaderConfig::default();
        let reporter = StageReporter::silent();
        let mut first = PipelineContext::new(&collab, &config, &reporter);
        let mut second = PipelineContext::new(&collab, &config, &reporter);

        let (a, b) = tokio::join!(
            run(&mut first, "u", &dir, true),
            run(&mut second, "u", &dir, true)
        );

        let mut names = vec![a.unwrap().filename.unwrap(), b.unwrap().filename.unwrap()];
        names.sort();
        assert_eq!(names, vec!["Song.mp3", "Song_1.mp3"]);
        assert_eq!(transcoder.conversions(), 2);

        let mut on_disk: Vec<String> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        on_disk.sort();
        assert_eq!(on_disk, names);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_no_audio_track_is_error() {
        let dir = scratch_dir();
        let formats = vec![descriptor("137", "mp4", Some("avc1"), None, Some(1080), 4400.0)];
        let extractor = Arc::new(MockExtractor::new(probe("Song", formats)));
        let collab = collaborators(extractor, Arc::new(MockTranscoder::default()));
        let config = DownloaderConfig::default();
        let reporter = StageReporter::silent();
        let mut ctx = PipelineContext::new(&collab, &config, &reporter);

        let err = run(&mut ctx, "u", &dir, false).await.unwrap_err();
        assert!(matches!(err, DownloadError::NoStreamsAvailable(_)));

        std::fs::remove_dir_all(dir).unwrap();
    }
}
