// ffmpeg CLI backend
//
// Stream-copy merges, re-encoding merges for container-incompatible codecs,
// and compressed-audio conversion, all through the `ffmpeg` binary.

use std::path::Path;

use async_trait::async_trait;

use crate::downloader::config::ConversionProfile;
use crate::downloader::errors::DownloadError;
use crate::downloader::remux::RemuxStats;
use crate::downloader::traits::{MediaTranscoder, Reencode, StreamMerger};
use crate::downloader::utils::{remove_quietly, run_output_with_timeout};

pub struct FfmpegCli {
    ffmpeg_path: String,
    timeout_secs: u64,
}

impl FfmpegCli {
    pub fn new(ffmpeg_path: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            timeout_secs,
        }
    }

    fn base_args() -> Vec<String> {
        ["-hide_banner", "-nostdin", "-loglevel", "error", "-y"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn merge_args(video: &Path, audio: &Path, output: &Path, reencode: Reencode) -> Vec<String> {
        let mut args = Self::base_args();
        args.extend([
            "-i".to_string(),
            video.to_string_lossy().to_string(),
            "-i".to_string(),
            audio.to_string_lossy().to_string(),
            "-map".to_string(),
            "0:v:0".to_string(),
            "-map".to_string(),
            "1:a:0".to_string(),
        ]);

        if reencode.video {
            args.extend(["-c:v", "libx264", "-preset", "medium", "-crf", "20"].map(String::from));
        } else {
            args.extend(["-c:v", "copy"].map(String::from));
        }
        if reencode.audio {
            args.extend(["-c:a", "aac", "-b:a", "192k"].map(String::from));
        } else {
            args.extend(["-c:a", "copy"].map(String::from));
        }

        args.extend(["-movflags", "+faststart"].map(String::from));
        args.push(output.to_string_lossy().to_string());
        args
    }

    fn convert_args(input: &Path, output: &Path, profile: &ConversionProfile) -> Vec<String> {
        let mut args = Self::base_args();
        args.extend([
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-vn".to_string(),
            "-map".to_string(),
            "0:a:0".to_string(),
            // tags are written by the metadata pipeline
            "-map_metadata".to_string(),
            "-1".to_string(),
            "-c:a".to_string(),
            "libmp3lame".to_string(),
            "-b:a".to_string(),
            format!("{}k", profile.bitrate_kbps),
            "-ar".to_string(),
            profile.sample_rate.to_string(),
            output.to_string_lossy().to_string(),
        ]);
        args
    }

    /// Run ffmpeg and verify `output` exists; removes partial output on failure
    async fn run(
        &self,
        args: Vec<String>,
        output: &Path,
        fail: fn(String) -> DownloadError,
    ) -> Result<(), DownloadError> {
        let result = match run_output_with_timeout(&self.ffmpeg_path, args, self.timeout_secs).await {
            Ok(out) if out.status.success() => {
                if tokio::fs::metadata(output).await.map(|m| m.len() > 0).unwrap_or(false) {
                    Ok(())
                } else {
                    Err(fail(format!("{} not created", output.display())))
                }
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                Err(fail(format!(
                    "ffmpeg exited with {}: {}",
                    out.status,
                    stderr.trim()
                )))
            }
            Err(DownloadError::ToolNotFound(tool)) => Err(DownloadError::ToolNotFound(tool)),
            Err(e) => Err(fail(e.to_string())),
        };

        if result.is_err() {
            remove_quietly(output).await;
        }
        result
    }
}

#[async_trait]
impl StreamMerger for FfmpegCli {
    fn name(&self) -> &'static str {
        "ffmpeg-copy"
    }

    async fn merge(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
    ) -> Result<Option<RemuxStats>, DownloadError> {
        tracing::info!(output = %output.display(), "merging with stream copy");
        let args = Self::merge_args(video, audio, output, Reencode::default());
        self.run(args, output, DownloadError::MergeFailed).await?;
        Ok(None)
    }
}

#[async_trait]
impl MediaTranscoder for FfmpegCli {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn convert_audio(
        &self,
        input: &Path,
        output: &Path,
        profile: &ConversionProfile,
    ) -> Result<(), DownloadError> {
        tracing::info!(
            input = %input.display(),
            bitrate_kbps = profile.bitrate_kbps,
            "converting audio"
        );
        let args = Self::convert_args(input, output, profile);
        self.run(args, output, DownloadError::ConversionFailed).await
    }

    async fn merge_reencode(
        &self,
        video: &Path,
        audio: &Path,
        output: &Path,
        reencode: Reencode,
    ) -> Result<(), DownloadError> {
        tracing::info!(
            video = reencode.video,
            audio = reencode.audio,
            "merging with re-encode"
        );
        let args = Self::merge_args(video, audio, output, reencode);
        self.run(args, output, DownloadError::MergeFailed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::testing::{packet_counts, render_fixture};
    use crate::downloader::utils::scratch_dir;

    #[test]
    fn test_copy_merge_maps_one_stream_each() {
        let args = FfmpegCli::merge_args(
            Path::new("v.webm"),
            Path::new("a.m4a"),
            Path::new("out.mp4"),
            Reencode::default(),
        );
        assert!(args.windows(2).any(|w| w == ["-map", "0:v:0"]));
        assert!(args.windows(2).any(|w| w == ["-map", "1:a:0"]));
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "copy"]));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[test]
    fn test_reencode_merge_only_touches_flagged_stream() {
        let args = FfmpegCli::merge_args(
            Path::new("v.webm"),
            Path::new("a.ogg"),
            Path::new("out.mp4"),
            Reencode {
                video: false,
                audio: true,
            },
        );
        assert!(args.windows(2).any(|w| w == ["-c:v", "copy"]));
        assert!(args.windows(2).any(|w| w == ["-c:a", "aac"]));
    }

    #[test]
    fn test_convert_uses_profile() {
        let profile = ConversionProfile {
            bitrate_kbps: 256,
            sample_rate: 48_000,
        };
        let args = FfmpegCli::convert_args(Path::new("in.m4a"), Path::new("out.mp3"), &profile);
        assert!(args.windows(2).any(|w| w == ["-c:a", "libmp3lame"]));
        assert!(args.windows(2).any(|w| w == ["-b:a", "256k"]));
        assert!(args.windows(2).any(|w| w == ["-ar", "48000"]));
        assert!(args.windows(2).any(|w| w == ["-map_metadata", "-1"]));
    }

    #[tokio::test]
    async fn test_missing_binary_reports_tool() {
        let ffmpeg = FfmpegCli::new("ytgrab-no-such-ffmpeg", 5);
        let err = ffmpeg
            .convert_audio(
                Path::new("in.m4a"),
                Path::new("/nonexistent/out.mp3"),
                &ConversionProfile::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_stream_copy_merge_keeps_every_packet() {
        let dir = scratch_dir();
        let video = dir.join("video.mp4");
        let audio = dir.join("audio.m4a");
        let output = dir.join("merged.mp4");

        let rendered = render_fixture(
            &["-f", "lavfi", "-i", "testsrc=duration=1:size=64x64:rate=10", "-c:v", "mpeg4"],
            &video,
        )
        .await
            && render_fixture(&["-f", "lavfi", "-i", "sine=frequency=440:duration=1", "-c:a", "aac"], &audio).await;
        if !rendered {
            eprintln!("ffmpeg not installed, skipping");
            std::fs::remove_dir_all(dir).unwrap();
            return;
        }

        let merger = FfmpegCli::new("ffmpeg", 60);
        assert_eq!(merger.merge(&video, &audio, &output).await.unwrap(), None);

        if let (Some(v), Some(a), Some(merged)) = (
            packet_counts(&video).await,
            packet_counts(&audio).await,
            packet_counts(&output).await,
        ) {
            assert_eq!(merged, vec![v[0].clone(), a[0].clone()]);
            assert_eq!(merged[0].0, "video");
            assert_eq!(merged[1].0, "audio");
        }

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[tokio::test]
    async fn test_failed_merge_leaves_no_output() {
        let dir = scratch_dir();
        let video = dir.join("video.mp4");
        let audio = dir.join("audio.m4a");
        let output = dir.join("merged.mp4");
        std::fs::write(&video, b"not a video").unwrap();
        std::fs::write(&audio, b"not audio").unwrap();

        let err = FfmpegCli::new("ffmpeg", 60)
            .merge(&video, &audio, &output)
            .await
            .unwrap_err();
        assert!(
            matches!(err, DownloadError::MergeFailed(_) | DownloadError::ToolNotFound(_)),
            "{}",
            err
        );
        assert!(!output.exists());

        std::fs::remove_dir_all(dir).unwrap();
    }
}
