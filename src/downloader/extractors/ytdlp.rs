// yt-dlp extractor - drives the native `yt-dlp` binary
//
// probe: `--dump-json` parsed into a typed `ProbeResult`
// fetch: `-f <id> -o <template>` with the final path printed after move

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::diagnostics::diagnose_error;
use crate::downloader::config::ExtractorConfig;
use crate::downloader::errors::DownloadError;
use crate::downloader::models::ProbeResult;
use crate::downloader::traits::StreamExtractor;
use crate::downloader::utils::{find_by_stem, run_output_with_timeout};

/// CLI-based extractor using the yt-dlp binary
pub struct YtDlpExtractor {
    ytdlp_path: String,
    config: ExtractorConfig,
}

impl YtDlpExtractor {
    pub fn new(ytdlp_path: impl Into<String>, config: ExtractorConfig) -> Self {
        Self {
            ytdlp_path: ytdlp_path.into(),
            config,
        }
    }

    /// Options shared by probe and fetch
    fn common_args(&self, url: &str) -> Vec<String> {
        let mut args = vec![
            "--no-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.probe_timeout_seconds.min(60).to_string(),
        ];

        if let Some(client) = &self.config.player_client {
            let lower = url.to_lowercase();
            if lower.contains("youtube.com") || lower.contains("youtu.be") {
                args.push("--extractor-args".to_string());
                args.push(format!("youtube:player_client={}", client));
            }
        }

        // Cookies
        if let Some(path) = &self.config.cookies_path {
            args.push("--cookies".to_string());
            args.push(path.clone());
        } else if self.config.cookies_from_browser {
            args.push("--cookies-from-browser".to_string());
            args.push("chrome".to_string());
        }

        // Proxy
        if let Some(proxy) = &self.config.proxy {
            args.push("--proxy".to_string());
            args.push(proxy.clone());
        }

        args
    }

    fn probe_args(&self, url: &str) -> Vec<String> {
        let mut args = vec!["--dump-json".to_string()];
        args.extend(self.common_args(url));
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    fn fetch_args(&self, url: &str, format_id: &str, template: &Path) -> Vec<String> {
        let mut args = vec![
            "-f".to_string(),
            format_id.to_string(),
            "-o".to_string(),
            template.to_string_lossy().to_string(),
            "--print".to_string(),
            "after_move:filepath".to_string(),
            "--no-simulate".to_string(),
            "--no-progress".to_string(),
            "--no-part".to_string(),
        ];
        args.extend(self.common_args(url));
        args.push("--".to_string());
        args.push(url.to_string());
        args
    }

    /// Last printed line is the final file path
    fn printed_path(stdout: &[u8]) -> Option<PathBuf> {
        String::from_utf8_lossy(stdout)
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| !l.is_empty())
            .map(PathBuf::from)
    }
}

/// Log the diagnosed reason and turn stderr into `ExtractionFailed`
fn extractor_failure(url: &str, step: &str, stderr: &[u8]) -> DownloadError {
    let stderr = String::from_utf8_lossy(stderr);
    let reason = diagnose_error(&stderr);
    tracing::warn!(
        url,
        step,
        reason = ?reason,
        permanent = reason.map_or(false, |r| r.is_permanent()),
        stderr = %stderr.trim(),
        "yt-dlp failed"
    );
    DownloadError::from_extractor_stderr(&stderr)
}

fn timeout_as_extraction_failure(e: DownloadError) -> DownloadError {
    if matches!(e, DownloadError::Timeout(_)) {
        DownloadError::from_extractor_stderr(&e.to_string())
    } else {
        e
    }
}

#[async_trait]
impl StreamExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn probe(&self, url: &str) -> Result<ProbeResult, DownloadError> {
        let args = self.probe_args(url);
        tracing::info!(url, "probing");

        let output = run_output_with_timeout(&self.ytdlp_path, args, self.config.probe_timeout_seconds)
            .await
            .map_err(timeout_as_extraction_failure)?;

        if !output.status.success() {
            return Err(extractor_failure(url, "probe", &output.stderr));
        }

        let probe = ProbeResult::from_json(&output.stdout)?;
        tracing::debug!(
            url,
            title = %probe.title,
            formats = probe.formats.len(),
            "probe succeeded"
        );
        Ok(probe)
    }

    async fn fetch(
        &self,
        url: &str,
        format_id: &str,
        destination_template: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let args = self.fetch_args(url, format_id, destination_template);
        tracing::info!(url, format_id, "fetching");

        let output = run_output_with_timeout(&self.ytdlp_path, args, self.config.fetch_timeout_seconds)
            .await
            .map_err(timeout_as_extraction_failure)?;

        if !output.status.success() {
            return Err(extractor_failure(url, "fetch", &output.stderr));
        }

        if let Some(path) = Self::printed_path(&output.stdout).filter(|p| p.is_file()) {
            return Ok(path);
        }

        // Older yt-dlp builds may not print; look for the file ourselves
        let dir = destination_template.parent().unwrap_or_else(|| Path::new("."));
        let stem = destination_template
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(".%(ext)s"))
            .unwrap_or_default();

        find_by_stem(dir, stem).ok_or_else(|| {
            DownloadError::ExtractionFailed(format!(
                "yt-dlp reported success but no file was written for format {}",
                format_id
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor(config: ExtractorConfig) -> YtDlpExtractor {
        YtDlpExtractor::new("yt-dlp", config)
    }

    #[test]
    fn test_probe_args_include_proxy_and_cookies() {
        let config = ExtractorConfig {
            proxy: Some("socks5h://127.0.0.1:1080".to_string()),
            cookies_path: Some("/tmp/cookies.txt".to_string()),
            player_client: Some("android".to_string()),
            ..ExtractorConfig::default()
        };
        let args = extractor(config).probe_args("https://www.youtube.com/watch?v=abc");

        assert_eq!(args[0], "--dump-json");
        assert!(args.windows(2).any(|w| w == ["--proxy", "socks5h://127.0.0.1:1080"]));
        assert!(args.windows(2).any(|w| w == ["--cookies", "/tmp/cookies.txt"]));
        assert!(args.windows(2).any(|w| w == ["--extractor-args", "youtube:player_client=android"]));
        assert_eq!(args.last().unwrap(), "https://www.youtube.com/watch?v=abc");
        assert!(!args.iter().any(|a| a == "--cookies-from-browser"));
    }

    #[test]
    fn test_player_client_only_for_youtube() {
        let config = ExtractorConfig {
            player_client: Some("web".to_string()),
            ..ExtractorConfig::default()
        };
        let args = extractor(config).probe_args("https://vimeo.com/1");
        assert!(!args.iter().any(|a| a == "--extractor-args"));
    }

    #[test]
    fn test_fetch_args_select_format_and_template() {
        let template = Path::new("/music/.ytgrab-1/audio.%(ext)s");
        let args = extractor(ExtractorConfig::default()).fetch_args("u", "140", template);

        assert_eq!(&args[..4], ["-f", "140", "-o", "/music/.ytgrab-1/audio.%(ext)s"]);
        assert!(args.windows(2).any(|w| w == ["--print", "after_move:filepath"]));
        assert!(args.iter().any(|a| a == "--no-simulate"));
    }

    #[test]
    fn test_printed_path_takes_last_line() {
        let stdout = b"some notice\n/tmp/x/video.webm\n\n";
        assert_eq!(
            YtDlpExtractor::printed_path(stdout),
            Some(PathBuf::from("/tmp/x/video.webm"))
        );
        assert_eq!(YtDlpExtractor::printed_path(b"  \n"), None);
    }
}
