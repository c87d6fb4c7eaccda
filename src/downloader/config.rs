// Runtime configuration for the downloader

use std::path::PathBuf;

use serde::Deserialize;

/// Settings passed to the yt-dlp extractor
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// SOCKS5/HTTP proxy URL
    pub proxy: Option<String>,
    /// Path to cookies.txt file
    pub cookies_path: Option<String>,
    /// Use cookies from browser (Chrome)
    pub cookies_from_browser: bool,
    /// YouTube player client (android, web, tv)
    pub player_client: Option<String>,
    /// Timeout for `probe` in seconds
    pub probe_timeout_seconds: u64,
    /// Timeout for a single `fetch` in seconds
    pub fetch_timeout_seconds: u64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            cookies_path: None,
            cookies_from_browser: false,
            player_client: None,
            probe_timeout_seconds: 60,
            fetch_timeout_seconds: 3600,
        }
    }
}

/// Target profile for the compressed-audio conversion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionProfile {
    pub bitrate_kbps: u32,
    pub sample_rate: u32,
}

impl ConversionProfile {
    pub const EXTENSION: &'static str = "mp3";
}

impl Default for ConversionProfile {
    fn default() -> Self {
        Self {
            bitrate_kbps: 192,
            sample_rate: 44_100,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DownloaderConfig {
    pub extractor: ExtractorConfig,
    /// Explicit yt-dlp binary, otherwise discovered
    pub ytdlp_path: Option<String>,
    /// Explicit ffmpeg binary, otherwise discovered
    pub ffmpeg_path: Option<String>,
    /// Timeout for ffmpeg runs in seconds
    pub ffmpeg_timeout_seconds: u64,
    pub conversion: ConversionProfile,
    /// Timeout for thumbnail / caption fetches in seconds
    pub http_timeout_seconds: u64,
    /// Caption language searched for lyrics
    pub lyrics_language: String,
    pub album_placeholder: String,
    pub artist_placeholder: String,
    /// Fail the request when tags cannot be written
    pub strict_metadata: bool,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            ytdlp_path: None,
            ffmpeg_path: None,
            ffmpeg_timeout_seconds: 1800,
            conversion: ConversionProfile::default(),
            http_timeout_seconds: 10,
            lyrics_language: "en".to_string(),
            album_placeholder: "Unknown Album".to_string(),
            artist_placeholder: "Unknown Artist".to_string(),
            strict_metadata: false,
        }
    }
}

/// `YTGRAB_*` environment overrides
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    proxy: Option<String>,
    cookies_path: Option<String>,
    cookies_from_browser: Option<bool>,
    player_client: Option<String>,
    probe_timeout: Option<u64>,
    fetch_timeout: Option<u64>,
    ytdlp_path: Option<String>,
    ffmpeg_path: Option<String>,
    ffmpeg_timeout: Option<u64>,
    mp3_bitrate: Option<u32>,
    mp3_sample_rate: Option<u32>,
    http_timeout: Option<u64>,
    lyrics_language: Option<String>,
    strict_metadata: Option<bool>,
}

impl DownloaderConfig {
    /// Defaults overlaid with `YTGRAB_*` environment variables
    pub fn from_env() -> Result<Self, envy::Error> {
        let overrides = envy::prefixed("YTGRAB_").from_env::<EnvOverrides>()?;
        Ok(Self::default().apply(overrides))
    }

    fn apply(mut self, env: EnvOverrides) -> Self {
        if env.proxy.is_some() {
            self.extractor.proxy = env.proxy;
        }
        if env.cookies_path.is_some() {
            self.extractor.cookies_path = env.cookies_path;
        }
        if let Some(enabled) = env.cookies_from_browser {
            self.extractor.cookies_from_browser = enabled;
        }
        if env.player_client.is_some() {
            self.extractor.player_client = env.player_client;
        }
        if let Some(secs) = env.probe_timeout {
            self.extractor.probe_timeout_seconds = secs;
        }
        if let Some(secs) = env.fetch_timeout {
            self.extractor.fetch_timeout_seconds = secs;
        }
        if env.ytdlp_path.is_some() {
            self.ytdlp_path = env.ytdlp_path;
        }
        if env.ffmpeg_path.is_some() {
            self.ffmpeg_path = env.ffmpeg_path;
        }
        if let Some(secs) = env.ffmpeg_timeout {
            self.ffmpeg_timeout_seconds = secs;
        }
        if let Some(kbps) = env.mp3_bitrate {
            self.conversion.bitrate_kbps = kbps;
        }
        if let Some(rate) = env.mp3_sample_rate {
            self.conversion.sample_rate = rate;
        }
        if let Some(secs) = env.http_timeout {
            self.http_timeout_seconds = secs;
        }
        if let Some(lang) = env.lyrics_language {
            self.lyrics_language = lang;
        }
        if let Some(strict) = env.strict_metadata {
            self.strict_metadata = strict;
        }
        self
    }

    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.extractor.proxy = proxy;
        self
    }

    pub fn with_cookies_path(mut self, path: Option<String>) -> Self {
        self.extractor.cookies_path = path;
        self
    }

    pub fn with_cookies_from_browser(mut self, enabled: bool) -> Self {
        self.extractor.cookies_from_browser = enabled;
        self
    }

    pub fn with_ffmpeg_path(mut self, path: Option<String>) -> Self {
        self.ffmpeg_path = path;
        self
    }

    pub fn with_ytdlp_path(mut self, path: Option<String>) -> Self {
        self.ytdlp_path = path;
        self
    }

    pub fn with_lyrics_language(mut self, language: impl Into<String>) -> Self {
        self.lyrics_language = language.into();
        self
    }

    pub fn with_strict_metadata(mut self, strict: bool) -> Self {
        self.strict_metadata = strict;
        self
    }
}

/// Platform Downloads directory, or the working directory
pub fn default_destination() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DownloaderConfig::default();
        assert_eq!(config.conversion.bitrate_kbps, 192);
        assert_eq!(config.conversion.sample_rate, 44_100);
        assert_eq!(config.lyrics_language, "en");
        assert_eq!(config.album_placeholder, "Unknown Album");
        assert!(!config.strict_metadata);
    }

    #[test]
    fn test_env_overrides_apply_only_present_fields() {
        let overrides = EnvOverrides {
            proxy: Some("socks5h://127.0.0.1:1080".to_string()),
            mp3_bitrate: Some(320),
            strict_metadata: Some(true),
            ..EnvOverrides::default()
        };

        let config = DownloaderConfig::default()
            .with_lyrics_language("de")
            .apply(overrides);

        assert_eq!(config.extractor.proxy.as_deref(), Some("socks5h://127.0.0.1:1080"));
        assert_eq!(config.conversion.bitrate_kbps, 320);
        assert_eq!(config.conversion.sample_rate, 44_100);
        assert_eq!(config.lyrics_language, "de");
        assert!(config.strict_metadata);
    }

    #[test]
    fn test_envy_reads_prefixed_vars() {
        let vars = vec![
            ("YTGRAB_FFMPEG_PATH".to_string(), "/opt/ffmpeg".to_string()),
            ("YTGRAB_HTTP_TIMEOUT".to_string(), "25".to_string()),
            ("UNRELATED".to_string(), "x".to_string()),
        ];
        let overrides = envy::prefixed("YTGRAB_")
            .from_iter::<_, EnvOverrides>(vars)
            .unwrap();
        let config = DownloaderConfig::default().apply(overrides);
        assert_eq!(config.ffmpeg_path.as_deref(), Some("/opt/ffmpeg"));
        assert_eq!(config.http_timeout_seconds, 25);
    }
}
