// Metadata embedding for produced audio files
//
// M4A/MP4 files carry atom tags (mp4ameta), MP3 files carry ID3v2.3 (id3).
// When a conversion replaces the M4A with an MP3, the M4A's tags are
// translated field by field into ID3 frames.

use std::path::{Path, PathBuf};

use id3::frame::{Content, Lyrics, Picture, PictureType};
use id3::{Frame, TagLike, Version};
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use mp4ameta::Img;
use time::macros::format_description;
use time::Date;

use super::config::DownloaderConfig;
use super::errors::DownloadError;
use super::models::{ProbeResult, TrackMetadata};
use super::traits::HttpFetcher;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8];
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const LYRICS_LANGUAGE: &str = "eng";
const COVER_DESCRIPTION: &str = "Cover";
const JPEG_QUALITY: u8 = 90;

impl TrackMetadata {
    /// Tags derived from the extractor's description of the item.
    /// Cover and lyrics are fetched separately.
    pub fn from_probe(probe: &ProbeResult, config: &DownloaderConfig) -> Self {
        let artist = probe
            .artist
            .clone()
            .or_else(|| probe.uploader.clone())
            .unwrap_or_else(|| config.artist_placeholder.clone());
        let album = probe
            .album
            .clone()
            .unwrap_or_else(|| config.album_placeholder.clone());

        Self {
            title: probe.title.clone(),
            artist,
            album,
            year: probe.upload_date.as_deref().and_then(release_year),
            cover: None,
            lyrics: None,
        }
    }
}

/// Year from a `YYYYMMDD` upload date; any other shape yields its first
/// four characters as they are
pub fn release_year(upload_date: &str) -> Option<String> {
    let upload_date = upload_date.trim();
    let format = format_description!("[year][month][day]");
    if let Ok(date) = Date::parse(upload_date, &format) {
        return Some(format!("{:04}", date.year()));
    }

    let prefix: String = upload_date.chars().take(4).collect();
    if prefix.is_empty() {
        None
    } else {
        Some(prefix)
    }
}

/// MIME type of an image by its signature, JPEG when unrecognized
pub fn sniff_image_mime(data: &[u8]) -> &'static str {
    match data {
        d if d.starts_with(JPEG_MAGIC) => "image/jpeg",
        d if d.starts_with(PNG_MAGIC) => "image/png",
        _ => "image/jpeg",
    }
}

fn is_webp(url: &str, data: &[u8]) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.to_ascii_lowercase().ends_with(".webp")
        || (data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP")
}

/// Decode a WebP image and re-encode it as baseline JPEG
pub fn webp_to_jpeg(data: &[u8]) -> Result<Vec<u8>, DownloadError> {
    let decoded = image::load_from_memory_with_format(data, ImageFormat::WebP)
        .map_err(|e| DownloadError::MetadataEmbedFailed(format!("cover decode: {}", e)))?;
    let rgb = decoded.to_rgb8();

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|e| DownloadError::MetadataEmbedFailed(format!("cover encode: {}", e)))?;
    Ok(jpeg)
}

/// Fetch the highest-resolution thumbnail; WebP is transcoded to JPEG
pub async fn fetch_cover_art(
    http: &dyn HttpFetcher,
    probe: &ProbeResult,
) -> Result<Option<Vec<u8>>, DownloadError> {
    let Some(thumbnail) = probe.best_thumbnail() else {
        return Ok(None);
    };

    tracing::debug!(url = %thumbnail.url, "fetching cover art");
    let data = http.get_bytes(&thumbnail.url).await?;
    if data.is_empty() {
        return Ok(None);
    }

    if is_webp(&thumbnail.url, &data) {
        let url = thumbnail.url.clone();
        let jpeg = tokio::task::spawn_blocking(move || webp_to_jpeg(&data))
            .await
            .map_err(|e| DownloadError::MetadataEmbedFailed(e.to_string()))??;
        tracing::debug!(url = %url, bytes = jpeg.len(), "cover transcoded to jpeg");
        return Ok(Some(jpeg));
    }

    Ok(Some(data))
}

fn embed_failure(e: impl std::fmt::Display) -> DownloadError {
    DownloadError::MetadataEmbedFailed(e.to_string())
}

fn is_mp4_family(ext: &str) -> bool {
    matches!(ext, "m4a" | "mp4" | "m4b" | "mov")
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Write `meta` into `tag`. Artwork is always declared JPEG.
pub fn apply_to_mp4(tag: &mut mp4ameta::Tag, meta: &TrackMetadata) {
    tag.set_title(meta.title.clone());
    tag.set_artist(meta.artist.clone());
    tag.set_album(meta.album.clone());
    if let Some(year) = &meta.year {
        tag.set_year(year.clone());
    }
    if let Some(cover) = &meta.cover {
        tag.set_artwork(Img::jpeg(cover.clone()));
    }
    if let Some(lyrics) = &meta.lyrics {
        tag.set_lyrics(lyrics.clone());
    }
}

/// Read back what an MP4 tag carries, for translation to another scheme
pub fn from_mp4_tag(tag: &mp4ameta::Tag) -> TrackMetadata {
    TrackMetadata {
        title: tag.title().unwrap_or_default().to_string(),
        artist: tag.artist().unwrap_or_default().to_string(),
        album: tag.album().unwrap_or_default().to_string(),
        year: tag.year().map(str::to_string),
        cover: tag.artwork().map(|img| img.data.to_vec()),
        lyrics: tag.lyrics().map(str::to_string),
    }
}

/// ID3 frames for `meta`: TIT2/TPE1/TALB, TYER, USLT, APIC
pub fn to_id3_tag(meta: &TrackMetadata) -> id3::Tag {
    let mut tag = id3::Tag::new();
    tag.set_title(meta.title.clone());
    tag.set_artist(meta.artist.clone());
    tag.set_album(meta.album.clone());

    if let Some(year) = &meta.year {
        match year.parse::<i32>() {
            Ok(y) => tag.set_year(y),
            Err(_) => tag.set_text("TYER", year.clone()),
        }
    }

    if let Some(lyrics) = &meta.lyrics {
        tag.add_frame(Frame::with_content(
            "USLT",
            Content::Lyrics(Lyrics {
                lang: LYRICS_LANGUAGE.to_string(),
                description: String::new(),
                text: lyrics.clone(),
            }),
        ));
    }

    if let Some(cover) = &meta.cover {
        tag.add_frame(Frame::with_content(
            "APIC",
            Content::Picture(Picture {
                mime_type: sniff_image_mime(cover).to_string(),
                picture_type: PictureType::CoverFront,
                description: COVER_DESCRIPTION.to_string(),
                data: cover.clone(),
            }),
        ));
    }

    tag
}

fn embed_blocking(path: &Path, meta: &TrackMetadata) -> Result<(), DownloadError> {
    let ext = extension_of(path);
    if is_mp4_family(&ext) {
        let mut tag = mp4ameta::Tag::read_from_path(path).map_err(embed_failure)?;
        apply_to_mp4(&mut tag, meta);
        tag.write_to_path(path).map_err(embed_failure)
    } else if ext == "mp3" {
        to_id3_tag(meta)
            .write_to_path(path, Version::Id3v23)
            .map_err(embed_failure)
    } else {
        Err(DownloadError::MetadataEmbedFailed(format!(
            "no tag writer for .{} files",
            ext
        )))
    }
}

/// Write tags into `path`, choosing the scheme by extension
pub async fn embed(path: &Path, meta: &TrackMetadata) -> Result<(), DownloadError> {
    let path_buf = path.to_path_buf();
    let meta = meta.clone();
    tokio::task::spawn_blocking(move || embed_blocking(&path_buf, &meta))
        .await
        .map_err(embed_failure)?
}

/// Copy the MP4 tags of `source` into `destination` as ID3v2.3
pub async fn translate_tags(source: &Path, destination: &Path) -> Result<(), DownloadError> {
    let (source, destination): (PathBuf, PathBuf) = (source.to_path_buf(), destination.to_path_buf());
    tokio::task::spawn_blocking(move || {
        let mp4 = mp4ameta::Tag::read_from_path(&source).map_err(embed_failure)?;
        let meta = from_mp4_tag(&mp4);
        to_id3_tag(&meta)
            .write_to_path(&destination, Version::Id3v23)
            .map_err(embed_failure)
    })
    .await
    .map_err(embed_failure)?
}

/// Whether `translate_tags` can read tags from this file
pub fn supports_translation(source: &Path) -> bool {
    is_mp4_family(&extension_of(source))
}
