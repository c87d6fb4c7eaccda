// Lyrics from caption tracks
//
// Absent lyrics are never an error: every failure here collapses to `None`.

use std::collections::HashMap;

use super::models::{CaptionTrack, ProbeResult};
use super::traits::HttpFetcher;

const PREFERRED_CAPTION_EXT: &str = "vtt";
const HEADER_PREFIXES: [&str; 4] = ["WEBVTT", "Kind:", "Language:", "NOTE"];

/// Caption track to read lyrics from: automatic captions in `language`
/// first, then authored subtitles, each preferring WebVTT
pub fn select_track<'a>(probe: &'a ProbeResult, language: &str) -> Option<&'a CaptionTrack> {
    pick_from(&probe.automatic_captions, language).or_else(|| pick_from(&probe.subtitles, language))
}

fn pick_from<'a>(tracks: &'a HashMap<String, Vec<CaptionTrack>>, language: &str) -> Option<&'a CaptionTrack> {
    let candidates = tracks.get(language)?;
    candidates
        .iter()
        .find(|t| {
            t.ext
                .as_deref()
                .map_or(false, |e| e.eq_ignore_ascii_case(PREFERRED_CAPTION_EXT))
        })
        .or_else(|| candidates.first())
}

/// Strip cue timings, blank lines and header lines. Repeated lines are kept.
pub fn clean_caption_text(raw: &str) -> Option<String> {
    let lines: Vec<&str> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| !line.contains("-->"))
        .filter(|line| !HEADER_PREFIXES.iter().any(|p| line.starts_with(p)))
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Fetch and clean the best caption track, if any
pub async fn fetch_lyrics(http: &dyn HttpFetcher, probe: &ProbeResult, language: &str) -> Option<String> {
    let track = select_track(probe, language)?;

    match http.get_text(&track.url).await {
        Ok(raw) => clean_caption_text(&raw),
        Err(e) => {
            tracing::debug!(url = %track.url, error = %e, "caption fetch failed, skipping lyrics");
            None
        }
    }
}
