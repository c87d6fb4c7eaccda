// Extractor failure diagnostics
//
// Classifies yt-dlp stderr into a short, user-facing reason so that
// `ExtractionFailed` messages say why a URL could not be resolved.

use serde::{Deserialize, Serialize};

/// Why the extractor could not resolve a URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// DRM / paid content, cannot be fetched at all
    DrmProtected,
    /// Requires channel membership
    MembersOnly,
    /// Needs a logged-in, age-verified session
    AgeRestricted,
    /// Private video
    PrivateVideo,
    /// Deleted, removed or otherwise gone
    Unavailable,
    /// Not available in the caller's region
    GeoBlocked,
    /// 429 / rate limiting / bot checks
    RateLimited,
    /// HTTP 403
    Forbidden,
    /// Network timeout or unreachable host
    NetworkTimeout,
    /// The URL is not recognized by any extractor
    UnsupportedUrl,
}

impl FailureReason {
    /// Human-readable description
    pub fn description(&self) -> &'static str {
        match self {
            Self::DrmProtected => "DRM-protected content",
            Self::MembersOnly => "Members-only content",
            Self::AgeRestricted => "Age-restricted content",
            Self::PrivateVideo => "Private video",
            Self::Unavailable => "Content unavailable",
            Self::GeoBlocked => "Not available in your region",
            Self::RateLimited => "Rate limited by the platform",
            Self::Forbidden => "Access denied (HTTP 403)",
            Self::NetworkTimeout => "Network timeout",
            Self::UnsupportedUrl => "Unsupported or invalid URL",
        }
    }

    /// Permanent restrictions never succeed on resubmission
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::DrmProtected | Self::Unavailable | Self::UnsupportedUrl
        )
    }
}

const PATTERNS: &[(FailureReason, &[&str])] = &[
    (
        FailureReason::DrmProtected,
        &["drm", "widevine", "playready", "fairplay", "requires purchase"],
    ),
    (
        FailureReason::MembersOnly,
        &["members only", "members-only", "join this channel", "available to members"],
    ),
    (
        FailureReason::AgeRestricted,
        &["age-restricted", "sign in to confirm your age", "age_verification"],
    ),
    (
        FailureReason::PrivateVideo,
        &["private video", "video is private"],
    ),
    (
        FailureReason::Unavailable,
        &[
            "video unavailable",
            "has been removed",
            "no longer available",
            "is unavailable",
            "http error 404",
        ],
    ),
    (
        FailureReason::GeoBlocked,
        &["not available in your country", "blocked in your country", "geo restricted", "geo-restricted"],
    ),
    (
        FailureReason::RateLimited,
        &["429", "too many requests", "rate limit", "confirm you're not a bot", "captcha"],
    ),
    (FailureReason::Forbidden, &["403", "forbidden"]),
    (
        FailureReason::NetworkTimeout,
        &["timed out", "timeout", "connection refused", "network is unreachable", "name or service not known"],
    ),
    (
        FailureReason::UnsupportedUrl,
        &["unsupported url", "is not a valid url", "invalid url"],
    ),
];

/// Match stderr against known failure patterns, most specific first
pub fn diagnose_error(error: &str) -> Option<FailureReason> {
    let lower = error.to_lowercase();

    PATTERNS
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| lower.contains(n)))
        .map(|(reason, _)| *reason)
}
