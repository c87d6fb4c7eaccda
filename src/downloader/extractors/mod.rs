// Stream extractors
//
// The only production extractor drives the `yt-dlp` binary: `--dump-json`
// for probing and `-f <format_id>` for fetching one descriptor.

mod diagnostics;
mod ytdlp;

pub use diagnostics::{diagnose_error, FailureReason};
pub use ytdlp::YtDlpExtractor;
