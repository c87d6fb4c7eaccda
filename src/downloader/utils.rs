// Helper functions shared by the pipelines and tool backends

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use regex::Regex;
use tokio::io::AsyncReadExt;
use tokio::process::Command as TokioCommand;
use tokio::time::{timeout, Duration as TokioDuration};
use uuid::Uuid;

use super::errors::DownloadError;

/// Run command with timeout (shared utility)
pub async fn run_output_with_timeout(
    program: &str,
    args: Vec<String>,
    timeout_secs: u64,
) -> Result<std::process::Output, DownloadError> {
    tracing::debug!(program, args = %args.join(" "), "spawning");

    let mut child = TokioCommand::new(program)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            ErrorKind::NotFound => DownloadError::ToolNotFound(program.to_string()),
            _ => DownloadError::Io(e),
        })?;

    let mut stdout_pipe = child.stdout.take().ok_or_else(|| {
        DownloadError::Io(std::io::Error::new(
            ErrorKind::BrokenPipe,
            format!("Failed to capture stdout from {}", program),
        ))
    })?;
    let mut stderr_pipe = child.stderr.take().ok_or_else(|| {
        DownloadError::Io(std::io::Error::new(
            ErrorKind::BrokenPipe,
            format!("Failed to capture stderr from {}", program),
        ))
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stdout_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        stderr_pipe.read_to_end(&mut buf).await.map(|_| buf)
    });

    let waited = timeout(TokioDuration::from_secs(timeout_secs), child.wait()).await;
    match waited {
        Ok(status_res) => {
            let status = status_res?;
            let stdout = join_pipe(stdout_task).await?;
            let stderr = join_pipe(stderr_task).await?;
            Ok(std::process::Output { status, stdout, stderr })
        }
        Err(_) => {
            let _ = child.kill().await;
            stdout_task.abort();
            stderr_task.abort();
            Err(DownloadError::Timeout(timeout_secs))
        }
    }
}

async fn join_pipe(
    task: tokio::task::JoinHandle<std::io::Result<Vec<u8>>>,
) -> Result<Vec<u8>, DownloadError> {
    task.await
        .map_err(|e| DownloadError::Io(std::io::Error::new(ErrorKind::Other, e.to_string())))?
        .map_err(DownloadError::Io)
}

lazy_static::lazy_static! {
    static ref UNSAFE_FILENAME_CHARS: Regex = Regex::new(r#"[\\/:*?"<>|]"#).unwrap();
}

/// Replace filesystem-unsafe characters with `_`
pub fn sanitize_title(title: &str) -> String {
    let sanitized = UNSAFE_FILENAME_CHARS.replace_all(title.trim(), "_");
    if sanitized.is_empty() {
        "Unknown".to_string()
    } else {
        sanitized.into_owned()
    }
}

fn candidate_names<'a>(folder: &'a Path, stem: &'a str, ext: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    std::iter::once(folder.join(format!("{}.{}", stem, ext)))
        .chain((1u32..).map(move |n| folder.join(format!("{}_{}.{}", stem, n, ext))))
}

/// Claim `<folder>/<stem>.<ext>`, or the first free `<stem>_<n>.<ext>`, by
/// creating it empty. Two callers never receive the same path and an
/// existing file is never reused.
pub async fn reserve_destination(folder: &Path, stem: &str, ext: &str) -> Result<PathBuf, DownloadError> {
    for candidate in candidate_names(folder, stem, ext) {
        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
            .await
        {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(DownloadError::Io(e)),
        }
    }

    Err(DownloadError::Io(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free name for {} in {}", stem, folder.display()),
    )))
}

/// Move a finished file from the workspace into `folder` under a reserved
/// unique name
pub async fn place_unique(source: &Path, folder: &Path, stem: &str, ext: &str) -> Result<PathBuf, DownloadError> {
    let target = reserve_destination(folder, stem, ext).await?;
    if let Err(e) = move_file(source, &target).await {
        remove_quietly(&target).await;
        return Err(e);
    }
    Ok(target)
}

/// Rename, falling back to copy + remove across filesystems
pub async fn move_file(from: &Path, to: &Path) -> Result<(), DownloadError> {
    match tokio::fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(error = %e, "rename failed, copying instead");
            tokio::fs::copy(from, to).await?;
            let _ = tokio::fs::remove_file(from).await;
            Ok(())
        }
    }
}

/// Best-effort removal, failures are only logged
pub async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::debug!(path = %path.display(), error = %e, "could not remove file");
        }
    }
}

/// Per-request scratch directory, removed on drop.
///
/// Named by a random token so concurrent requests into the same destination
/// folder never share temporary files.
#[derive(Debug)]
pub struct RequestWorkspace {
    path: PathBuf,
}

impl RequestWorkspace {
    pub async fn create(parent: &Path) -> Result<Self, DownloadError> {
        let path = parent.join(format!(".ytgrab-{}", Uuid::new_v4().simple()));
        tokio::fs::create_dir_all(&path).await?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// yt-dlp output template `<workspace>/<stem>.%(ext)s`
    pub fn template(&self, stem: &str) -> PathBuf {
        self.path.join(format!("{}.%(ext)s", stem))
    }
}

impl Drop for RequestWorkspace {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.path) {
            if e.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %e, "workspace cleanup failed");
            }
        }
    }
}

/// Locate the file yt-dlp produced for `<dir>/<stem>.%(ext)s`
pub fn find_by_stem(dir: &Path, stem: &str) -> Option<PathBuf> {
    let prefix = format!("{}.", stem);
    std::fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| {
                    n.starts_with(&prefix) && !n.ends_with(".part") && !n.ends_with(".ytdl")
                })
        })
}

#[cfg(test)]
pub(crate) fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("ytgrab-test-{}", Uuid::new_v4().simple()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
