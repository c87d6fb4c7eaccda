use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use ytgrab_lib::downloader::config::default_destination;
use ytgrab_lib::downloader::tools::ToolManager;
use ytgrab_lib::{DownloadEvent, DownloadRequest, DownloadResult, Downloader, DownloaderConfig};

/// Download audio or video, pick the best streams, merge and tag them
#[derive(Debug, Parser)]
#[command(name = "ytgrab", version, about)]
struct Cli {
    /// Print the final result as JSON on stdout
    #[arg(long, global = true)]
    json: bool,

    /// SOCKS5/HTTP proxy for extraction and thumbnail fetches
    #[arg(long, global = true)]
    proxy: Option<String>,

    /// cookies.txt passed to yt-dlp
    #[arg(long, global = true)]
    cookies: Option<String>,

    /// Fail the download when tags cannot be written
    #[arg(long, global = true)]
    strict_metadata: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Best audio track, converted to MP3 unless --keep-native
    Audio {
        url: String,
        /// Destination folder (default: Downloads)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Keep the extractor's container (usually M4A)
        #[arg(long)]
        keep_native: bool,
    },
    /// Best video and best audio merged into one file
    Video {
        url: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show detected yt-dlp / ffmpeg installations
    Tools,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ytgrab_lib=info,ytgrab=info")),
        )
        .init();
}

fn build_config(cli: &Cli) -> Result<DownloaderConfig, String> {
    let mut config = DownloaderConfig::from_env().map_err(|e| format!("Invalid YTGRAB_* setting: {}", e))?;
    if let Some(proxy) = &cli.proxy {
        config = config.with_proxy(Some(proxy.clone()));
    }
    if let Some(cookies) = &cli.cookies {
        config = config.with_cookies_path(Some(cookies.clone()));
    }
    if cli.strict_metadata {
        config = config.with_strict_metadata(true);
    }
    Ok(config)
}

fn print_tools() -> ExitCode {
    let tools = ToolManager::new().get_all_tools();
    for tool in &tools {
        match (&tool.path, &tool.version) {
            (Some(path), Some(version)) => println!("{:<8} {} ({})", tool.name, version, path),
            (Some(path), None) => println!("{:<8} found at {} but not runnable", tool.name, path),
            _ => println!("{:<8} not found", tool.name),
        }
    }

    if tools.iter().all(|t| t.is_available) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_result(result: &DownloadResult, destination: &Path, json: bool) {
    if json {
        match serde_json::to_string_pretty(result) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize result: {}", e),
        }
        return;
    }

    for warning in &result.warnings {
        eprintln!("warning: {}", warning);
    }
    if result.success {
        if let Some(filename) = &result.filename {
            println!("{}", destination.join(filename).display());
        }
    } else {
        eprintln!("{}", result.error.as_deref().unwrap_or("Download failed"));
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let (url, destination, request) = match &cli.command {
        Command::Tools => return print_tools(),
        Command::Audio {
            url,
            output,
            keep_native,
        } => (url, output, Some(!*keep_native)),
        Command::Video { url, output } => (url, output, None),
    };
    let destination = destination.clone().unwrap_or_else(default_destination);
    let request = match request {
        Some(convert_to_mp3) => DownloadRequest::Audio {
            url: url.clone(),
            destination: destination.clone(),
            convert_to_mp3,
        },
        None => DownloadRequest::Video {
            url: url.clone(),
            destination: destination.clone(),
        },
    };

    let downloader = match build_config(&cli).and_then(|c| Downloader::new(c).map_err(|e| e.to_string())) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut task = downloader.spawn(request);
    let mut finished = None;
    while let Some(event) = task.next_event().await {
        match event {
            DownloadEvent::Stage(stage) if !cli.json => eprintln!("==> {}", stage),
            DownloadEvent::Stage(_) => {}
            // warnings are printed with the result
            DownloadEvent::Warning(_) => {}
            DownloadEvent::Finished(result) => finished = Some(result),
        }
    }
    let result = match finished {
        Some(result) => result,
        None => task.join().await,
    };

    print_result(&result, &destination, cli.json);
    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
