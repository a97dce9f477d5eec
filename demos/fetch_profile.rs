//! Fetch profile example
//!
//! Downloads the most recent image posts of one profile and strips the
//! caption and metadata files afterwards.
//!
//! ```bash
//! cargo run --example fetch_profile -- nasa --count 10
//! IMAGEFEED_PASSWORD=secret cargo run --example fetch_profile -- friend --login me
//! ```

use clap::Parser;
use imagefeed_dl::{Config, Credentials, DownloadRequest, ErrorDetail, Event, ImageDownloader};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the login password
const PASSWORD_ENV: &str = "IMAGEFEED_PASSWORD";

#[derive(Debug, Parser)]
#[command(name = "fetch_profile", about = "Download the latest image posts of a profile")]
struct Args {
    /// Profile to download from
    profile: String,

    /// Number of images to download
    #[arg(short = 'n', long, default_value_t = 10)]
    count: usize,

    /// Log in as this user before resolving the profile
    #[arg(long, value_name = "USER")]
    login: Option<String>,

    /// JSON configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the download directory
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Keep caption and metadata files
    #[arg(long)]
    no_cleanup: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let detail = ErrorDetail::from(e);
            match serde_json::to_string_pretty(&detail) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{}: {}", detail.code, detail.message),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> imagefeed_dl::Result<()> {
    let mut config = match &args.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };
    if let Some(output) = args.output {
        config.download.download_dir = output;
    }
    if args.no_cleanup {
        config.cleanup.enabled = false;
    }

    let downloader = ImageDownloader::with_http_source(config)?;

    let mut events = downloader.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                Event::PostMaterialized {
                    id,
                    materialized,
                    requested,
                } => println!("✓ [{materialized}/{requested}] post {id}"),
                Event::PostSkipped { id, kind } => println!("  skipped {kind} post {id}"),
                Event::FileRemovalFailed { path, error } => {
                    println!("✗ could not remove {}: {error}", path.display())
                }
                _ => {}
            }
        }
    });

    let mut request = DownloadRequest::new(args.profile, args.count);
    if let Some(user) = args.login {
        let secret = std::env::var(PASSWORD_ENV).unwrap_or_default();
        request = request.with_credentials(Credentials::new(user, secret));
    }

    let report = downloader.run(&request).await?;

    println!(
        "\nDownloaded {}/{} images from @{} into {}",
        report.outcome.materialized,
        report.outcome.requested,
        report.profile.username,
        report.target.display()
    );
    if let Some(cleanup) = report.cleanup {
        println!(
            "Removed {} files ({} failed)",
            cleanup.removed.len(),
            cleanup.failed.len()
        );
    }

    Ok(())
}
