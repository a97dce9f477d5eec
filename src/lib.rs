//! # imagefeed-dl
//!
//! Selective image downloader for social media profiles.
//!
//! Given a profile name and a count `N`, imagefeed-dl walks the profile's
//! posts from most recent to oldest, downloads the first `N` single-image
//! posts into a per-profile directory and then removes the caption, archive
//! and metadata files the service leaves next to the images.
//!
//! ## Design
//!
//! - **Lazy** - pages of posts are requested only while more images are needed
//! - **Pluggable** - the remote service sits behind the [`ContentSource`](source::ContentSource) trait
//! - **Event-driven** - consumers subscribe to [`Event`]s instead of polling
//!
//! ## Quick Start
//!
//! ```no_run
//! use imagefeed_dl::{Config, DownloadRequest, ImageDownloader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut config = Config::default();
//!     config.download.download_dir = "downloads".into();
//!
//!     let downloader = ImageDownloader::with_http_source(config)?;
//!
//!     let mut events = downloader.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let report = downloader.run(&DownloadRequest::new("nasa", 10)).await?;
//!     println!("{}/{} images", report.outcome.materialized, report.outcome.requested);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Run orchestration
pub mod downloader;
/// Error types
pub mod error;
/// Selective fetching of image posts
pub mod fetcher;
/// Filesystem seam
pub mod fs;
/// Request pacing
pub mod pacing;
/// Artifact reconciliation
pub mod reconciler;
/// Retry logic with exponential backoff
pub mod retry;
/// Content sources
pub mod source;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use config::{CleanupConfig, Config, DownloadConfig, RemoteConfig, RetryConfig};
pub use downloader::{ImageDownloader, RunReport};
pub use error::{
    AuthenticationError, Error, ErrorDetail, MaterializationError, ReconciliationFileError,
    ResolutionError, Result,
};
pub use fetcher::fetch;
pub use fs::{Filesystem, LocalFilesystem};
pub use reconciler::{ReconcileReport, RetentionPolicy, reconcile};
pub use source::{ContentSource, HttpContentSource, MemoryContentSource};
pub use types::{
    Credentials, DownloadRequest, DownloadTarget, Event, MediaKind, PostDescriptor,
    ProfileHandle, RunOutcome,
};
