//! Run orchestration: login, resolve, fetch, reconcile
//!
//! [`ImageDownloader`] wires a [`ContentSource`] and a [`Filesystem`] to the
//! fetcher and reconciler and broadcasts [`Event`]s while it works.

use crate::config::Config;
use crate::error::Result;
use crate::fetcher::fetch;
use crate::fs::{Filesystem, LocalFilesystem};
use crate::reconciler::{ReconcileReport, reconcile};
use crate::source::{ContentSource, HttpContentSource};
use crate::types::{DownloadRequest, DownloadTarget, Event, ProfileHandle, RunOutcome};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Capacity of the event channel
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Result of a complete run
#[must_use]
#[derive(Clone, Debug)]
pub struct RunReport {
    /// The resolved profile
    pub profile: ProfileHandle,
    /// Requested vs. materialized image count
    pub outcome: RunOutcome,
    /// Directory the images were written to
    pub target: PathBuf,
    /// Reconciler result, `None` when cleanup is disabled
    pub cleanup: Option<ReconcileReport>,
}

/// Downloads image posts from one profile per run
///
/// # Example
///
/// ```no_run
/// use imagefeed_dl::{Config, DownloadRequest, ImageDownloader};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let downloader = ImageDownloader::with_http_source(Config::default())?;
///
///     let report = downloader.run(&DownloadRequest::new("nasa", 10)).await?;
///     println!(
///         "downloaded {}/{} images into {:?}",
///         report.outcome.materialized, report.outcome.requested, report.target
///     );
///     Ok(())
/// }
/// ```
pub struct ImageDownloader {
    config: Arc<Config>,
    source: Arc<dyn ContentSource>,
    fs: Arc<dyn Filesystem>,
    event_tx: broadcast::Sender<Event>,
}

impl ImageDownloader {
    /// Create a downloader over an explicit source and filesystem
    ///
    /// # Errors
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is invalid
    pub fn new(
        config: Config,
        source: Arc<dyn ContentSource>,
        fs: Arc<dyn Filesystem>,
    ) -> Result<Self> {
        config.validate()?;
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Ok(Self {
            config: Arc::new(config),
            source,
            fs,
            event_tx,
        })
    }

    /// Create a downloader that talks to the remote service and writes to local disk
    pub fn with_http_source(config: Config) -> Result<Self> {
        config.validate()?;
        let source = HttpContentSource::new(&config)?;
        Self::new(config, Arc::new(source), Arc::new(LocalFilesystem))
    }

    /// Subscribe to run events
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Perform one run
    ///
    /// 1. Log in, if the request carries credentials
    /// 2. Resolve the profile and check its name is a safe directory name
    ///    (nothing touches disk before this succeeds)
    /// 3. Fetch up to `target_count` image posts into `<download_dir>/<username>`
    /// 4. Remove non-media files, if cleanup is enabled
    ///
    /// Fewer images than requested is reported through
    /// [`RunOutcome`], not as an error.
    pub async fn run(&self, request: &DownloadRequest) -> Result<RunReport> {
        if let Some(credentials) = &request.credentials {
            self.source.authenticate(credentials).await?;
            info!(username = %credentials.username, "authenticated");
            self.event_tx
                .send(Event::Authenticated {
                    username: credentials.username.clone(),
                })
                .ok();
        }

        let profile = self.source.resolve_profile(&request.profile_name).await?;
        let target = DownloadTarget::for_profile(self.config.download_dir(), &profile)?;
        self.event_tx
            .send(Event::ProfileResolved {
                username: profile.username.clone(),
            })
            .ok();

        let outcome = fetch(
            self.source.as_ref(),
            self.fs.as_ref(),
            &profile,
            &target,
            request.target_count,
            &self.event_tx,
        )
        .await?;

        let cleanup = if self.config.cleanup.enabled {
            Some(self.cleanup(&target).await?)
        } else {
            debug!(target = ?target.path(), "cleanup disabled, skipping");
            None
        };

        Ok(RunReport {
            profile,
            outcome,
            target: target.path().to_path_buf(),
            cleanup,
        })
    }

    /// Run the reconciler alone over `target` with the configured policy
    pub async fn cleanup(&self, target: &DownloadTarget) -> Result<ReconcileReport> {
        reconcile(
            self.fs.as_ref(),
            target,
            &self.config.cleanup.retention,
            &self.event_tx,
        )
        .await
    }
}
