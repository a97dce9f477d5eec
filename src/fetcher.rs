//! Selective fetcher: downloads up to N image posts from a profile
//!
//! Walks the profile's post stream in source order, skips anything that is
//! not a single image, and stops polling the stream as soon as the target
//! count is reached. A materialization failure aborts the whole fetch; files
//! already written stay on disk.

use crate::error::{Error, MaterializationError, Result};
use crate::fs::Filesystem;
use crate::source::ContentSource;
use crate::types::{DownloadTarget, Event, PostDescriptor, ProfileHandle, RunOutcome};
use futures::TryStreamExt;
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Filter applied to every post: only single still images are downloaded
///
/// Videos and multi-item sidecars are passed over without error.
pub fn accept(post: &PostDescriptor) -> bool {
    post.is_image()
}

/// Download up to `target_count` image posts of `profile` into `target`
///
/// The target directory is created if missing, even when `target_count` is
/// zero. Returns the requested and materialized counts; running out of posts
/// early is not an error.
///
/// # Errors
///
/// - [`Error::Io`] if the target directory cannot be created
/// - [`Error::Materialization`] on the first post that cannot be written
/// - whatever the source's stream yields when a page cannot be fetched
pub async fn fetch(
    source: &dyn ContentSource,
    fs: &dyn Filesystem,
    profile: &ProfileHandle,
    target: &DownloadTarget,
    target_count: usize,
    event_tx: &broadcast::Sender<Event>,
) -> Result<RunOutcome> {
    fs.ensure_directory(target.path()).await?;

    debug!(
        profile = %profile.username,
        target = ?target.path(),
        target_count,
        source = source.name(),
        "starting fetch"
    );

    let mut materialized = 0;
    let mut posts = source.posts(profile);

    while materialized < target_count {
        let Some(post) = posts.try_next().await? else {
            debug!(profile = %profile.username, "post stream exhausted");
            break;
        };

        if !accept(&post) {
            debug!(post = %post.shortcode, kind = %post.kind, "skipping non-image post");
            event_tx
                .send(Event::PostSkipped {
                    id: post.id.clone(),
                    kind: post.kind,
                })
                .ok();
            continue;
        }

        source
            .materialize(&post, target.path())
            .await
            .map_err(|e| as_materialization_failure(&post, e))?;
        materialized += 1;

        debug!(post = %post.shortcode, materialized, target_count, "materialized post");
        event_tx
            .send(Event::PostMaterialized {
                id: post.id.clone(),
                materialized,
                requested: target_count,
            })
            .ok();
    }

    let outcome = RunOutcome {
        requested: target_count,
        materialized,
    };

    info!(
        profile = %profile.username,
        requested = outcome.requested,
        materialized = outcome.materialized,
        "fetch complete"
    );
    event_tx.send(Event::FetchComplete { outcome }).ok();

    Ok(outcome)
}

fn as_materialization_failure(post: &PostDescriptor, error: Error) -> Error {
    match error {
        Error::Materialization(e) => Error::Materialization(e),
        other => MaterializationError::new(&post.shortcode, other.to_string()).into(),
    }
}
