//! Content sources: where profiles and posts come from
//!
//! The core abstraction is the [`ContentSource`] trait. It resolves a profile
//! name, pages lazily through the profile's posts and writes a single post's
//! media to disk. Two implementations are provided:
//!
//! - [`HttpContentSource`]: talks to the remote web API with `reqwest`
//! - [`MemoryContentSource`]: scripted, in-memory source for offline use and tests
//!
//! ## Usage
//!
//! ```no_run
//! use futures::TryStreamExt;
//! use imagefeed_dl::Config;
//! use imagefeed_dl::source::{ContentSource, HttpContentSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = HttpContentSource::new(&Config::default())?;
//!     let profile = source.resolve_profile("nasa").await?;
//!
//!     let mut posts = source.posts(&profile);
//!     if let Some(post) = posts.try_next().await? {
//!         println!("latest post: {} ({})", post.shortcode, post.kind);
//!     }
//!     Ok(())
//! }
//! ```

mod http;
mod memory;

pub use http::HttpContentSource;
pub use memory::{MemoryContentSource, memory_post};

use crate::error::{AuthenticationError, Result};
use crate::types::{Credentials, PostDescriptor, ProfileHandle};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::path::Path;

/// Lazy, forward-only sequence of a profile's posts
///
/// Pages are requested only as the stream is polled; dropping the stream
/// stops pagination.
pub type PostStream<'a> = BoxStream<'a, Result<PostDescriptor>>;

/// Trait for the remote service the pipeline downloads from
///
/// Implementations must perform requests one at a time; callers never issue
/// concurrent calls on the same source.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Log in to the service
    ///
    /// # Errors
    ///
    /// - [`AuthenticationError::InvalidArgument`] for empty input
    /// - [`AuthenticationError::InvalidCredentials`] if the service rejects the login
    /// - [`AuthenticationError::TwoFactorRequired`] if a second factor is needed
    ///
    /// Sources without login support reject every attempt.
    async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        let _ = credentials;
        Err(AuthenticationError::InvalidArgument(format!(
            "{} does not support login",
            self.name()
        ))
        .into())
    }

    /// Look up a profile by name
    ///
    /// # Errors
    ///
    /// - [`ResolutionError::ProfileNotFound`](crate::error::ResolutionError::ProfileNotFound)
    /// - [`ResolutionError::ProfileForbidden`](crate::error::ResolutionError::ProfileForbidden)
    ///   when the profile is private and not followed
    async fn resolve_profile(&self, name: &str) -> Result<ProfileHandle>;

    /// The profile's posts, most recent first
    fn posts<'a>(&'a self, profile: &'a ProfileHandle) -> PostStream<'a>;

    /// Write the post's primary image, and possibly auxiliary files, under `destination`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Materialization`](crate::Error::Materialization) naming the post.
    async fn materialize(&self, post: &PostDescriptor, destination: &Path) -> Result<()>;

    /// Human-readable name for logging
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests;
