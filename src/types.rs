//! Core types for imagefeed-dl

use crate::error::{ResolutionError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// A resolved remote profile
///
/// Produced once per run by [`ContentSource::resolve_profile`](crate::source::ContentSource::resolve_profile)
/// and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileHandle {
    /// Service-side numeric id, used to page the feed
    pub id: String,
    /// Canonical username as reported by the service
    pub username: String,
    /// Whether the profile is private
    pub is_private: bool,
    /// Total number of posts, if the service reported it
    pub post_count: Option<u64>,
}

impl ProfileHandle {
    /// Create a handle for a public profile
    pub fn new(id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            username: username.into(),
            is_private: false,
            post_count: None,
        }
    }
}

/// Classification of a post's media
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// A single still image
    Image,
    /// A video or reel
    Video,
    /// A multi-item carousel
    Sidecar,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Image => write!(f, "image"),
            MediaKind::Video => write!(f, "video"),
            MediaKind::Sidecar => write!(f, "sidecar"),
        }
    }
}

/// One item of a profile's content feed
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostDescriptor {
    /// Service-side id
    pub id: String,
    /// Short public code of the post
    pub shortcode: String,
    /// Media classification
    pub kind: MediaKind,
    /// URL of the primary image
    pub display_url: String,
    /// When the post was published
    pub taken_at: DateTime<Utc>,
    /// Caption text, if any
    pub caption: Option<String>,
}

impl PostDescriptor {
    /// Whether this post is a single still image
    pub fn is_image(&self) -> bool {
        self.kind == MediaKind::Image
    }

    /// File stem used for every artifact written for this post
    ///
    /// Format: `2024-01-31_18-04-05_UTC`
    pub fn file_stem(&self) -> String {
        format!("{}_UTC", self.taken_at.format("%Y-%m-%d_%H-%M-%S"))
    }
}

/// The per-profile destination directory
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadTarget {
    path: PathBuf,
}

impl DownloadTarget {
    /// The directory for `profile` under `base_dir`, named after the username
    ///
    /// # Errors
    /// Returns [`ResolutionError::UnsafeName`] unless the username is exactly
    /// one plain path component, so the target can never leave `base_dir`.
    pub fn for_profile(base_dir: &Path, profile: &ProfileHandle) -> Result<Self> {
        let name = profile.username.as_str();
        let mut components = Path::new(name).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(c)), None) if c == name
        );
        if !single_normal || name.contains(['/', '\\']) {
            return Err(ResolutionError::UnsafeName {
                name: name.to_string(),
            }
            .into());
        }

        Ok(Self {
            path: base_dir.join(name),
        })
    }

    /// Wrap an explicit directory path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Directory path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Requested vs. materialized image count for one fetch
#[must_use]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    /// How many image posts the caller asked for
    pub requested: usize,
    /// How many image posts were written
    pub materialized: usize,
}

impl RunOutcome {
    /// True when the full requested count was written
    pub fn is_complete(&self) -> bool {
        self.materialized >= self.requested
    }

    /// How many requested posts were not available
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.materialized)
    }
}

/// Login credentials
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account username
    pub username: String,
    /// Account password
    pub secret: String,
}

impl Credentials {
    /// Create a credentials pair
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Everything a caller supplies for one run
#[derive(Clone, Debug)]
pub struct DownloadRequest {
    /// Profile name as typed by the user
    pub profile_name: String,
    /// Maximum number of image posts to download
    pub target_count: usize,
    /// Optional login performed before resolving the profile
    pub credentials: Option<Credentials>,
}

impl DownloadRequest {
    /// Request `target_count` image posts from `profile_name`, anonymously
    pub fn new(profile_name: impl Into<String>, target_count: usize) -> Self {
        Self {
            profile_name: profile_name.into().trim().to_string(),
            target_count,
            credentials: None,
        }
    }

    /// Log in with these credentials before resolving the profile
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }
}

/// Progress events broadcast during a run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Login succeeded
    Authenticated {
        /// Account that logged in
        username: String,
    },

    /// The requested profile was resolved
    ProfileResolved {
        /// Canonical username
        username: String,
    },

    /// A post was passed over by the image filter
    PostSkipped {
        /// Post id
        id: String,
        /// Why it was skipped
        kind: MediaKind,
    },

    /// A post's image was written to disk
    PostMaterialized {
        /// Post id
        id: String,
        /// Images written so far
        materialized: usize,
        /// Images requested
        requested: usize,
    },

    /// The fetch loop ended
    FetchComplete {
        /// Final counts
        outcome: RunOutcome,
    },

    /// The reconciler deleted a file
    FileRemoved {
        /// Deleted file
        path: PathBuf,
    },

    /// The reconciler could not delete a file
    FileRemovalFailed {
        /// File that remains
        path: PathBuf,
        /// Error message
        error: String,
    },

    /// The reconciler finished
    CleanupComplete {
        /// Files deleted
        removed: usize,
        /// Files that could not be deleted
        failed: usize,
    },
}
