//! Scripted, in-memory content source

use super::{ContentSource, PostStream};
use crate::error::{AuthenticationError, Error, MaterializationError, ResolutionError, Result};
use crate::types::{Credentials, MediaKind, PostDescriptor, ProfileHandle};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::{StreamExt, stream};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug)]
struct MemoryProfile {
    handle: ProfileHandle,
    posts: Vec<PostDescriptor>,
    followed: bool,
}

/// [`ContentSource`] that serves fixed profiles from memory
///
/// Each materialized post produces `<id>.jpg` plus the kind of incidental
/// metadata a real service leaves behind (`<id>.txt`, `<id>.json.xz`).
/// The source counts how many descriptors were pulled from its streams and
/// which posts were materialized, so callers can check pagination behavior.
///
/// # Examples
///
/// ```
/// use imagefeed_dl::source::{ContentSource, MemoryContentSource, memory_post};
/// use imagefeed_dl::{MediaKind, ProfileHandle};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let source = MemoryContentSource::new().with_profile(
///     ProfileHandle::new("1", "alice"),
///     vec![memory_post("p1", MediaKind::Image), memory_post("p2", MediaKind::Video)],
/// );
///
/// let profile = source.resolve_profile("alice").await?;
/// assert_eq!(profile.username, "alice");
/// assert!(source.resolve_profile("ghost").await.is_err());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MemoryContentSource {
    profiles: HashMap<String, MemoryProfile>,
    account: Option<Credentials>,
    two_factor: bool,
    failing_posts: HashSet<String>,
    logged_in: AtomicBool,
    pulled: Arc<AtomicUsize>,
    materialized: Mutex<Vec<String>>,
}

impl MemoryContentSource {
    /// Create an empty source
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a public profile with its posts, most recent first
    pub fn with_profile(mut self, handle: ProfileHandle, posts: Vec<PostDescriptor>) -> Self {
        self.insert(handle, posts, true);
        self
    }

    /// Add a private profile; it resolves only after login if `followed` is true
    pub fn with_private_profile(
        mut self,
        mut handle: ProfileHandle,
        posts: Vec<PostDescriptor>,
        followed: bool,
    ) -> Self {
        handle.is_private = true;
        self.insert(handle, posts, followed);
        self
    }

    /// Accept exactly these credentials at login
    pub fn with_account(mut self, credentials: Credentials) -> Self {
        self.account = Some(credentials);
        self
    }

    /// Make the account demand a second factor
    pub fn with_two_factor(mut self) -> Self {
        self.two_factor = true;
        self
    }

    /// Fail materialization of the post with this id
    pub fn fail_on(mut self, post_id: impl Into<String>) -> Self {
        self.failing_posts.insert(post_id.into());
        self
    }

    fn insert(&mut self, mut handle: ProfileHandle, posts: Vec<PostDescriptor>, followed: bool) {
        handle.post_count = Some(posts.len() as u64);
        self.profiles.insert(
            handle.username.to_lowercase(),
            MemoryProfile {
                handle,
                posts,
                followed,
            },
        );
    }

    /// Number of descriptors handed out by all post streams so far
    pub fn pulled(&self) -> usize {
        self.pulled.load(Ordering::SeqCst)
    }

    /// Ids of materialized posts, in call order
    pub async fn materialized_ids(&self) -> Vec<String> {
        self.materialized.lock().await.clone()
    }
}

#[async_trait]
impl ContentSource for MemoryContentSource {
    async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        if credentials.username.trim().is_empty() || credentials.secret.is_empty() {
            return Err(
                AuthenticationError::InvalidArgument("username and password are required".into())
                    .into(),
            );
        }
        match &self.account {
            Some(account) if account == credentials => {
                if self.two_factor {
                    return Err(AuthenticationError::TwoFactorRequired.into());
                }
                self.logged_in.store(true, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(AuthenticationError::InvalidCredentials.into()),
        }
    }

    async fn resolve_profile(&self, name: &str) -> Result<ProfileHandle> {
        let key = name.trim().to_lowercase();
        let profile = self
            .profiles
            .get(&key)
            .ok_or_else(|| ResolutionError::ProfileNotFound {
                name: name.to_string(),
            })?;

        if profile.handle.is_private
            && !(profile.followed && self.logged_in.load(Ordering::SeqCst))
        {
            return Err(ResolutionError::ProfileForbidden {
                name: profile.handle.username.clone(),
            }
            .into());
        }

        Ok(profile.handle.clone())
    }

    fn posts<'a>(&'a self, profile: &'a ProfileHandle) -> PostStream<'a> {
        let Some(entry) = self.profiles.get(&profile.username.to_lowercase()) else {
            return stream::once(async move {
                Err(Error::Feed(format!("unknown profile {}", profile.username)))
            })
            .boxed();
        };

        let pulled = Arc::clone(&self.pulled);
        stream::iter(entry.posts.iter().cloned())
            .inspect(move |_| {
                pulled.fetch_add(1, Ordering::SeqCst);
            })
            .map(Ok)
            .boxed()
    }

    async fn materialize(&self, post: &PostDescriptor, destination: &Path) -> Result<()> {
        if self.failing_posts.contains(&post.id) {
            return Err(MaterializationError::new(&post.shortcode, "simulated network fault").into());
        }

        let write = |name: String, contents: Vec<u8>| async move {
            tokio::fs::write(destination.join(&name), contents)
                .await
                .map_err(|e| MaterializationError::new(&post.shortcode, e.to_string()))
        };

        write(format!("{}.jpg", post.id), post.display_url.as_bytes().to_vec()).await?;
        write(
            format!("{}.txt", post.id),
            post.caption.clone().unwrap_or_default().into_bytes(),
        )
        .await?;
        write(format!("{}.json.xz", post.id), serde_json::to_vec(post)?).await?;

        debug!(post = %post.id, ?destination, "materialized post from memory");
        self.materialized.lock().await.push(post.id.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Build a descriptor for [`MemoryContentSource`]
///
/// The shortcode equals `id`; timestamps are fixed so file names are stable.
pub fn memory_post(id: impl Into<String>, kind: MediaKind) -> PostDescriptor {
    let id = id.into();
    let epoch = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap_or_default();
    let offset = id.bytes().fold(0i64, |acc, b| acc.wrapping_add(i64::from(b)));
    PostDescriptor {
        shortcode: id.clone(),
        display_url: format!("memory://{id}"),
        taken_at: epoch - Duration::minutes(offset),
        caption: Some(format!("caption for {id}")),
        kind,
        id,
    }
}
