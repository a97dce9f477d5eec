//! [`ContentSource`] over the remote JSON web API

use super::{ContentSource, PostStream};
use crate::config::{Config, RemoteConfig, RetryConfig};
use crate::error::{AuthenticationError, Error, MaterializationError, ResolutionError, Result};
use crate::pacing::RequestPacer;
use crate::retry::with_retry;
use crate::types::{Credentials, MediaKind, PostDescriptor, ProfileHandle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

const LOGIN_PATH: &str = "api/v1/web/accounts/login/ajax/";
const PROFILE_INFO_PATH: &str = "api/v1/users/web_profile_info/";
const FEED_PATH: &str = "graphql/query/";

/// Fetches profiles, feed pages and media over HTTP
///
/// Holds one cookie-backed session. Every request waits on the pacer and
/// goes through [`with_retry`], so rate limiting and transient server errors
/// are absorbed here rather than in the fetch loop.
pub struct HttpContentSource {
    client: reqwest::Client,
    base_url: Url,
    remote: RemoteConfig,
    retry: RetryConfig,
    save_captions: bool,
    pacer: RequestPacer,
    claimed_stems: Mutex<HashMap<PathBuf, String>>,
}

impl HttpContentSource {
    /// Create a source from the `remote`, `retry` and `download` settings
    ///
    /// # Errors
    /// Returns error if the base URL is invalid or the HTTP client cannot be created
    pub fn new(config: &Config) -> Result<Self> {
        let mut base_url = Url::parse(&config.remote.base_url).map_err(|e| Error::Config {
            message: format!("invalid base_url {}: {}", config.remote.base_url, e),
            key: Some("remote.base_url".to_string()),
        })?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .timeout(config.remote.timeout)
            .user_agent(config.remote.user_agent.clone())
            .cookie_store(true)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            remote: config.remote.clone(),
            retry: config.retry.clone(),
            save_captions: config.download.save_captions,
            pacer: RequestPacer::new(config.remote.request_interval),
            claimed_stems: Mutex::new(HashMap::new()),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Other(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Send a request built by `build`, pacing and retrying transient failures
    ///
    /// HTTP 429 and 5xx are turned into retryable errors; every other status
    /// is handed back to the caller to interpret.
    async fn execute<F>(&self, build: F) -> Result<reqwest::Response>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let this = self;
        let build = &build;
        with_retry(&self.retry, move || async move {
            this.pacer.wait().await;
            let response = build().send().await?;
            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                response.error_for_status_ref()?;
            }
            Ok::<_, Error>(response)
        })
        .await
    }

    async fn fetch_page(
        &self,
        profile: &ProfileHandle,
        after: Option<&str>,
    ) -> Result<(Vec<PostDescriptor>, Option<String>)> {
        let url = self.endpoint(FEED_PATH)?;
        let variables = serde_json::json!({
            "id": profile.id,
            "first": self.remote.page_size,
            "after": after,
        })
        .to_string();

        debug!(profile = %profile.username, ?after, "requesting feed page");

        let response = self
            .execute(|| {
                self.client.get(url.clone()).query(&[
                    ("query_hash", self.remote.query_hash.as_str()),
                    ("variables", variables.as_str()),
                ])
            })
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Feed(format!(
                "feed page for {} returned HTTP {}",
                profile.username,
                status.as_u16()
            )));
        }

        let body: FeedResponse = response.json().await?;
        let media = body
            .data
            .and_then(|d| d.user)
            .ok_or_else(|| Error::Feed(format!("feed page for {} has no user", profile.username)))?
            .edge_owner_to_timeline_media;

        let posts = media
            .edges
            .into_iter()
            .map(|edge| edge.node.into_descriptor())
            .collect::<Result<Vec<_>>>()?;

        let next = match (media.page_info.has_next_page, media.page_info.end_cursor) {
            (true, Some(cursor)) if !cursor.is_empty() => Some(cursor),
            _ => None,
        };

        debug!(
            profile = %profile.username,
            count = posts.len(),
            has_next = next.is_some(),
            "received feed page"
        );

        Ok((posts, next))
    }

    /// File stem for `post` in `destination`
    ///
    /// Posts taken in the same second share a timestamp stem; every post after
    /// the first one to claim it gets its shortcode appended.
    async fn claim_stem(&self, post: &PostDescriptor, destination: &Path) -> String {
        let stem = post.file_stem();
        let mut claimed = self.claimed_stems.lock().await;
        let owner = claimed
            .entry(destination.join(&stem))
            .or_insert_with(|| post.shortcode.clone());
        if *owner == post.shortcode {
            stem
        } else {
            format!("{stem}_{}", post.shortcode)
        }
    }

    async fn write_post(&self, post: &PostDescriptor, destination: &Path) -> Result<()> {
        let url = Url::parse(&post.display_url)
            .map_err(|e| Error::Other(format!("invalid media URL {}: {}", post.display_url, e)))?;

        let response = self.execute(|| self.client.get(url.clone())).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Other(format!("media returned HTTP {}", status.as_u16())));
        }
        let bytes = response.bytes().await?;

        let stem = self.claim_stem(post, destination).await;
        let image_path = destination.join(format!("{stem}.jpg"));
        let part_path = destination.join(format!("{stem}.jpg.part"));
        if let Err(e) = persist(&part_path, &image_path, &bytes).await {
            tokio::fs::remove_file(&part_path).await.ok();
            return Err(e.into());
        }

        if self.save_captions
            && let Some(caption) = post.caption.as_deref().filter(|c| !c.trim().is_empty())
        {
            tokio::fs::write(destination.join(format!("{stem}.txt")), caption).await?;
        }

        debug!(post = %post.shortcode, path = ?image_path, bytes = bytes.len(), "wrote image");
        Ok(())
    }
}

async fn persist(part_path: &Path, image_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(part_path, bytes).await?;
    tokio::fs::rename(part_path, image_path).await
}

enum PageCursor {
    Start,
    After(String),
    Done,
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn authenticate(&self, credentials: &Credentials) -> Result<()> {
        let username = credentials.username.trim();
        if username.is_empty() {
            return Err(AuthenticationError::InvalidArgument("username is empty".into()).into());
        }
        if credentials.secret.is_empty() {
            return Err(AuthenticationError::InvalidArgument("password is empty".into()).into());
        }

        let url = self.endpoint(LOGIN_PATH)?;
        let response = self
            .execute(|| {
                self.client.post(url.clone()).form(&[
                    ("username", username),
                    ("password", credentials.secret.as_str()),
                ])
            })
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AuthenticationError::InvalidCredentials.into());
        }
        if !status.is_success() && status != StatusCode::BAD_REQUEST {
            return Err(Error::Feed(format!("login returned HTTP {}", status.as_u16())));
        }

        let body: LoginResponse = response.json().await?;
        if body.two_factor_required {
            return Err(AuthenticationError::TwoFactorRequired.into());
        }
        if !body.authenticated {
            return Err(AuthenticationError::InvalidCredentials.into());
        }

        info!(username, "login successful");
        Ok(())
    }

    async fn resolve_profile(&self, name: &str) -> Result<ProfileHandle> {
        let name = name.trim();
        let not_found = || ResolutionError::ProfileNotFound {
            name: name.to_string(),
        };
        if name.is_empty() {
            return Err(not_found().into());
        }

        let url = self.endpoint(PROFILE_INFO_PATH)?;
        let response = self
            .execute(|| self.client.get(url.clone()).query(&[("username", name)]))
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(not_found().into());
        }
        if !status.is_success() {
            return Err(Error::Feed(format!(
                "profile lookup for {} returned HTTP {}",
                name,
                status.as_u16()
            )));
        }

        let body: ProfileInfoResponse = response.json().await?;
        let user = body.data.user.ok_or_else(not_found)?;

        if user.is_private && !user.followed_by_viewer && !user.is_viewer {
            return Err(ResolutionError::ProfileForbidden {
                name: user.username,
            }
            .into());
        }

        debug!(profile = %user.username, id = %user.id, "resolved profile");
        Ok(ProfileHandle {
            id: user.id,
            username: user.username,
            is_private: user.is_private,
            post_count: user.edge_owner_to_timeline_media.map(|m| m.count),
        })
    }

    fn posts<'a>(&'a self, profile: &'a ProfileHandle) -> PostStream<'a> {
        stream::try_unfold(PageCursor::Start, move |cursor| async move {
            let after = match cursor {
                PageCursor::Done => return Ok(None),
                PageCursor::Start => None,
                PageCursor::After(cursor) => Some(cursor),
            };
            let (posts, next) = self.fetch_page(profile, after.as_deref()).await?;
            let next = next.map_or(PageCursor::Done, PageCursor::After);
            Ok::<_, Error>(Some((posts, next)))
        })
        .map_ok(|posts| stream::iter(posts.into_iter().map(Ok::<_, Error>)))
        .try_flatten()
        .boxed()
    }

    async fn materialize(&self, post: &PostDescriptor, destination: &Path) -> Result<()> {
        self.write_post(post, destination)
            .await
            .map_err(|e| match e {
                Error::Materialization(m) => Error::Materialization(m),
                other => MaterializationError::new(&post.shortcode, other.to_string()).into(),
            })
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    two_factor_required: bool,
}

#[derive(Debug, Deserialize)]
struct ProfileInfoResponse {
    data: ProfileInfoData,
}

#[derive(Debug, Deserialize)]
struct ProfileInfoData {
    user: Option<ProfileUser>,
}

#[derive(Debug, Deserialize)]
struct ProfileUser {
    id: String,
    username: String,
    #[serde(default)]
    is_private: bool,
    #[serde(default)]
    followed_by_viewer: bool,
    #[serde(default)]
    is_viewer: bool,
    #[serde(default)]
    edge_owner_to_timeline_media: Option<MediaCount>,
}

#[derive(Debug, Deserialize)]
struct MediaCount {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct FeedResponse {
    data: Option<FeedData>,
}

#[derive(Debug, Deserialize)]
struct FeedData {
    user: Option<FeedUser>,
}

#[derive(Debug, Deserialize)]
struct FeedUser {
    edge_owner_to_timeline_media: MediaConnection,
}

#[derive(Debug, Deserialize)]
struct MediaConnection {
    page_info: PageInfo,
    #[serde(default)]
    edges: Vec<MediaEdge>,
}

#[derive(Debug, Deserialize)]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaEdge {
    node: MediaNode,
}

#[derive(Debug, Deserialize)]
struct MediaNode {
    id: String,
    shortcode: String,
    #[serde(rename = "__typename")]
    typename: String,
    #[serde(default)]
    is_video: bool,
    display_url: String,
    taken_at_timestamp: i64,
    #[serde(default)]
    edge_media_to_caption: Option<CaptionConnection>,
}

#[derive(Debug, Deserialize)]
struct CaptionConnection {
    #[serde(default)]
    edges: Vec<CaptionEdge>,
}

#[derive(Debug, Deserialize)]
struct CaptionEdge {
    node: CaptionNode,
}

#[derive(Debug, Deserialize)]
struct CaptionNode {
    text: String,
}

impl MediaNode {
    fn kind(&self) -> MediaKind {
        if self.typename == "GraphSidecar" {
            MediaKind::Sidecar
        } else if self.is_video {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }

    fn into_descriptor(self) -> Result<PostDescriptor> {
        let kind = self.kind();
        let taken_at = DateTime::<Utc>::from_timestamp(self.taken_at_timestamp, 0).ok_or_else(
            || {
                Error::Feed(format!(
                    "post {} has invalid timestamp {}",
                    self.shortcode, self.taken_at_timestamp
                ))
            },
        )?;
        let caption = self
            .edge_media_to_caption
            .and_then(|c| c.edges.into_iter().next())
            .map(|edge| edge.node.text);

        Ok(PostDescriptor {
            id: self.id,
            shortcode: self.shortcode,
            kind,
            display_url: self.display_url,
            taken_at,
            caption,
        })
    }
}
