use super::*;
use crate::config::{Config, RetryConfig};
use crate::error::{Error, ResolutionError};
use crate::types::MediaKind;
use futures::{StreamExt, TryStreamExt};
use serde_json::json;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param, query_param_contains};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.remote.base_url = server.uri();
    config.remote.request_interval = Duration::ZERO;
    config.remote.page_size = 2;
    config.retry = RetryConfig {
        max_attempts: 2,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
        jitter: false,
    };
    config
}

fn user_json(username: &str, is_private: bool, followed: bool) -> serde_json::Value {
    json!({
        "data": {
            "user": {
                "id": "4242",
                "username": username,
                "is_private": is_private,
                "followed_by_viewer": followed,
                "edge_owner_to_timeline_media": { "count": 3 }
            }
        }
    })
}

fn node(id: &str, typename: &str, is_video: bool, server: &MockServer) -> serde_json::Value {
    json!({
        "node": {
            "id": id,
            "shortcode": format!("sc{id}"),
            "__typename": typename,
            "is_video": is_video,
            "display_url": format!("{}/media/{id}.jpg", server.uri()),
            "taken_at_timestamp": 1_700_000_000,
            "edge_media_to_caption": { "edges": [ { "node": { "text": format!("caption {id}") } } ] }
        }
    })
}

fn page(edges: Vec<serde_json::Value>, next: Option<&str>) -> serde_json::Value {
    json!({
        "data": {
            "user": {
                "edge_owner_to_timeline_media": {
                    "page_info": { "has_next_page": next.is_some(), "end_cursor": next },
                    "edges": edges
                }
            }
        }
    })
}

fn handle() -> ProfileHandle {
    ProfileHandle::new("4242", "nasa")
}

#[tokio::test]
async fn http_resolves_public_profile() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .and(query_param("username", "NASA"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("nasa", false, false)))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let profile = source.resolve_profile("NASA").await.unwrap();

    assert_eq!(profile.id, "4242");
    assert_eq!(profile.username, "nasa");
    assert!(!profile.is_private);
    assert_eq!(profile.post_count, Some(3));
}

#[tokio::test]
async fn http_404_is_profile_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let err = source.resolve_profile("ghost").await.unwrap_err();

    assert!(matches!(
        err,
        Error::Resolution(ResolutionError::ProfileNotFound { ref name }) if name == "ghost"
    ));
}

#[tokio::test]
async fn http_null_user_is_profile_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "user": null } })))
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let err = source.resolve_profile("ghost").await.unwrap_err();
    assert_eq!(err.error_code(), "profile_not_found");
}

#[tokio::test]
async fn http_private_unfollowed_profile_is_forbidden() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("locked", true, false)))
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let err = source.resolve_profile("locked").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Resolution(ResolutionError::ProfileForbidden { .. })
    ));
}

#[tokio::test]
async fn http_private_followed_profile_resolves() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("friend", true, true)))
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let profile = source.resolve_profile("friend").await.unwrap();
    assert!(profile.is_private);
}

#[tokio::test]
async fn http_blank_name_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let err = source.resolve_profile("   ").await.unwrap_err();
    assert_eq!(err.error_code(), "profile_not_found");
}

#[tokio::test]
async fn http_posts_are_classified_and_paginated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .and(query_param_contains("variables", "\"after\":null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                node("1", "GraphImage", false, &server),
                node("2", "GraphVideo", true, &server),
            ],
            Some("cursor-1"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .and(query_param_contains("variables", "\"after\":\"cursor-1\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![node("3", "GraphSidecar", false, &server)],
            None,
        )))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let profile = handle();
    let posts: Vec<_> = source.posts(&profile).try_collect().await.unwrap();

    let kinds: Vec<_> = posts.iter().map(|p| (p.id.as_str(), p.kind)).collect();
    assert_eq!(
        kinds,
        [
            ("1", MediaKind::Image),
            ("2", MediaKind::Video),
            ("3", MediaKind::Sidecar)
        ]
    );
    assert_eq!(posts[0].shortcode, "sc1");
    assert_eq!(posts[0].caption.as_deref(), Some("caption 1"));
}

#[tokio::test]
async fn http_next_page_is_not_requested_until_needed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .and(query_param_contains("variables", "\"after\":null"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                node("1", "GraphImage", false, &server),
                node("2", "GraphImage", false, &server),
            ],
            Some("cursor-1"),
        )))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .and(query_param_contains("variables", "cursor-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(vec![], None)))
        .expect(0)
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let profile = handle();
    let mut posts = source.posts(&profile);

    assert_eq!(posts.try_next().await.unwrap().unwrap().id, "1");
    assert_eq!(posts.try_next().await.unwrap().unwrap().id, "2");
    drop(posts);
}

#[tokio::test]
async fn http_feed_without_user_is_feed_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": { "user": null } })))
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let profile = handle();
    let err = source
        .posts(&profile)
        .try_collect::<Vec<_>>()
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Feed(_)));
}

#[tokio::test]
async fn http_materialize_writes_image_and_caption() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/1.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![node("1", "GraphImage", false, &server)],
            None,
        )))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let profile = handle();
    let post = source
        .posts(&profile)
        .try_next()
        .await
        .unwrap()
        .unwrap();

    source.materialize(&post, temp_dir.path()).await.unwrap();

    let image = temp_dir.path().join("2023-11-14_22-13-20_UTC.jpg");
    let caption = temp_dir.path().join("2023-11-14_22-13-20_UTC.txt");
    assert_eq!(tokio::fs::read(&image).await.unwrap(), b"JPEGDATA");
    assert_eq!(
        tokio::fs::read_to_string(&caption).await.unwrap(),
        "caption 1"
    );
    assert!(!temp_dir.path().join("2023-11-14_22-13-20_UTC.jpg.part").exists());
}

#[tokio::test]
async fn http_same_second_posts_get_distinct_files() {
    let server = MockServer::start().await;
    for id in ["1", "2"] {
        Mock::given(method("GET"))
            .and(path(format!("/media/{id}.jpg")))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(format!("JPEG{id}").into_bytes()))
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/graphql/query/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(
            vec![
                node("1", "GraphImage", false, &server),
                node("2", "GraphImage", false, &server),
            ],
            None,
        )))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let profile = handle();
    let posts: Vec<_> = source.posts(&profile).try_collect().await.unwrap();

    for post in &posts {
        source.materialize(post, temp_dir.path()).await.unwrap();
    }
    // the same post again keeps its name
    source.materialize(&posts[0], temp_dir.path()).await.unwrap();

    let first = temp_dir.path().join("2023-11-14_22-13-20_UTC.jpg");
    let second = temp_dir.path().join("2023-11-14_22-13-20_UTC_sc2.jpg");
    assert_eq!(tokio::fs::read(&first).await.unwrap(), b"JPEG1");
    assert_eq!(tokio::fs::read(&second).await.unwrap(), b"JPEG2");
    assert_eq!(
        tokio::fs::read_to_string(temp_dir.path().join("2023-11-14_22-13-20_UTC_sc2.txt"))
            .await
            .unwrap(),
        "caption 2"
    );
    assert!(!temp_dir.path().join("2023-11-14_22-13-20_UTC_sc1.jpg").exists());
}

#[tokio::test]
async fn http_failed_rename_leaves_no_part_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/1.jpg"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"JPEGDATA".to_vec()))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    // a directory squatting on the image name makes the final rename fail
    let blocker = temp_dir.path().join("2023-11-14_22-13-20_UTC.jpg");
    std::fs::create_dir(&blocker).unwrap();
    std::fs::write(blocker.join("keep"), b"x").unwrap();

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let post = PostDescriptor {
        id: "1".into(),
        shortcode: "sc1".into(),
        kind: MediaKind::Image,
        display_url: format!("{}/media/1.jpg", server.uri()),
        taken_at: chrono::DateTime::<chrono::Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        caption: Some("caption 1".into()),
    };

    let err = source
        .materialize(&post, temp_dir.path())
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), "materialization_failed");
    assert!(!temp_dir.path().join("2023-11-14_22-13-20_UTC.jpg.part").exists());
    assert!(!temp_dir.path().join("2023-11-14_22-13-20_UTC.txt").exists());
    assert!(blocker.join("keep").exists());
}

#[tokio::test]
async fn http_materialize_failure_names_the_post() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/9.jpg"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let temp_dir = TempDir::new().unwrap();
    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let post = PostDescriptor {
        id: "9".into(),
        shortcode: "sc9".into(),
        kind: MediaKind::Image,
        display_url: format!("{}/media/9.jpg", server.uri()),
        taken_at: chrono::DateTime::<chrono::Utc>::from_timestamp(1_700_000_000, 0).unwrap(),
        caption: None,
    };

    let err = source
        .materialize(&post, temp_dir.path())
        .await
        .unwrap_err();
    match err {
        Error::Materialization(m) => {
            assert_eq!(m.post, "sc9");
            assert!(m.reason.contains("404"), "reason: {}", m.reason);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn http_server_errors_are_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/users/web_profile_info/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_json("nasa", false, false)))
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let profile = source.resolve_profile("nasa").await.unwrap();
    assert_eq!(profile.username, "nasa");
}

#[tokio::test]
async fn http_login_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/web/accounts/login/ajax/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "authenticated": true, "user": true })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    source
        .authenticate(&Credentials::new("me", "secret"))
        .await
        .unwrap();
}

#[tokio::test]
async fn http_login_two_factor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/web/accounts/login/ajax/"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "two_factor_required": true, "status": "fail" })),
        )
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let err = source
        .authenticate(&Credentials::new("me", "secret"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Authentication(AuthenticationError::TwoFactorRequired)
    ));
}

#[tokio::test]
async fn http_login_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/web/accounts/login/ajax/"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "authenticated": false, "user": true })),
        )
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let err = source
        .authenticate(&Credentials::new("me", "wrong"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_credentials");
}

#[tokio::test]
async fn http_login_empty_input_is_invalid_argument() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let source = HttpContentSource::new(&test_config(&server)).unwrap();
    let err = source
        .authenticate(&Credentials::new("", "secret"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_argument");
}

#[tokio::test]
async fn memory_login_flows() {
    let source = MemoryContentSource::new().with_account(Credentials::new("me", "pw"));

    assert_eq!(
        source
            .authenticate(&Credentials::new("me", "nope"))
            .await
            .unwrap_err()
            .error_code(),
        "invalid_credentials"
    );
    assert_eq!(
        source
            .authenticate(&Credentials::new("me", ""))
            .await
            .unwrap_err()
            .error_code(),
        "invalid_argument"
    );
    source
        .authenticate(&Credentials::new("me", "pw"))
        .await
        .unwrap();

    let two_factor = MemoryContentSource::new()
        .with_account(Credentials::new("me", "pw"))
        .with_two_factor();
    assert_eq!(
        two_factor
            .authenticate(&Credentials::new("me", "pw"))
            .await
            .unwrap_err()
            .error_code(),
        "two_factor_required"
    );
}

#[tokio::test]
async fn memory_private_profile_needs_followed_login() {
    let source = MemoryContentSource::new()
        .with_account(Credentials::new("me", "pw"))
        .with_private_profile(ProfileHandle::new("7", "friend"), vec![], true)
        .with_private_profile(ProfileHandle::new("8", "stranger"), vec![], false);

    assert_eq!(
        source.resolve_profile("friend").await.unwrap_err().error_code(),
        "profile_forbidden"
    );

    source
        .authenticate(&Credentials::new("me", "pw"))
        .await
        .unwrap();

    assert!(source.resolve_profile("friend").await.unwrap().is_private);
    assert_eq!(
        source
            .resolve_profile("stranger")
            .await
            .unwrap_err()
            .error_code(),
        "profile_forbidden"
    );
}

#[tokio::test]
async fn memory_stream_counts_pulled_posts() {
    let source = MemoryContentSource::new().with_profile(
        ProfileHandle::new("1", "alice"),
        vec![
            memory_post("a", MediaKind::Image),
            memory_post("b", MediaKind::Image),
            memory_post("c", MediaKind::Image),
        ],
    );
    let profile = source.resolve_profile("Alice").await.unwrap();
    assert_eq!(profile.post_count, Some(3));

    let mut posts = source.posts(&profile);
    posts.try_next().await.unwrap();
    drop(posts);

    assert_eq!(source.pulled(), 1);
}

#[tokio::test]
async fn memory_materialize_writes_image_and_metadata() {
    let temp_dir = TempDir::new().unwrap();
    let source = MemoryContentSource::new().fail_on("bad");

    source
        .materialize(&memory_post("ok", MediaKind::Image), temp_dir.path())
        .await
        .unwrap();
    for name in ["ok.jpg", "ok.txt", "ok.json.xz"] {
        assert!(temp_dir.path().join(name).exists(), "{name} missing");
    }

    let err = source
        .materialize(&memory_post("bad", MediaKind::Image), temp_dir.path())
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "materialization_failed");
    assert_eq!(source.materialized_ids().await, ["ok"]);
}

#[tokio::test]
async fn default_login_is_rejected() {
    struct NoLogin;

    #[async_trait]
    impl ContentSource for NoLogin {
        async fn resolve_profile(&self, name: &str) -> crate::Result<ProfileHandle> {
            Ok(ProfileHandle::new("0", name))
        }

        fn posts<'a>(&'a self, _profile: &'a ProfileHandle) -> PostStream<'a> {
            futures::stream::empty().boxed()
        }

        async fn materialize(&self, _post: &PostDescriptor, _destination: &Path) -> crate::Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "no-login"
        }
    }

    let err = NoLogin
        .authenticate(&Credentials::new("me", "pw"))
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "invalid_argument");
    assert!(err.to_string().contains("no-login does not support login"));
}
