//! Expired access tokens are refreshed once and the original calls retried

use mockito::{Matcher, Server};
use serde_json::json;

use postboard_client::{ApiError, PostInput, SessionPhase};

use crate::test_harness::*;

#[tokio::test]
async fn concurrent_expired_calls_share_one_refresh() {
    //* Given
    let mut server = Server::new_async().await;

    let stale_list = server
        .mock("GET", POSTS_PATH)
        .match_header("authorization", bearer("stale").as_str())
        .with_status(401)
        .with_body(r#"{"detail": "Given token not valid for any token type"}"#)
        .expect(1)
        .create_async()
        .await;
    let stale_mine = server
        .mock("GET", "/api/post/user/1")
        .match_header("authorization", bearer("stale").as_str())
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH_PATH)
        .match_body(Matcher::Json(json!({"refresh": "r1"})))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access": "fresh"}"#)
        .expect(1)
        .create_async()
        .await;
    let fresh_list = server
        .mock("GET", POSTS_PATH)
        .match_header("authorization", bearer("fresh").as_str())
        .with_status(200)
        .with_body(empty_page())
        .expect(1)
        .create_async()
        .await;
    let fresh_mine = server
        .mock("GET", "/api/post/user/1")
        .match_header("authorization", bearer("fresh").as_str())
        .with_status(200)
        .with_body(empty_page())
        .expect(1)
        .create_async()
        .await;

    let (ctx, storage) =
        memory_context(&server, Some(record(Some("stale"), Some("r1"), Some(identity())))).await;

    //* When
    let (listed, mine) = tokio::join!(ctx.posts.list(), ctx.posts.list_for_user(1));

    //* Then
    assert_eq!(listed.expect("list should succeed after refresh").count, 0);
    assert_eq!(mine.expect("own posts should succeed after refresh").count, 0);

    stale_list.assert_async().await;
    stale_mine.assert_async().await;
    refresh.assert_async().await;
    fresh_list.assert_async().await;
    fresh_mine.assert_async().await;

    let session = ctx.session.snapshot();
    assert_eq!(session.access.as_deref(), Some("fresh"));
    assert_eq!(session.refresh.as_deref(), Some("r1"));
    assert_eq!(session.user, Some(identity()), "identity survives a refresh");
    assert_eq!(ctx.session.phase(), SessionPhase::Authenticated);

    let stored = storage.snapshot().await.expect("session should be persisted");
    assert_eq!(stored.access.as_deref(), Some("fresh"));
    assert_eq!(stored.refresh.as_deref(), Some("r1"));
}

#[tokio::test]
async fn rotated_refresh_token_is_stored() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("GET", POSTS_PATH)
        .match_header("authorization", bearer("stale").as_str())
        .with_status(401)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH_PATH)
        .with_status(200)
        .with_body(r#"{"access": "fresh", "refresh": "r2"}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("GET", POSTS_PATH)
        .match_header("authorization", bearer("fresh").as_str())
        .with_status(200)
        .with_body(empty_page())
        .create_async()
        .await;

    let (ctx, storage) = memory_context(&server, Some(record(Some("stale"), Some("r1"), None))).await;

    //* When
    ctx.posts.list().await.expect("list should succeed after refresh");

    //* Then
    refresh.assert_async().await;
    assert_eq!(ctx.session.snapshot().refresh.as_deref(), Some("r2"));
    let stored = storage.snapshot().await.expect("session should be persisted");
    assert_eq!(stored.refresh.as_deref(), Some("r2"));
}

#[tokio::test]
async fn rejected_refresh_ends_session_and_later_calls_fail_fast() {
    //* Given
    let mut server = Server::new_async().await;

    let stale_list = server
        .mock("GET", POSTS_PATH)
        .match_header("authorization", bearer("stale").as_str())
        .with_status(401)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH_PATH)
        .with_status(401)
        .with_body(r#"{"detail": "Token is blacklisted", "code": "token_not_valid"}"#)
        .expect(1)
        .create_async()
        .await;

    let (ctx, storage) =
        memory_context(&server, Some(record(Some("stale"), Some("r1"), Some(identity())))).await;
    let mut changes = ctx.session.subscribe();

    //* When
    let first = ctx.posts.list().await;
    let second = ctx.posts.list().await;

    //* Then
    assert_eq!(first.unwrap_err(), ApiError::SessionExpired);
    assert_eq!(second.unwrap_err(), ApiError::Unauthenticated);

    stale_list.assert_async().await;
    refresh.assert_async().await;

    assert!(ctx.session.snapshot().is_empty());
    assert_eq!(ctx.session.phase(), SessionPhase::Anonymous);
    assert!(!ctx.session.is_authenticated());
    assert!(changes.has_changed().unwrap(), "observers are told about the logout");
    assert!(storage.snapshot().await.is_none(), "stored session is removed");
}

#[tokio::test]
async fn unauthorized_retry_is_not_retried_again() {
    //* Given
    let mut server = Server::new_async().await;

    let list = server
        .mock("GET", POSTS_PATH)
        .with_status(401)
        .expect(2)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH_PATH)
        .with_status(200)
        .with_body(r#"{"access": "fresh"}"#)
        .expect(1)
        .create_async()
        .await;

    let (ctx, _storage) = memory_context(&server, Some(record(Some("stale"), Some("r1"), None))).await;

    //* When
    let result = ctx.posts.list().await;

    //* Then
    assert_eq!(result.unwrap_err(), ApiError::SessionExpired);
    list.assert_async().await;
    refresh.assert_async().await;
    assert!(ctx.session.snapshot().is_empty());
}

#[tokio::test]
async fn validation_errors_pass_through_without_refresh() {
    //* Given
    let mut server = Server::new_async().await;

    let create = server
        .mock("POST", POSTS_PATH)
        .match_header("authorization", bearer("a1").as_str())
        .match_body(Matcher::Json(json!({"content": "", "hidden": false})))
        .with_status(400)
        .with_body(r#"{"content": ["This field may not be blank."]}"#)
        .expect(1)
        .create_async()
        .await;
    let refresh = server
        .mock("POST", REFRESH_PATH)
        .expect(0)
        .create_async()
        .await;

    let (ctx, _storage) = memory_context(&server, Some(record(Some("a1"), Some("r1"), None))).await;

    //* When
    let result = ctx
        .posts
        .create(&PostInput {
            content: String::new(),
            hidden: false,
        })
        .await;

    //* Then
    match result {
        Err(ApiError::Validation { status, body }) => {
            assert_eq!(status, 400);
            assert_eq!(
                body,
                Some(json!({"content": ["This field may not be blank."]}))
            );
        }
        other => panic!("expected a validation error, got {:?}", other),
    }
    create.assert_async().await;
    refresh.assert_async().await;
    assert_eq!(ctx.session.snapshot().access.as_deref(), Some("a1"));
}

#[tokio::test]
async fn server_errors_keep_the_session() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("GET", POSTS_PATH)
        .with_status(503)
        .with_body("Service Unavailable")
        .create_async()
        .await;

    let (ctx, _storage) = memory_context(&server, Some(record(Some("a1"), Some("r1"), None))).await;

    //* When
    let err = ctx.posts.list().await.unwrap_err();

    //* Then
    assert!(matches!(err, ApiError::Server { status: 503, .. }));
    assert!(ctx.session.is_authenticated());
}
