//! Logout revokes the refresh token once and always clears the local session

use mockito::{Matcher, Server};
use serde_json::json;

use postboard_client::{ApiError, LogoutOutcome, SessionPhase};

use crate::test_harness::*;

#[tokio::test]
async fn logout_sends_refresh_token_and_clears_session() {
    //* Given
    let mut server = Server::new_async().await;

    let logout = server
        .mock("POST", LOGOUT_PATH)
        .match_header("authorization", bearer("a1").as_str())
        .match_header("content-type", Matcher::Regex("application/json".to_string()))
        .match_body(Matcher::Json(json!({"refresh": "r1"})))
        .with_status(205)
        .expect(1)
        .create_async()
        .await;

    let (ctx, storage) =
        memory_context(&server, Some(record(Some("a1"), Some("r1"), Some(identity())))).await;

    //* When
    let outcome = ctx.accounts.logout().await.expect("logout should succeed");

    //* Then
    assert_eq!(outcome, LogoutOutcome::Revoked);
    logout.assert_async().await;
    assert!(ctx.session.snapshot().is_empty());
    assert_eq!(ctx.session.phase(), SessionPhase::Anonymous);
    assert!(storage.snapshot().await.is_none());
}

#[tokio::test]
async fn logout_clears_session_when_server_fails() {
    //* Given
    let mut server = Server::new_async().await;

    let logout = server
        .mock("POST", LOGOUT_PATH)
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(1)
        .create_async()
        .await;

    let (ctx, storage) = memory_context(&server, Some(record(Some("a1"), Some("r1"), None))).await;

    //* When
    let outcome = ctx.accounts.logout().await.expect("local logout never fails");

    //* Then
    assert!(matches!(
        outcome,
        LogoutOutcome::ServerFailed(ApiError::Server { status: 500, .. })
    ));
    logout.assert_async().await;
    assert!(ctx.session.snapshot().is_empty());
    assert!(storage.snapshot().await.is_none());
}

#[tokio::test]
async fn logout_without_refresh_token_stays_local() {
    //* Given
    let mut server = Server::new_async().await;

    let logout = server
        .mock("POST", LOGOUT_PATH)
        .expect(0)
        .create_async()
        .await;

    let (ctx, storage) = memory_context(&server, Some(record(Some("a1"), None, None))).await;

    //* When
    let outcome = ctx.accounts.logout().await.expect("logout should succeed");

    //* Then
    assert_eq!(outcome, LogoutOutcome::LocalOnly);
    logout.assert_async().await;
    assert!(ctx.session.snapshot().is_empty());
    assert!(storage.snapshot().await.is_none());
}

#[tokio::test]
async fn calls_after_logout_fail_fast() {
    //* Given
    let mut server = Server::new_async().await;

    server
        .mock("POST", LOGOUT_PATH)
        .with_status(205)
        .create_async()
        .await;
    let list = server
        .mock("GET", POSTS_PATH)
        .expect(0)
        .create_async()
        .await;

    let (ctx, _storage) = memory_context(&server, Some(record(Some("a1"), Some("r1"), None))).await;
    ctx.accounts.logout().await.expect("logout should succeed");

    //* When
    let result = ctx.posts.list().await;

    //* Then
    assert_eq!(result.unwrap_err(), ApiError::Unauthenticated);
    list.assert_async().await;
}
