//! Tests for the REST routes.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use strictly_chess::{Color, GameStatus, MoveOutcome, RejectReason, ShakmatyEngine};
use strictly_chess_server::{
    ErrorBody, GameView, MemoryStore, MoveReply, SessionManager, router,
};
use tower::ServiceExt;

fn app() -> Router {
    let manager = SessionManager::new(ShakmatyEngine::new(), Arc::new(MemoryStore::new()));
    router(manager, Duration::from_secs(5))
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => builder.body(Body::empty()),
    }
    .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn parse<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn test_open_creates_game() {
    let app = app();
    let (status, body) = call(&app, Method::POST, "/api/sessions/g1", None).await;
    assert_eq!(status, StatusCode::OK);
    let view: GameView = parse(&body);
    assert_eq!(view.game_id, "g1");
    assert_eq!(view.version, 1);
    assert_eq!(view.snapshot.turn, Color::White);

    let (_, body) = call(&app, Method::GET, "/api/sessions", None).await;
    let ids: Vec<String> = parse(&body);
    assert_eq!(ids, vec!["g1"]);
}

#[tokio::test]
async fn test_move_round_trip() {
    let app = app();
    call(&app, Method::POST, "/api/sessions/g1", None).await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/sessions/g1/moves",
        Some(r#"{"move":"e2-e4"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let reply: MoveReply = parse(&body);
    assert_eq!(reply.outcome, MoveOutcome::Applied(GameStatus::InProgress));
    assert_eq!(reply.game.snapshot.turn, Color::Black);

    let (_, body) = call(
        &app,
        Method::POST,
        "/api/sessions/g1/moves",
        Some(r#"{"move":"e2e4"}"#),
    )
    .await;
    let reply: MoveReply = parse(&body);
    assert_eq!(reply.outcome, MoveOutcome::Rejected(RejectReason::Illegal));
    assert_eq!(reply.game.snapshot.status_message, "Illegal move! Try again.");
}

#[tokio::test]
async fn test_unknown_game_is_404() {
    let app = app();
    let (status, body) = call(&app, Method::GET, "/api/sessions/missing/game", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorBody = parse(&body);
    assert_eq!(error.kind, "not found");

    let (status, _) = call(&app, Method::DELETE, "/api/sessions/missing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_restart_and_delete() {
    let app = app();
    call(&app, Method::POST, "/api/sessions/g1", None).await;
    call(
        &app,
        Method::POST,
        "/api/sessions/g1/moves",
        Some(r#"{"move":"e2e4"}"#),
    )
    .await;

    let (status, body) = call(&app, Method::POST, "/api/sessions/g1/restart", None).await;
    assert_eq!(status, StatusCode::OK);
    let view: GameView = parse(&body);
    assert_eq!(view.snapshot.turn, Color::White);
    assert_eq!(view.version, 3);

    let (status, _) = call(&app, Method::DELETE, "/api/sessions/g1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = call(&app, Method::GET, "/api/sessions", None).await;
    let ids: Vec<String> = parse(&body);
    assert!(ids.is_empty());
}

#[tokio::test]
async fn test_long_poll_returns_newer_version_immediately() {
    let app = app();
    call(&app, Method::POST, "/api/sessions/g1", None).await;
    call(
        &app,
        Method::POST,
        "/api/sessions/g1/moves",
        Some(r#"{"move":"e2e4"}"#),
    )
    .await;

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/sessions/g1/game?since=1&wait_ms=60000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let view: GameView = parse(&body);
    assert_eq!(view.version, 2);
}

#[tokio::test(start_paused = true)]
async fn test_long_poll_times_out() {
    let app = app();
    call(&app, Method::POST, "/api/sessions/g1", None).await;

    let (status, body) = call(
        &app,
        Method::GET,
        "/api/sessions/g1/game?since=1&wait_ms=1000",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let view: GameView = parse(&body);
    assert_eq!(view.version, 1);
}

#[tokio::test]
async fn test_malformed_body_rejected() {
    let app = app();
    call(&app, Method::POST, "/api/sessions/g1", None).await;
    let (status, _) = call(
        &app,
        Method::POST,
        "/api/sessions/g1/moves",
        Some(r#"{"mv":"e2e4"}"#),
    )
    .await;
    assert!(status.is_client_error());
}
