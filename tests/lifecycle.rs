//! Server lifecycle: shutdown, call logs and context cancellation.

mod common;

use std::time::Duration;

use common::*;
use dev_proxy::{Route, ServerConfig, ServerState, Service};
use tokio_util::sync::CancellationToken;

fn api(port: u16) -> Service {
    Service::new("api", "http://127.0.0.1", port).with_route(Route::new("api", "/", "/v1/api/"))
}

#[tokio::test]
async fn test_shutdown_removes_call_logs() {
    let backend = start_echo_backend().await;
    let proxy = start_proxy(ServerConfig::default(), vec![api(backend)]).await;
    let server = proxy.server.clone();
    let log_dir = server.log_dir().to_path_buf();

    let response = client().get(proxy.url("/v1/api/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(log_dir.join("api.log").is_file());

    proxy.stop().await.unwrap();

    assert_eq!(server.state(), ServerState::Stopped);
    assert!(!log_dir.exists());
}

#[tokio::test]
async fn test_save_logs_keeps_call_log() {
    let backend = start_echo_backend().await;
    let proxy = start_proxy(ServerConfig::default().with_save_logs(true), vec![api(backend)]).await;
    let server = proxy.server.clone();
    let log_dir = server.log_dir().to_path_buf();

    client().get(proxy.url("/v1/api/users?page=2")).send().await.unwrap();
    proxy.stop().await.unwrap();

    let contents = std::fs::read_to_string(log_dir.join("api.log")).unwrap();
    assert!(contents.contains("GET /v1/api/users ->"));
    assert!(contents.contains("/users?page=2 200"));

    std::fs::remove_dir_all(log_dir).unwrap();
}

#[tokio::test]
async fn test_log_dir_parent_is_honoured() {
    let parent = std::env::temp_dir().join(format!("dev-proxy-parent-{}", std::process::id()));
    let proxy = start_proxy(ServerConfig::default().with_log_dir(&parent), vec![]).await;

    assert!(proxy.server.log_dir().starts_with(&parent));

    proxy.stop().await.unwrap();
    let _ = std::fs::remove_dir_all(parent);
}

#[tokio::test]
async fn test_context_cancellation_fails_in_flight_request() {
    let backend = start_slow_backend(Duration::from_secs(10)).await;
    let context = CancellationToken::new();
    let proxy = start_proxy(ServerConfig::default().with_context(context.clone()), vec![api(backend)]).await;
    let server = proxy.server.clone();

    let url = proxy.url("/v1/api/slow");
    let in_flight = tokio::spawn(async move { client().get(url).send().await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    context.cancel();

    let response = tokio::time::timeout(Duration::from_secs(5), in_flight)
        .await
        .expect("request was not cancelled")
        .unwrap()
        .unwrap();
    assert_eq!(response.status(), 502);
    assert_eq!(response.text().await.unwrap(), "context canceled");

    let state = tokio::time::timeout(Duration::from_secs(5), server.wait_for_state(ServerState::Stopped))
        .await
        .expect("server did not stop");
    assert_eq!(state, ServerState::Stopped);
    assert!(!server.log_dir().exists());
}

#[tokio::test]
async fn test_context_cancellation_ends_streaming_body() {
    let backend = start_stalling_backend().await;
    let context = CancellationToken::new();
    let proxy = start_proxy(ServerConfig::default().with_context(context.clone()), vec![api(backend)]).await;
    let server = proxy.server.clone();

    let response = client().get(proxy.url("/v1/api/stream")).send().await.unwrap();
    assert_eq!(response.status(), 200);

    context.cancel();

    let body = tokio::time::timeout(Duration::from_secs(3), response.bytes())
        .await
        .expect("body outlived the context");
    assert!(body.is_err());

    let state = tokio::time::timeout(Duration::from_secs(5), server.wait_for_state(ServerState::Stopped))
        .await
        .expect("server did not stop");
    assert_eq!(state, ServerState::Stopped);
}

#[tokio::test]
async fn test_shutdown_is_idempotent() {
    let proxy = start_proxy(ServerConfig::default(), vec![]).await;
    let server = proxy.server.clone();

    server.shutdown();
    server.shutdown();
    proxy.stop().await.unwrap();

    assert_eq!(server.state(), ServerState::Stopped);
}
