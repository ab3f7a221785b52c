//! Admission, queueing and lifecycle notices over the wire

mod common;

use std::time::Duration;

use common::client::TerminalClient;
use common::{TestOptions, start_server, start_server_with};
use warden_server::http::{HealthResponse, SessionListResponse};

#[tokio::test]
async fn quota_rejection_sends_notice_and_closes() {
    let server = start_server_with(TestOptions {
        max_sessions_per_ip: 1,
        trust_forwarded_for: true,
        ..TestOptions::default()
    })
    .await;

    let mut first = TerminalClient::connect_with(server.addr, None, Some("198.51.100.1")).await;
    first.send_text("ok\n").await;
    first.expect_output("ok").await;

    let mut second = TerminalClient::connect_with(server.addr, None, Some("198.51.100.1")).await;
    assert_eq!(
        second.expect_notice().await,
        "session rejected: too many sessions from 198.51.100.1 (limit 1)"
    );
    second.expect_closed().await;
    assert_eq!(server.broker.stats().tracked_sessions, 1);

    // A different address still gets in
    let mut other = TerminalClient::connect_with(server.addr, None, Some("198.51.100.2")).await;
    other.send_text("other\n").await;
    other.expect_output("other").await;

    server.broker.shutdown().await;
}

#[tokio::test]
async fn queued_clients_see_positions_and_get_promoted() {
    let server = start_server_with(TestOptions {
        max_concurrent_sessions: 1,
        ..TestOptions::default()
    })
    .await;

    let mut active = TerminalClient::connect(server.addr).await;
    active.send_text("active\n").await;
    active.expect_output("active").await;

    let mut second = TerminalClient::connect(server.addr).await;
    assert_eq!(second.expect_notice().await, "queue position: 1");
    let mut third = TerminalClient::connect(server.addr).await;
    assert_eq!(third.expect_notice().await, "queue position: 2");

    // Input sent while queued is delivered once the shell starts
    third.send_text("typed early\n").await;

    second.close().await;
    assert_eq!(third.expect_notice().await, "queue position: 1");

    active.close().await;
    third.expect_output("typed early").await;

    server.wait_for_stats(|s| s.queue_length == 0).await;
    assert_eq!(server.broker.stats().active_sessions, 1);

    server.broker.shutdown().await;
}

#[tokio::test]
async fn idle_session_gets_notice_then_close() {
    let server = start_server_with(TestOptions {
        idle_timeout: Duration::from_secs(1),
        ..TestOptions::default()
    })
    .await;
    let mut client = TerminalClient::connect(server.addr).await;
    client.send_text("still here\n").await;
    client.expect_output("still here").await;

    assert_eq!(client.expect_notice().await, "session closed: idle for 1s");
    client.expect_closed().await;

    server.wait_for_stats(|s| s.tracked_sessions == 0).await;
    server.broker.shutdown().await;
}

#[tokio::test]
async fn spawn_failure_sends_notice() {
    let server = start_server_with(TestOptions {
        command: "/nonexistent/shell",
        ..TestOptions::default()
    })
    .await;
    let mut client = TerminalClient::connect(server.addr).await;

    let notice = client.expect_notice().await;
    assert!(notice.starts_with("session failed: "), "got {:?}", notice);
    client.expect_closed().await;

    server.wait_for_stats(|s| s.active_sessions == 0 && s.tracked_sessions == 0).await;
    server.broker.shutdown().await;
}

#[tokio::test]
async fn shutdown_notifies_clients_and_stops_server() {
    let server = start_server_with(TestOptions {
        max_concurrent_sessions: 1,
        ..TestOptions::default()
    })
    .await;

    let mut active = TerminalClient::connect(server.addr).await;
    active.send_text("up\n").await;
    active.expect_output("up").await;
    let mut queued = TerminalClient::connect(server.addr).await;
    assert_eq!(queued.expect_notice().await, "queue position: 1");

    server.shutdown.cancel();

    assert_eq!(active.expect_notice().await, "server shutting down");
    active.expect_closed().await;
    assert_eq!(queued.expect_notice().await, "server shutting down");
    queued.expect_closed().await;

    let result = tokio::time::timeout(Duration::from_secs(10), server.handle)
        .await
        .expect("server should stop")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn connection_during_shutdown_is_refused() {
    let server = start_server().await;
    server.broker.shutdown().await;

    let mut client = TerminalClient::connect(server.addr).await;
    assert_eq!(client.expect_notice().await, "server shutting down");
    client.expect_closed().await;
}

#[tokio::test]
async fn health_endpoint_reports_counters() {
    let server = start_server_with(TestOptions {
        max_concurrent_sessions: 1,
        ..TestOptions::default()
    })
    .await;

    let mut active = TerminalClient::connect(server.addr).await;
    active.send_text("x\n").await;
    active.expect_output("x").await;
    let mut queued = TerminalClient::connect(server.addr).await;
    queued.expect_notice().await;

    let health: HealthResponse = reqwest::get(server.http_url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health.status, "ok");
    assert_eq!(health.active_sessions, 1);
    assert_eq!(health.queue_length, 1);
    assert_eq!(health.tracked_sessions, 2);
    assert_eq!(health.distinct_clients, 1);

    server.broker.shutdown().await;
}

#[tokio::test]
async fn session_listing_includes_label() {
    let server = start_server().await;

    let mut client = TerminalClient::connect_with(server.addr, Some("alice"), None).await;
    client.send_text("hi\n").await;
    client.expect_output("hi").await;

    let list: SessionListResponse = reqwest::get(server.http_url("/api/sessions"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(list.sessions.len(), 1);
    assert_eq!(list.sessions[0].label.as_deref(), Some("alice"));
    assert_eq!(list.sessions[0].client, "127.0.0.1");

    server.broker.shutdown().await;
}
