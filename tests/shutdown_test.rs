//! Graceful shutdown, forced close and server timeout tests.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use edge_scaffold::http::{handler, BoxHandler, ServerState};
use tokio::sync::Notify;

mod common;

/// A handler that signals when it starts, then sleeps for `work`.
fn slow_handler(started: Arc<Notify>, work: Duration) -> BoxHandler {
    handler(move |_req: Request<Body>| {
        let started = Arc::clone(&started);
        async move {
            started.notify_one();
            tokio::time::sleep(work).await;
            "finished"
        }
    })
}

#[tokio::test]
async fn test_in_flight_request_completes_within_idle_timeout() {
    let started = Arc::new(Notify::new());
    let (server, addr, handle) = common::spawn_server(
        slow_handler(Arc::clone(&started), Duration::from_millis(300)),
        Duration::from_secs(5),
        Duration::from_secs(2),
    )
    .await;

    let request = tokio::spawn(async move {
        common::client()
            .get(format!("http://{addr}/work"))
            .send()
            .await
    });
    started.notified().await;
    server.stop();

    let res = request.await.unwrap().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), "finished");

    handle.await.unwrap().unwrap();
    assert_eq!(server.state(), ServerState::Stopped);
}

#[tokio::test]
async fn test_request_outliving_idle_timeout_is_terminated() {
    let started = Arc::new(Notify::new());
    let (server, addr, handle) = common::spawn_server(
        slow_handler(Arc::clone(&started), Duration::from_secs(10)),
        Duration::from_secs(30),
        Duration::from_millis(200),
    )
    .await;

    let request = tokio::spawn(async move {
        common::client()
            .get(format!("http://{addr}/work"))
            .send()
            .await
    });
    started.notified().await;

    let stopping = Instant::now();
    server.stop();
    handle.await.unwrap().unwrap();
    assert!(stopping.elapsed() < Duration::from_secs(5));

    let outcome = request.await.unwrap();
    assert!(outcome.is_err(), "request should be cut off, got {outcome:?}");
}

#[tokio::test]
async fn test_stopped_server_refuses_connections() {
    let started = Arc::new(Notify::new());
    let (server, addr, handle) = common::spawn_server(
        slow_handler(started, Duration::ZERO),
        Duration::from_secs(5),
        Duration::from_secs(1),
    )
    .await;

    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    server.stop();
    server.stop();
    handle.await.unwrap().unwrap();

    assert!(common::client().get(format!("http://{addr}/")).send().await.is_err());
    assert!(server.start().await.is_err());
}

#[tokio::test]
async fn test_slow_handler_gets_request_timeout() {
    let started = Arc::new(Notify::new());
    let (server, addr, handle) = common::spawn_server(
        slow_handler(started, Duration::from_secs(5)),
        Duration::from_millis(100),
        Duration::from_secs(1),
    )
    .await;

    let res = common::client().get(format!("http://{addr}/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::REQUEST_TIMEOUT);

    server.stop();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_kill_switch_stops_application() {
    let mut config = common::test_config();
    config.slt_mode = true;
    let app = common::spawn_app(config).await;

    let res = common::client().get(app.url("/rest/kill")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    app.join().await.unwrap();
}

#[tokio::test]
async fn test_kill_switch_absent_by_default() {
    let app = common::spawn_app(common::test_config()).await;

    let res = common::client().get(app.url("/rest/kill")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(!app.shutdown.is_triggered());

    app.stop().await.unwrap();
}
