//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use edge_scaffold::config::AppConfig;
use edge_scaffold::http::{BoxHandler, Server, ServerConfig, ServerError};
use edge_scaffold::lifecycle::{App, Shutdown};
use edge_scaffold::observability::MetricsRegistry;
use edge_scaffold::routing::Router;
use tokio::task::JoinHandle;

/// Config for a full application on an ephemeral local port.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.http_server.bind_host = "127.0.0.1".to_string();
    config.http_server.port = 0;
    config.metrics.namespace = "edge_test".to_string();
    config
}

/// A running application.
pub struct TestApp {
    pub addr: SocketAddr,
    pub router: Arc<Router>,
    pub registry: MetricsRegistry,
    pub shutdown: Shutdown,
    pub server: Arc<Server>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for the application to finish.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        self.join().await
    }

    /// Wait for the application to finish on its own.
    pub async fn join(self) -> Result<(), ServerError> {
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("application did not stop in time")
            .expect("application task panicked")
    }
}

/// Build and start the full application, returning once it is listening.
pub async fn spawn_app(config: AppConfig) -> TestApp {
    let shutdown = Shutdown::new();
    let app = App::build(&config, shutdown.clone()).expect("application builds");
    let router = app.router();
    let registry = app.registry().clone();
    let server = app.server();

    let handle = tokio::spawn(app.run());
    let addr = server.local_addr().await.expect("server is listening");

    TestApp {
        addr,
        router,
        registry,
        shutdown,
        server,
        handle,
    }
}

/// A bare server around `handler` with explicit timeouts.
pub async fn spawn_server(
    handler: BoxHandler,
    write_timeout: Duration,
    idle_timeout: Duration,
) -> (Arc<Server>, SocketAddr, JoinHandle<Result<(), ServerError>>) {
    let config = ServerConfig {
        bind_host: "127.0.0.1".to_string(),
        port: 0,
        read_timeout: Duration::from_secs(5),
        write_timeout,
        idle_timeout,
    };
    let server = Arc::new(Server::new(config, handler, Shutdown::new()));
    let running = Arc::clone(&server);
    let handle = tokio::spawn(async move { running.start().await });
    let addr = server.local_addr().await.expect("server is listening");
    (server, addr, handle)
}

/// A client that does not follow redirects or pool connections.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .pool_max_idle_per_host(0)
        .timeout(Duration::from_secs(10))
        .build()
        .expect("client builds")
}
