//! HTTP server and graceful shutdown.
//!
//! # Responsibilities
//! - Bind the listener and accept connections
//! - Serve each connection on its own task (HTTP/1.1)
//! - Bound header reads (`read_timeout`) and handlers (`write_timeout`)
//! - Turn handler panics into `500` responses
//! - Stop gracefully: stop accepting, drain for `idle_timeout`, then close
//!
//! # Lifecycle
//! ```text
//! Created ──start()──→ Running ──stop()/Shutdown──→ Stopped
//!    │                                                ↑
//!    └────────────── bind failure ────────────────────┘
//! ```

use std::convert::Infallible;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use axum::body::Body;
use axum::http::StatusCode;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::HttpServerConfig;
use crate::http::handler::BoxHandler;
use crate::lifecycle::Shutdown;

/// Pause after a non-connection accept error (e.g. out of file descriptors).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for the server lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// `start` was called on a server that is not in the `Created` state.
    #[error("server cannot start from state {0}")]
    InvalidState(ServerState),

    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The bound listener could not report its address.
    #[error("listener address unavailable: {0}")]
    LocalAddr(#[source] io::Error),
}

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Running,
    Stopped,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ServerState::Created,
            1 => ServerState::Running,
            _ => ServerState::Stopped,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Created => "created",
            ServerState::Running => "running",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Listener address and timeouts.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_host: String,
    pub port: u16,
    /// Bound on reading a request's headers. The same timer runs while a
    /// keep-alive connection waits for its next request, so it also closes
    /// idle connections.
    pub read_timeout: Duration,
    /// Bound on a handler; exceeding it yields `408`.
    pub write_timeout: Duration,
    /// Drain deadline on stop. In-flight requests get this long to finish
    /// before their connections are closed.
    pub idle_timeout: Duration,
}

impl From<&HttpServerConfig> for ServerConfig {
    fn from(config: &HttpServerConfig) -> Self {
        Self {
            bind_host: config.bind_host.clone(),
            port: config.port,
            read_timeout: config.read_timeout(),
            write_timeout: config.write_timeout(),
            idle_timeout: config.idle_timeout(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Bound {
    Pending,
    Listening(SocketAddr),
    Closed,
}

/// HTTP server bound to one handler (usually a middleware-wrapped `Mux`).
pub struct Server {
    config: ServerConfig,
    handler: BoxHandler,
    shutdown: Shutdown,
    state: AtomicU8,
    bound: watch::Sender<Bound>,
}

impl Server {
    /// Create a server. `shutdown` stops it; other components may share it.
    pub fn new(config: ServerConfig, handler: BoxHandler, shutdown: Shutdown) -> Self {
        let (bound, _) = watch::channel(Bound::Pending);
        Self {
            config,
            handler,
            shutdown,
            state: AtomicU8::new(ServerState::Created as u8),
            bound,
        }
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// The bound address once listening; `None` if binding failed or the
    /// server has stopped.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        let mut rx = self.bound.subscribe();
        let bound = match rx.wait_for(|b| !matches!(b, Bound::Pending)).await {
            Ok(bound) => *bound,
            Err(_) => Bound::Closed,
        };
        match bound {
            Bound::Listening(addr) => Some(addr),
            Bound::Pending | Bound::Closed => None,
        }
    }

    /// Request a graceful stop. Returns immediately; `start` resolves once
    /// the drain completes.
    pub fn stop(&self) {
        tracing::info!(state = %self.state(), "HTTP server stop requested");
        self.shutdown.trigger();
    }

    /// Bind and serve until stopped.
    ///
    /// Returns `Ok(())` after an intentional stop.
    pub async fn start(&self) -> Result<(), ServerError> {
        if let Err(current) = self.state.compare_exchange(
            ServerState::Created as u8,
            ServerState::Running as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            return Err(ServerError::InvalidState(ServerState::from_u8(current)));
        }

        let result = self.serve().await;
        self.state.store(ServerState::Stopped as u8, Ordering::SeqCst);
        self.bound.send_replace(Bound::Closed);
        result
    }

    async fn serve(&self) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.bind_host, self.config.port);
        let listener = TcpListener::bind((self.config.bind_host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local = listener.local_addr().map_err(ServerError::LocalAddr)?;
        self.bound.send_replace(Bound::Listening(local));

        tracing::info!(
            address = %local,
            read_timeout = ?self.config.read_timeout,
            write_timeout = ?self.config.write_timeout,
            idle_timeout = ?self.config.idle_timeout,
            "HTTP server listening"
        );

        let handler = self.handler.clone();
        let service = ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::new())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.write_timeout,
            ))
            .service(tower::service_fn(move |req| {
                let fut = handler.call(req);
                async move { Ok::<_, Infallible>(fut.await) }
            }));

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.read_timeout);

        let graceful = GracefulShutdown::new();
        let mut tasks = JoinSet::new();
        let mut stop = self.shutdown.subscribe();

        loop {
            tokio::select! {
                biased;

                () = stop.recv() => {
                    tracing::info!(in_flight = tasks.len(), "Shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, peer) = match res {
                        Ok(accepted) => accepted,
                        Err(e) if is_connection_error(&e) => continue,
                        Err(e) => {
                            tracing::error!(error = %e, "Accept failed");
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                            continue;
                        }
                    };

                    let service = service.clone();
                    let hyper_service = hyper::service::service_fn(move |req: hyper::Request<Incoming>| {
                        service.clone().oneshot(req.map(Body::new))
                    });
                    let conn = graceful.watch(builder.serve_connection(TokioIo::new(stream), hyper_service));

                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            tracing::debug!(peer = %peer, error = %e, "Connection closed with error");
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);

        tokio::select! {
            () = graceful.shutdown() => {
                tracing::info!("All connections drained");
            }
            () = tokio::time::sleep(self.config.idle_timeout) => {
                tracing::warn!(
                    remaining = tasks.len(),
                    idle_timeout = ?self.config.idle_timeout,
                    "Drain timed out, closing remaining connections"
                );
                tasks.abort_all();
            }
        }
        while tasks.join_next().await.is_some() {}

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::handler;
    use axum::http::Request;

    fn config() -> ServerConfig {
        ServerConfig {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            read_timeout: Duration::from_secs(1),
            write_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(1),
        }
    }

    fn ok() -> BoxHandler {
        handler(|_req: Request<Body>| async { "ok" })
    }

    #[tokio::test]
    async fn test_start_stop_transitions() {
        let server = std::sync::Arc::new(Server::new(config(), ok(), Shutdown::new()));
        assert_eq!(server.state(), ServerState::Created);

        let running = std::sync::Arc::clone(&server);
        let task = tokio::spawn(async move { running.start().await });

        let addr = server.local_addr().await.unwrap();
        assert_ne!(addr.port(), 0);
        assert_eq!(server.state(), ServerState::Running);

        server.stop();
        task.await.unwrap().unwrap();
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().await.is_none());

        let err = server.start().await.unwrap_err();
        assert!(matches!(err, ServerError::InvalidState(ServerState::Stopped)));
    }

    #[tokio::test]
    async fn test_bind_failure_is_reported() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let server = Server::new(ServerConfig { port, ..config() }, ok(), Shutdown::new());
        let err = server.start().await.unwrap_err();

        assert!(matches!(err, ServerError::Bind { .. }));
        assert_eq!(server.state(), ServerState::Stopped);
        assert!(server.local_addr().await.is_none());
    }

    #[tokio::test]
    async fn test_shared_shutdown_stops_server() {
        let shutdown = Shutdown::new();
        let server = Server::new(config(), ok(), shutdown.clone());
        shutdown.trigger();

        tokio::time::timeout(Duration::from_secs(2), server.start())
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_idle_keep_alive_closed_by_read_timeout() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let config = ServerConfig {
            read_timeout: Duration::from_millis(300),
            idle_timeout: Duration::from_secs(10),
            ..config()
        };
        let server = std::sync::Arc::new(Server::new(config, ok(), Shutdown::new()));
        let running = std::sync::Arc::clone(&server);
        let task = tokio::spawn(async move { running.start().await });
        let addr = server.local_addr().await.unwrap();

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET / HTTP/1.1\r\nHost: test\r\n\r\n")
            .await
            .unwrap();
        let mut buf = vec![0u8; 1024];
        let n = stream.read(&mut buf).await.unwrap();
        assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200"));

        let idle_since = std::time::Instant::now();
        let closed = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .expect("idle connection should be closed well before idle_timeout");
        assert!(matches!(closed, Ok(0) | Err(_)));
        assert!(idle_since.elapsed() < Duration::from_secs(3));

        server.stop();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn test_config_from_http_section() {
        let section = HttpServerConfig::default();
        let config = ServerConfig::from(&section);
        assert_eq!(config.port, 8080);
        assert_eq!(config.write_timeout, Duration::from_secs(10));
        assert_eq!(config.idle_timeout, Duration::from_secs(30));
    }
}
