//! Route registration.
//!
//! # Responsibilities
//! - Accept routes from any task, before or after the server starts
//! - Reject registrations that would shadow a live handler
//! - Wrap instrumented routes before they become reachable
//! - Publish each new table atomically for the [`Mux`]
//!
//! # Design Decisions
//! - One mutex serializes writers; it is held only to build and publish
//! - Readers never take the mutex (lock-free snapshot via `ArcSwap`)
//! - A failed registration publishes nothing

use std::fmt;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use axum::http::Method;
use thiserror::Error;

use crate::http::diagnostics;
use crate::http::handler::BoxHandler;
use crate::http::instrument::Instrumentor;
use crate::observability::{MetricsError, MetricsRegistry};
use crate::routing::table::{Mux, RouteTable};

/// Error type for route registration.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A handler is already registered for this path and method.
    #[error("route conflict: {method} {path} is already registered")]
    Conflict { path: String, method: String },

    /// The path pattern is malformed or ambiguous with an existing one.
    #[error("invalid route path `{path}`: {message}")]
    InvalidPath { path: String, message: String },
}

/// The methods a route accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Methods {
    /// Every method, including non-standard ones.
    Any,
    /// Exactly these methods. An empty list accepts every method.
    Only(Vec<Method>),
}

impl Methods {
    /// Accept exactly `methods`, ignoring duplicates. No methods means
    /// [`Methods::Any`].
    pub fn only(methods: impl IntoIterator<Item = Method>) -> Self {
        let mut list: Vec<Method> = Vec::new();
        for method in methods {
            if !list.contains(&method) {
                list.push(method);
            }
        }
        Methods::Only(list).normalized()
    }

    /// Collapse an empty `Only` into `Any`.
    pub(crate) fn normalized(self) -> Self {
        match self {
            Methods::Only(list) if list.is_empty() => Methods::Any,
            other => other,
        }
    }
}

impl fmt::Display for Methods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Methods::Any => f.write_str("ANY"),
            Methods::Only(list) => {
                let names: Vec<&str> = list.iter().map(Method::as_str).collect();
                f.write_str(&names.join(","))
            }
        }
    }
}

/// One route to register.
pub struct RouteConfig {
    pub path: String,
    pub methods: Methods,
    pub handler: BoxHandler,
    /// Record request count and latency for this route.
    pub instrument: bool,
}

impl RouteConfig {
    pub fn new(path: impl Into<String>, methods: Methods, handler: BoxHandler) -> Self {
        Self {
            path: path.into(),
            methods,
            handler,
            instrument: false,
        }
    }

    pub fn instrumented(mut self) -> Self {
        self.instrument = true;
        self
    }
}

/// The mutable route table and its instrumentation.
pub struct Router {
    table: Arc<ArcSwap<RouteTable>>,
    writer: Mutex<()>,
    instrumentor: Instrumentor,
}

impl Router {
    /// Create a router with the diagnostic routes (`/metrics`,
    /// `/debug/pprof/...`) already mounted.
    ///
    /// Fails if another router's instrumentation is still registered in
    /// `registry`.
    pub fn new(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        let router = Self {
            table: Arc::new(ArcSwap::from_pointee(RouteTable::default())),
            writer: Mutex::new(()),
            instrumentor: Instrumentor::new(registry)?,
        };

        for (path, handler) in diagnostics::routes(registry) {
            if let Err(e) = router.add_route(RouteConfig::new(path, Methods::only([Method::GET]), handler)) {
                tracing::error!(error = %e, "Failed to mount diagnostic route");
            }
        }
        Ok(router)
    }

    /// Register a route. Safe to call concurrently and while serving.
    pub fn add_route(&self, config: RouteConfig) -> Result<(), RouteError> {
        let RouteConfig {
            path,
            methods,
            handler,
            instrument,
        } = config;

        let handler = if instrument {
            self.instrumentor.instrument(&path, handler)
        } else {
            handler
        };
        let methods_label = methods.to_string();

        let _guard = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let next = match self.table.load().with_route(&path, methods, handler) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(path = %path, methods = %methods_label, error = %e, "Route rejected");
                return Err(e);
            }
        };
        self.table.store(Arc::new(next));

        tracing::info!(path = %path, methods = %methods_label, instrument, "Route registered");
        Ok(())
    }

    /// A handle to the live multiplexer.
    pub fn mux(&self) -> Mux {
        Mux::new(Arc::clone(&self.table))
    }

    /// Number of registered path patterns, diagnostics included.
    pub fn len(&self) -> usize {
        self.table.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the instrumentation collectors. Idempotent.
    pub fn shutdown(&self) -> Result<(), MetricsError> {
        self.instrumentor.shutdown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::handler;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::response::Response;

    fn text(body: &'static str) -> BoxHandler {
        handler(move |_req: Request<Body>| async move { body })
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn body(res: Response) -> String {
        let bytes = axum::body::to_bytes(res.into_body(), 1 << 20).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration_keeps_every_route() {
        let registry = MetricsRegistry::new("test");
        let router = Arc::new(Router::new(&registry).unwrap());
        let baseline = router.len();

        let mut tasks = Vec::new();
        for worker in 0..8 {
            let router = Arc::clone(&router);
            tasks.push(tokio::spawn(async move {
                for i in 0..25 {
                    let path = format!("/w{worker}/r{i}");
                    router
                        .add_route(RouteConfig::new(
                            path,
                            Methods::only([Method::GET]),
                            text("ok"),
                        ))
                        .unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(router.len(), baseline + 8 * 25);
        let mux = router.mux();
        for worker in 0..8 {
            for i in 0..25 {
                let res = mux.dispatch(get(&format!("/w{worker}/r{i}"))).await;
                assert_eq!(res.status(), StatusCode::OK);
            }
        }
    }

    #[tokio::test]
    async fn test_conflict_keeps_original_handler() {
        let registry = MetricsRegistry::new("test");
        let router = Router::new(&registry).unwrap();
        router
            .add_route(RouteConfig::new("/dup", Methods::only([Method::GET]), text("first")))
            .unwrap();

        let err = router
            .add_route(RouteConfig::new("/dup", Methods::only([Method::GET]), text("second")))
            .unwrap_err();
        assert!(matches!(err, RouteError::Conflict { .. }));
        assert_eq!(err.to_string(), "route conflict: GET /dup is already registered");

        let res = router.mux().dispatch(get("/dup")).await;
        assert_eq!(body(res).await, "first");
    }

    #[tokio::test]
    async fn test_mux_sees_routes_added_later() {
        let registry = MetricsRegistry::new("test");
        let router = Router::new(&registry).unwrap();
        let mux = router.mux();

        assert_eq!(mux.dispatch(get("/late")).await.status(), StatusCode::NOT_FOUND);
        router
            .add_route(RouteConfig::new("/late", Methods::Any, text("here")))
            .unwrap();
        assert_eq!(body(mux.dispatch(get("/late")).await).await, "here");
    }

    #[tokio::test]
    async fn test_only_instrumented_routes_are_measured() {
        let registry = MetricsRegistry::new("test");
        let router = Router::new(&registry).unwrap();
        router
            .add_route(
                RouteConfig::new("/measured", Methods::only([Method::GET]), text("m")).instrumented(),
            )
            .unwrap();
        router
            .add_route(RouteConfig::new("/plain", Methods::only([Method::GET]), text("p")))
            .unwrap();

        let mux = router.mux();
        mux.dispatch(get("/measured")).await;
        mux.dispatch(get("/plain")).await;
        let metrics = body(mux.dispatch(get("/metrics")).await).await;

        assert!(metrics.contains(r#"test_api_requests_total{code="2xx",method="GET",path="/measured"} 1"#));
        assert!(!metrics.contains(r#"path="/plain""#));
        assert!(!metrics.contains(r#"path="/metrics""#));
    }

    #[test]
    fn test_router_shutdown_releases_metric_names() {
        let registry = MetricsRegistry::new("test");
        let first = Router::new(&registry).unwrap();
        assert!(matches!(
            Router::new(&registry),
            Err(MetricsError::AlreadyRegistered(_))
        ));

        first.shutdown().unwrap();
        assert!(Router::new(&registry).is_ok());
    }

    #[test]
    fn test_methods_display_and_dedup() {
        assert_eq!(Methods::Any.to_string(), "ANY");
        let methods = Methods::only([Method::GET, Method::POST, Method::GET]);
        assert_eq!(methods, Methods::Only(vec![Method::GET, Method::POST]));
        assert_eq!(Methods::only(Vec::<Method>::new()), Methods::Any);
        assert_eq!(methods.to_string(), "GET,POST");
    }
}
