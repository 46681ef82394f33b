//! Per-route request metrics.
//!
//! [`Instrumentor::instrument`] wraps a handler so that every invocation
//! records exactly one increment of `<ns>_api_requests_total{path,method,code}`
//! and one observation of `<ns>_request_duration_seconds{path,method}`.
//!
//! Label values are bounded: `path` is the registered route pattern (never
//! the raw request path), `method` is a standard method name or `OTHER`, and
//! `code` is a status class (`1xx`..`5xx`) or `cancelled`.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use futures_util::FutureExt;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

use crate::http::handler::{BoxFuture, BoxHandler, Handler};
use crate::observability::{MetricsError, MetricsRegistry};

/// Latency buckets in seconds, 1ms to 10s.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Owns the request counter and latency histogram for instrumented routes.
pub struct Instrumentor {
    registry: MetricsRegistry,
    requests: IntCounterVec,
    duration: HistogramVec,
    released: AtomicBool,
}

impl Instrumentor {
    /// Create both collectors and register them with `registry`.
    ///
    /// Fails with [`MetricsError::AlreadyRegistered`] while another live
    /// instrumentor holds the same metric names in that registry.
    pub fn new(registry: &MetricsRegistry) -> Result<Self, MetricsError> {
        let ns = registry.namespace();
        let requests = IntCounterVec::new(
            Opts::new(
                "api_requests_total",
                "Requests handled by instrumented routes.",
            )
            .namespace(ns),
            &["path", "method", "code"],
        )?;
        let duration = HistogramVec::new(
            HistogramOpts::new(
                "request_duration_seconds",
                "Latency of instrumented routes in seconds.",
            )
            .namespace(ns)
            .buckets(DURATION_BUCKETS.to_vec()),
            &["path", "method"],
        )?;

        registry.register(Box::new(requests.clone()))?;
        if let Err(e) = registry.register(Box::new(duration.clone())) {
            registry.unregister(Box::new(requests.clone()))?;
            return Err(e);
        }

        Ok(Self {
            registry: registry.clone(),
            requests,
            duration,
            released: AtomicBool::new(false),
        })
    }

    /// Wrap `handler` so each call to the route `path` is measured.
    pub fn instrument(&self, path: &str, handler: BoxHandler) -> BoxHandler {
        Arc::new(Instrumented {
            path: Arc::from(path),
            inner: handler,
            requests: self.requests.clone(),
            duration: self.duration.clone(),
        })
    }

    /// Unregister both collectors. Only the first call has an effect.
    pub fn shutdown(&self) -> Result<(), MetricsError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.registry.unregister(Box::new(self.requests.clone()))?;
        self.registry.unregister(Box::new(self.duration.clone()))?;
        tracing::debug!("Route instrumentation released");
        Ok(())
    }
}

struct Instrumented {
    path: Arc<str>,
    inner: BoxHandler,
    requests: IntCounterVec,
    duration: HistogramVec,
}

impl Handler for Instrumented {
    fn call(&self, req: Request<Body>) -> BoxFuture {
        let mut measurement = Measurement {
            path: Arc::clone(&self.path),
            method: method_label(req.method()),
            started: Instant::now(),
            requests: self.requests.clone(),
            duration: self.duration.clone(),
            recorded: false,
        };
        let fut = self.inner.call(req);

        Box::pin(async move {
            match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(res) => {
                    measurement.record(status_class(res.status()));
                    res
                }
                Err(panic) => {
                    measurement.record("5xx");
                    std::panic::resume_unwind(panic)
                }
            }
        })
    }
}

/// One in-flight request. Records on completion, or as `cancelled` if the
/// request future is dropped first.
struct Measurement {
    path: Arc<str>,
    method: &'static str,
    started: Instant,
    requests: IntCounterVec,
    duration: HistogramVec,
    recorded: bool,
}

impl Measurement {
    fn record(&mut self, code: &str) {
        if self.recorded {
            return;
        }
        self.recorded = true;
        let elapsed = self.started.elapsed().as_secs_f64();
        self.requests
            .with_label_values(&[&*self.path, self.method, code])
            .inc();
        self.duration
            .with_label_values(&[&*self.path, self.method])
            .observe(elapsed);
    }
}

impl Drop for Measurement {
    fn drop(&mut self) {
        self.record("cancelled");
    }
}

fn method_label(method: &Method) -> &'static str {
    match *method {
        Method::GET => "GET",
        Method::HEAD => "HEAD",
        Method::POST => "POST",
        Method::PUT => "PUT",
        Method::DELETE => "DELETE",
        Method::CONNECT => "CONNECT",
        Method::OPTIONS => "OPTIONS",
        Method::TRACE => "TRACE",
        Method::PATCH => "PATCH",
        _ => "OTHER",
    }
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() {
        100..=199 => "1xx",
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::handler::handler;
    use std::time::Duration;

    fn counter_value(inst: &Instrumentor, path: &str, method: &str, code: &str) -> u64 {
        inst.requests.with_label_values(&[path, method, code]).get()
    }

    fn sample_count(inst: &Instrumentor, path: &str, method: &str) -> u64 {
        inst.duration.with_label_values(&[path, method]).get_sample_count()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_error_status_is_counted_once() {
        let registry = MetricsRegistry::new("test");
        let inst = Instrumentor::new(&registry).unwrap();
        let h = inst.instrument(
            "/fail",
            handler(|_req: Request<Body>| async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                StatusCode::INTERNAL_SERVER_ERROR
            }),
        );

        let started = Instant::now();
        for _ in 0..3 {
            let res = h.call(get("/fail")).await;
            assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
        }
        let wall = started.elapsed().as_secs_f64();

        assert_eq!(counter_value(&inst, "/fail", "GET", "5xx"), 3);
        assert_eq!(sample_count(&inst, "/fail", "GET"), 3);

        let sum = inst.duration.with_label_values(&["/fail", "GET"]).get_sample_sum();
        assert!(sum >= 0.06, "recorded latency {sum} below slept time");
        assert!(sum <= wall + 0.01, "recorded latency {sum} above wall clock {wall}");
    }

    #[tokio::test]
    async fn test_labels_use_route_pattern_and_method() {
        let registry = MetricsRegistry::new("test");
        let inst = Instrumentor::new(&registry).unwrap();
        let h = inst.instrument("/users/{id}", handler(|_req: Request<Body>| async { "ok" }));

        let req = Request::builder()
            .method("PURGE")
            .uri("/users/42?token=secret")
            .body(Body::empty())
            .unwrap();
        h.call(req).await;

        assert_eq!(counter_value(&inst, "/users/{id}", "OTHER", "2xx"), 1);
        let text = registry.render().unwrap();
        assert!(!text.contains("/users/42"));
        assert!(!text.contains("secret"));
        assert!(text.contains("test_api_requests_total"));
        assert!(text.contains("test_request_duration_seconds_bucket"));
    }

    #[tokio::test]
    async fn test_panic_is_recorded_and_propagates() {
        let registry = MetricsRegistry::new("test");
        let inst = Instrumentor::new(&registry).unwrap();
        let h = inst.instrument(
            "/boom",
            handler(|_req: Request<Body>| async {
                if true {
                    panic!("handler exploded");
                }
                "unreachable"
            }),
        );

        let outcome = AssertUnwindSafe(h.call(get("/boom"))).catch_unwind().await;
        assert!(outcome.is_err());
        assert_eq!(counter_value(&inst, "/boom", "GET", "5xx"), 1);
        assert_eq!(sample_count(&inst, "/boom", "GET"), 1);
    }

    #[tokio::test]
    async fn test_dropped_request_is_recorded_as_cancelled() {
        let registry = MetricsRegistry::new("test");
        let inst = Instrumentor::new(&registry).unwrap();
        let h = inst.instrument(
            "/slow",
            handler(|_req: Request<Body>| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );

        let res = tokio::time::timeout(Duration::from_millis(20), h.call(get("/slow"))).await;
        assert!(res.is_err());
        assert_eq!(counter_value(&inst, "/slow", "GET", "cancelled"), 1);
        assert_eq!(sample_count(&inst, "/slow", "GET"), 1);
    }

    #[test]
    fn test_second_instrumentor_requires_shutdown() {
        let registry = MetricsRegistry::new("test");
        let first = Instrumentor::new(&registry).unwrap();

        let err = Instrumentor::new(&registry).err().unwrap();
        assert!(matches!(err, MetricsError::AlreadyRegistered(ref n) if n == "test_api_requests_total"));

        first.shutdown().unwrap();
        first.shutdown().unwrap();
        let second = Instrumentor::new(&registry).unwrap();
        second.shutdown().unwrap();
    }

    #[test]
    fn test_status_classes() {
        assert_eq!(status_class(StatusCode::CONTINUE), "1xx");
        assert_eq!(status_class(StatusCode::NO_CONTENT), "2xx");
        assert_eq!(status_class(StatusCode::MOVED_PERMANENTLY), "3xx");
        assert_eq!(status_class(StatusCode::NOT_FOUND), "4xx");
        assert_eq!(status_class(StatusCode::BAD_GATEWAY), "5xx");
    }
}
