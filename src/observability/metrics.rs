//! Metrics registry and exposition.
//!
//! # Responsibilities
//! - Own the Prometheus registry every collector in the process registers with
//! - Fail loudly on duplicate collector registration
//! - Render the Prometheus text format for the `/metrics` endpoint
//!
//! # Metrics
//! - `<ns>_api_requests_total` (counter): requests by path pattern, method, status class
//! - `<ns>_request_duration_seconds` (histogram): latency by path pattern, method
//! - `<ns>_cache_*_total` (gauges): cache statistics snapshots
//!
//! # Design Decisions
//! - The registry is an explicit value, not a process global, so tests can
//!   build as many independent instances as they need
//! - Labels are bounded enums or registered path patterns, never raw request data

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{Encoder, Registry, TextEncoder};
use thiserror::Error;

/// Error type for metric registration and exposition.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A collector with the same descriptor is already registered.
    #[error("metric `{0}` is already registered")]
    AlreadyRegistered(String),

    /// Any other failure reported by the prometheus crate.
    #[error("prometheus: {0}")]
    Prometheus(#[from] prometheus::Error),

    /// The text encoder produced bytes that are not UTF-8.
    #[error("metrics output is not valid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// A cheaply cloneable handle to one Prometheus registry.
#[derive(Clone)]
pub struct MetricsRegistry {
    inner: Arc<Registry>,
    namespace: Arc<str>,
}

impl MetricsRegistry {
    /// Create an empty registry whose collectors are prefixed with `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Registry::new()),
            namespace: Arc::from(namespace.into()),
        }
    }

    /// Prefix applied to metric names created for this registry.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Register a collector. Registering the same metric twice is an error.
    pub fn register(&self, collector: Box<dyn Collector>) -> Result<(), MetricsError> {
        let name = collector_name(collector.as_ref());
        match self.inner.register(collector) {
            Ok(()) => {
                tracing::debug!(metric = %name, "Metric registered");
                Ok(())
            }
            Err(prometheus::Error::AlreadyReg) => Err(MetricsError::AlreadyRegistered(name)),
            Err(other) => Err(MetricsError::Prometheus(other)),
        }
    }

    /// Remove a previously registered collector.
    pub fn unregister(&self, collector: Box<dyn Collector>) -> Result<(), MetricsError> {
        let name = collector_name(collector.as_ref());
        self.inner.unregister(collector)?;
        tracing::debug!(metric = %name, "Metric unregistered");
        Ok(())
    }

    /// Render every registered metric in the Prometheus text format.
    pub fn render(&self) -> Result<String, MetricsError> {
        let families = self.inner.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

fn collector_name(collector: &dyn Collector) -> String {
    collector
        .desc()
        .first()
        .map(|d| d.fq_name.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::{IntCounter, Opts};

    fn counter(ns: &str) -> IntCounter {
        IntCounter::with_opts(Opts::new("hits_total", "Hits.").namespace(ns)).unwrap()
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let registry = MetricsRegistry::new("test");
        registry.register(Box::new(counter("test"))).unwrap();

        let err = registry.register(Box::new(counter("test"))).unwrap_err();
        assert!(matches!(err, MetricsError::AlreadyRegistered(ref name) if name == "test_hits_total"));
    }

    #[test]
    fn test_unregister_allows_registering_again() {
        let registry = MetricsRegistry::new("test");
        let c = counter("test");
        registry.register(Box::new(c.clone())).unwrap();
        registry.unregister(Box::new(c)).unwrap();

        registry.register(Box::new(counter("test"))).unwrap();
    }

    #[test]
    fn test_registries_are_independent() {
        let a = MetricsRegistry::new("test");
        let b = MetricsRegistry::new("test");
        a.register(Box::new(counter("test"))).unwrap();
        b.register(Box::new(counter("test"))).unwrap();
    }

    #[test]
    fn test_render_text_format() {
        let registry = MetricsRegistry::new("test");
        let c = counter("test");
        registry.register(Box::new(c.clone())).unwrap();
        c.inc_by(3);

        let output = registry.render().unwrap();
        assert!(output.contains("# TYPE test_hits_total counter"));
        assert!(output.contains("test_hits_total 3"));
    }
}
