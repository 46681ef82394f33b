//! Startup orchestration.
//!
//! # Responsibilities
//! - Build every subsystem from a validated [`AppConfig`], in dependency order
//! - Mount the built-in routes
//! - Run the server and its background tasks until shutdown
//!
//! # Design Decisions
//! - Fail fast: any build error is fatal
//! - Subsystems initialize in order, not concurrently
//! - The listener starts last (traffic only when ready)

use std::sync::Arc;

use thiserror::Error;

use crate::cache::{CacheError, CacheOptions, CacheStatsCollector, InMemCache};
use crate::config::AppConfig;
use crate::handlers::{health, kill};
use crate::http::middleware::{chain, cors, request_id, Middleware, RequestIdPolicy};
use crate::http::{Server, ServerConfig, ServerError};
use crate::lifecycle::Shutdown;
use crate::observability::{MetricsError, MetricsRegistry};
use crate::routing::{RouteError, Router};

/// Error type for building the application.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("metrics setup failed: {0}")]
    Metrics(#[from] MetricsError),

    #[error("route setup failed: {0}")]
    Route(#[from] RouteError),

    #[error("cache setup failed: {0}")]
    Cache(#[from] CacheError),
}

/// A fully wired service, ready to run.
pub struct App {
    registry: MetricsRegistry,
    router: Arc<Router>,
    server: Arc<Server>,
    cache: Option<Arc<InMemCache>>,
    collector: Option<CacheStatsCollector>,
    shutdown: Shutdown,
}

impl App {
    /// Wire metrics, routes, middleware, cache and server from `config`.
    ///
    /// `shutdown` stops the server and every background task.
    pub fn build(config: &AppConfig, shutdown: Shutdown) -> Result<Self, StartupError> {
        let registry = MetricsRegistry::new(config.metrics.namespace.clone());
        let router = Arc::new(Router::new(&registry)?);

        health::register(&router)?;
        if config.slt_mode {
            kill::register(&router, shutdown.clone())?;
        }

        let (cache, collector) = if config.cache.enabled {
            let cache = Arc::new(InMemCache::new(CacheOptions::from(&config.cache))?);
            let collector = if config.cache.stats_enabled {
                Some(CacheStatsCollector::new(
                    &registry,
                    Arc::clone(&cache),
                    config.cache.stats_interval(),
                )?)
            } else {
                None
            };
            (Some(cache), collector)
        } else {
            (None, None)
        };

        let middlewares: [Middleware; 2] = [
            request_id(RequestIdPolicy::Preserve),
            cors(&config.cors),
        ];
        let app = chain(Arc::new(router.mux()), &middlewares);
        let server = Arc::new(Server::new(
            ServerConfig::from(&config.http_server),
            app,
            shutdown.clone(),
        ));

        tracing::info!(
            app = %config.app_name,
            environment = %config.environment,
            routes = router.len(),
            cache = config.cache.enabled,
            slt_mode = config.slt_mode,
            "Application built"
        );

        Ok(Self {
            registry,
            router,
            server,
            cache,
            collector,
            shutdown,
        })
    }

    pub fn registry(&self) -> &MetricsRegistry {
        &self.registry
    }

    /// The router, for mounting application routes before or after `run`.
    pub fn router(&self) -> Arc<Router> {
        Arc::clone(&self.router)
    }

    pub fn server(&self) -> Arc<Server> {
        Arc::clone(&self.server)
    }

    pub fn cache(&self) -> Option<Arc<InMemCache>> {
        self.cache.clone()
    }

    /// Serve until shutdown, then stop background tasks and release metrics.
    pub async fn run(self) -> Result<(), ServerError> {
        let collector = self
            .collector
            .map(|collector| collector.spawn(&self.shutdown));

        let served = self.server.start().await;

        // The server may also exit on its own (bind failure).
        self.shutdown.trigger();
        if let Some(task) = collector {
            if let Err(e) = task.await {
                tracing::warn!(error = %e, "Cache stats collector task failed");
            }
        }
        if let Err(e) = self.router.shutdown() {
            tracing::warn!(error = %e, "Failed to release route metrics");
        }

        tracing::info!("Shutdown complete");
        served
    }
}
