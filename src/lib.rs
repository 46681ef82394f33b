//! HTTP edge-service scaffold.
//!
//! Accepts requests, dispatches them to handlers registered at runtime from
//! any task, and measures each instrumented route.
//!
//! # Architecture Overview
//!
//! ```text
//!   client ──→ http::Server ──→ middleware chain ──→ routing::Mux ──→ handler
//!              (timeouts,       (request id, CORS)   (live table)     │
//!               panic → 500)                                          │ instrumented?
//!                                                                     ↓
//!                                                       http::Instrumentor ──→ MetricsRegistry
//!
//!   modules ──add_route──→ routing::Router ──publish──→ routing::Mux
//! ```

pub mod cache;
pub mod config;
pub mod handlers;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;

pub use config::AppConfig;
pub use http::{Server, ServerConfig, ServerError};
pub use lifecycle::{App, Shutdown};
pub use observability::MetricsRegistry;
pub use routing::{Methods, Mux, RouteConfig, RouteError, Router};
