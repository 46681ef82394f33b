//! The handler capability shared by the router, middleware and instrumentation.
//!
//! A handler accepts a request and produces a response. It is implemented for
//! every `Fn(Request<Body>) -> impl Future<Output = impl IntoResponse>`, so
//! plain `async fn`s and closures work directly, and user types can implement
//! [`Handler`] by hand.
//!
//! ```text
//! async fn health(req) -> &'static str      ← user writes this
//!        ↓ handler(health) / Arc::new(health)
//! BoxHandler = Arc<dyn Handler>              ← stored in the route table
//!        ↓
//! handler.call(req)                          ← one virtual call per request
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::{IntoResponse, Response};

/// A heap-allocated response future that can move across worker threads.
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Turns a request into a response.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request<Body>) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
pub type BoxHandler = Arc<dyn Handler>;

impl<F, Fut, R> Handler for F
where
    F: Fn(Request<Body>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    fn call(&self, req: Request<Body>) -> BoxFuture {
        let fut = (self)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Erase a handler's concrete type.
pub fn handler(h: impl Handler) -> BoxHandler {
    Arc::new(h)
}
