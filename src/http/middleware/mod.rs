//! Middleware composition.
//!
//! A [`Middleware`] transforms one handler into another. [`chain`] folds a
//! list of them around a terminal handler so that the first entry is the
//! outermost wrapper:
//!
//! ```text
//! chain(h, [A, B])  ==  A(B(h))
//!
//! request  → A pre → B pre → h
//! response ← A post ← B post ←
//! ```
//!
//! Composition is pure: building a chain registers nothing and touches no
//! shared state.

use std::future::Future;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use axum::response::Response;

use crate::http::handler::{BoxFuture, BoxHandler, Handler};

pub mod cors;
pub mod request_id;

pub use cors::cors;
pub use request_id::{request_id, RequestIdPolicy};

/// A handler transform.
pub type Middleware = Arc<dyn Fn(BoxHandler) -> BoxHandler + Send + Sync>;

/// Wrap `terminal` in `middlewares`, `middlewares[0]` outermost.
///
/// With no middlewares the terminal handler is returned unchanged.
pub fn chain(terminal: BoxHandler, middlewares: &[Middleware]) -> BoxHandler {
    middlewares
        .iter()
        .rev()
        .fold(terminal, |inner, middleware| middleware(inner))
}

/// The rest of the chain, handed to a [`from_fn`] middleware.
#[derive(Clone)]
pub struct Next {
    inner: BoxHandler,
}

impl Next {
    /// Run the remaining middlewares and the terminal handler.
    pub fn run(self, req: Request<Body>) -> BoxFuture {
        self.inner.call(req)
    }
}

/// Build a middleware from an async function of the request and the rest of
/// the chain.
///
/// ```rust,ignore
/// let timing = from_fn(|req, next: Next| async move {
///     let started = Instant::now();
///     let res = next.run(req).await;
///     tracing::debug!(elapsed = ?started.elapsed(), "handled");
///     res
/// });
/// ```
pub fn from_fn<F, Fut>(f: F) -> Middleware
where
    F: Fn(Request<Body>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |inner: BoxHandler| -> BoxHandler {
        Arc::new(FromFn {
            f: Arc::clone(&f),
            inner,
        })
    })
}

struct FromFn<F> {
    f: Arc<F>,
    inner: BoxHandler,
}

impl<F, Fut> Handler for FromFn<F>
where
    F: Fn(Request<Body>, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    fn call(&self, req: Request<Body>) -> BoxFuture {
        let next = Next {
            inner: Arc::clone(&self.inner),
        };
        Box::pin((self.f)(req, next))
    }
}
