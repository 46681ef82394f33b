//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (hyper http1, header read timeout, trace span,
//!                  panic → 500, handler timeout → 408)
//!     → middleware/ (request id, CORS; first entry outermost)
//!     → routing::Mux (404 / 405 / 301 or matched route)
//!     → instrument.rs (count + latency, instrumented routes only)
//!     → handler.rs (application handler)
//! ```

pub mod diagnostics;
pub mod handler;
pub mod instrument;
pub mod middleware;
pub mod request;
pub mod server;

pub use handler::{handler, BoxFuture, BoxHandler, Handler};
pub use instrument::Instrumentor;
pub use middleware::{chain, Middleware, Next, RequestIdPolicy};
pub use request::{PathParams, RequestId, RequestIdExt, X_REQUEST_ID};
pub use server::{Server, ServerConfig, ServerError, ServerState};
