//! Request-ID middleware.
//!
//! Every request leaving this middleware carries a [`RequestId`] in its
//! extensions and in the `X-Request-ID` request header, and every response
//! carries the same id in its `X-Request-ID` header.

use crate::http::middleware::{from_fn, Middleware, Next};
use crate::http::request::{RequestId, X_REQUEST_ID};

/// What to do with an id the caller already sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RequestIdPolicy {
    /// Keep a valid caller-supplied id; generate one only when absent or invalid.
    #[default]
    Preserve,
    /// Always generate a fresh id.
    Regenerate,
}

/// Attach a request id, honoring `policy` for caller-supplied ids.
pub fn request_id(policy: RequestIdPolicy) -> Middleware {
    from_fn(move |mut req, next: Next| async move {
        let supplied = match policy {
            RequestIdPolicy::Preserve => req
                .headers()
                .get(X_REQUEST_ID)
                .and_then(|v| v.to_str().ok())
                .and_then(RequestId::parse),
            RequestIdPolicy::Regenerate => None,
        };
        let id = supplied.unwrap_or_else(RequestId::generate);
        let header = id.header_value();

        req.headers_mut().insert(X_REQUEST_ID, header.clone());
        req.extensions_mut().insert(id);

        let mut res = next.run(req).await;
        res.headers_mut().insert(X_REQUEST_ID, header);
        res
    })
}
