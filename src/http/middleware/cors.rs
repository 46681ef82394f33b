//! CORS middleware.
//!
//! Adds the configured `Access-Control-Allow-*` headers to every response and
//! answers `OPTIONS` preflights with `204 No Content` without calling the
//! wrapped handler.
//!
//! Origin handling: a single configured origin (or `*`) is sent verbatim.
//! With several origins, the request's `Origin` is echoed back when it is in
//! the list (plus `Vary: Origin`) and no allow-origin header is sent otherwise.

use std::sync::Arc;

use axum::http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    ORIGIN, VARY,
};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::config::CorsConfig;
use crate::http::middleware::{from_fn, Middleware, Next};

#[derive(Debug)]
struct CorsHeaders {
    origins: Vec<HeaderValue>,
    methods: Option<HeaderValue>,
    headers: Option<HeaderValue>,
}

impl CorsHeaders {
    fn from_config(config: &CorsConfig) -> Self {
        let origins = config
            .origins
            .iter()
            .filter_map(|o| HeaderValue::from_str(o.trim()).ok())
            .collect();
        Self {
            origins,
            methods: joined(&config.methods),
            headers: joined(&config.headers),
        }
    }

    fn allow_origin(&self, request_origin: Option<&HeaderValue>) -> Option<(HeaderValue, bool)> {
        match self.origins.as_slice() {
            [] => None,
            [single] => Some((single.clone(), false)),
            many => {
                if many.iter().any(|o| o == "*") {
                    return Some((HeaderValue::from_static("*"), false));
                }
                let origin = request_origin?;
                many.contains(origin).then(|| (origin.clone(), true))
            }
        }
    }

    fn apply(&self, request_origin: Option<&HeaderValue>, headers: &mut HeaderMap) {
        if let Some((origin, varies)) = self.allow_origin(request_origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin);
            if varies {
                headers.append(VARY, HeaderValue::from_static("Origin"));
            }
        }
        if let Some(methods) = &self.methods {
            headers.insert(ACCESS_CONTROL_ALLOW_METHODS, methods.clone());
        }
        if let Some(allowed) = &self.headers {
            headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, allowed.clone());
        }
    }
}

fn joined(values: &[String]) -> Option<HeaderValue> {
    if values.is_empty() {
        return None;
    }
    HeaderValue::from_str(&values.join(", ")).ok()
}

/// CORS headers from static configuration; `OPTIONS` short-circuits with 204.
pub fn cors(config: &CorsConfig) -> Middleware {
    let cors = Arc::new(CorsHeaders::from_config(config));

    from_fn(move |req, next: Next| {
        let cors = Arc::clone(&cors);
        async move {
            let origin = req.headers().get(ORIGIN).cloned();

            let mut res: Response = if req.method() == Method::OPTIONS {
                StatusCode::NO_CONTENT.into_response()
            } else {
                next.run(req).await
            };

            cors.apply(origin.as_ref(), res.headers_mut());
            res
        }
    })
}
