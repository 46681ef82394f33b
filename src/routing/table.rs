//! Immutable route table snapshots and the dispatching [`Mux`].
//!
//! A [`RouteTable`] is never mutated once published. Registration clones the
//! current table, adds one route, and swaps the result in; dispatch loads the
//! current snapshot without locking.

use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use arc_swap::ArcSwap;
use axum::body::Body;
use axum::http::header::{ALLOW, LOCATION};
use axum::http::{HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::http::handler::{BoxFuture, BoxHandler, Handler};
use crate::http::request::PathParams;
use crate::routing::{Methods, RouteError};

/// Handlers registered for one path pattern.
#[derive(Clone, Default)]
struct PathEntry {
    any: Option<BoxHandler>,
    by_method: HashMap<Method, BoxHandler>,
}

impl PathEntry {
    /// Check that `methods` can be added without shadowing a live handler.
    fn check(&self, path: &str, methods: &Methods) -> Result<(), RouteError> {
        let conflict = |method: &str| RouteError::Conflict {
            path: path.to_string(),
            method: method.to_string(),
        };

        match methods {
            Methods::Any => {
                if self.any.is_some() {
                    return Err(conflict("ANY"));
                }
                if let Some(existing) = self.sorted_methods().first() {
                    return Err(conflict(existing.as_str()));
                }
            }
            Methods::Only(list) => {
                if self.any.is_some() {
                    return Err(conflict("ANY"));
                }
                if let Some(taken) = list.iter().find(|m| self.by_method.contains_key(*m)) {
                    return Err(conflict(taken.as_str()));
                }
            }
        }
        Ok(())
    }

    fn insert(&mut self, methods: Methods, handler: BoxHandler) {
        match methods {
            Methods::Any => self.any = Some(handler),
            Methods::Only(list) => {
                for method in list {
                    self.by_method.insert(method, Arc::clone(&handler));
                }
            }
        }
    }

    fn handler_for(&self, method: &Method) -> Option<&BoxHandler> {
        self.by_method.get(method).or(self.any.as_ref())
    }

    fn sorted_methods(&self) -> Vec<&Method> {
        let mut methods: Vec<&Method> = self.by_method.keys().collect();
        methods.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        methods
    }

    fn allow_header(&self) -> Option<HeaderValue> {
        let joined = self
            .sorted_methods()
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        HeaderValue::from_str(&joined).ok()
    }
}

/// One published set of routes.
#[derive(Clone, Default)]
pub(crate) struct RouteTable {
    matcher: matchit::Router<Arc<str>>,
    entries: HashMap<Arc<str>, PathEntry>,
}

/// Outcome of looking up a request in a table.
enum Resolution {
    Found(BoxHandler, PathParams),
    MethodNotAllowed(Option<HeaderValue>),
    Redirect(String),
    NotFound,
}

impl RouteTable {
    /// Build the table that results from adding one route.
    ///
    /// `self` is left untouched; on error nothing is built.
    pub(crate) fn with_route(
        &self,
        path: &str,
        methods: Methods,
        handler: BoxHandler,
    ) -> Result<RouteTable, RouteError> {
        if !path.starts_with('/') {
            return Err(RouteError::InvalidPath {
                path: path.to_string(),
                message: "path must start with '/'".to_string(),
            });
        }

        let methods = methods.normalized();
        let existing = self.entries.get(path);
        match existing {
            Some(entry) => entry.check(path, &methods)?,
            None => PathEntry::default().check(path, &methods)?,
        }

        let mut next = self.clone();
        if existing.is_none() {
            let key: Arc<str> = Arc::from(path);
            next.matcher
                .insert(path, Arc::clone(&key))
                .map_err(|e| RouteError::InvalidPath {
                    path: path.to_string(),
                    message: e.to_string(),
                })?;
            next.entries.insert(key, PathEntry::default());
        }
        if let Some(entry) = next.entries.get_mut(path) {
            entry.insert(methods, handler);
        }
        Ok(next)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn resolve(&self, method: &Method, path: &str) -> Resolution {
        match self.matcher.at(path) {
            Ok(matched) => {
                let Some(entry) = self.entries.get(matched.value) else {
                    return Resolution::NotFound;
                };
                match entry.handler_for(method) {
                    Some(handler) => {
                        let params = matched
                            .params
                            .iter()
                            .map(|(k, v)| (k.to_owned(), v.to_owned()))
                            .collect();
                        Resolution::Found(Arc::clone(handler), PathParams::new(params))
                    }
                    None => Resolution::MethodNotAllowed(entry.allow_header()),
                }
            }
            Err(_) => {
                let toggled = toggle_trailing_slash(path);
                match toggled {
                    Some(alt) if self.matcher.at(&alt).is_ok() => Resolution::Redirect(alt),
                    _ => Resolution::NotFound,
                }
            }
        }
    }
}

fn toggle_trailing_slash(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    Some(match path.strip_suffix('/') {
        Some(trimmed) => trimmed.to_string(),
        None => format!("{path}/"),
    })
}

/// The live request multiplexer.
///
/// Cheap to clone; every clone dispatches against the most recently
/// published route table. Usable as a [`Handler`] and as a `tower::Service`.
#[derive(Clone)]
pub struct Mux {
    table: Arc<ArcSwap<RouteTable>>,
}

impl Mux {
    pub(crate) fn new(table: Arc<ArcSwap<RouteTable>>) -> Self {
        Self { table }
    }

    /// Route `req` to its handler, or answer 404/405/301 directly.
    pub fn dispatch(&self, mut req: Request<Body>) -> BoxFuture {
        let resolution = self.table.load().resolve(req.method(), req.uri().path());

        match resolution {
            Resolution::Found(handler, params) => {
                req.extensions_mut().insert(params);
                handler.call(req)
            }
            Resolution::MethodNotAllowed(allow) => Box::pin(async move {
                let mut res = StatusCode::METHOD_NOT_ALLOWED.into_response();
                if let Some(allow) = allow {
                    res.headers_mut().insert(ALLOW, allow);
                }
                res
            }),
            Resolution::Redirect(path) => {
                let location = match req.uri().query() {
                    Some(query) => format!("{path}?{query}"),
                    None => path,
                };
                Box::pin(async move {
                    match HeaderValue::try_from(location) {
                        Ok(location) => {
                            (StatusCode::MOVED_PERMANENTLY, [(LOCATION, location)]).into_response()
                        }
                        Err(_) => StatusCode::NOT_FOUND.into_response(),
                    }
                })
            }
            Resolution::NotFound => Box::pin(async { StatusCode::NOT_FOUND.into_response() }),
        }
    }
}

impl Handler for Mux {
    fn call(&self, req: Request<Body>) -> BoxFuture {
        self.dispatch(req)
    }
}

impl tower::Service<Request<Body>> for Mux {
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let fut = self.dispatch(req);
        Box::pin(async move { Ok(fut.await) })
    }
}
