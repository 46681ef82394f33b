use axum::body::Body;
use axum::http::{Method, Request};

use crate::http::handler;
use crate::routing::{Methods, RouteConfig, RouteError, Router};

pub const HEALTH_PATH: &str = "/rest/health";

/// Always `200 success` while the process is serving.
pub async fn health(_req: Request<Body>) -> &'static str {
    "success"
}

pub fn register(router: &Router) -> Result<(), RouteError> {
    router.add_route(
        RouteConfig::new(HEALTH_PATH, Methods::only([Method::GET]), handler(health)).instrumented(),
    )
}
