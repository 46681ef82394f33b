use axum::body::Body;
use axum::http::{Method, Request, StatusCode};

use crate::http::handler;
use crate::lifecycle::Shutdown;
use crate::routing::{Methods, RouteConfig, RouteError, Router};

pub const KILL_PATH: &str = "/rest/kill";

/// Mount the kill switch. Each request triggers a graceful shutdown.
pub fn register(router: &Router, shutdown: Shutdown) -> Result<(), RouteError> {
    tracing::warn!(path = KILL_PATH, "Running in SLT mode with kill switch enabled");
    let kill = move |_req: Request<Body>| {
        let shutdown = shutdown.clone();
        async move {
            tracing::warn!("Kill switch hit");
            shutdown.trigger();
            (StatusCode::ACCEPTED, "shutting down")
        }
    };
    router.add_route(RouteConfig::new(KILL_PATH, Methods::only([Method::GET]), handler(kill)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MetricsRegistry;

    #[tokio::test]
    async fn test_kill_triggers_shutdown() {
        let router = Router::new(&MetricsRegistry::new("svc")).unwrap();
        let shutdown = Shutdown::new();
        register(&router, shutdown.clone()).unwrap();
        assert!(!shutdown.is_triggered());

        let req = Request::builder().uri(KILL_PATH).body(Body::empty()).unwrap();
        let res = router.mux().dispatch(req).await;

        assert_eq!(res.status(), StatusCode::ACCEPTED);
        assert!(shutdown.is_triggered());
    }
}
