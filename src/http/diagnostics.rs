//! Built-in diagnostic endpoints.
//!
//! - `/metrics`: Prometheus text exposition of the owned registry
//! - `/debug/pprof/`: index of the debug endpoints
//! - `/debug/pprof/cmdline`: process command line, one argument per line
//! - `/debug/pprof/runtime`: tokio runtime counters as JSON
//! - `/debug/pprof/profile?seconds=N`: CPU profile over `N` seconds, as an
//!   SVG flamegraph
//!
//! None of these are instrumented.

use std::time::Duration;

use axum::body::Body;
use axum::extract::Query;
use axum::http::header::CONTENT_TYPE;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::http::handler::{handler, BoxHandler};
use crate::observability::MetricsRegistry;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const PPROF_INDEX: &str = "\
/debug/pprof/

cmdline  command line of this process
profile  CPU profile as an SVG flamegraph; ?seconds=N (default 30)
runtime  async runtime worker and task counters
";

const DEFAULT_PROFILE_SECONDS: u64 = 30;
const MAX_PROFILE_SECONDS: u64 = 300;
const PROFILE_FREQUENCY_HZ: i32 = 100;

/// The diagnostic routes, keyed by path.
pub(crate) fn routes(registry: &MetricsRegistry) -> Vec<(&'static str, BoxHandler)> {
    let registry = registry.clone();
    vec![
        (
            "/metrics",
            handler(move |_req: Request<Body>| {
                let registry = registry.clone();
                async move { render_metrics(&registry) }
            }),
        ),
        ("/debug/pprof/", handler(index)),
        ("/debug/pprof/cmdline", handler(cmdline)),
        ("/debug/pprof/profile", handler(profile)),
        ("/debug/pprof/runtime", handler(runtime)),
    ]
}

fn render_metrics(registry: &MetricsRegistry) -> Response {
    match registry.render() {
        Ok(text) => ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], text).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn index(_req: Request<Body>) -> &'static str {
    PPROF_INDEX
}

async fn cmdline(_req: Request<Body>) -> String {
    std::env::args().collect::<Vec<_>>().join("\n")
}

#[derive(Debug, Deserialize)]
struct ProfileParams {
    seconds: Option<u64>,
}

async fn profile(req: Request<Body>) -> Response {
    let seconds = match Query::<ProfileParams>::try_from_uri(req.uri()) {
        Ok(Query(params)) => params.seconds.unwrap_or(DEFAULT_PROFILE_SECONDS),
        Err(rejection) => return (StatusCode::BAD_REQUEST, rejection.body_text()).into_response(),
    };
    if seconds == 0 || seconds > MAX_PROFILE_SECONDS {
        return (
            StatusCode::BAD_REQUEST,
            format!("seconds must be between 1 and {MAX_PROFILE_SECONDS}"),
        )
            .into_response();
    }

    tracing::info!(seconds, "CPU profile started");
    let duration = Duration::from_secs(seconds);
    match tokio::task::spawn_blocking(move || cpu_flamegraph(duration)).await {
        Ok(Ok(Some(svg))) => ([(CONTENT_TYPE, "image/svg+xml")], svg).into_response(),
        Ok(Ok(None)) => "no samples collected\n".into_response(),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "CPU profile failed");
            (StatusCode::SERVICE_UNAVAILABLE, format!("profiling failed: {e}")).into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "CPU profile task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Sample the whole process for `duration`. `None` when nothing ran.
fn cpu_flamegraph(duration: Duration) -> Result<Option<Vec<u8>>, pprof::Error> {
    let guard = pprof::ProfilerGuardBuilder::default()
        .frequency(PROFILE_FREQUENCY_HZ)
        .blocklist(&["libc", "libgcc", "pthread", "vdso"])
        .build()?;
    std::thread::sleep(duration);

    let report = guard.report().build()?;
    if report.data.is_empty() {
        return Ok(None);
    }
    let mut svg = Vec::new();
    report.flamegraph(&mut svg)?;
    Ok(Some(svg))
}

#[derive(Debug, Serialize)]
struct RuntimeSnapshot {
    pid: u32,
    num_workers: usize,
    num_alive_tasks: usize,
    global_queue_depth: usize,
}

async fn runtime(_req: Request<Body>) -> Response {
    let metrics = match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.metrics(),
        Err(_) => return StatusCode::SERVICE_UNAVAILABLE.into_response(),
    };
    Json(RuntimeSnapshot {
        pid: std::process::id(),
        num_workers: metrics.num_workers(),
        num_alive_tasks: metrics.num_alive_tasks(),
        global_queue_depth: metrics.global_queue_depth(),
    })
    .into_response()
}
