//! Operator-facing HTTP surface.

pub mod error;
pub mod ops;

use std::sync::Arc;
use std::time::Instant;

use axum::{
    Router,
    extract::Request,
    middleware::{self as axum_middleware, Next},
    response::Response,
    routing::{get, patch, post},
};
use tracing::debug;

use crate::cache::{CacheManager, RemoteCache};
use crate::monitor::PerformanceMonitor;

#[derive(Clone)]
pub struct OpsState {
    pub manager: Arc<CacheManager>,
    pub remote: Arc<RemoteCache>,
    pub monitor: Arc<PerformanceMonitor>,
}

pub fn build_router(state: OpsState) -> Router {
    Router::new()
        .route("/cache/stats", get(ops::cache_stats))
        .route("/cache/warmup", post(ops::cache_warmup))
        .route("/performance/metrics", get(ops::performance_metrics))
        .route("/performance/alerts/{alert_id}", patch(ops::resolve_alert))
        .route("/health/cache", get(ops::cache_health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
}

async fn log_responses(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    debug!(
        target: "strato::infra::http",
        %method,
        path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "request served"
    );
    response
}
