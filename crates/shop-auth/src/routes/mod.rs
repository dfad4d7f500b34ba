//! HTTP 라우터.

pub mod auth;
pub mod health;

use axum::{extract::State, http::StatusCode, middleware, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::metrics_layer;
use crate::state::AppState;

pub use auth::auth_router;
pub use health::health_router;

/// 인증 + 헬스 체크 라우터.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(auth_router())
        .merge(health_router())
        .with_state(state)
}

/// 미들웨어와 `/metrics`까지 포함한 전체 애플리케이션.
pub fn create_app(
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
    request_timeout: Duration,
) -> Router {
    let mut app = create_router(state);

    if let Some(handle) = metrics_handle {
        let metrics_router = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(handle);
        app = app.merge(metrics_router);
    }

    app.layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
}

async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}
