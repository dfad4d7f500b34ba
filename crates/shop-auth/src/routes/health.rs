//! 헬스 체크 endpoint.
//!
//! 로드밸런서나 오케스트레이터(Kubernetes 등)의 liveness/readiness probe용입니다.

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 헬스 체크 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" | "unhealthy"
    pub status: String,
    pub version: String,
    pub uptime_secs: i64,
    /// 현재 시간 (RFC 3339)
    pub timestamp: String,
    pub components: ComponentHealth,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub database: ComponentStatus,
}

/// 컴포넌트 상태.
#[derive(Debug, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// "up" | "down"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentStatus {
    pub fn up() -> Self {
        Self {
            status: "up".to_string(),
            message: None,
        }
    }

    pub fn down(message: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            message: Some(message.into()),
        }
    }
}

/// GET /health/live
pub async fn health_live() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /health/ready
///
/// 저장소에 연결할 수 없으면 503을 반환합니다.
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let (status, status_code, database) = match state.auth.ping_store().await {
        Ok(()) => ("healthy", StatusCode::OK, ComponentStatus::up()),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            (
                "unhealthy",
                StatusCode::SERVICE_UNAVAILABLE,
                ComponentStatus::down("credential store unreachable"),
            )
        }
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: state.version.clone(),
        uptime_secs: state.uptime_secs(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        components: ComponentHealth { database },
    };

    (status_code, Json(response))
}

pub fn health_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health/live", get(health_live))
        .route("/health/ready", get(health_ready))
}
