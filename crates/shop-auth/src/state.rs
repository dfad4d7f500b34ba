//! 애플리케이션 상태.

use chrono::{DateTime, Utc};
use shop_core::cookies::DEFAULT_COOKIE_PATH;
use std::sync::Arc;

use crate::service::AuthService;

/// 핸들러 간 공유 상태.
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
    /// 토큰 쿠키의 `Path` 속성
    pub cookie_path: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(auth: AuthService) -> Self {
        Self {
            auth: Arc::new(auth),
            cookie_path: DEFAULT_COOKIE_PATH.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn with_cookie_path(mut self, path: impl Into<String>) -> Self {
        self.cookie_path = path.into();
        self
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
