//! 하위 서비스 세션 설정.
//!
//! 기본값 → `config/session.toml`(선택) → 환경 변수 순으로 로드합니다.
//! 하위 서비스는 `ACCESS_SECRET`만 가지며 `REFRESH_SECRET`은 알지 못합니다.

use crate::client::{AuthClient, ClientError, DEFAULT_AUTH_TIMEOUT};
use crate::edge::EdgePolicy;
use crate::middleware::AutoRefreshState;
use secrecy::SecretString;
use serde::Deserialize;
use shop_core::config::{layered, require_positive, require_secret, require_value, ConfigError};
use shop_core::AccessTokenCodec;
use std::sync::Arc;
use std::time::Duration;

const DEFAULTS: &[(&str, &str)] = &[
    ("auth_url", "http://127.0.0.1:8081"),
    ("auth_timeout_secs", "5"),
    ("cookie_path", "/"),
];

#[derive(Debug, Default, Deserialize)]
pub struct RawSessionConfig {
    pub access_secret: Option<String>,
    pub auth_url: Option<String>,
    pub auth_timeout_secs: i64,
    pub cookie_path: String,
}

/// 검증된 세션 설정.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub access_secret: SecretString,
    pub auth_url: String,
    pub auth_timeout: Duration,
    pub cookie_path: String,
}

impl SessionConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let raw: RawSessionConfig = layered("config/session", DEFAULTS)?;
        raw.validate()
    }

    /// 로컬 검증용 코덱.
    pub fn access_codec(&self) -> Arc<AccessTokenCodec> {
        Arc::new(AccessTokenCodec::new(&self.access_secret))
    }

    /// 자동 갱신 미들웨어 상태를 만듭니다.
    pub fn auto_refresh_state(&self) -> Result<AutoRefreshState, ClientError> {
        let client = AuthClient::new(&self.auth_url, self.auth_timeout)?;
        Ok(AutoRefreshState::new(
            self.access_codec(),
            Arc::new(client),
            self.cookie_path.clone(),
        ))
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        EdgePolicy::new(self.access_codec())
    }
}

impl RawSessionConfig {
    pub fn validate(self) -> Result<SessionConfig, ConfigError> {
        let access_secret = require_secret("ACCESS_SECRET", self.access_secret)?;
        let auth_url = require_value("AUTH_URL", self.auth_url)?;
        if !(auth_url.starts_with("http://") || auth_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "AUTH_URL",
                reason: "must start with http:// or https://".to_string(),
            });
        }

        let auth_timeout = match self.auth_timeout_secs {
            0 => DEFAULT_AUTH_TIMEOUT,
            secs => Duration::from_secs(require_positive("AUTH_TIMEOUT_SECS", secs)? as u64),
        };

        Ok(SessionConfig {
            access_secret,
            auth_url,
            auth_timeout,
            cookie_path: self.cookie_path,
        })
    }
}
