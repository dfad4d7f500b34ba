//! 인증 서비스 설정.
//!
//! 기본값 → `config/auth.toml`(선택) → 환경 변수 순으로 로드합니다.
//!
//! | 환경 변수 | 기본값 |
//! |---|---|
//! | `LISTEN_ADDR` | `0.0.0.0:8081` |
//! | `DATABASE_URL` | (필수) |
//! | `ACCESS_SECRET` / `REFRESH_SECRET` | (필수) |
//! | `ACCESS_TTL_MINUTES` | 15 |
//! | `REFRESH_TTL_DAYS` | 7 |
//! | `STORAGE_TIMEOUT_SECS` | 5 |
//! | `DB_MAX_CONNECTIONS` | 10 |
//! | `DB_ACQUIRE_TIMEOUT_SECS` | 5 |
//! | `REQUEST_TIMEOUT_SECS` | 30 |
//! | `COOKIE_PATH` | `/` |

use secrecy::SecretString;
use serde::Deserialize;
use shop_core::config::{layered, require_positive, require_secret, require_value, ConfigError};
use shop_core::tokens::LifetimeOutOfRange;
use shop_core::TokenLifetimes;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULTS: &[(&str, &str)] = &[
    ("listen_addr", "0.0.0.0:8081"),
    ("access_ttl_minutes", "15"),
    ("refresh_ttl_days", "7"),
    ("storage_timeout_secs", "5"),
    ("db_max_connections", "10"),
    ("db_acquire_timeout_secs", "5"),
    ("request_timeout_secs", "30"),
    ("cookie_path", "/"),
];

/// 파일/환경 변수에서 읽은 그대로의 값.
#[derive(Debug, Default, Deserialize)]
pub struct RawAuthConfig {
    pub listen_addr: String,
    pub database_url: Option<String>,
    pub access_secret: Option<String>,
    pub refresh_secret: Option<String>,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
    pub storage_timeout_secs: i64,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: i64,
    pub request_timeout_secs: i64,
    pub cookie_path: String,
}

/// 검증된 인증 서비스 설정.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub listen_addr: SocketAddr,
    pub database_url: SecretString,
    pub access_secret: SecretString,
    pub refresh_secret: SecretString,
    pub lifetimes: TokenLifetimes,
    pub storage_timeout: Duration,
    pub db_max_connections: u32,
    pub db_acquire_timeout: Duration,
    pub request_timeout: Duration,
    pub cookie_path: String,
}

impl AuthConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let raw: RawAuthConfig = layered("config/auth", DEFAULTS)?;
        raw.validate()
    }
}

impl RawAuthConfig {
    /// 필수 값과 범위를 검증합니다. 비밀 키가 비어 있으면 실패합니다.
    pub fn validate(self) -> Result<AuthConfig, ConfigError> {
        let listen_addr =
            self.listen_addr
                .parse::<SocketAddr>()
                .map_err(|e| ConfigError::Invalid {
                    key: "LISTEN_ADDR",
                    reason: e.to_string(),
                })?;

        let database_url = SecretString::from(require_value("DATABASE_URL", self.database_url)?);
        let access_secret = require_secret("ACCESS_SECRET", self.access_secret)?;
        let refresh_secret = require_secret("REFRESH_SECRET", self.refresh_secret)?;

        let access_minutes = require_positive("ACCESS_TTL_MINUTES", self.access_ttl_minutes)?;
        let refresh_days = require_positive("REFRESH_TTL_DAYS", self.refresh_ttl_days)?;
        let storage_timeout = require_positive("STORAGE_TIMEOUT_SECS", self.storage_timeout_secs)?;
        let acquire_timeout =
            require_positive("DB_ACQUIRE_TIMEOUT_SECS", self.db_acquire_timeout_secs)?;
        let request_timeout = require_positive("REQUEST_TIMEOUT_SECS", self.request_timeout_secs)?;

        let lifetimes = TokenLifetimes::try_new(access_minutes, refresh_days).map_err(|e| {
            ConfigError::Invalid {
                key: match e {
                    LifetimeOutOfRange::Access => "ACCESS_TTL_MINUTES",
                    LifetimeOutOfRange::Refresh => "REFRESH_TTL_DAYS",
                },
                reason: e.to_string(),
            }
        })?;

        if self.db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(AuthConfig {
            listen_addr,
            database_url,
            access_secret,
            refresh_secret,
            lifetimes,
            storage_timeout: Duration::from_secs(storage_timeout as u64),
            db_max_connections: self.db_max_connections,
            db_acquire_timeout: Duration::from_secs(acquire_timeout as u64),
            request_timeout: Duration::from_secs(request_timeout as u64),
            cookie_path: self.cookie_path,
        })
    }
}
