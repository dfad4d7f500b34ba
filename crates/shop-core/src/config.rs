//! 설정 로딩 도우미.
//!
//! 각 서비스는 기본값 → 선택적 설정 파일 → 환경 변수 순서로 설정을 쌓습니다.
//! 환경 변수는 접두어 없이 평평한 키(`ACCESS_SECRET`, `DATABASE_URL` 등)를 사용하며
//! 구조체 필드명(소문자)과 대응됩니다.

use config::builder::DefaultState;
use config::{ConfigBuilder, Environment, File};
use secrecy::SecretString;
use serde::de::DeserializeOwned;

/// 설정 에러.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// 기본값이 채워진 설정 빌더.
///
/// `defaults`는 (키, 값) 목록이며 파일과 환경 변수가 그 위를 덮어씁니다.
pub fn layered<T: DeserializeOwned>(
    file: &str,
    defaults: &[(&str, &str)],
) -> Result<T, ConfigError> {
    let mut builder: ConfigBuilder<DefaultState> = config::Config::builder();
    for (key, value) in defaults {
        builder = builder.set_default(*key, *value)?;
    }

    let settings = builder
        .add_source(File::with_name(file).required(false))
        .add_source(Environment::default())
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// 비밀 값 검증. 없거나 공백뿐이면 에러입니다.
pub fn require_secret(
    key: &'static str,
    value: Option<String>,
) -> Result<SecretString, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(SecretString::from(v)),
        _ => Err(ConfigError::Missing(key)),
    }
}

/// 필수 문자열 값 검증.
pub fn require_value(key: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(key)),
    }
}

/// 양수 값 검증.
pub fn require_positive(key: &'static str, value: i64) -> Result<i64, ConfigError> {
    if value > 0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key,
            reason: format!("must be positive, got {}", value),
        })
    }
}
