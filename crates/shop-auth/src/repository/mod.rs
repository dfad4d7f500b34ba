//! 자격 증명 저장소.
//!
//! 사용자 계정과 Refresh Token 로테이션 원장을 보관합니다.
//! - [`PgCredentialStore`]: PostgreSQL 구현 (운영)
//! - [`MemoryCredentialStore`]: 단일 mutex로 직렬화되는 인메모리 구현 (테스트/로컬 개발)
//!
//! 로테이션은 "조회 → 폐기 → 신규 삽입"을 하나의 원자적 단계로 처리합니다.
//! 같은 `jti`에 대한 동시 로테이션 중 정확히 하나만 성공합니다.

mod memory;
mod postgres;

pub use memory::MemoryCredentialStore;
pub use postgres::PgCredentialStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shop_core::Role;
use sqlx::FromRow;
use uuid::Uuid;

/// 사용자 레코드.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// 저장된 역할. 알 수 없는 값은 최소 권한(`user`)으로 취급합니다.
    pub fn role(&self) -> Role {
        Role::parse(&self.role).unwrap_or(Role::User)
    }
}

/// Refresh Token 원장 레코드.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub jti: String,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// 새 Refresh Token 원장 항목.
#[derive(Debug, Clone)]
pub struct NewRefreshToken {
    pub id: Uuid,
    pub jti: String,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// 로테이션 거부 사유.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    NotFound,
    Revoked,
    Expired,
}

impl std::fmt::Display for TokenRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TokenRejection::NotFound => "not found",
            TokenRejection::Revoked => "revoked",
            TokenRejection::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// 기존 원장 행이 로테이션 가능한지 판단합니다.
pub(crate) fn check_rotatable(
    record: Option<&RefreshTokenRecord>,
    now: DateTime<Utc>,
) -> Result<(), TokenRejection> {
    match record {
        None => Err(TokenRejection::NotFound),
        Some(r) if r.revoked => Err(TokenRejection::Revoked),
        Some(r) if r.expires_at <= now => Err(TokenRejection::Expired),
        Some(_) => Ok(()),
    }
}

/// 저장소 에러.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("refresh token {0}")]
    TokenRejected(TokenRejection),

    #[error("credential store unavailable")]
    Unavailable,
}

/// 자격 증명 저장소 추상화.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 사용자 생성. 같은 이름이 이미 있으면 `None`을 반환합니다.
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_username(&self, username: &str)
        -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError>;

    /// 로그인 시 새 원장 행 삽입.
    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<(), StoreError>;

    /// 원자적 로테이션.
    ///
    /// `old_jti` 행을 잠그고, 없거나 폐기됐거나 만료됐으면
    /// [`StoreError::TokenRejected`]로 중단합니다. 그렇지 않으면 폐기 표시 후
    /// `replacement`를 삽입하고 커밋합니다.
    async fn rotate_refresh_token(
        &self,
        old_jti: &str,
        now: DateTime<Utc>,
        replacement: &NewRefreshToken,
    ) -> Result<(), StoreError>;

    /// 해시로 찾은 활성 토큰을 폐기합니다. 실제로 폐기했으면 `true`.
    async fn revoke_by_hash(&self, token_hash: &str) -> Result<bool, StoreError>;

    /// 연결 상태 확인.
    async fn ping(&self) -> Result<(), StoreError>;
}
