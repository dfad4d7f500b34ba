use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::roles::Role;

/// Access Token 페이로드.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject - 사용자 ID
    pub sub: String,
    /// 발급 시점의 사용자 역할
    pub role: Role,
    /// Issued At (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
}

impl AccessClaims {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    /// `sub`를 UUID로 해석합니다.
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}

/// Refresh Token 페이로드.
///
/// 역할은 담지 않습니다. 로테이션 시 저장소에서 현재 역할을 다시 읽습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    /// Subject - 사용자 ID
    pub sub: String,
    /// Issued At
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// JWT ID - 로테이션 원장의 키
    pub jti: String,
}

impl RefreshClaims {
    pub fn user_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.sub).ok()
    }
}
