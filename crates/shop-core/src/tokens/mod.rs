//! 토큰 서명 및 검증.
//!
//! Access Token과 Refresh Token은 서로 다른 HMAC-SHA256 비밀 키로 서명됩니다.
//! 하위 서비스와 게이트웨이는 [`AccessTokenCodec`]만 보유하고,
//! 인증 서비스는 두 코덱을 합친 [`TokenCodec`]을 사용합니다.

mod claims;
mod codec;
mod issued;

pub use claims::{AccessClaims, RefreshClaims};
pub use codec::{
    AccessTokenCodec, LifetimeOutOfRange, RefreshTokenCodec, TokenCodec, TokenLifetimes,
};
pub use issued::IssuedTokens;

/// 토큰 처리 에러.
///
/// `Expired`와 `Invalid`는 같은 메시지로 표시됩니다.
/// 호출자는 variant로만 두 경우를 구분해야 합니다.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// 서명은 유효하지만 `exp`가 지남
    #[error("invalid token")]
    Expired,
    /// 서명 불일치, 알고리즘 불일치, 형식 오류, 필수 클레임 누락 등
    #[error("invalid token")]
    Invalid,
    /// 토큰 서명 실패
    #[error("token signing failed: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl TokenError {
    pub fn is_expired(&self) -> bool {
        matches!(self, TokenError::Expired)
    }
}
