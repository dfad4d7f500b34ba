//! 인증된 사용자 식별 정보.

use axum::extract::{FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use shop_core::{AccessClaims, Role, ShopError};
use std::convert::Infallible;

/// 미들웨어가 요청 extensions에 넣는 사용자 정보.
///
/// ```rust,ignore
/// async fn cart(user: AuthUser) -> impl IntoResponse {
///     format!("cart of {}", user.user_id)
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: String,
    pub role: Role,
}

impl AuthUser {
    pub fn from_claims(claims: &AccessClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            role: claims.role,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ShopError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ShopError::unauthorized("authentication required"))
    }
}

/// 인증이 선택적인 경로용 (`Option<AuthUser>`).
impl<S> OptionalFromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<AuthUser>().cloned())
    }
}
