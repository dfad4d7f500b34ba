//! 게이트웨이 앞단 토큰 검증.
//!
//! 네트워크 호출 없이 Access Token만 확인합니다. 만료된 토큰은 하위 서비스의
//! 자동 갱신 미들웨어가 처리하도록 그대로 통과시킵니다.

use crate::identity::AuthUser;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use shop_core::cookies::{read_cookie, ACCESS_TOKEN_COOKIE};
use shop_core::{AccessTokenCodec, Role, ShopError, TokenError};
use std::sync::Arc;
use tracing::{debug, warn};

/// 경로별 검증 정책.
#[derive(Debug, Clone)]
pub struct EdgePolicy {
    codec: Arc<AccessTokenCodec>,
    allowed_roles: Option<Vec<Role>>,
}

impl EdgePolicy {
    /// 모든 역할을 허용하는 정책.
    pub fn new(codec: Arc<AccessTokenCodec>) -> Self {
        Self {
            codec,
            allowed_roles: None,
        }
    }

    /// 허용 역할을 제한합니다.
    pub fn allow_roles(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.allowed_roles = Some(roles.into_iter().collect());
        self
    }

    fn permits(&self, role: Role) -> bool {
        self.allowed_roles
            .as_ref()
            .map_or(true, |allowed| allowed.contains(&role))
    }
}

/// 게이트웨이 검증 미들웨어.
///
/// `axum::middleware::from_fn_with_state(policy, edge_auth)`로 설치합니다.
pub async fn edge_auth(
    State(policy): State<EdgePolicy>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = extract_token(request.headers()) else {
        return ShopError::unauthorized("missing access token").into_response();
    };

    let claims = match policy.codec.verify(&token) {
        Ok(claims) => claims,
        Err(TokenError::Expired) => {
            debug!("Expired access token forwarded for downstream refresh");
            return next.run(request).await;
        }
        Err(e) => {
            debug!(error = %e, "Edge rejected access token");
            return ShopError::unauthorized("invalid access token").into_response();
        }
    };

    if claims.sub.is_empty() {
        warn!("Access token without subject");
        return ShopError::unauthorized("invalid access token").into_response();
    }

    if !policy.permits(claims.role) {
        warn!(user_id = %claims.sub, role = %claims.role, "Role not allowed at edge");
        return ShopError::forbidden("insufficient role").into_response();
    }

    request.extensions_mut().insert(AuthUser::from_claims(&claims));
    next.run(request).await
}

/// `Authorization: Bearer` 우선, 없으면 `accessToken` 쿠키.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split_once(' '))
        .filter(|(scheme, _)| scheme.eq_ignore_ascii_case("bearer"))
        .map(|(_, token)| token.trim())
        .filter(|token| !token.is_empty())
        .map(String::from)
        .or_else(|| read_cookie(headers, ACCESS_TOKEN_COOKIE))
}
