//! 인증 endpoint.
//!
//! | method | path | 설명 |
//! |---|---|---|
//! | POST | `/register` | 회원가입 |
//! | POST | `/login` | 로그인, 토큰 쿠키 설정 |
//! | POST | `/refresh` | Refresh Token 로테이션 (쿠키 또는 JSON 본문) |
//! | POST | `/logout` | Refresh Token 폐기, 쿠키 삭제 |

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use shop_core::cookies::{clear_token_cookies, read_cookie, set_token_cookies, REFRESH_TOKEN_COOKIE};
use shop_core::{ShopError, ShopResult};
use std::sync::Arc;
use validator::Validate;

use crate::state::AppState;

// ============================================================================
// 요청/응답 타입
// ============================================================================

/// 회원가입/로그인 요청.
#[derive(Deserialize, Validate)]
pub struct CredentialsRequest {
    #[validate(length(min = 1, max = 128, message = "username must be 1-128 characters"))]
    pub username: String,
    #[validate(length(min = 1, max = 1024, message = "password must be 1-1024 characters"))]
    pub password: String,
}

/// 쿠키를 쓸 수 없는 클라이언트용 본문.
#[derive(Debug, Default, Deserialize)]
pub struct TokenRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub is_admin: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

fn parse_credentials(
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ShopResult<CredentialsRequest> {
    let Json(request) = payload.map_err(|e| ShopError::validation(e.body_text()))?;
    request.validate().map_err(|e| ShopError::Validation {
        message: "invalid credentials payload".to_string(),
        details: serde_json::to_value(&e).ok(),
    })?;
    Ok(request)
}

/// Refresh Token 위치: `refreshToken` 쿠키 우선, 없으면 JSON 본문.
fn extract_refresh_token(headers: &HeaderMap, body: &[u8]) -> Option<String> {
    read_cookie(headers, REFRESH_TOKEN_COOKIE).or_else(|| {
        serde_json::from_slice::<TokenRequest>(body)
            .ok()
            .and_then(|r| r.refresh_token)
            .filter(|t| !t.is_empty())
    })
}

// ============================================================================
// 핸들러
// ============================================================================

/// POST /register
pub async fn register(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ShopResult<Json<RegisterResponse>> {
    let request = parse_credentials(payload)?;
    let user = state.auth.register(&request.username, &request.password).await?;

    Ok(Json(RegisterResponse {
        username: user.username,
    }))
}

/// POST /login
///
/// 토큰은 응답 본문이 아닌 `HttpOnly` 쿠키로만 전달합니다.
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> ShopResult<Response> {
    let request = parse_credentials(payload)?;
    let tokens = state.auth.login(&request.username, &request.password).await?;

    let mut response = Json(LoginResponse {
        is_admin: tokens.is_admin,
    })
    .into_response();
    set_token_cookies(
        response.headers_mut(),
        &tokens.access_token,
        tokens.access_exp,
        &tokens.refresh_token,
        tokens.refresh_exp,
        &state.cookie_path,
    );
    Ok(response)
}

/// POST /refresh
///
/// 실패하면 401과 함께 두 토큰 쿠키를 삭제합니다.
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = extract_refresh_token(&headers, &body).unwrap_or_default();

    match state.auth.refresh(&token).await {
        Ok(tokens) => {
            let mut response = Json(&tokens).into_response();
            set_token_cookies(
                response.headers_mut(),
                &tokens.access_token,
                tokens.access_exp,
                &tokens.refresh_token,
                tokens.refresh_exp,
                &state.cookie_path,
            );
            response
        }
        Err(e) => {
            let mut response = ShopError::from(e).into_response();
            clear_token_cookies(response.headers_mut(), &state.cookie_path);
            response
        }
    }
}

/// POST /logout
///
/// 인증이 필요 없습니다. 결과와 관계없이 쿠키를 삭제합니다.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let token = extract_refresh_token(&headers, &body);

    let mut response = match state.auth.logout(token.as_deref()).await {
        Ok(()) => Json(MessageResponse {
            message: "logged out".to_string(),
        })
        .into_response(),
        Err(e) => ShopError::from(e).into_response(),
    };
    clear_token_cookies(response.headers_mut(), &state.cookie_path);
    response
}

pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/logout", post(logout))
}
