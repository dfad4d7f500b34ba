//! 공통 에러 분류와 HTTP 에러 응답.
//!
//! 각 계층의 에러(토큰, 저장소, 인증 서비스 등)는 [`ShopError`]로 변환되고,
//! 라우트는 `ShopError`만 다룹니다. 모든 2xx 이외 응답 본문은 [`ApiErrorResponse`] 형식입니다.
//!
//! ```json
//! { "code": "UNAUTHORIZED", "message": "invalid refresh token" }
//! ```

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tokens::TokenError;

/// HTTP 에러 응답 본문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "UNAUTHORIZED", "CONFLICT")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 상세 정보 (입력 검증 실패 필드 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ApiErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// 공통 에러.
#[derive(Debug, thiserror::Error)]
pub enum ShopError {
    /// 입력 검증 실패 (400)
    #[error("{message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// 인증 실패 (401)
    #[error("{0}")]
    Unauthorized(String),

    /// 권한 부족 (403)
    #[error("{0}")]
    Forbidden(String),

    /// 리소스 없음 (404)
    #[error("{0}")]
    NotFound(String),

    /// 중복 (409)
    #[error("{0}")]
    Conflict(String),

    /// 내부 오류 (500). 원인은 로그에만 남기고 응답에는 노출하지 않습니다.
    #[error("internal error: {0}")]
    Internal(String),

    /// 의존 서비스 불가 (503)
    #[error("{0}")]
    Unavailable(String),
}

impl ShopError {
    pub fn validation(message: impl Into<String>) -> Self {
        ShopError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ShopError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ShopError::Forbidden(message.into())
    }

    pub fn internal(cause: impl std::fmt::Display) -> Self {
        ShopError::Internal(cause.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ShopError::Validation { .. } => StatusCode::BAD_REQUEST,
            ShopError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ShopError::Forbidden(_) => StatusCode::FORBIDDEN,
            ShopError::NotFound(_) => StatusCode::NOT_FOUND,
            ShopError::Conflict(_) => StatusCode::CONFLICT,
            ShopError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ShopError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ShopError::Validation { .. } => "VALIDATION_ERROR",
            ShopError::Unauthorized(_) => "UNAUTHORIZED",
            ShopError::Forbidden(_) => "FORBIDDEN",
            ShopError::NotFound(_) => "NOT_FOUND",
            ShopError::Conflict(_) => "CONFLICT",
            ShopError::Internal(_) => "INTERNAL_ERROR",
            ShopError::Unavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    /// 응답 본문으로 변환합니다.
    pub fn to_response_body(&self) -> ApiErrorResponse {
        match self {
            ShopError::Validation { message, details } => {
                let body = ApiErrorResponse::new(self.code(), message.clone());
                match details {
                    Some(details) => body.with_details(details.clone()),
                    None => body,
                }
            }
            ShopError::Internal(_) => ApiErrorResponse::new(self.code(), "internal server error"),
            other => ApiErrorResponse::new(other.code(), other.to_string()),
        }
    }
}

impl IntoResponse for ShopError {
    fn into_response(self) -> Response {
        if let ShopError::Internal(cause) = &self {
            tracing::error!(cause = %cause, "Internal error");
        }
        (self.status(), Json(self.to_response_body())).into_response()
    }
}

impl From<TokenError> for ShopError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired | TokenError::Invalid => ShopError::Unauthorized(err.to_string()),
            TokenError::Signing(_) => ShopError::Internal(err.to_string()),
        }
    }
}

/// 공통 Result 타입.
pub type ShopResult<T> = Result<T, ShopError>;
