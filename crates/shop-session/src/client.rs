//! 인증 서비스 클라이언트.
//!
//! 만료된 Access Token을 갱신하기 위해 인증 서비스의 `POST /refresh`를
//! 호출합니다. 재시도하지 않으며 모든 실패는 호출자에게 그대로 전달됩니다.

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use reqwest::{Client, StatusCode};
use shop_core::cookies::{request_cookie_header, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE};
use shop_core::IssuedTokens;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// 기본 요청 타임아웃.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

/// 클라이언트 에러.
#[derive(Debug, Error)]
pub enum ClientError {
    /// 인증 서비스가 2xx 이외의 상태로 응답함
    #[error("auth service rejected refresh: {0}")]
    Rejected(StatusCode),

    /// 연결 실패 또는 타임아웃
    #[error("auth service request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// 응답 본문을 해석할 수 없음
    #[error("invalid refresh response: {0}")]
    Decode(String),

    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
}

/// 토큰 갱신 인터페이스.
///
/// 자동 갱신 미들웨어가 이 트레이트에만 의존하므로 테스트에서는
/// 가짜 구현으로 대체할 수 있습니다.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Refresh Token(과 만료된 Access Token)으로 새 토큰 쌍을 받습니다.
    async fn refresh_tokens(
        &self,
        refresh_token: &str,
        access_token: Option<&str>,
    ) -> Result<IssuedTokens, ClientError>;
}

/// reqwest 기반 인증 서비스 클라이언트.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    refresh_url: String,
}

impl AuthClient {
    /// 새 클라이언트를 생성합니다.
    ///
    /// `base_url` 끝의 `/`는 무시합니다.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            refresh_url: format!("{}/refresh", base_url.trim_end_matches('/')),
        })
    }

    pub fn refresh_url(&self) -> &str {
        &self.refresh_url
    }
}

#[async_trait]
impl TokenRefresher for AuthClient {
    async fn refresh_tokens(
        &self,
        refresh_token: &str,
        access_token: Option<&str>,
    ) -> Result<IssuedTokens, ClientError> {
        let mut cookies = vec![(REFRESH_TOKEN_COOKIE, refresh_token)];
        if let Some(access) = access_token.filter(|token| !token.is_empty()) {
            cookies.push((ACCESS_TOKEN_COOKIE, access));
        }

        debug!(url = %self.refresh_url, "Requesting token refresh");

        let response = self
            .client
            .post(&self.refresh_url)
            .header(COOKIE, request_cookie_header(&cookies))
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, timeout = e.is_timeout(), "Auth service unreachable");
                ClientError::Transport(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Auth service rejected token refresh");
            return Err(ClientError::Rejected(status));
        }

        let body = response.bytes().await.map_err(ClientError::Transport)?;

        serde_json::from_slice::<IssuedTokens>(&body).map_err(|e| {
            warn!(error = %e, "Failed to parse refresh response");
            ClientError::Decode(e.to_string())
        })
    }
}
