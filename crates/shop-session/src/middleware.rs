//! 자동 갱신 인증 미들웨어.
//!
//! 하위 서비스가 설치하는 쿠키 기반 미들웨어입니다. 요청마다 다음 상태를 거칩니다:
//!
//! | 상태 | 조건 | 결과 |
//! |---|---|---|
//! | 미인증 | `accessToken` 쿠키 없음 | 401 |
//! | 유효 | 로컬 검증 성공 | `AuthUser` 첨부 후 핸들러 실행 |
//! | 만료 | 서명은 유효, `exp` 경과 | 인증 서비스로 갱신 후 핸들러 실행, 새 쿠키 설정 |
//! | 무효 | 그 외 검증 실패 | 쿠키 삭제, 401 (네트워크 호출 없음) |
//!
//! ```rust,ignore
//! Router::new()
//!     .route("/orders", get(list_orders))
//!     .layer(axum::middleware::from_fn_with_state(state, require_auth));
//! ```

use crate::client::TokenRefresher;
use crate::identity::AuthUser;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use metrics::counter;
use shop_core::cookies::{
    clear_token_cookies, read_cookie, set_token_cookies, ACCESS_TOKEN_COOKIE,
    REFRESH_TOKEN_COOKIE,
};
use shop_core::{AccessTokenCodec, IssuedTokens, ShopError, TokenError};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 미들웨어 상태.
#[derive(Clone)]
pub struct AutoRefreshState {
    pub codec: Arc<AccessTokenCodec>,
    pub refresher: Arc<dyn TokenRefresher>,
    pub cookie_path: String,
}

impl AutoRefreshState {
    pub fn new(
        codec: Arc<AccessTokenCodec>,
        refresher: Arc<dyn TokenRefresher>,
        cookie_path: impl Into<String>,
    ) -> Self {
        Self {
            codec,
            refresher,
            cookie_path: cookie_path.into(),
        }
    }
}

/// 요청 인증 결과. 갱신이 일어났다면 새 토큰 쌍을 함께 돌려줍니다.
struct Resolved {
    user: AuthUser,
    rotated: Option<IssuedTokens>,
}

// =============================================================================
// 미들웨어
// =============================================================================

/// 인증 필수 미들웨어.
pub async fn require_auth(
    State(state): State<AutoRefreshState>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = match resolve(&state, request.headers()).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    request.extensions_mut().insert(resolved.user);
    let response = next.run(request).await;

    with_rotated_cookies(response, resolved.rotated.as_ref(), &state.cookie_path)
}

/// 관리자 전용 미들웨어.
///
/// 역할은 가장 최근 토큰 기준입니다. 갱신 후 403이 되더라도
/// 이전 Refresh Token은 이미 폐기되었으므로 새 쿠키는 설정합니다.
pub async fn require_admin(
    State(state): State<AutoRefreshState>,
    mut request: Request,
    next: Next,
) -> Response {
    let resolved = match resolve(&state, request.headers()).await {
        Ok(resolved) => resolved,
        Err(response) => return response,
    };

    let response = if resolved.user.is_admin() {
        request.extensions_mut().insert(resolved.user);
        next.run(request).await
    } else {
        warn!(
            user_id = %resolved.user.user_id,
            role = %resolved.user.role,
            "Access denied: admin role required"
        );
        ShopError::forbidden("admin role required").into_response()
    };

    with_rotated_cookies(response, resolved.rotated.as_ref(), &state.cookie_path)
}

// =============================================================================
// 상태 전이
// =============================================================================

async fn resolve(state: &AutoRefreshState, headers: &HeaderMap) -> Result<Resolved, Response> {
    let Some(access_token) = read_cookie(headers, ACCESS_TOKEN_COOKIE) else {
        return Err(unauthorized(None));
    };

    match state.codec.verify(&access_token) {
        Ok(claims) => Ok(Resolved {
            user: AuthUser::from_claims(&claims),
            rotated: None,
        }),
        Err(TokenError::Expired) => refresh(state, headers, &access_token).await,
        Err(e) => {
            debug!(error = %e, "Rejected invalid access token");
            Err(unauthorized(Some(&state.cookie_path)))
        }
    }
}

async fn refresh(
    state: &AutoRefreshState,
    headers: &HeaderMap,
    expired_access: &str,
) -> Result<Resolved, Response> {
    let Some(refresh_token) = read_cookie(headers, REFRESH_TOKEN_COOKIE) else {
        debug!("Access token expired and no refresh token present");
        record_refresh("missing");
        return Err(unauthorized(Some(&state.cookie_path)));
    };

    let tokens = match state
        .refresher
        .refresh_tokens(&refresh_token, Some(expired_access))
        .await
    {
        Ok(tokens) => tokens,
        Err(e) => {
            warn!(error = %e, "Token refresh failed");
            record_refresh("rejected");
            return Err(unauthorized(Some(&state.cookie_path)));
        }
    };

    // 새 토큰도 로컬에서 검증해야 신뢰합니다.
    let claims = match state.codec.verify(&tokens.access_token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!(error = %e, "Refreshed access token failed local verification");
            record_refresh("invalid_token");
            return Err(unauthorized(Some(&state.cookie_path)));
        }
    };

    record_refresh("success");
    info!(user_id = %claims.sub, role = %claims.role, "Session refreshed");

    Ok(Resolved {
        user: AuthUser::from_claims(&claims),
        rotated: Some(tokens),
    })
}

// =============================================================================
// 응답 헬퍼
// =============================================================================

/// 401 응답. 경로가 주어지면 두 토큰 쿠키를 삭제합니다.
fn unauthorized(clear_path: Option<&str>) -> Response {
    let mut response = ShopError::unauthorized("authentication required").into_response();
    if let Some(path) = clear_path {
        clear_token_cookies(response.headers_mut(), path);
    }
    response
}

fn with_rotated_cookies(
    mut response: Response,
    rotated: Option<&IssuedTokens>,
    cookie_path: &str,
) -> Response {
    if let Some(tokens) = rotated {
        set_token_cookies(
            response.headers_mut(),
            &tokens.access_token,
            tokens.access_exp,
            &tokens.refresh_token,
            tokens.refresh_exp,
            cookie_path,
        );
    }
    response
}

fn record_refresh(result: &'static str) {
    counter!("session_refresh_total", "result" => result).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::header::{COOKIE, SET_COOKIE};
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{middleware, Json, Router};
    use chrono::{Duration, Utc};
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use shop_core::Role;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tower::ServiceExt;

    const SECRET: &str = "session-access-secret";

    #[derive(Clone, Copy)]
    enum Mode {
        Issue(Role),
        Reject,
        ForeignKey,
    }

    /// 호출 횟수와 인자를 기록하는 가짜 갱신기.
    struct FakeRefresher {
        codec: AccessTokenCodec,
        mode: Mode,
        calls: AtomicUsize,
        last_args: Mutex<Option<(String, Option<String>)>>,
    }

    impl FakeRefresher {
        fn new(mode: Mode) -> Arc<Self> {
            Arc::new(Self {
                codec: codec(),
                mode,
                calls: AtomicUsize::new(0),
                last_args: Mutex::new(None),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for FakeRefresher {
        async fn refresh_tokens(
            &self,
            refresh_token: &str,
            access_token: Option<&str>,
        ) -> Result<IssuedTokens, ClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_args.lock().unwrap() =
                Some((refresh_token.to_string(), access_token.map(String::from)));

            let access_exp = Utc::now() + Duration::minutes(15);
            let access_token = match self.mode {
                Mode::Issue(role) => self.codec.sign(role, "user-1", access_exp).unwrap(),
                Mode::ForeignKey => AccessTokenCodec::new(&SecretString::from("other"))
                    .sign(Role::User, "user-1", access_exp)
                    .unwrap(),
                Mode::Reject => return Err(ClientError::Rejected(StatusCode::UNAUTHORIZED)),
            };

            Ok(IssuedTokens {
                access_token,
                refresh_token: "rotated-refresh".into(),
                access_exp,
                refresh_exp: Utc::now() + Duration::days(7),
                is_admin: matches!(self.mode, Mode::Issue(Role::Admin)),
            })
        }
    }

    fn codec() -> AccessTokenCodec {
        AccessTokenCodec::new(&SecretString::from(SECRET))
    }

    fn valid_token(role: Role) -> String {
        codec()
            .sign(role, "user-1", Utc::now() + Duration::minutes(5))
            .unwrap()
    }

    fn expired_token(role: Role) -> String {
        codec()
            .sign(role, "user-1", Utc::now() - Duration::seconds(30))
            .unwrap()
    }

    async fn whoami(user: AuthUser) -> Json<Value> {
        Json(json!({ "user_id": user.user_id, "role": user.role }))
    }

    fn app(refresher: Arc<FakeRefresher>) -> Router {
        let state = AutoRefreshState::new(Arc::new(codec()), refresher, "/");
        let admin = Router::new()
            .route("/admin", get(whoami))
            .layer(middleware::from_fn_with_state(state.clone(), require_admin));
        Router::new()
            .route("/me", get(whoami))
            .layer(middleware::from_fn_with_state(state, require_auth))
            .merge(admin)
    }

    async fn call(app: Router, uri: &str, cookie: Option<String>) -> Response {
        let mut builder = axum::http::Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        app.oneshot(builder.body(Body::empty()).unwrap()).await.unwrap()
    }

    fn set_cookies(response: &Response) -> Vec<String> {
        response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect()
    }

    fn clears_both(response: &Response) -> bool {
        let cookies = set_cookies(response);
        ["accessToken=;", "refreshToken=;"]
            .iter()
            .all(|prefix| cookies.iter().any(|c| c.starts_with(prefix) && c.contains("Max-Age=0")))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_valid_access_token_passes_without_refresh() {
        let refresher = FakeRefresher::new(Mode::Issue(Role::User));
        let response = call(
            app(refresher.clone()),
            "/me",
            Some(format!("accessToken={}", valid_token(Role::User))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert!(set_cookies(&response).is_empty());
        assert_eq!(refresher.calls(), 0);
        let body = body_json(response).await;
        assert_eq!(body["user_id"], "user-1");
        assert_eq!(body["role"], "user");
    }

    #[tokio::test]
    async fn test_missing_access_cookie_is_unauthorized() {
        let refresher = FakeRefresher::new(Mode::Issue(Role::User));
        let response = call(
            app(refresher.clone()),
            "/me",
            Some("refreshToken=r".to_string()),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_access_token_clears_cookies_without_network() {
        let refresher = FakeRefresher::new(Mode::Issue(Role::User));
        let response = call(
            app(refresher.clone()),
            "/me",
            Some("accessToken=garbage; refreshToken=r".to_string()),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(clears_both(&response));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_without_refresh_cookie() {
        let refresher = FakeRefresher::new(Mode::Issue(Role::User));
        let response = call(
            app(refresher.clone()),
            "/me",
            Some(format!("accessToken={}", expired_token(Role::User))),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(clears_both(&response));
        assert_eq!(refresher.calls(), 0);
    }

    #[tokio::test]
    async fn test_expired_access_is_refreshed_transparently() {
        let refresher = FakeRefresher::new(Mode::Issue(Role::User));
        let expired = expired_token(Role::User);
        let response = call(
            app(refresher.clone()),
            "/me",
            Some(format!("accessToken={}; refreshToken=old-refresh", expired)),
        )
        .await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(refresher.calls(), 1);
        assert_eq!(
            *refresher.last_args.lock().unwrap(),
            Some(("old-refresh".to_string(), Some(expired)))
        );

        let cookies = set_cookies(&response);
        assert_eq!(cookies.len(), 2);
        assert!(cookies.iter().any(|c| c.starts_with("accessToken=ey")));
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("refreshToken=rotated-refresh") && c.contains("HttpOnly")));

        let body = body_json(response).await;
        assert_eq!(body["user_id"], "user-1");
    }

    #[tokio::test]
    async fn test_refresh_rejection_clears_cookies() {
        let refresher = FakeRefresher::new(Mode::Reject);
        let response = call(
            app(refresher.clone()),
            "/me",
            Some(format!(
                "accessToken={}; refreshToken=dead",
                expired_token(Role::User)
            )),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(clears_both(&response));
        assert_eq!(refresher.calls(), 1);
    }

    #[tokio::test]
    async fn test_refreshed_token_must_verify_locally() {
        let refresher = FakeRefresher::new(Mode::ForeignKey);
        let response = call(
            app(refresher.clone()),
            "/me",
            Some(format!(
                "accessToken={}; refreshToken=r",
                expired_token(Role::User)
            )),
        )
        .await;

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(clears_both(&response));
    }

    #[tokio::test]
    async fn test_admin_route_checks_role() {
        let refresher = FakeRefresher::new(Mode::Issue(Role::User));

        let response = call(
            app(refresher.clone()),
            "/admin",
            Some(format!("accessToken={}", valid_token(Role::User))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = call(
            app(refresher),
            "/admin",
            Some(format!("accessToken={}", valid_token(Role::Admin))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_admin_uses_role_from_refreshed_token() {
        // 만료된 토큰은 user였지만 갱신 후 admin으로 승격된 경우
        let promoted = FakeRefresher::new(Mode::Issue(Role::Admin));
        let response = call(
            app(promoted),
            "/admin",
            Some(format!(
                "accessToken={}; refreshToken=r",
                expired_token(Role::User)
            )),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(set_cookies(&response).len(), 2);

        // 강등된 경우에도 새 쿠키는 403 응답에 설정됩니다.
        let demoted = FakeRefresher::new(Mode::Issue(Role::User));
        let response = call(
            app(demoted),
            "/admin",
            Some(format!(
                "accessToken={}; refreshToken=r",
                expired_token(Role::Admin)
            )),
        )
        .await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let cookies = set_cookies(&response);
        assert!(cookies
            .iter()
            .any(|c| c.starts_with("refreshToken=rotated-refresh")));
        assert!(!clears_both(&response));
    }
}
