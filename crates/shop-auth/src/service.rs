//! 인증 서비스.
//!
//! 회원가입, 로그인, Refresh Token 로테이션, 로그아웃을 처리합니다.
//! 모든 저장소 호출은 설정된 타임아웃으로 감싸며, 타임아웃은 실패로 처리하고 재시도하지 않습니다.
//!
//! # 로테이션 프로토콜
//!
//! 1. Refresh Token 서명/만료 검증
//! 2. `sub`를 UUID로 해석하고 저장소에서 사용자를 다시 읽음 (현재 역할 반영)
//! 3. 새 Refresh/Access Token 서명
//! 4. 저장소 트랜잭션: 기존 `jti` 행 잠금 → 폐기 확인 → 폐기 표시 → 새 행 삽입 → 커밋
//!
//! 어느 단계에서든 실패하면 `invalid refresh token`(401)으로 응답합니다.

use chrono::Utc;
use shop_core::{IssuedTokens, Role, ShopError, TokenCodec, TokenError};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::metrics::{self, Outcome};
use crate::password::{self, PasswordError};
use crate::repository::{CredentialStore, NewRefreshToken, StoreError, UserRecord};

/// 인증 서비스 에러.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("username already exists")]
    UsernameTaken,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("storage operation timed out: {0}")]
    Timeout(&'static str),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("password error: {0}")]
    Password(#[from] PasswordError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<AuthError> for ShopError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Validation(message) => ShopError::validation(message),
            AuthError::UsernameTaken => ShopError::Conflict(err.to_string()),
            AuthError::InvalidCredentials | AuthError::InvalidRefreshToken => {
                ShopError::Unauthorized(err.to_string())
            }
            AuthError::Storage(_)
            | AuthError::Timeout(_)
            | AuthError::Token(_)
            | AuthError::Password(_)
            | AuthError::Internal(_) => ShopError::internal(err),
        }
    }
}

/// 인증 서비스.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    codec: TokenCodec,
    storage_timeout: Duration,
}

impl AuthService {
    pub fn new(store: Arc<dyn CredentialStore>, codec: TokenCodec, storage_timeout: Duration) -> Self {
        Self {
            store,
            codec,
            storage_timeout,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// 저장소 연결 확인 (readiness).
    pub async fn ping_store(&self) -> Result<(), AuthError> {
        self.with_timeout("ping", self.store.ping()).await
    }

    async fn with_timeout<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, AuthError> {
        match tokio::time::timeout(self.storage_timeout, fut).await {
            Ok(result) => result.map_err(AuthError::Storage),
            Err(_) => Err(AuthError::Timeout(operation)),
        }
    }

    // ========================================================================
    // 회원가입
    // ========================================================================

    /// 회원가입.
    ///
    /// 사용자 이름은 앞뒤 공백을 제거하고, 비밀번호는 그대로 사용합니다.
    /// 새 사용자의 역할은 항상 `user`입니다.
    pub async fn register(&self, username: &str, password: &str) -> Result<UserRecord, AuthError> {
        let result = self.register_inner(username, password).await;
        metrics::record_register(match &result {
            Ok(_) => Outcome::Success,
            Err(AuthError::Validation(_) | AuthError::UsernameTaken) => Outcome::Rejected,
            Err(_) => Outcome::Error,
        });
        result
    }

    async fn register_inner(&self, username: &str, password: &str) -> Result<UserRecord, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "username and password are required".to_string(),
            ));
        }

        let password_hash = hash_blocking(password.to_string()).await?;

        let created = self
            .with_timeout(
                "create_user",
                self.store.create_user(username, &password_hash, Role::User),
            )
            .await?;

        match created {
            Some(user) => {
                info!(user_id = %user.id, username = %user.username, "User registered");
                Ok(user)
            }
            None => {
                info!(username, "Registration rejected: username taken");
                Err(AuthError::UsernameTaken)
            }
        }
    }

    // ========================================================================
    // 로그인
    // ========================================================================

    /// 로그인.
    ///
    /// 사용자가 없는 경우와 비밀번호가 틀린 경우 모두 같은 에러를 반환합니다.
    /// 기존 세션(다른 Refresh Token)은 건드리지 않습니다.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedTokens, AuthError> {
        let result = self.login_inner(username, password).await;
        metrics::record_login(match &result {
            Ok(_) => Outcome::Success,
            Err(AuthError::Validation(_)) => Outcome::Rejected,
            Err(AuthError::InvalidCredentials) => Outcome::Unauthorized,
            Err(_) => Outcome::Error,
        });
        result
    }

    async fn login_inner(&self, username: &str, password: &str) -> Result<IssuedTokens, AuthError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::Validation(
                "username and password are required".to_string(),
            ));
        }

        let user = match self
            .with_timeout("find_user_by_username", self.store.find_user_by_username(username))
            .await?
        {
            Some(user) => user,
            None => {
                // 없는 사용자도 같은 Argon2 검증 비용을 치릅니다.
                burn_verify(password).await;
                warn!(username, "Login failed: unknown user");
                return Err(AuthError::InvalidCredentials);
            }
        };

        match verify_blocking(password.to_string(), user.password_hash.clone()).await {
            Ok(()) => {}
            Err(AuthError::Password(PasswordError::Mismatch)) => {
                warn!(user_id = %user.id, "Login failed: wrong password");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        }

        let issued = self.issue_for(&user)?;
        self.with_timeout("insert_refresh_token", self.store.insert_refresh_token(&issued.ledger))
            .await?;

        info!(user_id = %user.id, jti = %issued.ledger.jti, "User logged in");
        Ok(issued.tokens)
    }

    // ========================================================================
    // 토큰 갱신 (로테이션)
    // ========================================================================

    /// Refresh Token 로테이션.
    ///
    /// 검증, 사용자 조회, 저장소 오류, 타임아웃 등 모든 실패는
    /// [`AuthError::InvalidRefreshToken`]으로 응답합니다. 원인은 로그에 남깁니다.
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError> {
        let result = self.rotate(refresh_token).await;
        metrics::record_refresh(match &result {
            Ok(_) => Outcome::Success,
            Err(_) => Outcome::Unauthorized,
        });
        result
    }

    async fn rotate(&self, refresh_token: &str) -> Result<IssuedTokens, AuthError> {
        let claims = self.codec.verify_refresh(refresh_token).map_err(|e| {
            debug!(expired = e.is_expired(), "Refresh token failed verification");
            AuthError::InvalidRefreshToken
        })?;

        let user_id = claims.user_id().ok_or_else(|| {
            warn!(jti = %claims.jti, "Refresh token subject is not a valid user id");
            AuthError::InvalidRefreshToken
        })?;

        let user = match self
            .with_timeout("find_user_by_id", self.store.find_user_by_id(user_id))
            .await
        {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(%user_id, jti = %claims.jti, "Refresh for unknown user");
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => {
                error!(%user_id, jti = %claims.jti, error = %e, "User lookup failed during refresh");
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        let issued = self.issue_for(&user).map_err(|e| {
            error!(%user_id, error = %e, "Token signing failed during refresh");
            AuthError::InvalidRefreshToken
        })?;

        match self
            .with_timeout(
                "rotate_refresh_token",
                self.store
                    .rotate_refresh_token(&claims.jti, Utc::now(), &issued.ledger),
            )
            .await
        {
            Ok(()) => {}
            Err(AuthError::Storage(StoreError::TokenRejected(reason))) => {
                warn!(%user_id, jti = %claims.jti, %reason, "Refresh token rejected");
                return Err(AuthError::InvalidRefreshToken);
            }
            Err(e) => {
                error!(%user_id, jti = %claims.jti, error = %e, "Refresh token rotation failed");
                return Err(AuthError::InvalidRefreshToken);
            }
        }

        info!(
            %user_id,
            old_jti = %claims.jti,
            new_jti = %issued.ledger.jti,
            role = %user.role(),
            "Refresh token rotated"
        );
        Ok(issued.tokens)
    }

    // ========================================================================
    // 로그아웃
    // ========================================================================

    /// 로그아웃. 토큰이 없거나 이미 폐기됐어도 성공입니다.
    ///
    /// 서명 검증 없이 해시로만 찾으므로 만료된 토큰도 폐기할 수 있습니다.
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), AuthError> {
        metrics::record_logout();

        let token = match refresh_token {
            Some(t) if !t.is_empty() => t,
            _ => return Ok(()),
        };

        let token_hash = self.codec.fingerprint(token);
        let revoked = self
            .with_timeout("revoke_by_hash", self.store.revoke_by_hash(&token_hash))
            .await?;

        debug!(revoked, "Logout processed");
        Ok(())
    }

    /// 사용자에 대한 새 토큰 쌍과 원장 항목을 만듭니다. 저장은 호출자가 합니다.
    fn issue_for(&self, user: &UserRecord) -> Result<Issued, AuthError> {
        let now = Utc::now();
        let lifetimes = self.codec.lifetimes();
        let access_exp = now + lifetimes.access;
        let refresh_exp = now + lifetimes.refresh;
        let subject = user.id.to_string();
        let role = user.role();

        let access_token = self.codec.sign_access(role, &subject, access_exp)?;
        let (refresh_token, jti) = self.codec.sign_refresh(&subject, refresh_exp)?;

        let ledger = NewRefreshToken {
            id: Uuid::new_v4(),
            jti,
            user_id: user.id,
            token_hash: self.codec.fingerprint(&refresh_token),
            expires_at: refresh_exp,
        };

        Ok(Issued {
            tokens: IssuedTokens {
                access_token,
                refresh_token,
                access_exp,
                refresh_exp,
                is_admin: role.is_admin(),
            },
            ledger,
        })
    }
}

struct Issued {
    tokens: IssuedTokens,
    ledger: NewRefreshToken,
}

/// Argon2 해싱은 CPU 작업이므로 blocking 풀에서 실행합니다.
async fn hash_blocking(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .map_err(AuthError::Password)
}

async fn verify_blocking(password: String, hash: String) -> Result<(), AuthError> {
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?
        .map_err(AuthError::Password)
}

/// 존재하지 않는 사용자 로그인용 해시. 프로세스당 한 번만 계산합니다.
static DUMMY_HASH: OnceCell<String> = OnceCell::const_new();

/// 더미 해시로 검증을 수행하고 결과는 버립니다.
async fn burn_verify(password: &str) {
    let hash = match DUMMY_HASH
        .get_or_try_init(|| hash_blocking("shop-auth-dummy-password".to_string()))
        .await
    {
        Ok(hash) => hash.clone(),
        Err(e) => {
            error!(error = %e, "Failed to prepare dummy password hash");
            return;
        }
    };
    let _ = verify_blocking(password.to_string(), hash).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::MemoryCredentialStore;
    use chrono::Duration as ChronoDuration;
    use secrecy::SecretString;
    use shop_core::TokenLifetimes;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            &SecretString::from("service-test-access-secret-32-chars!"),
            &SecretString::from("service-test-refresh-secret-32-chars"),
            TokenLifetimes::default(),
        )
    }

    fn service() -> (AuthService, Arc<MemoryCredentialStore>) {
        let store = Arc::new(MemoryCredentialStore::new());
        let service = AuthService::new(store.clone(), codec(), Duration::from_secs(5));
        (service, store)
    }

    #[tokio::test]
    async fn test_register_trims_username() {
        let (service, _) = service();
        let user = service.register("  alice ", "pw").await.unwrap();
        assert_eq!(user.username, "alice");
        assert_eq!(user.role(), Role::User);
        assert!(user.password_hash.starts_with("$argon2id$"));
    }

    #[tokio::test]
    async fn test_register_validation_and_conflict() {
        let (service, _) = service();

        assert!(matches!(
            service.register("   ", "pw").await,
            Err(AuthError::Validation(_))
        ));
        assert!(matches!(
            service.register("alice", "").await,
            Err(AuthError::Validation(_))
        ));

        service.register("alice", "pw").await.unwrap();
        assert!(matches!(
            service.register("alice", "other").await,
            Err(AuthError::UsernameTaken)
        ));
    }

    #[tokio::test]
    async fn test_login_issues_verifiable_tokens() {
        let (service, store) = service();
        let user = service.register("alice", "pw").await.unwrap();

        let before = Utc::now();
        let tokens = service.login("alice", "pw").await.unwrap();
        assert!(!tokens.is_admin);

        let access = service.codec().verify_access(&tokens.access_token).unwrap();
        assert_eq!(access.sub, user.id.to_string());
        assert_eq!(access.role, Role::User);
        assert!(tokens.access_exp >= before + ChronoDuration::minutes(15) - ChronoDuration::seconds(1));
        assert!(tokens.refresh_exp > tokens.access_exp);

        let refresh = service.codec().verify_refresh(&tokens.refresh_token).unwrap();
        let row = store.refresh_token(&refresh.jti).await.unwrap();
        assert_eq!(row.user_id, user.id);
        assert!(!row.revoked);
        assert_eq!(row.token_hash, service.codec().fingerprint(&tokens.refresh_token));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let (service, _) = service();
        service.register("alice", "pw").await.unwrap();

        let unknown = service.login("mallory", "pw").await.unwrap_err();
        let wrong = service.login("alice", "nope").await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_keeps_existing_sessions() {
        let (service, store) = service();
        let user = service.register("alice", "pw").await.unwrap();

        let first = service.login("alice", "pw").await.unwrap();
        let _second = service.login("alice", "pw").await.unwrap();

        let rows = store.refresh_tokens_for_user(user.id).await;
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| !r.revoked));
        assert!(service.refresh(&first.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_is_single_use() {
        let (service, _) = service();
        service.register("alice", "pw").await.unwrap();
        let tokens = service.login("alice", "pw").await.unwrap();

        let rotated = service.refresh(&tokens.refresh_token).await.unwrap();
        assert_ne!(rotated.refresh_token, tokens.refresh_token);

        assert!(matches!(
            service.refresh(&tokens.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert!(service.refresh(&rotated.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_refresh_single_winner() {
        let (service, _) = service();
        service.register("alice", "pw").await.unwrap();
        let tokens = service.login("alice", "pw").await.unwrap();

        let service = Arc::new(service);
        let handles: Vec<_> = (0..10)
            .map(|_| {
                let service = service.clone();
                let token = tokens.refresh_token.clone();
                tokio::spawn(async move { service.refresh(&token).await.is_ok() })
            })
            .collect();

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_refresh_reflects_current_role() {
        let (service, store) = service();
        let user = service.register("alice", "pw").await.unwrap();
        let tokens = service.login("alice", "pw").await.unwrap();
        assert!(!tokens.is_admin);

        store.set_role(user.id, Role::Admin).await;

        let rotated = service.refresh(&tokens.refresh_token).await.unwrap();
        assert!(rotated.is_admin);
        let claims = service.codec().verify_access(&rotated.access_token).unwrap();
        assert_eq!(claims.role, Role::Admin);
    }

    #[tokio::test]
    async fn test_refresh_rejects_bad_tokens() {
        let (service, _) = service();
        service.register("alice", "pw").await.unwrap();
        let tokens = service.login("alice", "pw").await.unwrap();

        // Access Token은 Refresh Token으로 쓸 수 없음
        assert!(matches!(
            service.refresh(&tokens.access_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
        assert!(matches!(
            service.refresh("garbage").await,
            Err(AuthError::InvalidRefreshToken)
        ));

        // 서명은 유효하지만 원장에 없는 토큰
        let (unknown, _) = service
            .codec()
            .sign_refresh(&Uuid::new_v4().to_string(), Utc::now() + ChronoDuration::days(1))
            .unwrap();
        assert!(matches!(
            service.refresh(&unknown).await,
            Err(AuthError::InvalidRefreshToken)
        ));

        // sub가 UUID가 아닌 토큰
        let (bad_sub, _) = service
            .codec()
            .sign_refresh("not-a-uuid", Utc::now() + ChronoDuration::days(1))
            .unwrap();
        assert!(matches!(
            service.refresh(&bad_sub).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_refresh_storage_failure_is_unauthorized() {
        let (service, store) = service();
        service.register("alice", "pw").await.unwrap();
        let tokens = service.login("alice", "pw").await.unwrap();

        store.set_available(false);
        let err = service.refresh(&tokens.refresh_token).await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidRefreshToken));
        assert_eq!(ShopError::from(err).status(), axum::http::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_timeout_is_unauthorized() {
        let store = Arc::new(MemoryCredentialStore::new());
        let service = AuthService::new(store.clone(), codec(), Duration::from_millis(50));
        service.register("alice", "pw").await.unwrap();
        let tokens = service.login("alice", "pw").await.unwrap();

        store.set_latency(Duration::from_millis(300));
        assert!(matches!(
            service.refresh(&tokens.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));

        // 타임아웃된 로테이션은 원장을 바꾸지 않음
        store.set_latency(Duration::ZERO);
        assert!(service.refresh(&tokens.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let (service, store) = service();
        service.register("alice", "pw").await.unwrap();
        let tokens = service.login("alice", "pw").await.unwrap();
        let jti = service.codec().verify_refresh(&tokens.refresh_token).unwrap().jti;

        service.logout(Some(&tokens.refresh_token)).await.unwrap();
        service.logout(Some(&tokens.refresh_token)).await.unwrap();
        service.logout(None).await.unwrap();
        service.logout(Some("")).await.unwrap();
        service.logout(Some("never-issued")).await.unwrap();

        assert!(store.refresh_token(&jti).await.unwrap().revoked);
        assert!(matches!(
            service.refresh(&tokens.refresh_token).await,
            Err(AuthError::InvalidRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_unknown_user_login_costs_a_hash_verify() {
        let (service, _) = service();
        service.register("alice", "pw").await.unwrap();

        // 더미 해시 준비 비용은 측정에서 제외
        let _ = service.login("nobody", "pw").await;

        let mut unknown = Duration::ZERO;
        let mut wrong = Duration::ZERO;
        for _ in 0..3 {
            let start = std::time::Instant::now();
            assert!(matches!(
                service.login("nobody", "pw").await,
                Err(AuthError::InvalidCredentials)
            ));
            unknown += start.elapsed();

            let start = std::time::Instant::now();
            assert!(matches!(
                service.login("alice", "wrong").await,
                Err(AuthError::InvalidCredentials)
            ));
            wrong += start.elapsed();
        }

        assert!(
            unknown * 3 >= wrong && wrong * 3 >= unknown,
            "unknown={:?} wrong={:?}",
            unknown,
            wrong
        );
    }

    #[tokio::test]
    async fn test_logout_revokes_expired_refresh_token() {
        let (service, store) = service();
        let user = service.register("alice", "pw").await.unwrap();

        let expired_at = Utc::now() - ChronoDuration::hours(1);
        let (token, jti) = service
            .codec()
            .sign_refresh(&user.id.to_string(), expired_at)
            .unwrap();
        store
            .insert_refresh_token(&NewRefreshToken {
                id: Uuid::new_v4(),
                jti: jti.clone(),
                user_id: user.id,
                token_hash: service.codec().fingerprint(&token),
                expires_at: expired_at,
            })
            .await
            .unwrap();

        assert!(service.logout(Some(&token)).await.is_ok());
        assert!(store.refresh_token(&jti).await.unwrap().revoked);
    }

    #[tokio::test]
    async fn test_logout_storage_failure_is_internal() {
        let (service, store) = service();
        store.set_available(false);
        let err = service.logout(Some("some-token")).await.unwrap_err();
        assert!(matches!(err, AuthError::Storage(StoreError::Unavailable)));
        assert_eq!(
            ShopError::from(err).status(),
            axum::http::StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(
            ShopError::from(AuthError::UsernameTaken).status(),
            axum::http::StatusCode::CONFLICT
        );
        assert_eq!(
            ShopError::from(AuthError::Validation("x".into())).status(),
            axum::http::StatusCode::BAD_REQUEST
        );
        let err = ShopError::from(AuthError::InvalidRefreshToken);
        assert_eq!(err.to_response_body().message, "invalid refresh token");
        let err = ShopError::from(AuthError::Timeout("create_user"));
        assert_eq!(err.to_response_body().message, "internal server error");
    }
}
