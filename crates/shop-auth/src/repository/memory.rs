use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shop_core::Role;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    check_rotatable, CredentialStore, NewRefreshToken, RefreshTokenRecord, StoreError, UserRecord,
};

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, UserRecord>,
    /// jti → 원장 행
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

impl MemoryState {
    fn insert_token(&mut self, token: &NewRefreshToken) {
        self.refresh_tokens.insert(
            token.jti.clone(),
            RefreshTokenRecord {
                id: token.id,
                jti: token.jti.clone(),
                user_id: token.user_id,
                token_hash: token.token_hash.clone(),
                expires_at: token.expires_at,
                revoked: false,
                created_at: Utc::now(),
            },
        );
    }
}

/// 인메모리 자격 증명 저장소.
///
/// 모든 연산이 하나의 `tokio::sync::Mutex`를 거치므로 `jti`별 로테이션이 선형화됩니다.
/// 장애/지연 주입 기능이 있어 타임아웃과 저장소 장애 경로를 시험할 수 있습니다.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<MemoryState>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `false`로 설정하면 모든 연산이 [`StoreError::Unavailable`]로 실패합니다.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    /// 모든 연산 앞에 지연을 추가합니다.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// 사용자 역할 변경 (관리 작업).
    pub async fn set_role(&self, user_id: Uuid, role: Role) -> bool {
        let mut state = self.state.lock().await;
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.role = role.as_str().to_string();
                true
            }
            None => false,
        }
    }

    pub async fn refresh_token(&self, jti: &str) -> Option<RefreshTokenRecord> {
        self.state.lock().await.refresh_tokens.get(jti).cloned()
    }

    pub async fn refresh_tokens_for_user(&self, user_id: Uuid) -> Vec<RefreshTokenRecord> {
        self.state
            .lock()
            .await
            .refresh_tokens
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect()
    }

    async fn gate(&self) -> Result<(), StoreError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable);
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.gate().await?;
        let mut state = self.state.lock().await;

        if state.users.values().any(|u| u.username == username) {
            return Ok(None);
        }

        let user = UserRecord {
            id: Uuid::new_v4(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role: role.as_str().to_string(),
            created_at: Utc::now(),
        };
        state.users.insert(user.id, user.clone());
        Ok(Some(user))
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        self.gate().await?;
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.username == username).cloned())
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        self.gate().await?;
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<(), StoreError> {
        self.gate().await?;
        self.state.lock().await.insert_token(token);
        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_jti: &str,
        now: DateTime<Utc>,
        replacement: &NewRefreshToken,
    ) -> Result<(), StoreError> {
        self.gate().await?;
        let mut state = self.state.lock().await;

        check_rotatable(state.refresh_tokens.get(old_jti), now)
            .map_err(StoreError::TokenRejected)?;

        if let Some(current) = state.refresh_tokens.get_mut(old_jti) {
            current.revoked = true;
        }
        state.insert_token(replacement);
        Ok(())
    }

    async fn revoke_by_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        self.gate().await?;
        let mut state = self.state.lock().await;

        let mut revoked = false;
        for token in state
            .refresh_tokens
            .values_mut()
            .filter(|t| t.token_hash == token_hash && !t.revoked)
        {
            token.revoked = true;
            revoked = true;
        }
        Ok(revoked)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.gate().await
    }
}
