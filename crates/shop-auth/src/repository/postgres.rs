use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shop_core::Role;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    check_rotatable, CredentialStore, NewRefreshToken, RefreshTokenRecord, StoreError, UserRecord,
};

/// PostgreSQL 자격 증명 저장소.
#[derive(Debug, Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 스키마 마이그레이션을 실행합니다.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully");
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<Option<UserRecord>, StoreError> {
        let record = sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (id, username, password_hash, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (username) DO NOTHING
            RETURNING id, username, password_hash, role, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .bind(role.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, StoreError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<UserRecord>, StoreError> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn insert_refresh_token(&self, token: &NewRefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, jti, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(token.id)
        .bind(&token.jti)
        .bind(token.user_id)
        .bind(&token.token_hash)
        .bind(token.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn rotate_refresh_token(
        &self,
        old_jti: &str,
        now: DateTime<Utc>,
        replacement: &NewRefreshToken,
    ) -> Result<(), StoreError> {
        // 조회-폐기-삽입을 트랜잭션으로 묶습니다. 중간에 반환하면 롤백됩니다.
        let mut tx = self.pool.begin().await?;

        let current: Option<RefreshTokenRecord> = sqlx::query_as(
            r#"
            SELECT id, jti, user_id, token_hash, expires_at, revoked, created_at
            FROM refresh_tokens
            WHERE jti = $1
            FOR UPDATE
            "#,
        )
        .bind(old_jti)
        .fetch_optional(&mut *tx)
        .await?;

        check_rotatable(current.as_ref(), now).map_err(StoreError::TokenRejected)?;

        sqlx::query("UPDATE refresh_tokens SET revoked = true WHERE jti = $1")
            .bind(old_jti)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (id, jti, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(replacement.id)
        .bind(&replacement.jti)
        .bind(replacement.user_id)
        .bind(&replacement.token_hash)
        .bind(replacement.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        debug!(old_jti, new_jti = %replacement.jti, "Refresh token rotated");
        Ok(())
    }

    async fn revoke_by_hash(&self, token_hash: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked = true WHERE token_hash = $1 AND revoked = false",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// 실제 PostgreSQL이 필요한 테스트.
///
/// `AUTH_TEST_DATABASE_URL`을 설정하고 `cargo test -- --ignored`로 실행합니다.
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    async fn store() -> PgCredentialStore {
        let url = std::env::var("AUTH_TEST_DATABASE_URL")
            .expect("AUTH_TEST_DATABASE_URL must be set for database tests");
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(&url)
            .await
            .unwrap();
        let store = PgCredentialStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn new_token(user_id: Uuid, ttl: Duration) -> NewRefreshToken {
        let jti = Uuid::new_v4().to_string();
        NewRefreshToken {
            id: Uuid::new_v4(),
            token_hash: format!("hash-{}", jti),
            jti,
            user_id,
            expires_at: Utc::now() + ttl,
        }
    }

    #[tokio::test]
    #[ignore]
    async fn test_create_user_conflict() {
        let store = store().await;
        let username = format!("user-{}", Uuid::new_v4());

        let created = store.create_user(&username, "hash", Role::User).await.unwrap();
        assert!(created.is_some());
        let duplicate = store.create_user(&username, "hash", Role::User).await.unwrap();
        assert!(duplicate.is_none());
    }

    #[tokio::test]
    #[ignore]
    async fn test_rotation_is_single_use() {
        let store = store().await;
        let user = store
            .create_user(&format!("user-{}", Uuid::new_v4()), "hash", Role::User)
            .await
            .unwrap()
            .unwrap();

        let original = new_token(user.id, Duration::days(1));
        store.insert_refresh_token(&original).await.unwrap();

        let first = new_token(user.id, Duration::days(1));
        store
            .rotate_refresh_token(&original.jti, Utc::now(), &first)
            .await
            .unwrap();

        let second = new_token(user.id, Duration::days(1));
        let err = store
            .rotate_refresh_token(&original.jti, Utc::now(), &second)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::TokenRejected(super::super::TokenRejection::Revoked)
        ));
    }

    #[tokio::test]
    #[ignore]
    async fn test_concurrent_rotation_single_winner() {
        let store = Arc::new(store().await);
        let user = store
            .create_user(&format!("user-{}", Uuid::new_v4()), "hash", Role::User)
            .await
            .unwrap()
            .unwrap();

        let original = new_token(user.id, Duration::days(1));
        store.insert_refresh_token(&original).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let jti = original.jti.clone();
            let replacement = new_token(user.id, Duration::days(1));
            handles.push(tokio::spawn(async move {
                store
                    .rotate_refresh_token(&jti, Utc::now(), &replacement)
                    .await
                    .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    #[ignore]
    async fn test_revoke_by_hash_is_idempotent() {
        let store = store().await;
        let user = store
            .create_user(&format!("user-{}", Uuid::new_v4()), "hash", Role::User)
            .await
            .unwrap()
            .unwrap();
        let token = new_token(user.id, Duration::days(1));
        store.insert_refresh_token(&token).await.unwrap();

        assert!(store.revoke_by_hash(&token.token_hash).await.unwrap());
        assert!(!store.revoke_by_hash(&token.token_hash).await.unwrap());
        assert!(!store.revoke_by_hash("no-such-hash").await.unwrap());
    }
}
