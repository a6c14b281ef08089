//! Refresh token store
//!
//! Server-side record of issued refresh tokens. A refresh token is only
//! usable while a record for the same (user, token) pair exists here.
//! Tokens are stored as SHA-256 hashes.
//!
//! Deletes are idempotent: removing a record that is already gone succeeds.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

/// Default bound on every store operation
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Refresh token store error types
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Refresh token store timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Hash a token using SHA-256
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
}

/// Persistent record of issued refresh tokens
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Record a freshly issued refresh token for a user
    async fn store(&self, user_id: &str, token: &str) -> Result<(), StoreError>;

    /// Whether a record exists for this exact (user, token) pair.
    /// Absence is `Ok(false)`, not an error.
    async fn validate(&self, user_id: &str, token: &str) -> Result<bool, StoreError>;

    /// Remove the record for a (user, token) pair
    async fn delete_by_user(&self, user_id: &str, token: &str) -> Result<(), StoreError>;

    /// Remove the record for a token regardless of owner
    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError>;

    /// Number of live records for a user
    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError>;
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL-backed refresh token store
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
    timeout: Duration,
}

impl PgRefreshTokenStore {
    /// Create a new store with the default operation timeout
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Set the per-operation timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>> + Send,
    {
        with_deadline(self.timeout, fut).await
    }
}

/// Run a store query, failing with `StoreError::Timeout` once `limit` elapses
async fn with_deadline<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(|e| {
            tracing::error!(error = %e, "Refresh token store query failed");
            StoreError::DatabaseError(e)
        }),
        Err(_) => {
            tracing::error!(timeout = ?limit, "Refresh token store timed out");
            Err(StoreError::Timeout(limit))
        }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn store(&self, user_id: &str, token: &str) -> Result<(), StoreError> {
        let token_hash = hash_token(token);

        self.bounded(
            sqlx::query(
                r#"
                INSERT INTO refresh_tokens (user_id, token_hash)
                VALUES ($1, $2)
                "#,
            )
            .bind(user_id)
            .bind(&token_hash)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn validate(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        let token_hash = hash_token(token);

        let found: Option<(i64,)> = self
            .bounded(
                sqlx::query_as(
                    r#"
                    SELECT 1::BIGINT FROM refresh_tokens
                    WHERE user_id = $1 AND token_hash = $2
                    LIMIT 1
                    "#,
                )
                .bind(user_id)
                .bind(&token_hash)
                .fetch_optional(&self.pool),
            )
            .await?;

        Ok(found.is_some())
    }

    async fn delete_by_user(&self, user_id: &str, token: &str) -> Result<(), StoreError> {
        let token_hash = hash_token(token);

        self.bounded(
            sqlx::query(
                r#"
                DELETE FROM refresh_tokens
                WHERE user_id = $1 AND token_hash = $2
                "#,
            )
            .bind(user_id)
            .bind(&token_hash)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError> {
        let token_hash = hash_token(token);

        self.bounded(
            sqlx::query(
                r#"
                DELETE FROM refresh_tokens
                WHERE token_hash = $1
                "#,
            )
            .bind(&token_hash)
            .execute(&self.pool),
        )
        .await?;

        Ok(())
    }

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        let count: (i64,) = self
            .bounded(
                sqlx::query_as(
                    r#"
                    SELECT COUNT(*) FROM refresh_tokens
                    WHERE user_id = $1
                    "#,
                )
                .bind(user_id)
                .fetch_one(&self.pool),
            )
            .await?;

        Ok(count.0.max(0) as u64)
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory refresh token store keyed by token hash
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    // token hash -> owning user id
    records: DashMap<String, String>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn store(&self, user_id: &str, token: &str) -> Result<(), StoreError> {
        self.records.insert(hash_token(token), user_id.to_string());
        Ok(())
    }

    async fn validate(&self, user_id: &str, token: &str) -> Result<bool, StoreError> {
        Ok(self
            .records
            .get(&hash_token(token))
            .is_some_and(|owner| owner.value() == user_id))
    }

    async fn delete_by_user(&self, user_id: &str, token: &str) -> Result<(), StoreError> {
        self.records
            .remove_if(&hash_token(token), |_, owner| owner == user_id);
        Ok(())
    }

    async fn delete_by_token(&self, token: &str) -> Result<(), StoreError> {
        self.records.remove(&hash_token(token));
        Ok(())
    }

    async fn count_for_user(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .records
            .iter()
            .filter(|entry| entry.value() == user_id)
            .count() as u64)
    }
}
