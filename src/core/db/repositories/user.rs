//! User directory
//!
//! The session service only needs three things from user storage: lookup by
//! email, lookup by id, and creation. `UserDirectory` captures that, with a
//! PostgreSQL implementation and an in-memory one for tests and development.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use sqlx::PgPool;
use uuid::Uuid;

use crate::core::db::models::{NewUser, User};

/// User directory error types
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("Email already exists")]
    EmailAlreadyExists,

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),
}

/// Lookup and creation of user records
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DirectoryError>;

    async fn create_user(&self, user: NewUser) -> Result<User, DirectoryError>;
}

/// PostgreSQL-backed user repository
#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    /// Create a new user repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, full_name, phone_number, account_type,
                   organization_id, created_at, updated_at
            FROM users
            WHERE LOWER(email) = LOWER($1)
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DirectoryError> {
        // Subject ids that are not UUIDs cannot exist in this table
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };

        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, password_hash, full_name, phone_number, account_type,
                   organization_id, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    async fn create_user(&self, user: NewUser) -> Result<User, DirectoryError> {
        if self.find_by_email(&user.email).await?.is_some() {
            return Err(DirectoryError::EmailAlreadyExists);
        }

        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, password_hash, full_name, phone_number, account_type, organization_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, email, password_hash, full_name, phone_number, account_type,
                      organization_id, created_at, updated_at
            "#,
        )
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.full_name)
        .bind(&user.phone_number)
        .bind(user.account_type)
        .bind(&user.organization_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                DirectoryError::EmailAlreadyExists
            }
            _ => DirectoryError::DatabaseError(e),
        })?;

        Ok(created)
    }
}

/// In-memory user directory keyed by id
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: DashMap<Uuid, User>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace a stored user record (used to simulate profile changes)
    pub fn update(&self, user: User) {
        self.users.insert(user.id, user);
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        Ok(self
            .users
            .iter()
            .find(|entry| entry.email.eq_ignore_ascii_case(email))
            .map(|entry| entry.value().clone()))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<User>, DirectoryError> {
        let Ok(id) = Uuid::parse_str(id) else {
            return Ok(None);
        };
        Ok(self.users.get(&id).map(|entry| entry.value().clone()))
    }

    async fn create_user(&self, user: NewUser) -> Result<User, DirectoryError> {
        if self.find_by_email(&user.email).await?.is_some() {
            return Err(DirectoryError::EmailAlreadyExists);
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            full_name: user.full_name,
            phone_number: user.phone_number,
            account_type: user.account_type,
            organization_id: user.organization_id,
            created_at: now,
            updated_at: now,
        };

        self.users.insert(created.id, created.clone());
        Ok(created)
    }
}
