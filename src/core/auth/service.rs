//! Session service
//!
//! Orchestrates register, login, refresh and logout. Owns the token issuance
//! policy: every login or refresh mints an access token carrying the
//! encrypted identity payload plus a refresh token that is recorded in the
//! refresh token store.

use std::sync::{Arc, OnceLock};

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::core::auth::cipher::{CipherError, PayloadCipher};
use crate::core::auth::identity::{AccountType, IdentityPayload};
use crate::core::auth::jwt::{AccessClaims, IssuedToken, RefreshClaims, TokenCodec, TokenError};
use crate::core::auth::password::{PasswordError, PasswordHasher};
use crate::core::db::models::{NewUser, User, UserResponse};
use crate::core::db::repositories::{
    DirectoryError, RefreshTokenStore, StoreError, UserDirectory,
};

/// Session service error types
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("invalid refresh token")]
    InvalidRefreshToken,

    #[error("refresh token not valid")]
    RefreshTokenNotValid,

    #[error("user not found")]
    UserNotFound,

    #[error("email already registered")]
    EmailAlreadyExists,

    #[error("{0}")]
    Validation(String),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Cipher error: {0}")]
    Cipher(#[from] CipherError),

    #[error("Password error: {0}")]
    Password(#[from] PasswordError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Directory error: {0}")]
    Directory(DirectoryError),
}

impl From<DirectoryError> for SessionError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::EmailAlreadyExists => SessionError::EmailAlreadyExists,
            _ => SessionError::Directory(err),
        }
    }
}

// ============================================================================
// Request / Response Types
// ============================================================================

/// Registration request data
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub account_type: Option<AccountType>,
    #[serde(default)]
    pub organization_id: Option<String>,
}

impl RegisterRequest {
    /// Request with only the required fields set
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            full_name: None,
            phone_number: None,
            account_type: None,
            organization_id: None,
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

/// Login request data
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        validate_email(&self.email)?;
        validate_password(&self.password)
    }
}

/// Token refresh / logout request
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

impl RefreshRequest {
    pub fn validate(&self) -> Result<(), SessionError> {
        let len = self.refresh_token.len();
        if !(10..=500).contains(&len) {
            return Err(SessionError::Validation(
                "refresh_token: the length must be between 10 and 500".to_string(),
            ));
        }
        Ok(())
    }
}

/// Token pair returned by login and refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access_token: String,
    pub refresh_token: String,
    /// Seconds until the access token expires
    pub expires_in: i64,
}

/// Emails are stored and looked up trimmed and lowercased
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn validate_email(email: &str) -> Result<(), SessionError> {
    let invalid = || SessionError::Validation("email: must be a valid email address".to_string());

    let len = email.chars().count();
    if !(5..=50).contains(&len) {
        return Err(SessionError::Validation(
            "email: the length must be between 5 and 50".to_string(),
        ));
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(invalid());
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return Err(invalid());
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }

    // Domain needs at least one dot with non-empty labels around it
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 || labels.iter().any(|l| l.is_empty()) {
        return Err(invalid());
    }

    Ok(())
}

fn validate_password(password: &str) -> Result<(), SessionError> {
    let len = password.chars().count();
    if !(6..=100).contains(&len) {
        return Err(SessionError::Validation(
            "password: the length must be between 6 and 100".to_string(),
        ));
    }
    Ok(())
}

/// Encrypt an identity payload and sign it into an access token valid for `ttl`.
///
/// No refresh token is issued and nothing is stored.
pub fn mint_access_token(
    codec: &TokenCodec,
    cipher: &PayloadCipher,
    payload: &IdentityPayload,
    ttl: Duration,
) -> Result<IssuedToken, SessionError> {
    let data = cipher.encrypt(payload)?;
    Ok(codec.issue(AccessClaims { data }, ttl)?)
}

// ============================================================================
// Session Service
// ============================================================================

/// Session service
#[derive(Clone)]
pub struct SessionService {
    users: Arc<dyn UserDirectory>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    codec: TokenCodec,
    cipher: PayloadCipher,
    hasher: PasswordHasher,
    // Verified against on unknown emails so both login failures cost one bcrypt verify
    dummy_hash: Arc<OnceLock<String>>,
}

impl SessionService {
    /// Create a new session service
    pub fn new(
        users: Arc<dyn UserDirectory>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        codec: TokenCodec,
        cipher: PayloadCipher,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            codec,
            cipher,
            hasher: PasswordHasher::default(),
            dummy_hash: Arc::new(OnceLock::new()),
        }
    }

    /// Replace the password hasher (tests use a low bcrypt cost)
    pub fn with_password_hasher(mut self, hasher: PasswordHasher) -> Self {
        self.hasher = hasher;
        self.dummy_hash = Arc::new(OnceLock::new());
        self
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn cipher(&self) -> &PayloadCipher {
        &self.cipher
    }

    /// Register a new user
    pub async fn register(
        &self,
        mut request: RegisterRequest,
    ) -> Result<UserResponse, SessionError> {
        request.email = normalize_email(&request.email);
        request.validate()?;

        if self.users.find_by_email(&request.email).await?.is_some() {
            tracing::info!("Registration rejected: email already registered");
            return Err(SessionError::EmailAlreadyExists);
        }

        let password_hash = self.hasher.hash(&request.password)?;

        let user = self
            .users
            .create_user(NewUser {
                email: request.email,
                password_hash,
                full_name: request.full_name.unwrap_or_default(),
                phone_number: request.phone_number.unwrap_or_default(),
                account_type: request.account_type.unwrap_or_default(),
                organization_id: request.organization_id,
            })
            .await?;

        tracing::info!("Registered user {}", user.id);
        Ok(user.into())
    }

    /// Login an existing user
    pub async fn login(&self, mut request: LoginRequest) -> Result<AuthTokens, SessionError> {
        request.email = normalize_email(&request.email);
        request.validate()?;

        let Some(user) = self.users.find_by_email(&request.email).await? else {
            self.burn_password_check(&request.password);
            tracing::info!("Login failed: unknown email");
            return Err(SessionError::InvalidCredentials);
        };

        let password_ok = self
            .hasher
            .verify(&request.password, &user.password_hash)
            .unwrap_or_else(|e| {
                tracing::warn!("Stored password hash for user {} is unusable: {}", user.id, e);
                false
            });
        if !password_ok {
            tracing::info!("Login failed for user {}: password mismatch", user.id);
            return Err(SessionError::InvalidCredentials);
        }

        let tokens = self.generate_tokens(&user).await?;
        tracing::info!("User {} logged in", user.id);
        Ok(tokens)
    }

    /// Rotate a refresh token into a fresh token pair.
    ///
    /// The new pair is stored before the presented token is revoked, so a
    /// store failure at any step leaves the presented token usable for a
    /// retry. The new identity payload is built from the current user record.
    pub async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, SessionError> {
        let claims = self.codec.verify_refresh_token(refresh_token).map_err(|e| {
            tracing::warn!("Refresh rejected: {}", e);
            SessionError::InvalidRefreshToken
        })?;

        if !self
            .refresh_tokens
            .validate(&claims.user_id, refresh_token)
            .await?
        {
            tracing::warn!("Refresh rejected for user {}: no stored record", claims.user_id);
            return Err(SessionError::RefreshTokenNotValid);
        }

        let user = self
            .users
            .find_by_id(&claims.user_id)
            .await?
            .ok_or(SessionError::UserNotFound)?;

        let tokens = self.generate_tokens(&user).await?;

        self.refresh_tokens
            .delete_by_user(&claims.user_id, refresh_token)
            .await?;

        tracing::info!("Rotated refresh token for user {}", user.id);
        Ok(tokens)
    }

    /// Revoke a refresh token for its subject. Revoking twice is not an error.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), SessionError> {
        let claims = self.verify_for_logout(refresh_token)?;
        self.revoke(&claims, refresh_token).await
    }

    /// Like `logout`, but only when the refresh token belongs to `user_id`,
    /// the subject of the caller's access token.
    pub async fn logout_as(
        &self,
        user_id: &str,
        refresh_token: &str,
    ) -> Result<(), SessionError> {
        let claims = self.verify_for_logout(refresh_token)?;
        if claims.user_id != user_id {
            tracing::warn!(
                "Logout rejected: user {} presented a refresh token of another subject",
                user_id
            );
            return Err(SessionError::InvalidRefreshToken);
        }

        self.revoke(&claims, refresh_token).await
    }

    fn verify_for_logout(&self, refresh_token: &str) -> Result<RefreshClaims, SessionError> {
        self.codec.verify_refresh_token(refresh_token).map_err(|e| {
            tracing::warn!("Logout rejected: {}", e);
            SessionError::InvalidRefreshToken
        })
    }

    async fn revoke(
        &self,
        claims: &RefreshClaims,
        refresh_token: &str,
    ) -> Result<(), SessionError> {
        self.refresh_tokens
            .delete_by_user(&claims.user_id, refresh_token)
            .await?;

        tracing::info!("User {} logged out", claims.user_id);
        Ok(())
    }

    /// Revoke a refresh token by value alone, without checking its signature.
    /// Used when a token is known to be compromised.
    pub async fn invalidate_refresh_token(&self, refresh_token: &str) -> Result<(), SessionError> {
        self.refresh_tokens.delete_by_token(refresh_token).await?;
        tracing::info!("Refresh token invalidated");
        Ok(())
    }

    /// Issue an access token for an already-built identity payload
    pub fn mint_access_token(
        &self,
        payload: &IdentityPayload,
        ttl: Duration,
    ) -> Result<IssuedToken, SessionError> {
        mint_access_token(&self.codec, &self.cipher, payload, ttl)
    }

    fn burn_password_check(&self, password: &str) {
        let dummy = self.dummy_hash.get_or_init(|| {
            self.hasher.hash("unknown-account").unwrap_or_else(|e| {
                tracing::warn!("Could not build dummy password hash: {}", e);
                String::new()
            })
        });
        let _ = self.hasher.verify(password, dummy);
    }

    async fn generate_tokens(&self, user: &User) -> Result<AuthTokens, SessionError> {
        let payload = IdentityPayload::for_user(user);
        let data = self.cipher.encrypt(&payload)?;

        let access = self.codec.issue_access_token(data)?;
        let user_id = user.id.to_string();
        let refresh = self.codec.issue_refresh_token(&user_id)?;

        self.refresh_tokens.store(&user_id, &refresh.token).await?;

        Ok(AuthTokens {
            access_token: access.token,
            refresh_token: refresh.token,
            expires_in: self.codec.access_token_ttl_secs(),
        })
    }
}
