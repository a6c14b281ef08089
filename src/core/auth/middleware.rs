//! Request authentication and role gating
//!
//! `authenticate` turns the bearer access token of a request into a
//! [`RequestIdentity`] stored in the request extensions. `capability_gate`
//! reads that identity and checks its role against an allowed set.
//!
//! Both fail closed with a 401/403 and a fixed, generic message. The
//! underlying cause is logged, never returned.
//!
//! ```ignore
//! Router::new()
//!     .route("/api/admin", get(handler))
//!     .route_layer(middleware::from_fn_with_state(require_roles(["ADMIN"]), capability_gate))
//!     .route_layer(middleware::from_fn_with_state(authenticator, authenticate))
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::core::auth::api::ApiError;
use crate::core::auth::cipher::{CipherError, IvMode, PayloadCipher};
use crate::core::auth::identity::{IdentityPayload, RequestIdentity};
use crate::core::auth::jwt::{AccessClaims, JwtConfig, TokenCodec};

// ============================================================================
// Rejections
// ============================================================================

/// Why a request was turned away by the authenticator or the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthRejection {
    #[error("missing access token")]
    MissingToken,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("token data missing")]
    TokenDataMissing,

    #[error("token decryption failed")]
    DecryptionFailed,

    #[error("invalid token user data")]
    InvalidUserData,

    #[error("role missing")]
    RoleMissing,

    #[error("access denied: invalid role")]
    AccessDenied,
}

impl AuthRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            AuthRejection::AccessDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthRejection::MissingToken => "MISSING_TOKEN",
            AuthRejection::InvalidToken => "INVALID_TOKEN",
            AuthRejection::TokenDataMissing => "TOKEN_DATA_MISSING",
            AuthRejection::DecryptionFailed => "TOKEN_DECRYPTION_FAILED",
            AuthRejection::InvalidUserData => "INVALID_TOKEN_USER_DATA",
            AuthRejection::RoleMissing => "ROLE_MISSING",
            AuthRejection::AccessDenied => "ACCESS_DENIED",
        }
    }
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        let body = ApiError::new(self.to_string(), self.code());
        (self.status(), Json(body)).into_response()
    }
}

// ============================================================================
// Authenticator
// ============================================================================

/// Verifies access tokens and recovers the identity they carry
#[derive(Clone)]
pub struct Authenticator {
    codec: TokenCodec,
    cipher: PayloadCipher,
}

impl Authenticator {
    pub fn new(codec: TokenCodec, cipher: PayloadCipher) -> Self {
        Self { codec, cipher }
    }

    /// Build from raw key material, failing on bad key or IV lengths
    pub fn from_secrets(
        signing_secret: &str,
        cipher_key: &[u8],
        cipher_iv: &[u8],
        iv_mode: IvMode,
    ) -> Result<Self, CipherError> {
        let cipher = PayloadCipher::new(cipher_key, cipher_iv, iv_mode)?;
        let codec = TokenCodec::new(JwtConfig::new(signing_secret));
        Ok(Self::new(codec, cipher))
    }

    /// Resolve the identity behind an `Authorization: Bearer` header
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<RequestIdentity, AuthRejection> {
        let token = extract_bearer_token(headers).ok_or(AuthRejection::MissingToken)?;
        self.identity_from_token(token)
    }

    /// Resolve the identity carried by an access token
    pub fn identity_from_token(&self, token: &str) -> Result<RequestIdentity, AuthRejection> {
        let envelope = self.codec.verify::<AccessClaims>(token).map_err(|e| {
            tracing::warn!("Access token rejected: {}", e);
            AuthRejection::InvalidToken
        })?;

        let data = envelope.claims.data;
        if data.is_empty() {
            tracing::warn!("Access token has no data claim");
            return Err(AuthRejection::TokenDataMissing);
        }

        let plaintext = self.cipher.decrypt(&data).map_err(|e| {
            tracing::warn!("Access token payload could not be decrypted: {}", e);
            AuthRejection::DecryptionFailed
        })?;

        let payload: IdentityPayload = serde_json::from_slice(&plaintext).map_err(|e| {
            tracing::warn!("Access token payload is not a valid identity: {}", e);
            AuthRejection::InvalidUserData
        })?;

        Ok(payload.into())
    }
}

/// Bearer string from the Authorization header, `None` when absent or empty
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();

    (!token.is_empty()).then_some(token)
}

/// Authentication middleware for `axum::middleware::from_fn_with_state`
pub async fn authenticate(
    State(authenticator): State<Arc<Authenticator>>,
    mut req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let identity = authenticator.authenticate(req.headers())?;

    tracing::debug!(
        "Authenticated user {} with role {}",
        identity.user_id,
        identity.role
    );

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Handlers behind `authenticate` can take the identity as an argument
impl<S> FromRequestParts<S> for RequestIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestIdentity>()
            .cloned()
            .ok_or(AuthRejection::MissingToken)
    }
}

// ============================================================================
// Capability Gate
// ============================================================================

/// Set of roles allowed through a route, compared case-insensitively
#[derive(Debug, Clone)]
pub struct CapabilityGate {
    allowed: Arc<HashSet<String>>,
}

/// Build a gate admitting any of the given roles
pub fn require_roles<I, R>(roles: I) -> CapabilityGate
where
    I: IntoIterator<Item = R>,
    R: AsRef<str>,
{
    let allowed = roles
        .into_iter()
        .map(|r| r.as_ref().trim().to_uppercase())
        .filter(|r| !r.is_empty())
        .collect();

    CapabilityGate {
        allowed: Arc::new(allowed),
    }
}

impl CapabilityGate {
    /// Decide whether a published role may pass
    pub fn check(&self, role: Option<&str>) -> Result<(), AuthRejection> {
        let role = role
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .ok_or(AuthRejection::RoleMissing)?;

        if self.allowed.contains(&role.to_uppercase()) {
            Ok(())
        } else {
            Err(AuthRejection::AccessDenied)
        }
    }

    pub fn allows(&self, role: &str) -> bool {
        self.check(Some(role)).is_ok()
    }
}

/// Role gate middleware; must run after `authenticate`
pub async fn capability_gate(
    State(gate): State<CapabilityGate>,
    req: Request,
    next: Next,
) -> Result<Response, AuthRejection> {
    let role = req
        .extensions()
        .get::<RequestIdentity>()
        .map(|identity| identity.role.as_str());

    if let Err(rejection) = gate.check(role) {
        tracing::warn!("Capability gate rejected role {:?}", role);
        return Err(rejection);
    }

    Ok(next.run(req).await)
}
