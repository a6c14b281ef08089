//! Auth API endpoints
//!
//! Provides REST API endpoints for authentication:
//! - POST /api/auth/register - Register a new user
//! - POST /api/auth/login - Login and get tokens
//! - POST /api/auth/refresh - Rotate the refresh token
//! - PATCH /api/auth/logout - Logout (revoke refresh token, access token required)
//! - GET /api/auth/me - Identity carried by the access token

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Serialize;
use std::sync::Arc;

use crate::core::auth::identity::RequestIdentity;
use crate::core::auth::middleware::{Authenticator, authenticate};
use crate::core::auth::service::{
    AuthTokens, LoginRequest, RefreshRequest, RegisterRequest, SessionError, SessionService,
};
use crate::core::db::models::UserResponse;

/// Auth API state
#[derive(Clone)]
pub struct AuthApiState {
    pub session_service: SessionService,
    pub authenticator: Arc<Authenticator>,
}

impl AuthApiState {
    /// State whose authenticator shares the service's codec and cipher
    pub fn new(session_service: SessionService) -> Self {
        let authenticator = Arc::new(Authenticator::new(
            session_service.codec().clone(),
            session_service.cipher().clone(),
        ));

        Self {
            session_service,
            authenticator,
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }
}

/// Convert SessionError to API response
impl IntoResponse for SessionError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SessionError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            SessionError::InvalidRefreshToken => {
                (StatusCode::UNAUTHORIZED, "INVALID_REFRESH_TOKEN")
            }
            SessionError::RefreshTokenNotValid => {
                (StatusCode::UNAUTHORIZED, "REFRESH_TOKEN_NOT_VALID")
            }
            SessionError::UserNotFound => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
            SessionError::EmailAlreadyExists => (StatusCode::CONFLICT, "EMAIL_EXISTS"),
            SessionError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            SessionError::Store(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORE_UNAVAILABLE"),
            SessionError::Token(_)
            | SessionError::Cipher(_)
            | SessionError::Password(_)
            | SessionError::Directory(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let message = match &self {
            SessionError::Store(e) => {
                tracing::error!("Refresh token store failure: {}", e);
                "token store unavailable, please retry".to_string()
            }
            SessionError::Token(_)
            | SessionError::Cipher(_)
            | SessionError::Password(_)
            | SessionError::Directory(_) => {
                tracing::error!("Internal auth error: {}", self);
                "internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(ApiError::new(message, code))).into_response()
    }
}

/// Response for logout
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

/// Create the auth API router
pub fn auth_api_router(state: AuthApiState) -> Router {
    let authenticator = state.authenticator.clone();
    let state = Arc::new(state);

    let protected = Router::new()
        .route("/api/auth/logout", patch(logout_handler))
        .route("/api/auth/me", get(me_handler))
        .route_layer(middleware::from_fn_with_state(authenticator, authenticate));

    Router::new()
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .merge(protected)
        .with_state(state)
}

/// POST /api/auth/register
/// Register a new user
async fn register_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), SessionError> {
    let user = state.session_service.register(request).await?;

    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /api/auth/login
/// Login and get access/refresh tokens
async fn login_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthTokens>, SessionError> {
    let tokens = state.session_service.login(request).await?;

    Ok(Json(tokens))
}

/// POST /api/auth/refresh
/// Exchange a refresh token for a new token pair
async fn refresh_handler(
    State(state): State<Arc<AuthApiState>>,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthTokens>, SessionError> {
    tracing::debug!("Token refresh request");
    request.validate()?;

    let tokens = state.session_service.refresh(&request.refresh_token).await?;

    Ok(Json(tokens))
}

/// PATCH /api/auth/logout
/// Revoke the given refresh token
async fn logout_handler(
    State(state): State<Arc<AuthApiState>>,
    identity: RequestIdentity,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<LogoutResponse>, SessionError> {
    tracing::info!("Logout request from user {}", identity.user_id);
    request.validate()?;

    state
        .session_service
        .logout_as(&identity.user_id, &request.refresh_token)
        .await?;

    Ok(Json(LogoutResponse {
        message: "Logged out successfully".to_string(),
    }))
}

/// GET /api/auth/me
/// Identity carried by the caller's access token
async fn me_handler(identity: RequestIdentity) -> Json<RequestIdentity> {
    Json(identity)
}
