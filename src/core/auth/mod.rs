//! Authentication module for fleetgate
//!
//! This module provides the token-based identity and session subsystem:
//! - AES-256-CBC encryption of the identity payload
//! - HS256 access and refresh tokens
//! - Register, login, refresh and logout
//! - Request authentication and role gating middleware
//! - REST API endpoints for auth operations

pub mod api;
pub mod cipher;
pub mod identity;
pub mod jwt;
pub mod middleware;
pub mod password;
pub mod service;

pub use api::{ApiError, AuthApiState, auth_api_router};
pub use cipher::{CipherError, IvMode, PayloadCipher};
pub use identity::{AccountType, IdentityPayload, RequestIdentity, Role};
pub use jwt::{JwtConfig, TokenCodec, TokenError};
pub use middleware::{
    AuthRejection, Authenticator, CapabilityGate, authenticate, capability_gate, require_roles,
};
pub use password::{PasswordError, PasswordHasher};
pub use service::{
    AuthTokens, LoginRequest, RefreshRequest, RegisterRequest, SessionError, SessionService,
};
