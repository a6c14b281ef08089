//! JWT codec for access and refresh tokens
//!
//! Signs and verifies HS256 tokens. The codec itself does not care what the
//! claims look like: it wraps any serializable claim set in an envelope with
//! `exp`, `iat` and `jti`. Access tokens carry `{data}` (the encrypted identity
//! payload), refresh tokens carry `{user_id, type: "refresh"}`.
//! Access tokens are short-lived (15 minutes), refresh tokens are long-lived (7 days).

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default access token expiration time (15 minutes)
pub const ACCESS_TOKEN_EXPIRATION_MINUTES: i64 = 15;

/// Default refresh token expiration time (7 days)
pub const REFRESH_TOKEN_EXPIRATION_DAYS: i64 = 7;

/// Value of the `type` claim on refresh tokens
pub const REFRESH_TOKEN_TYPE: &str = "refresh";

/// Signing algorithm; tokens declaring anything else are rejected
const SIGNING_ALGORITHM: Algorithm = Algorithm::HS256;

/// JWT configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Secret key for signing tokens
    pub secret: String,
    /// Access token expiration in minutes
    pub access_token_expiration_minutes: i64,
    /// Refresh token expiration in days
    pub refresh_token_expiration_days: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field(
                "access_token_expiration_minutes",
                &self.access_token_expiration_minutes,
            )
            .field(
                "refresh_token_expiration_days",
                &self.refresh_token_expiration_days,
            )
            .finish_non_exhaustive()
    }
}

impl JwtConfig {
    /// Create a new JWT configuration
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            access_token_expiration_minutes: ACCESS_TOKEN_EXPIRATION_MINUTES,
            refresh_token_expiration_days: REFRESH_TOKEN_EXPIRATION_DAYS,
        }
    }

    /// Set access token expiration
    pub fn access_token_expiration(mut self, minutes: i64) -> Self {
        self.access_token_expiration_minutes = minutes;
        self
    }

    /// Set refresh token expiration
    pub fn refresh_token_expiration(mut self, days: i64) -> Self {
        self.refresh_token_expiration_days = days;
        self
    }

    /// `None` when the configured minutes overflow a `Duration`
    pub fn access_token_ttl(&self) -> Option<Duration> {
        Duration::try_minutes(self.access_token_expiration_minutes)
    }

    /// `None` when the configured days overflow a `Duration`
    pub fn refresh_token_ttl(&self) -> Option<Duration> {
        Duration::try_days(self.refresh_token_expiration_days)
    }
}

/// Whether a token issued now with this lifetime has a representable expiry
pub fn lifetime_in_range(ttl: Duration) -> bool {
    Utc::now().checked_add_signed(ttl).is_some()
}

fn lifetime_out_of_range(kind: &str) -> TokenError {
    TokenError::Encoding(format!("{} token lifetime out of range", kind))
}

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token encoding failed: {0}")]
    Encoding(String),

    #[error("Token expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Unexpected token signing algorithm")]
    InvalidAlgorithm,

    #[error("Malformed token: {0}")]
    Malformed(String),

    #[error("Invalid token type")]
    WrongTokenType,
}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature => TokenError::InvalidSignature,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                TokenError::InvalidAlgorithm
            }
            _ => TokenError::Malformed(err.to_string()),
        }
    }
}

/// Claim envelope shared by every token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenEnvelope<C> {
    #[serde(flatten)]
    pub claims: C,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default)]
    pub iat: i64,
    /// JWT ID (unique identifier for this token)
    #[serde(default)]
    pub jti: String,
}

/// Application claims of an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Hex ciphertext of the identity payload
    #[serde(default)]
    pub data: String,
}

/// Application claims of a refresh token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    #[serde(default)]
    pub user_id: String,
    #[serde(rename = "type", default)]
    pub token_type: String,
}

impl RefreshClaims {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            token_type: REFRESH_TOKEN_TYPE.to_string(),
        }
    }

    pub fn is_refresh_token(&self) -> bool {
        self.token_type == REFRESH_TOKEN_TYPE
    }
}

/// A freshly signed token
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    /// Expiration (Unix timestamp)
    pub expires_at: i64,
}

/// JWT codec for token operations
#[derive(Clone)]
pub struct TokenCodec {
    config: JwtConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl TokenCodec {
    /// Create a new token codec
    pub fn new(config: JwtConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Sign a claim set that expires `ttl` from now
    pub fn issue<C: Serialize>(&self, claims: C, ttl: Duration) -> Result<IssuedToken, TokenError> {
        let now = Utc::now();
        let exp = now
            .checked_add_signed(ttl)
            .ok_or_else(|| lifetime_out_of_range("requested"))?
            .timestamp();

        let envelope = TokenEnvelope {
            claims,
            exp,
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(SIGNING_ALGORITHM), &envelope, &self.encoding_key)
            .map_err(|e| TokenError::Encoding(e.to_string()))?;

        Ok(IssuedToken {
            token,
            expires_at: exp,
        })
    }

    /// Verify signature, algorithm and expiry, then decode the claims
    pub fn verify<C: DeserializeOwned>(&self, token: &str) -> Result<TokenEnvelope<C>, TokenError> {
        let mut validation = Validation::new(SIGNING_ALGORITHM);
        // Set leeway to 0 for strict expiration checking
        validation.leeway = 0;

        let token_data = decode::<TokenEnvelope<C>>(token, &self.decoding_key, &validation)?;

        Ok(token_data.claims)
    }

    /// Issue an access token carrying the given ciphertext
    pub fn issue_access_token(&self, data: impl Into<String>) -> Result<IssuedToken, TokenError> {
        let ttl = self
            .config
            .access_token_ttl()
            .ok_or_else(|| lifetime_out_of_range("access"))?;
        self.issue(AccessClaims { data: data.into() }, ttl)
    }

    /// Issue a refresh token for a subject
    pub fn issue_refresh_token(&self, user_id: &str) -> Result<IssuedToken, TokenError> {
        let ttl = self
            .config
            .refresh_token_ttl()
            .ok_or_else(|| lifetime_out_of_range("refresh"))?;
        self.issue(RefreshClaims::new(user_id), ttl)
    }

    /// Verify a refresh token and check its `type` claim
    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let envelope = self.verify::<RefreshClaims>(token)?;

        if !envelope.claims.is_refresh_token() {
            return Err(TokenError::WrongTokenType);
        }
        if envelope.claims.user_id.is_empty() {
            return Err(TokenError::Malformed("user_id missing in token".to_string()));
        }

        Ok(envelope.claims)
    }

    /// Access token lifetime in seconds
    pub fn access_token_ttl_secs(&self) -> i64 {
        self.config.access_token_expiration_minutes.saturating_mul(60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_codec() -> TokenCodec {
        TokenCodec::new(JwtConfig::new("test_secret_key_for_testing_only_32bytes!"))
    }

    // ========================================================================
    // JwtConfig Tests
    // ========================================================================

    #[test]
    fn test_jwt_config_new() {
        let config = JwtConfig::new("my_secret");

        assert_eq!(config.secret, "my_secret");
        assert_eq!(
            config.access_token_expiration_minutes,
            ACCESS_TOKEN_EXPIRATION_MINUTES
        );
        assert_eq!(
            config.refresh_token_expiration_days,
            REFRESH_TOKEN_EXPIRATION_DAYS
        );
    }

    #[test]
    fn test_jwt_config_builder() {
        let config = JwtConfig::new("secret")
            .access_token_expiration(30)
            .refresh_token_expiration(14);

        assert_eq!(config.access_token_ttl(), Some(Duration::minutes(30)));
        assert_eq!(config.refresh_token_ttl(), Some(Duration::days(14)));
    }

    #[test]
    fn test_jwt_config_debug_hides_secret() {
        let debug = format!("{:?}", JwtConfig::new("super_secret_value"));
        assert!(!debug.contains("super_secret_value"));
    }

    #[test]
    fn test_access_ttl_is_fifteen_minutes() {
        assert_eq!(create_test_codec().access_token_ttl_secs(), 900);
    }

    // ========================================================================
    // Issue / Verify Tests
    // ========================================================================

    #[test]
    fn test_access_token_round_trip() {
        let codec = create_test_codec();

        let issued = codec.issue_access_token("deadbeef").unwrap();
        assert!(!issued.token.is_empty());
        assert!(issued.expires_at > Utc::now().timestamp());

        let envelope = codec.verify::<AccessClaims>(&issued.token).unwrap();
        assert_eq!(envelope.claims.data, "deadbeef");
        assert_eq!(envelope.exp, issued.expires_at);
    }

    #[test]
    fn test_refresh_token_round_trip() {
        let codec = create_test_codec();

        let issued = codec.issue_refresh_token("user-1").unwrap();
        let claims = codec.verify_refresh_token(&issued.token).unwrap();

        assert_eq!(claims.user_id, "user-1");
        assert!(claims.is_refresh_token());
    }

    #[test]
    fn test_refresh_claims_wire_shape() {
        let json = serde_json::to_value(RefreshClaims::new("u1")).unwrap();
        assert_eq!(json["user_id"], "u1");
        assert_eq!(json["type"], "refresh");
    }

    #[test]
    fn test_tokens_in_same_second_differ() {
        let codec = create_test_codec();

        let a = codec.issue_refresh_token("user-1").unwrap();
        let b = codec.issue_refresh_token("user-1").unwrap();

        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_access_token_is_not_a_refresh_token() {
        let codec = create_test_codec();
        let issued = codec.issue_access_token("deadbeef").unwrap();

        let result = codec.verify_refresh_token(&issued.token);
        assert!(matches!(result, Err(TokenError::WrongTokenType)));
    }

    #[test]
    fn test_refresh_token_without_subject_rejected() {
        let codec = create_test_codec();
        let issued = codec
            .issue(RefreshClaims::new(""), Duration::minutes(5))
            .unwrap();

        let result = codec.verify_refresh_token(&issued.token);
        assert!(matches!(result, Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_legacy_access_token_without_jti() {
        #[derive(Serialize)]
        struct Legacy {
            data: String,
            exp: i64,
        }

        let codec = create_test_codec();
        let token = encode(
            &Header::new(Algorithm::HS256),
            &Legacy {
                data: "cafe".to_string(),
                exp: Utc::now().timestamp() + 60,
            },
            &EncodingKey::from_secret(b"test_secret_key_for_testing_only_32bytes!"),
        )
        .unwrap();

        let envelope = codec.verify::<AccessClaims>(&token).unwrap();
        assert_eq!(envelope.claims.data, "cafe");
        assert!(envelope.jti.is_empty());
    }

    // ========================================================================
    // Rejection Tests
    // ========================================================================

    #[test]
    fn test_validate_invalid_token() {
        let codec = create_test_codec();

        let result = codec.verify::<AccessClaims>("invalid.token.here");
        assert!(matches!(result, Err(TokenError::Malformed(_))));
    }

    #[test]
    fn test_validate_token_wrong_secret() {
        let codec1 = TokenCodec::new(JwtConfig::new("secret_one"));
        let codec2 = TokenCodec::new(JwtConfig::new("secret_two"));

        let issued = codec1.issue_access_token("deadbeef").unwrap();

        let result = codec2.verify::<AccessClaims>(&issued.token);
        assert!(matches!(result, Err(TokenError::InvalidSignature)));
    }

    #[test]
    fn test_expired_token() {
        // Negative expiration puts exp in the past
        let config = JwtConfig::new("test_secret").access_token_expiration(-1);
        let codec = TokenCodec::new(config);

        let issued = codec.issue_access_token("deadbeef").unwrap();

        let result = codec.verify::<AccessClaims>(&issued.token);
        assert!(
            matches!(result, Err(TokenError::Expired)),
            "Expected Expired error, got: {:?}",
            result
        );
    }

    #[test]
    fn test_huge_lifetime_is_an_error() {
        // Representable as a Duration, but the expiry is past chrono's max date
        let codec = TokenCodec::new(
            JwtConfig::new("test_secret").access_token_expiration(1_000_000_000_000),
        );
        assert!(matches!(
            codec.issue_access_token("deadbeef"),
            Err(TokenError::Encoding(_))
        ));

        // Overflows Duration itself
        let codec =
            TokenCodec::new(JwtConfig::new("test_secret").refresh_token_expiration(i64::MAX));
        assert!(codec.config().refresh_token_ttl().is_none());
        assert!(matches!(
            codec.issue_refresh_token("user-1"),
            Err(TokenError::Encoding(_))
        ));

        assert!(!lifetime_in_range(Duration::MAX));
        assert!(lifetime_in_range(Duration::days(7)));
    }

    #[test]
    fn test_algorithm_confusion_rejected() {
        let secret = "test_secret_key_for_testing_only_32bytes!";
        let codec = TokenCodec::new(JwtConfig::new(secret));

        let token = encode(
            &Header::new(Algorithm::HS512),
            &TokenEnvelope {
                claims: AccessClaims {
                    data: "deadbeef".to_string(),
                },
                exp: Utc::now().timestamp() + 60,
                iat: Utc::now().timestamp(),
                jti: "x".to_string(),
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap();

        let result = codec.verify::<AccessClaims>(&token);
        assert!(matches!(result, Err(TokenError::InvalidAlgorithm)));
    }

    #[test]
    fn test_unsigned_token_rejected() {
        let codec = create_test_codec();

        // {"alg":"none","typ":"JWT"} . {"data":"deadbeef","exp":9999999999} . <empty>
        let token = "eyJhbGciOiJub25lIiwidHlwIjoiSldUIn0.\
                     eyJkYXRhIjoiZGVhZGJlZWYiLCJleHAiOjk5OTk5OTk5OTl9.";

        assert!(codec.verify::<AccessClaims>(token).is_err());
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let codec = create_test_codec();
        let issued = codec.issue_access_token("deadbeef").unwrap();

        let mut parts: Vec<String> = issued.token.split('.').map(String::from).collect();
        let mut payload = parts[1].clone().into_bytes();
        let last = payload.len() - 2;
        payload[last] = if payload[last] == b'A' { b'B' } else { b'A' };
        parts[1] = String::from_utf8(payload).unwrap();

        let result = codec.verify::<AccessClaims>(&parts.join("."));
        assert!(result.is_err());
    }

    // ========================================================================
    // Error Tests
    // ========================================================================

    #[test]
    fn test_token_error_display() {
        assert_eq!(format!("{}", TokenError::Expired), "Token expired");
        assert_eq!(
            format!("{}", TokenError::WrongTokenType),
            "Invalid token type"
        );
        assert_eq!(
            format!("{}", TokenError::InvalidSignature),
            "Invalid token signature"
        );
    }
}
