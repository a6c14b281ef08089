//! Identity types carried inside access tokens
//!
//! `IdentityPayload` is the structure that gets encrypted into the `data`
//! claim of an access token. `RequestIdentity` is what the authenticator
//! publishes for the lifetime of a single request.

use serde::{Deserialize, Serialize};

use crate::core::db::models::User;

/// Account type of a registered user
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "text", rename_all = "lowercase")]
pub enum AccountType {
    #[default]
    Individual,
    Company,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Individual => "individual",
            AccountType::Company => "company",
        }
    }
}

impl std::str::FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "individual" => Ok(AccountType::Individual),
            "company" => Ok(AccountType::Company),
            other => Err(format!("unknown account type '{}'", other)),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role granted to a subject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    FleetManager,
    Admin,
}

impl Role {
    /// Derive the role for an account type.
    ///
    /// Individuals are plain users and companies manage fleets. This is
    /// evaluated once per issuance and frozen inside the access token.
    pub fn for_account_type(account_type: AccountType) -> Self {
        match account_type {
            AccountType::Individual => Role::User,
            AccountType::Company => Role::FleetManager,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::FleetManager => "FLEET_MANAGER",
            Role::Admin => "ADMIN",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity claims encrypted into an access token.
///
/// Field order is the serialization order; `user_type` leads so the first
/// cipher block always starts with a closed-set value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityPayload {
    #[serde(rename = "user_type")]
    pub account_type: AccountType,
    pub user_id: String,
    pub user_role: Role,
    pub full_name: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    pub phone_number: String,
}

impl IdentityPayload {
    /// Build the payload for a user, deriving the role from its account type
    pub fn for_user(user: &User) -> Self {
        let role = Role::for_account_type(user.account_type);

        tracing::debug!(
            "Deriving role {} for user {} (account type {})",
            role,
            user.id,
            user.account_type
        );

        Self {
            account_type: user.account_type,
            user_id: user.id.to_string(),
            user_role: role,
            full_name: user.full_name.clone(),
            username: user.full_name.clone(),
            organization_id: user.organization_id.clone(),
            phone_number: user.phone_number.clone(),
        }
    }
}

/// Identity of the caller, valid for one request only.
///
/// Inserted into the request extensions by the authenticator and read by the
/// capability gate and handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestIdentity {
    pub user_id: String,
    pub role: Role,
    pub account_type: AccountType,
    pub organization_id: Option<String>,
    pub phone_number: String,
    pub full_name: String,
}

impl From<IdentityPayload> for RequestIdentity {
    fn from(payload: IdentityPayload) -> Self {
        Self {
            user_id: payload.user_id,
            role: payload.user_role,
            account_type: payload.account_type,
            organization_id: payload.organization_id,
            phone_number: payload.phone_number,
            full_name: payload.full_name,
        }
    }
}
