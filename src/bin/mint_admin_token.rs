//! Admin Token Minter
//!
//! Prints a signed access token carrying an ADMIN identity, for bootstrapping
//! and operator access. Reads JWT_SECRET_KEY, CIPHER_KEY, CIPHER_IV and
//! CIPHER_IV_MODE from the environment (or `.env`). No refresh token is issued.
//!
//! Usage:
//!   cargo run --bin mint-admin-token
//!   cargo run --bin mint-admin-token -- --ttl-hours 2 --user-id ops-007

use chrono::Duration;
use clap::Parser;
use fleetgate::core::auth::identity::{AccountType, IdentityPayload, Role};
use fleetgate::core::auth::jwt::lifetime_in_range;
use fleetgate::core::auth::service::mint_access_token;
use fleetgate::core::config::Config;

#[derive(Parser, Debug)]
#[command(name = "mint-admin-token")]
#[command(about = "Mint an ADMIN access token for operator use")]
struct Args {
    /// Subject id written into the token
    #[arg(long, default_value = "admin-001")]
    user_id: String,

    /// Display name
    #[arg(long, default_value = "Admin User")]
    full_name: String,

    #[arg(long, default_value = "admin")]
    username: String,

    #[arg(long, default_value = "admin-org-001")]
    organization_id: String,

    #[arg(long, default_value = "+251900000000")]
    phone_number: String,

    /// individual or company
    #[arg(long, default_value = "company")]
    account_type: AccountType,

    /// Token lifetime in hours
    #[arg(long, env = "ADMIN_TOKEN_TTL_HOURS", default_value_t = 24)]
    ttl_hours: i64,
}

fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = Args::parse();

    match mint(&args) {
        Ok(token) => println!("{}", token),
        Err(e) => {
            tracing::error!("Failed to mint admin token: {}", e);
            std::process::exit(1);
        }
    }
}

fn mint(args: &Args) -> Result<String, Box<dyn std::error::Error>> {
    let ttl = token_ttl(args.ttl_hours)?;

    let config = Config::from_env()?;
    let codec = config.token_codec();
    let cipher = config.payload_cipher()?;

    let payload = IdentityPayload {
        account_type: args.account_type,
        user_id: args.user_id.clone(),
        user_role: Role::Admin,
        full_name: args.full_name.clone(),
        username: args.username.clone(),
        organization_id: Some(args.organization_id.clone()),
        phone_number: args.phone_number.clone(),
    };

    let issued = mint_access_token(&codec, &cipher, &payload, ttl)?;
    tracing::info!(
        "Minted ADMIN token for {} expiring at {}",
        payload.user_id,
        issued.expires_at
    );

    Ok(issued.token)
}

fn token_ttl(hours: i64) -> Result<Duration, String> {
    if hours <= 0 {
        return Err("--ttl-hours must be positive".to_string());
    }

    Duration::try_hours(hours)
        .filter(|ttl| lifetime_in_range(*ttl))
        .ok_or_else(|| format!("--ttl-hours {} is too large", hours))
}
